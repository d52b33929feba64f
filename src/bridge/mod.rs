//! Seams to the desktop: screen grabbing, focus probing, OCR, pointer events
//! and the status window. The pipeline only talks to these traits; `desktop`
//! holds the real implementations.

mod desktop;
mod status;

pub use desktop::{RdevPointer, TesseractOcr, XcapScreen};
pub use status::ConsoleStatus;

use std::sync::Arc;

use image::RgbImage;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::error::CaptureResult;
use crate::models::{CaptureRegion, PointerPress, WindowBounds};
use crate::settings::HunterSettings;
use crate::tagger::{LabelValidator, StubValidator};

/// Pixels as delivered by a capture, always 3-channel RGB.
pub type RawImage = RgbImage;

pub trait ScreenCapture: Send + Sync {
    /// Grabs `region` (the primary display when `None`). Regions reaching past
    /// the screen edge are clipped rather than rejected.
    fn capture(&self, region: Option<CaptureRegion>) -> CaptureResult<RawImage>;
}

pub trait TextExtractor: Send + Sync {
    /// Recognized text; may be empty or garbled.
    fn recognize(&self, image: &RawImage) -> CaptureResult<String>;
}

pub trait ForegroundProbe: Send + Sync {
    /// Name of the application owning the focused window, if any.
    fn foreground_app(&self) -> CaptureResult<Option<String>>;
}

/// The floating status window. Called from the monitor tasks and the tagger
/// concurrently.
pub trait StatusSink: Send + Sync {
    fn update_status(&self, message: &str);

    /// Current on-screen rectangle of the window, queried live because the
    /// user can drag it around.
    fn window_bounds(&self) -> Option<WindowBounds>;
}

pub trait PointerSource: Send + Sync {
    /// Starts delivering button presses. Fails if the system-wide listener
    /// cannot be installed (missing accessibility permission, no display).
    fn subscribe(&self) -> CaptureResult<UnboundedReceiver<PointerPress>>;
}

/// Everything the pipeline needs from the outside world.
#[derive(Clone)]
pub struct Collaborators {
    pub capture: Arc<dyn ScreenCapture>,
    pub ocr: Arc<dyn TextExtractor>,
    pub foreground: Arc<dyn ForegroundProbe>,
    pub status: Arc<dyn StatusSink>,
    pub pointer: Arc<dyn PointerSource>,
    pub validator: Arc<dyn LabelValidator>,
}

impl Collaborators {
    /// Real desktop implementations with a log-backed status window.
    pub fn desktop(settings: &HunterSettings) -> Self {
        Self {
            capture: Arc::new(XcapScreen),
            ocr: Arc::new(TesseractOcr::new(&settings.ocr_language)),
            foreground: Arc::new(XcapScreen),
            status: Arc::new(ConsoleStatus::new(Some(settings.status_window))),
            pointer: Arc::new(RdevPointer),
            validator: Arc::new(StubValidator),
        }
    }
}

/// Loose match between a window-system application name and the configured
/// target, so "google-chrome" and "Google Chrome" agree.
pub fn app_matches(app_name: &str, target: &str) -> bool {
    let app = normalize_app_name(app_name);
    let target = normalize_app_name(target);
    !target.is_empty() && app.contains(&target)
}

fn normalize_app_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Scripted collaborators for exercising the monitors without a desktop.
#[cfg(test)]
pub(crate) mod fakes {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    use image::{Rgb, RgbImage};
    use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

    use super::*;
    use crate::error::CaptureError;

    pub struct FixedForeground(pub Mutex<Option<String>>);

    impl FixedForeground {
        pub fn new(app: Option<&str>) -> Self {
            Self(Mutex::new(app.map(String::from)))
        }

        pub fn set(&self, app: Option<&str>) {
            *self.0.lock().unwrap() = app.map(String::from);
        }
    }

    impl ForegroundProbe for FixedForeground {
        fn foreground_app(&self) -> CaptureResult<Option<String>> {
            Ok(self.0.lock().unwrap().clone())
        }
    }

    /// Returns a solid image of the requested size and counts calls.
    #[derive(Default)]
    pub struct CountingCapture {
        pub calls: AtomicUsize,
        pub fail: AtomicBool,
        pub regions: Mutex<Vec<Option<CaptureRegion>>>,
    }

    impl CountingCapture {
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ScreenCapture for CountingCapture {
        fn capture(&self, region: Option<CaptureRegion>) -> CaptureResult<RawImage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.regions.lock().unwrap().push(region);
            if self.fail.load(Ordering::SeqCst) {
                return Err(CaptureError::Backend("scripted failure".into()));
            }
            let (w, h) = region.map(|r| (r.width, r.height)).unwrap_or((64, 32));
            Ok(RgbImage::from_pixel(w.max(1), h.max(1), Rgb([120, 80, 40])))
        }
    }

    /// Hands out queued transcripts, repeating the last one once drained.
    pub struct ScriptedOcr {
        texts: Mutex<VecDeque<String>>,
        last: Mutex<String>,
        pub calls: AtomicUsize,
    }

    impl ScriptedOcr {
        pub fn new(texts: &[&str]) -> Self {
            Self {
                texts: Mutex::new(texts.iter().map(|t| t.to_string()).collect()),
                last: Mutex::new(String::new()),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TextExtractor for ScriptedOcr {
        fn recognize(&self, _image: &RawImage) -> CaptureResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut last = self.last.lock().unwrap();
            if let Some(next) = self.texts.lock().unwrap().pop_front() {
                *last = next;
            }
            Ok(last.clone())
        }
    }

    #[derive(Default)]
    pub struct RecordingStatus {
        pub messages: Mutex<Vec<String>>,
        pub bounds: Mutex<Option<WindowBounds>>,
    }

    impl RecordingStatus {
        pub fn messages(&self) -> Vec<String> {
            self.messages.lock().unwrap().clone()
        }
    }

    impl StatusSink for RecordingStatus {
        fn update_status(&self, message: &str) {
            self.messages.lock().unwrap().push(message.to_string());
        }

        fn window_bounds(&self) -> Option<WindowBounds> {
            *self.bounds.lock().unwrap()
        }
    }

    /// Pointer source fed by the test through the returned sender.
    pub struct ChannelPointer {
        rx: Mutex<Option<UnboundedReceiver<PointerPress>>>,
    }

    impl ChannelPointer {
        pub fn new() -> (Self, UnboundedSender<PointerPress>) {
            let (tx, rx) = mpsc::unbounded_channel();
            (
                Self {
                    rx: Mutex::new(Some(rx)),
                },
                tx,
            )
        }
    }

    impl PointerSource for ChannelPointer {
        fn subscribe(&self) -> CaptureResult<UnboundedReceiver<PointerPress>> {
            self.rx
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| CaptureError::Listener("already subscribed".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_names_match_loosely() {
        assert!(app_matches("Google Chrome", "Google Chrome"));
        assert!(app_matches("google-chrome", "Google Chrome"));
        assert!(app_matches("Google Chrome Canary", "google chrome"));
        assert!(!app_matches("Firefox", "Google Chrome"));
        assert!(!app_matches("Firefox", ""));
    }
}
