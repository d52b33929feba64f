use std::sync::mpsc as std_mpsc;
use std::thread;
use std::time::{Duration, Instant};

use image::{DynamicImage, GrayImage, RgbImage};
use rdev::{Button, EventType};
use rusty_tesseract::Args;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use xcap::{Monitor, Window};

use super::{ForegroundProbe, PointerSource, RawImage, ScreenCapture, TextExtractor};
use crate::error::{CaptureError, CaptureResult};
use crate::models::{CaptureRegion, PointerButton, PointerPress, ScreenRect};

/// How long `subscribe` waits for the OS listener to fail before assuming it
/// is installed. `rdev::listen` only returns on failure.
const LISTENER_STARTUP_GRACE: Duration = Duration::from_millis(250);

const OCR_THRESHOLD: u8 = 128;

/// Screen grabbing and focus probing through `xcap`.
#[derive(Debug, Default, Clone, Copy)]
pub struct XcapScreen;

impl XcapScreen {
    fn monitor_rect(monitor: &Monitor) -> CaptureResult<ScreenRect> {
        Ok(ScreenRect {
            x: monitor.x().map_err(backend)?,
            y: monitor.y().map_err(backend)?,
            width: monitor.width().map_err(backend)?,
            height: monitor.height().map_err(backend)?,
        })
    }

    fn primary_monitor(monitors: Vec<Monitor>) -> CaptureResult<Monitor> {
        let mut fallback = None;
        for monitor in monitors {
            if monitor.is_primary().unwrap_or(false) {
                return Ok(monitor);
            }
            fallback.get_or_insert(monitor);
        }
        fallback.ok_or(CaptureError::NoMonitor { left: 0, top: 0 })
    }
}

impl ScreenCapture for XcapScreen {
    fn capture(&self, region: Option<CaptureRegion>) -> CaptureResult<RawImage> {
        let monitors = Monitor::all().map_err(backend)?;

        let Some(region) = region else {
            let monitor = Self::primary_monitor(monitors)?;
            let rgba = monitor.capture_image().map_err(backend)?;
            return Ok(DynamicImage::ImageRgba8(rgba).to_rgb8());
        };

        let mut target = None;
        for monitor in monitors {
            let rect = Self::monitor_rect(&monitor)?;
            if rect.contains(i64::from(region.left), i64::from(region.top)) {
                target = Some((monitor, rect));
                break;
            }
        }
        let (monitor, rect) = target.ok_or(CaptureError::NoMonitor {
            left: region.left,
            top: region.top,
        })?;

        let clipped = region.clip_to(&rect).ok_or(CaptureError::EmptyRegion {
            left: region.left,
            top: region.top,
            width: region.width,
            height: region.height,
        })?;

        // xcap wants coordinates relative to the monitor origin.
        let rel_x = (i64::from(clipped.left) - i64::from(rect.x)) as u32;
        let rel_y = (i64::from(clipped.top) - i64::from(rect.y)) as u32;
        let rgba = monitor
            .capture_region(rel_x, rel_y, clipped.width, clipped.height)
            .map_err(backend)?;

        Ok(DynamicImage::ImageRgba8(rgba).to_rgb8())
    }
}

impl ForegroundProbe for XcapScreen {
    fn foreground_app(&self) -> CaptureResult<Option<String>> {
        let windows = Window::all().map_err(|e| CaptureError::Foreground(e.to_string()))?;
        for window in windows {
            if window.is_focused().unwrap_or(false) {
                return window
                    .app_name()
                    .map(Some)
                    .map_err(|e| CaptureError::Foreground(e.to_string()));
            }
        }
        Ok(None)
    }
}

fn backend(err: xcap::XCapError) -> CaptureError {
    CaptureError::Backend(err.to_string())
}

/// Tesseract OCR on a binarised copy of the capture.
#[derive(Clone)]
pub struct TesseractOcr {
    args: Args,
}

impl TesseractOcr {
    pub fn new(language: &str) -> Self {
        Self {
            args: Args {
                lang: language.to_string(),
                ..Args::default()
            },
        }
    }
}

impl TextExtractor for TesseractOcr {
    fn recognize(&self, image: &RawImage) -> CaptureResult<String> {
        let prepared = DynamicImage::ImageLuma8(binarize(image));
        let tess_image = rusty_tesseract::Image::from_dynamic_image(&prepared)
            .map_err(|e| CaptureError::Recognition(e.to_string()))?;
        rusty_tesseract::image_to_string(&tess_image, &self.args)
            .map_err(|e| CaptureError::Recognition(e.to_string()))
    }
}

/// Grayscale then hard threshold; browser chrome text survives this far
/// better than anti-aliased colour.
pub(crate) fn binarize(image: &RgbImage) -> GrayImage {
    let mut gray = image::imageops::grayscale(image);
    for pixel in gray.pixels_mut() {
        pixel.0[0] = if pixel.0[0] < OCR_THRESHOLD { 0 } else { 255 };
    }
    gray
}

/// System-wide pointer presses via `rdev`.
///
/// The listener runs on its own OS thread for the life of the process; rdev
/// has no way to uninstall it. Dropping the receiver just discards presses.
#[derive(Debug, Default, Clone, Copy)]
pub struct RdevPointer;

impl PointerSource for RdevPointer {
    fn subscribe(&self) -> CaptureResult<UnboundedReceiver<PointerPress>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (failed_tx, failed_rx) = std_mpsc::channel::<String>();

        thread::Builder::new()
            .name("pointer-listener".into())
            .spawn(move || {
                // Presses carry no coordinates, so remember the last move.
                let mut position = (0.0_f64, 0.0_f64);
                let result = rdev::listen(move |event| match event.event_type {
                    EventType::MouseMove { x, y } => position = (x, y),
                    EventType::ButtonPress(button) => {
                        let _ = tx.send(PointerPress {
                            x: position.0,
                            y: position.1,
                            button: map_button(button),
                            at: Instant::now(),
                        });
                    }
                    _ => {}
                });

                if let Err(err) = result {
                    let _ = failed_tx.send(format!("{err:?}"));
                }
            })
            .map_err(|e| CaptureError::Listener(e.to_string()))?;

        match failed_rx.recv_timeout(LISTENER_STARTUP_GRACE) {
            Ok(reason) => Err(CaptureError::Listener(reason)),
            Err(std_mpsc::RecvTimeoutError::Timeout) => Ok(rx),
            Err(std_mpsc::RecvTimeoutError::Disconnected) => Err(CaptureError::Listener(
                "listener exited without reporting an error".into(),
            )),
        }
    }
}

fn map_button(button: Button) -> PointerButton {
    match button {
        Button::Left => PointerButton::Primary,
        Button::Right => PointerButton::Secondary,
        Button::Middle => PointerButton::Middle,
        Button::Unknown(_) => PointerButton::Other,
    }
}
