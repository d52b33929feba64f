use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::bridge::{
    app_matches, Collaborators, ForegroundProbe, PointerSource, ScreenCapture, StatusSink,
};
use crate::metrics::{MetricsCollector, PipelineEvent};
use crate::models::{CaptureRegion, PointerButton, PointerPress};
use crate::settings::HunterSettings;
use crate::tagger::TagJob;

use super::search_slot::SearchReader;

// Set to false to silence per-click logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Why a press did not produce a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickReject {
    NotPrimary,
    OverStatusWindow,
    Cooldown,
    TargetNotForeground,
    NoCurrentSearch,
    CaptureFailed,
    TaggerClosed,
}

impl ClickReject {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClickReject::NotPrimary => "not_primary",
            ClickReject::OverStatusWindow => "over_status_window",
            ClickReject::Cooldown => "cooldown",
            ClickReject::TargetNotForeground => "target_not_foreground",
            ClickReject::NoCurrentSearch => "no_current_search",
            ClickReject::CaptureFailed => "capture_failed",
            ClickReject::TaggerClosed => "tagger_closed",
        }
    }
}

impl fmt::Display for ClickReject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gates each press and turns qualifying ones into tag jobs.
pub struct ClickHandler {
    target_app: String,
    cooldown: Duration,
    min_distance: f64,
    capture_size: u32,
    foreground: Arc<dyn ForegroundProbe>,
    capture: Arc<dyn ScreenCapture>,
    status: Arc<dyn StatusSink>,
    reader: SearchReader,
    jobs: UnboundedSender<TagJob>,
    metrics: MetricsCollector,
    last_qualifying: Option<PointerPress>,
}

impl ClickHandler {
    pub fn new(
        settings: &HunterSettings,
        collaborators: &Collaborators,
        reader: SearchReader,
        jobs: UnboundedSender<TagJob>,
        metrics: MetricsCollector,
    ) -> Self {
        Self {
            target_app: settings.target_app.clone(),
            cooldown: settings.click_cooldown(),
            min_distance: settings.click_min_distance_px,
            capture_size: settings.click_capture_size,
            foreground: Arc::clone(&collaborators.foreground),
            capture: Arc::clone(&collaborators.capture),
            status: Arc::clone(&collaborators.status),
            reader,
            jobs,
            metrics,
            last_qualifying: None,
        }
    }

    /// Runs the gates in order: button, status window, cooldown, foreground
    /// app, current search. A press that passes all of them starts the
    /// cooldown even if the capture then fails. With a minimum distance set,
    /// the cooldown gate also drops presses too close to the last qualifying
    /// one.
    pub async fn handle_press(&mut self, press: PointerPress) -> Result<(), ClickReject> {
        if press.button != PointerButton::Primary {
            return Err(ClickReject::NotPrimary);
        }

        // Queried per press; the window can be dragged.
        if let Some(bounds) = self.status.window_bounds() {
            if bounds.contains(press.x, press.y) {
                return Err(ClickReject::OverStatusWindow);
            }
        }

        if let Some(last) = &self.last_qualifying {
            if press.at.saturating_duration_since(last.at) < self.cooldown {
                return Err(ClickReject::Cooldown);
            }
            if self.min_distance > 0.0 && press.distance_to(last) <= self.min_distance {
                return Err(ClickReject::Cooldown);
            }
        }

        let foreground = Arc::clone(&self.foreground);
        let app = tokio::task::spawn_blocking(move || foreground.foreground_app())
            .await
            .map_err(|err| {
                log_warn!("foreground probe task failed: {err}");
                ClickReject::TargetNotForeground
            })?;
        let is_target = match app {
            Ok(app) => app
                .as_deref()
                .is_some_and(|name| app_matches(name, &self.target_app)),
            Err(err) => {
                log_debug!("foreground probe failed during click: {err}");
                false
            }
        };
        if !is_target {
            return Err(ClickReject::TargetNotForeground);
        }

        let Some(record) = self.reader.snapshot() else {
            return Err(ClickReject::NoCurrentSearch);
        };

        self.last_qualifying = Some(press);
        self.status.update_status("Clicked! Capturing image...");
        log_info!(
            "Click at ({:.0}, {:.0}) for '{}'",
            press.x,
            press.y,
            record.subject()
        );

        let region = CaptureRegion::centered_on(press.x, press.y, self.capture_size);
        let capture = Arc::clone(&self.capture);
        let image = match tokio::task::spawn_blocking(move || capture.capture(Some(region))).await {
            Ok(Ok(image)) => image,
            Ok(Err(err)) => {
                log_warn!("click capture failed: {err}");
                return Err(ClickReject::CaptureFailed);
            }
            Err(err) => {
                log_warn!("click capture task failed: {err}");
                return Err(ClickReject::CaptureFailed);
            }
        };

        self.jobs
            .send(TagJob { image, record })
            .map_err(|_| ClickReject::TaggerClosed)
    }

    /// `handle_press` plus bookkeeping for the metrics and the debug log.
    async fn process(&mut self, press: PointerPress) {
        self.metrics.record(PipelineEvent::ClickSeen).await;
        if let Err(reason) = self.handle_press(press).await {
            log_debug!("click at ({:.0}, {:.0}) dropped: {reason}", press.x, press.y);
            self.metrics
                .record(PipelineEvent::ClickDropped(reason.as_str()))
                .await;
        }
    }
}

/// Listens for pointer presses and hands qualifying captures to the tagger.
pub struct ClickMonitor {
    pointer: Arc<dyn PointerSource>,
    handler: Option<ClickHandler>,
    presses: Option<UnboundedReceiver<PointerPress>>,
    stop_timeout: Duration,
    handle: Option<JoinHandle<(ClickHandler, UnboundedReceiver<PointerPress>)>>,
    cancel_token: Option<CancellationToken>,
}

impl ClickMonitor {
    pub fn new(
        settings: &HunterSettings,
        collaborators: &Collaborators,
        reader: SearchReader,
        jobs: UnboundedSender<TagJob>,
        metrics: MetricsCollector,
    ) -> Self {
        Self {
            pointer: Arc::clone(&collaborators.pointer),
            handler: Some(ClickHandler::new(
                settings,
                collaborators,
                reader,
                jobs,
                metrics,
            )),
            presses: None,
            stop_timeout: settings.stop_timeout(),
            handle: None,
            cancel_token: None,
        }
    }

    /// Installs the pointer listener on first start (surfacing its failure)
    /// and spawns the click loop.
    pub async fn start(&mut self) -> Result<()> {
        if self.handle.is_some() {
            bail!("click monitor already running");
        }
        if self.handler.is_none() {
            bail!("click monitor lost its handler after a stop timed out");
        }

        let presses = match self.presses.take() {
            Some(presses) => presses,
            None => {
                let pointer = Arc::clone(&self.pointer);
                tokio::task::spawn_blocking(move || pointer.subscribe())
                    .await
                    .context("pointer listener setup task failed")?
                    .context("failed to install pointer listener")?
            }
        };

        let handler = self
            .handler
            .take()
            .context("click monitor lost its handler after a stop timed out")?;

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(click_loop(handler, presses, cancel_token.clone()));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        log_info!("Click monitor started");
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        match tokio::time::timeout(self.stop_timeout, handle).await {
            Ok(joined) => {
                let (handler, presses) = joined.context("click loop task failed to join")?;
                self.handler = Some(handler);
                self.presses = Some(presses);
                log_info!("Click monitor stopped");
                Ok(())
            }
            Err(_) => bail!(
                "click loop did not exit within {}ms",
                self.stop_timeout.as_millis()
            ),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

async fn click_loop(
    mut handler: ClickHandler,
    mut presses: UnboundedReceiver<PointerPress>,
    cancel_token: CancellationToken,
) -> (ClickHandler, UnboundedReceiver<PointerPress>) {
    loop {
        tokio::select! {
            press = presses.recv() => {
                let Some(press) = press else {
                    log_warn!("pointer stream closed; click loop exiting");
                    break;
                };
                handler.process(press).await;
            }
            _ = cancel_token.cancelled() => break,
        }
    }

    log_info!("click loop shutting down");
    (handler, presses)
}
