use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use image_hasher::ImageHash;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::bridge::{
    app_matches, Collaborators, ForegroundProbe, ScreenCapture, StatusSink, TextExtractor,
};
use crate::error::CaptureResult;
use crate::metrics::{MetricsCollector, PipelineEvent};
use crate::models::{CaptureRegion, SearchRecord};
use crate::settings::HunterSettings;

use super::phash::{compute_phash, hamming_distance};
use super::query_parser::QueryParser;
use super::search_slot::{search_slot, SearchPublisher, SearchReader};

// Set to false to silence the per-poll logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// What a single poll cycle ended up doing.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The target app is not foreground; nothing was captured.
    Inactive,
    /// Foreground, but not for enough consecutive cycles yet.
    WarmingUp,
    /// The minimum interval since the last capture has not passed.
    Throttled,
    /// Query region looks unchanged since the last OCR run.
    OcrSkipped,
    /// OCR ran but no search could be read from it.
    NoSearch,
    /// Same subject as the one already published.
    Unchanged,
    Published(Arc<SearchRecord>),
}

/// State and collaborators for the poll loop. Owns the write side of the
/// current-search slot.
pub struct SearchPoller {
    target_app: String,
    query_region: CaptureRegion,
    min_active_cycles: u32,
    min_capture_interval: Duration,
    ocr_refresh_interval: Duration,
    phash_change_threshold: u32,
    foreground: Arc<dyn ForegroundProbe>,
    capture: Arc<dyn ScreenCapture>,
    ocr: Arc<dyn TextExtractor>,
    status: Arc<dyn StatusSink>,
    parser: Arc<QueryParser>,
    metrics: MetricsCollector,
    publisher: SearchPublisher,
    active_cycles: u32,
    last_capture: Option<Instant>,
    last_ocr_hash: Option<ImageHash>,
    last_ocr_time: Option<Instant>,
    last_subject: Option<String>,
}

impl SearchPoller {
    pub fn new(
        settings: &HunterSettings,
        parser: Arc<QueryParser>,
        collaborators: &Collaborators,
        metrics: MetricsCollector,
        publisher: SearchPublisher,
    ) -> Self {
        Self {
            target_app: settings.target_app.clone(),
            query_region: settings.query_region,
            min_active_cycles: settings.min_active_cycles,
            min_capture_interval: settings.min_capture_interval(),
            ocr_refresh_interval: settings.ocr_refresh_interval(),
            phash_change_threshold: settings.phash_change_threshold,
            foreground: Arc::clone(&collaborators.foreground),
            capture: Arc::clone(&collaborators.capture),
            ocr: Arc::clone(&collaborators.ocr),
            status: Arc::clone(&collaborators.status),
            parser,
            metrics,
            publisher,
            active_cycles: 0,
            last_capture: None,
            last_ocr_hash: None,
            last_ocr_time: None,
            last_subject: None,
        }
    }

    /// One cycle of focus gating, capture, OCR and publish-on-change.
    /// Errors are transient; the caller logs them and keeps polling.
    pub async fn poll_once(&mut self, now: Instant) -> CaptureResult<PollOutcome> {
        self.metrics.record(PipelineEvent::Poll).await;

        let foreground = Arc::clone(&self.foreground);
        let app = match tokio::task::spawn_blocking(move || foreground.foreground_app()).await? {
            Ok(app) => app,
            Err(err) => {
                self.active_cycles = 0;
                return Err(err);
            }
        };

        let is_target = app
            .as_deref()
            .is_some_and(|name| app_matches(name, &self.target_app));
        if !is_target {
            self.active_cycles = 0;
            self.metrics.record(PipelineEvent::GatedPoll).await;
            return Ok(PollOutcome::Inactive);
        }

        self.active_cycles = self.active_cycles.saturating_add(1);
        if self.active_cycles <= self.min_active_cycles {
            self.metrics.record(PipelineEvent::GatedPoll).await;
            return Ok(PollOutcome::WarmingUp);
        }

        if let Some(last) = self.last_capture {
            if now.saturating_duration_since(last) < self.min_capture_interval {
                return Ok(PollOutcome::Throttled);
            }
        }
        // Failed captures count too, so a broken grabber isn't hammered.
        self.last_capture = Some(now);

        let capture = Arc::clone(&self.capture);
        let region = self.query_region;
        let captured = tokio::task::spawn_blocking(move || {
            capture.capture(Some(region)).map(|image| {
                let hash = compute_phash(&image);
                (image, hash)
            })
        })
        .await?;
        let (image, hash) = match captured {
            Ok(captured) => captured,
            Err(err) => {
                self.metrics.record(PipelineEvent::CaptureFailure).await;
                return Err(err);
            }
        };
        self.metrics.record(PipelineEvent::Capture).await;

        if !self.should_run_ocr(&hash, now) {
            self.metrics.record(PipelineEvent::OcrSkip).await;
            return Ok(PollOutcome::OcrSkipped);
        }

        let ocr = Arc::clone(&self.ocr);
        let text = tokio::task::spawn_blocking(move || ocr.recognize(&image)).await??;
        self.last_ocr_hash = Some(hash);
        self.last_ocr_time = Some(now);
        self.metrics.record(PipelineEvent::OcrRun).await;

        let Some(parsed) = self.parser.parse(&text) else {
            log_debug!("No search found in {} chars of OCR text", text.len());
            return Ok(PollOutcome::NoSearch);
        };

        if self.last_subject.as_deref() == Some(parsed.subject.as_str()) {
            return Ok(PollOutcome::Unchanged);
        }

        let Some(record) =
            SearchRecord::new(parsed.query, parsed.subject, parsed.context, Utc::now())
        else {
            return Ok(PollOutcome::NoSearch);
        };

        let message = record.status_message();
        self.last_subject = Some(record.subject().to_string());
        let record = self.publisher.publish(record);
        self.status.update_status(&message);
        self.metrics.record(PipelineEvent::SearchPublished).await;
        log_info!(
            "New search detected: '{}' (subject '{}', context {:?})",
            record.query(),
            record.subject(),
            record.context()
        );

        Ok(PollOutcome::Published(record))
    }

    fn should_run_ocr(&self, hash: &ImageHash, now: Instant) -> bool {
        let Some(previous) = &self.last_ocr_hash else {
            return true;
        };

        let refresh_due = self
            .last_ocr_time
            .map(|at| now.saturating_duration_since(at) >= self.ocr_refresh_interval)
            .unwrap_or(true);

        refresh_due || hamming_distance(hash, previous) >= self.phash_change_threshold
    }
}

/// Background poller that keeps the current-search slot up to date.
pub struct SearchMonitor {
    poller: Option<SearchPoller>,
    reader: SearchReader,
    poll_interval: Duration,
    error_backoff: Duration,
    stop_timeout: Duration,
    handle: Option<JoinHandle<SearchPoller>>,
    cancel_token: Option<CancellationToken>,
}

impl SearchMonitor {
    pub fn new(
        settings: &HunterSettings,
        parser: Arc<QueryParser>,
        collaborators: &Collaborators,
        metrics: MetricsCollector,
    ) -> Self {
        let (publisher, reader) = search_slot();
        let poller = SearchPoller::new(settings, parser, collaborators, metrics, publisher);

        Self {
            poller: Some(poller),
            reader,
            poll_interval: settings.poll_interval(),
            error_backoff: settings.error_backoff(),
            stop_timeout: settings.stop_timeout(),
            handle: None,
            cancel_token: None,
        }
    }

    /// Spawns the poll loop on the current tokio runtime.
    pub fn start(&mut self) -> Result<()> {
        if self.handle.is_some() {
            bail!("search monitor already running");
        }

        let poller = self
            .poller
            .take()
            .context("search monitor lost its poller after a stop timed out")?;

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(search_loop(
            poller,
            self.poll_interval,
            self.error_backoff,
            cancel_token.clone(),
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        log_info!("Search monitor started");
        Ok(())
    }

    /// Signals the loop and waits (bounded) for its current cycle to finish.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        match tokio::time::timeout(self.stop_timeout, handle).await {
            Ok(joined) => {
                self.poller = Some(joined.context("search loop task failed to join")?);
                log_info!("Search monitor stopped");
                Ok(())
            }
            Err(_) => bail!(
                "search loop did not exit within {}ms",
                self.stop_timeout.as_millis()
            ),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn get_current_search(&self) -> Option<Arc<SearchRecord>> {
        self.reader.current()
    }

    pub fn reader(&self) -> SearchReader {
        self.reader.clone()
    }
}

async fn search_loop(
    mut poller: SearchPoller,
    poll_interval: Duration,
    error_backoff: Duration,
    cancel_token: CancellationToken,
) -> SearchPoller {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match poller.poll_once(Instant::now()).await {
                    Ok(outcome) => log_debug!("search poll: {outcome:?}"),
                    Err(err) => {
                        log_warn!(
                            "search poll failed: {err}; backing off {}ms",
                            error_backoff.as_millis()
                        );
                        tokio::select! {
                            _ = tokio::time::sleep(error_backoff) => {}
                            _ = cancel_token.cancelled() => break,
                        }
                    }
                }
            }
            _ = cancel_token.cancelled() => break,
        }
    }

    log_info!("search loop shutting down");
    poller
}
