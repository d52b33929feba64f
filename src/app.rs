use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::bridge::Collaborators;
use crate::metrics::{MetricsCollector, MetricsSnapshot};
use crate::models::SearchRecord;
use crate::sensing::{ClickMonitor, QueryParser, SearchMonitor};
use crate::settings::HunterSettings;
use crate::tagger::{spawn_tagger_worker, TagJob, Tagger};

const WAITING_MESSAGE: &str = "Waiting for user search...";

/// Wires the search monitor, click monitor and tagger together and owns
/// their lifecycle.
pub struct HunterApp {
    collaborators: Collaborators,
    metrics: MetricsCollector,
    search: SearchMonitor,
    clicks: ClickMonitor,
    tagger: Arc<Tagger>,
    jobs: Option<UnboundedReceiver<TagJob>>,
    worker: Option<JoinHandle<UnboundedReceiver<TagJob>>>,
    worker_cancel: Option<CancellationToken>,
}

impl HunterApp {
    pub fn new(settings: HunterSettings, collaborators: Collaborators) -> Result<Self> {
        let parser = QueryParser::new(&settings.context_tokens)
            .context("context tokens do not form a valid pattern")?;
        let metrics = MetricsCollector::new();

        let search = SearchMonitor::new(
            &settings,
            Arc::new(parser),
            &collaborators,
            metrics.clone(),
        );

        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        let clicks = ClickMonitor::new(
            &settings,
            &collaborators,
            search.reader(),
            jobs_tx,
            metrics.clone(),
        );
        let tagger = Arc::new(Tagger::from_settings(&settings, &collaborators));

        Ok(Self {
            collaborators,
            metrics,
            search,
            clicks,
            tagger,
            jobs: Some(jobs_rx),
            worker: None,
            worker_cancel: None,
        })
    }

    /// Starts polling for searches, then listening for clicks. If the click
    /// listener cannot be installed the search monitor is stopped again and
    /// the error returned.
    pub async fn start(&mut self) -> Result<()> {
        if self.search.is_running() {
            bail!("character hunter already running");
        }

        self.collaborators.status.update_status(WAITING_MESSAGE);
        self.search.start()?;

        if let Err(err) = self.clicks.start().await {
            if let Err(stop_err) = self.search.stop().await {
                log::warn!("search monitor did not stop cleanly: {stop_err:#}");
            }
            return Err(err);
        }

        let jobs = self
            .jobs
            .take()
            .context("tag job queue lost after an unclean stop")?;
        let cancel_token = CancellationToken::new();
        self.worker = Some(spawn_tagger_worker(
            Arc::clone(&self.tagger),
            jobs,
            self.metrics.clone(),
            cancel_token.clone(),
        ));
        self.worker_cancel = Some(cancel_token);

        log::info!("Character hunter started");
        Ok(())
    }

    /// Stops clicks before searches so no click lands without a search, then
    /// the tagger worker, and logs the run's metrics.
    pub async fn stop(&mut self) -> Result<()> {
        let clicks = self.clicks.stop().await;
        let search = self.search.stop().await;

        if let Some(token) = self.worker_cancel.take() {
            token.cancel();
        }
        if let Some(worker) = self.worker.take() {
            self.jobs = Some(worker.await.context("tagger worker failed to join")?);
        }

        let snapshot = self.metrics.get_snapshot().await;
        match serde_json::to_string(&snapshot) {
            Ok(json) => log::info!("Pipeline metrics: {json}"),
            Err(err) => log::warn!("failed to serialize metrics: {err}"),
        }

        clicks.and(search)
    }

    pub fn is_running(&self) -> bool {
        self.search.is_running()
    }

    pub fn current_search(&self) -> Option<Arc<SearchRecord>> {
        self.search.get_current_search()
    }

    pub async fn metrics(&self) -> MetricsSnapshot {
        self.metrics.get_snapshot().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::fakes::{
        ChannelPointer, CountingCapture, FixedForeground, RecordingStatus, ScriptedOcr,
    };
    use crate::bridge::PointerSource;
    use crate::models::PointerPress;
    use crate::tagger::StubValidator;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn settings(dir: &TempDir) -> HunterSettings {
        HunterSettings {
            poll_interval_ms: 10,
            min_active_cycles: 0,
            min_capture_interval_ms: 0,
            canvas_size: 64,
            dataset_dir: dir.path().to_path_buf(),
            status_reset_delay_ms: 10,
            ..HunterSettings::default()
        }
    }

    fn collaborators(
        pointer: ChannelPointer,
        status: Arc<RecordingStatus>,
    ) -> Collaborators {
        Collaborators {
            capture: Arc::new(CountingCapture::default()),
            ocr: Arc::new(ScriptedOcr::new(&[
                "Roxy FNAF Security Breach - Google Search",
            ])),
            foreground: Arc::new(FixedForeground::new(Some("Google Chrome"))),
            status,
            pointer: Arc::new(pointer),
            validator: Arc::new(StubValidator),
        }
    }

    #[tokio::test]
    async fn search_then_click_produces_a_dataset_entry() {
        let dir = TempDir::new().unwrap();
        let status = Arc::new(RecordingStatus::default());
        let (pointer, pointer_tx) = ChannelPointer::new();
        let mut app = HunterApp::new(settings(&dir), collaborators(pointer, status.clone())).unwrap();

        app.start().await.unwrap();
        assert!(app.is_running());
        assert!(app.start().await.is_err());

        for _ in 0..200 {
            if app.current_search().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let search = app.current_search().unwrap();
        assert_eq!(search.subject(), "Roxy");
        assert_eq!(search.context(), Some("FNAF Security Breach"));

        pointer_tx
            .send(PointerPress::primary(500.0, 400.0, Instant::now()))
            .unwrap();

        for _ in 0..200 {
            if app.metrics().await.entries_saved == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        app.stop().await.unwrap();
        assert!(!app.is_running());

        let snapshot = app.metrics().await;
        assert_eq!(snapshot.entries_saved, 1);
        assert_eq!(snapshot.searches_published, 1);

        let files: Vec<String> = std::fs::read_dir(dir.path().join("Roxy"))
            .unwrap()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(files.len(), 2);
        assert!(files.iter().any(|name| name.ends_with(".png")));
        assert!(files.iter().any(|name| name.ends_with(".json")));

        let messages = status.messages();
        assert_eq!(messages.first().map(String::as_str), Some(WAITING_MESSAGE));
        assert!(messages.contains(&"Detected: 'Roxy' from 'FNAF Security Breach'".to_string()));
        assert!(messages.contains(&"Saved image for 'Roxy'".to_string()));
    }

    #[tokio::test]
    async fn clicks_two_seconds_apart_give_two_entries() {
        let dir = TempDir::new().unwrap();
        let (pointer, pointer_tx) = ChannelPointer::new();
        let mut app = HunterApp::new(
            settings(&dir),
            collaborators(pointer, Arc::new(RecordingStatus::default())),
        )
        .unwrap();

        app.start().await.unwrap();
        for _ in 0..200 {
            if app.current_search().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(app.current_search().is_some());

        let base = Instant::now();
        pointer_tx
            .send(PointerPress::primary(500.0, 400.0, base))
            .unwrap();
        pointer_tx
            .send(PointerPress::primary(500.0, 400.0, base + Duration::from_secs(2)))
            .unwrap();

        for _ in 0..200 {
            if app.metrics().await.entries_saved == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        app.stop().await.unwrap();
        assert_eq!(app.metrics().await.entries_saved, 2);

        let files: Vec<String> = std::fs::read_dir(dir.path().join("Roxy"))
            .unwrap()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(files.len(), 4);

        let mut stems: Vec<&str> = files
            .iter()
            .filter_map(|name| name.strip_suffix(".png"))
            .collect();
        stems.sort_unstable();
        stems.dedup();
        assert_eq!(stems.len(), 2);
        assert!(stems.iter().all(|stem| stem.starts_with("Roxy_")));
        for stem in &stems {
            assert!(files.contains(&format!("{stem}.json")));
        }
    }

    #[tokio::test]
    async fn pointer_failure_rolls_back_search_monitor() {
        let dir = TempDir::new().unwrap();
        let (pointer, _pointer_tx) = ChannelPointer::new();
        // Exhaust the single subscription so the app's attempt fails.
        let _taken = pointer.subscribe().unwrap();
        let mut app = HunterApp::new(
            settings(&dir),
            collaborators(pointer, Arc::new(RecordingStatus::default())),
        )
        .unwrap();

        assert!(app.start().await.is_err());
        assert!(!app.is_running());
    }

    #[tokio::test]
    async fn restarts_after_stop() {
        let dir = TempDir::new().unwrap();
        let (pointer, _pointer_tx) = ChannelPointer::new();
        let mut app = HunterApp::new(
            settings(&dir),
            collaborators(pointer, Arc::new(RecordingStatus::default())),
        )
        .unwrap();

        app.start().await.unwrap();
        app.stop().await.unwrap();
        app.start().await.unwrap();
        app.stop().await.unwrap();
    }
}
