mod types;

pub use types::MetricsSnapshot;

use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared pipeline counters. Clones point at the same counters.
#[derive(Clone, Default)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsSnapshot>>,
}

/// One countable pipeline event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineEvent {
    Poll,
    GatedPoll,
    Capture,
    CaptureFailure,
    OcrRun,
    OcrSkip,
    SearchPublished,
    ClickSeen,
    ClickDropped(&'static str),
    EntrySaved,
    PersistenceFailure,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, event: PipelineEvent) {
        let mut state = self.inner.lock().await;
        match event {
            PipelineEvent::Poll => state.polls += 1,
            PipelineEvent::GatedPoll => state.gated_polls += 1,
            PipelineEvent::Capture => state.captures += 1,
            PipelineEvent::CaptureFailure => state.capture_failures += 1,
            PipelineEvent::OcrRun => state.ocr_runs += 1,
            PipelineEvent::OcrSkip => state.ocr_skips += 1,
            PipelineEvent::SearchPublished => state.searches_published += 1,
            PipelineEvent::ClickSeen => state.clicks_seen += 1,
            PipelineEvent::ClickDropped(reason) => {
                *state.clicks_dropped.entry(reason.to_string()).or_insert(0) += 1;
            }
            PipelineEvent::EntrySaved => state.entries_saved += 1,
            PipelineEvent::PersistenceFailure => state.persistence_failures += 1,
        }
    }

    pub async fn get_snapshot(&self) -> MetricsSnapshot {
        self.inner.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clones_share_counters() {
        let metrics = MetricsCollector::new();
        let other = metrics.clone();

        metrics.record(PipelineEvent::Poll).await;
        other.record(PipelineEvent::ClickDropped("cooldown")).await;
        other.record(PipelineEvent::ClickDropped("cooldown")).await;

        let snapshot = metrics.get_snapshot().await;
        assert_eq!(snapshot.polls, 1);
        assert_eq!(snapshot.clicks_dropped.get("cooldown"), Some(&2));
        assert_eq!(other.get_snapshot().await, snapshot);
    }
}
