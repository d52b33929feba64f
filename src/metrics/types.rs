use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Counters for one run of the pipeline, logged on shutdown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub polls: u64,
    /// Polls skipped because the target app was not foreground or still warming up.
    pub gated_polls: u64,
    pub captures: u64,
    pub capture_failures: u64,
    pub ocr_runs: u64,
    pub ocr_skips: u64,
    pub searches_published: u64,
    pub clicks_seen: u64,
    /// Dropped clicks keyed by the gate that rejected them.
    pub clicks_dropped: BTreeMap<String, u64>,
    pub entries_saved: u64,
    pub persistence_failures: u64,
}
