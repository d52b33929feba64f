//! Metadata sidecar written next to every dataset image.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SearchRecord;

/// Placeholder stored when a search carried no context.
pub const UNKNOWN_CONTEXT: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub timestamp: DateTime<Utc>,
    pub search_query: String,
    pub subject: String,
    pub context: String,
    pub image_size: [u32; 2],
    pub preprocessed: bool,
    pub label_confidence: f32,
}

impl DatasetMetadata {
    pub fn new(
        record: &SearchRecord,
        timestamp: DateTime<Utc>,
        canvas_size: u32,
        label_confidence: f32,
    ) -> Self {
        Self {
            timestamp,
            search_query: record.query().to_string(),
            subject: record.subject().to_string(),
            context: record.context().unwrap_or(UNKNOWN_CONTEXT).to_string(),
            image_size: [canvas_size, canvas_size],
            preprocessed: true,
            label_confidence,
        }
    }
}
