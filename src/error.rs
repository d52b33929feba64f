use std::path::PathBuf;

use thiserror::Error;

/// Failures reported by the desktop collaborators (screen grabber, focus
/// probe, OCR engine, pointer listener).
///
/// None of these are fatal: a poll cycle or click that hits one is skipped and
/// the next poll/click naturally retries.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no monitor covers region at ({left}, {top})")]
    NoMonitor { left: u32, top: u32 },

    #[error("capture region {width}x{height} at ({left}, {top}) is empty after clipping")]
    EmptyRegion {
        left: u32,
        top: u32,
        width: u32,
        height: u32,
    },

    #[error("screen capture failed: {0}")]
    Backend(String),

    #[error("foreground window query failed: {0}")]
    Foreground(String),

    #[error("text recognition failed: {0}")]
    Recognition(String),

    #[error("pointer listener failed to start: {0}")]
    Listener(String),

    #[error("blocking capture worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

pub type CaptureResult<T> = std::result::Result<T, CaptureError>;

/// Failures while turning a capture into a dataset entry.
#[derive(Debug, Error)]
pub enum TaggerError {
    #[error("failed to encode image: {0}")]
    Encode(#[from] image::ImageError),

    #[error("failed to serialize metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("source image has zero area ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },
}

impl TaggerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TaggerError::Io {
            path: path.into(),
            source,
        }
    }
}
