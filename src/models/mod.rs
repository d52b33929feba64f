mod dataset;
mod geometry;
mod pointer;
mod search;

pub use dataset::{DatasetMetadata, UNKNOWN_CONTEXT};
pub use geometry::{CaptureRegion, ScreenRect, WindowBounds};
pub use pointer::{PointerButton, PointerPress};
pub use search::SearchRecord;
