//! Turns click captures into dataset entries: a normalized PNG plus a JSON
//! sidecar under `<dataset>/<subject>/`.

mod normalize;
mod quality;

pub use normalize::normalize;
pub use quality::{LabelValidator, StubValidator, STUB_CONFIDENCE};

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use image::{DynamicImage, ImageFormat};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::bridge::{Collaborators, RawImage, StatusSink};
use crate::error::TaggerError;
use crate::metrics::{MetricsCollector, PipelineEvent};
use crate::models::{DatasetMetadata, SearchRecord, UNKNOWN_CONTEXT};
use crate::settings::HunterSettings;

const READY_MESSAGE: &str = "Ready for next image";
const ERROR_DETAIL_CHARS: usize = 50;

/// A capture waiting to be tagged, paired with the search that was current
/// when the click happened.
#[derive(Debug, Clone)]
pub struct TagJob {
    pub image: RawImage,
    pub record: SearchRecord,
}

/// Where an entry ended up on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetEntry {
    pub image_path: PathBuf,
    pub metadata_path: PathBuf,
    pub subject_label: String,
    pub context_label: String,
    pub metadata: DatasetMetadata,
}

pub struct Tagger {
    dataset_dir: PathBuf,
    canvas_size: u32,
    reset_delay: Duration,
    status: Arc<dyn StatusSink>,
    validator: Arc<dyn LabelValidator>,
}

impl Tagger {
    pub fn new(
        dataset_dir: impl Into<PathBuf>,
        canvas_size: u32,
        reset_delay: Duration,
        status: Arc<dyn StatusSink>,
        validator: Arc<dyn LabelValidator>,
    ) -> Self {
        Self {
            dataset_dir: dataset_dir.into(),
            canvas_size,
            reset_delay,
            status,
            validator,
        }
    }

    pub fn from_settings(settings: &HunterSettings, collaborators: &Collaborators) -> Self {
        Self::new(
            settings.dataset_dir.clone(),
            settings.canvas_size,
            settings.status_reset_delay(),
            Arc::clone(&collaborators.status),
            Arc::clone(&collaborators.validator),
        )
    }

    /// Normalizes `image` and writes it with its metadata sidecar. Blocking;
    /// callers on the runtime go through `spawn_blocking`.
    ///
    /// The status window follows along: "Processing image...", then either
    /// "Saved image for '<subject>'" (reset to ready after a delay) or a
    /// truncated error.
    pub fn process_and_save(
        &self,
        image: &DynamicImage,
        record: &SearchRecord,
    ) -> Result<DatasetEntry, TaggerError> {
        self.status.update_status("Processing image...");

        match self.save_entry(image, record) {
            Ok(entry) => {
                log::info!(
                    "Saved image for '{}' to {} (confidence {:.2})",
                    record.subject(),
                    entry.image_path.display(),
                    entry.metadata.label_confidence
                );
                self.status
                    .update_status(&format!("Saved image for '{}'", record.subject()));
                self.schedule_status_reset();
                Ok(entry)
            }
            Err(err) => {
                log::error!("Error saving image for '{}': {err}", record.subject());
                let detail: String = err.to_string().chars().take(ERROR_DETAIL_CHARS).collect();
                self.status
                    .update_status(&format!("Error saving image: {detail}"));
                Err(err)
            }
        }
    }

    fn save_entry(
        &self,
        image: &DynamicImage,
        record: &SearchRecord,
    ) -> Result<DatasetEntry, TaggerError> {
        let canvas = normalize(image, self.canvas_size)?;
        let confidence = self.validator.validate(&canvas, record.subject());

        let subject_label = sanitize_component(record.subject());
        let context_label = sanitize_component(record.context().unwrap_or(UNKNOWN_CONTEXT));

        let subject_dir = self.dataset_dir.join(&subject_label);
        fs::create_dir_all(&subject_dir).map_err(|err| TaggerError::io(&subject_dir, err))?;

        let timestamp = Utc::now();
        let (image_path, metadata_path) = unique_paths(&subject_dir, &subject_label, timestamp);

        let mut png = Cursor::new(Vec::new());
        canvas.write_to(&mut png, ImageFormat::Png)?;
        write_atomically(&image_path, png.get_ref())?;

        let metadata = DatasetMetadata::new(record, timestamp, self.canvas_size, confidence);
        let json = serde_json::to_vec_pretty(&metadata)?;
        write_atomically(&metadata_path, &json)?;

        Ok(DatasetEntry {
            image_path,
            metadata_path,
            subject_label,
            context_label,
            metadata,
        })
    }

    fn schedule_status_reset(&self) {
        let status = Arc::clone(&self.status);
        let delay = self.reset_delay;

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    status.update_status(READY_MESSAGE);
                });
            }
            Err(_) => {
                std::thread::spawn(move || {
                    std::thread::sleep(delay);
                    status.update_status(READY_MESSAGE);
                });
            }
        }
    }
}

/// Makes `name` safe as a single path component on every desktop OS.
pub fn sanitize_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_control() || matches!(c, '\\' | '/' | '*' | '?' | ':' | '"' | '<' | '>' | '|')
            {
                '_'
            } else {
                c
            }
        })
        .collect();

    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

fn unique_paths(dir: &Path, subject_label: &str, timestamp: DateTime<Utc>) -> (PathBuf, PathBuf) {
    let stem = format!("{subject_label}_{}", timestamp.format("%Y%m%d_%H%M%S_%6f"));

    let mut candidate = stem.clone();
    let mut suffix = 1u32;
    loop {
        let image_path = dir.join(format!("{candidate}.png"));
        let metadata_path = dir.join(format!("{candidate}.json"));
        if !image_path.exists() && !metadata_path.exists() {
            return (image_path, metadata_path);
        }
        candidate = format!("{stem}_{suffix}");
        suffix += 1;
    }
}

/// Writes to a hidden sibling and renames it into place, so readers never
/// see a half-written file.
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), TaggerError> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = path.with_file_name(format!(".{file_name}.tmp"));

    fs::write(&tmp_path, bytes).map_err(|err| TaggerError::io(&tmp_path, err))?;
    fs::rename(&tmp_path, path).map_err(|err| TaggerError::io(path, err))
}

/// Drains tag jobs until cancelled, running each one on the blocking pool
/// without waiting for it. Jobs already in flight finish on their own; the
/// receiver is handed back so a later start can pick up where this left off.
pub fn spawn_tagger_worker(
    tagger: Arc<Tagger>,
    mut jobs: UnboundedReceiver<TagJob>,
    metrics: MetricsCollector,
    cancel_token: CancellationToken,
) -> JoinHandle<UnboundedReceiver<TagJob>> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                job = jobs.recv() => {
                    let Some(job) = job else { break };
                    tokio::spawn(run_job(Arc::clone(&tagger), job, metrics.clone()));
                }
                _ = cancel_token.cancelled() => break,
            }
        }
        log::info!("tagger worker shutting down");
        jobs
    })
}

async fn run_job(tagger: Arc<Tagger>, job: TagJob, metrics: MetricsCollector) {
    let subject = job.record.subject().to_string();
    let result = tokio::task::spawn_blocking(move || {
        tagger.process_and_save(&DynamicImage::ImageRgb8(job.image), &job.record)
    })
    .await;

    match result {
        Ok(Ok(_)) => metrics.record(PipelineEvent::EntrySaved).await,
        // Already logged and shown by the tagger.
        Ok(Err(_)) => metrics.record(PipelineEvent::PersistenceFailure).await,
        Err(err) => {
            log::error!("tagging task for '{subject}' failed: {err}");
            metrics.record(PipelineEvent::PersistenceFailure).await;
        }
    }
}
