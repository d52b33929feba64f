use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::models::{CaptureRegion, WindowBounds};

pub const SETTINGS_PATH_ENV: &str = "CHARACTER_HUNTER_SETTINGS";
pub const DEBUG_ENV: &str = "CHARACTER_HUNTER_DEBUG";
const DEFAULT_SETTINGS_FILE: &str = "character_hunter.json";

/// Franchise names that mark where a subject ends and its context begins in
/// queries like "Roxy FNAF Security Breach".
const DEFAULT_CONTEXT_TOKENS: &[&str] = &["FNAF", "Pokemon", "Pokémon", "Zelda", "Genshin"];

/// `CHARACTER_HUNTER_DEBUG=1` (or `true`) turns on debug logging and faster polling.
pub fn debug_enabled() -> bool {
    std::env::var(DEBUG_ENV)
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HunterSettings {
    /// Application name that must be foreground for anything to happen.
    pub target_app: String,
    /// Screen area holding the browser's address bar and tab titles.
    pub query_region: CaptureRegion,
    pub poll_interval_ms: u64,
    /// The browser must stay foreground for more than this many polls in a row.
    pub min_active_cycles: u32,
    pub min_capture_interval_ms: u64,
    pub error_backoff_ms: u64,
    /// Re-run OCR after this long even if the query region looks unchanged.
    pub ocr_refresh_interval_ms: u64,
    /// Hamming distance between query-region hashes that counts as a change.
    pub phash_change_threshold: u32,
    pub ocr_language: String,
    pub context_tokens: Vec<String>,
    pub click_cooldown_ms: u64,
    /// Presses no farther than this from the last qualifying one are dropped
    /// like cooldown hits. 0 disables the check.
    pub click_min_distance_px: f64,
    /// Side of the square captured around each qualifying click.
    pub click_capture_size: u32,
    pub canvas_size: u32,
    pub dataset_dir: PathBuf,
    pub status_reset_delay_ms: u64,
    /// Where the floating status window sits; clicks inside it are ignored.
    pub status_window: WindowBounds,
    pub stop_timeout_ms: u64,
    #[serde(skip)]
    pub debug: bool,
}

impl Default for HunterSettings {
    fn default() -> Self {
        Self {
            target_app: "Google Chrome".into(),
            query_region: CaptureRegion::new(0, 0, 1200, 200),
            poll_interval_ms: 1_000,
            min_active_cycles: 1,
            min_capture_interval_ms: 1_000,
            error_backoff_ms: 5_000,
            ocr_refresh_interval_ms: 10_000,
            phash_change_threshold: 4,
            ocr_language: "eng".into(),
            context_tokens: DEFAULT_CONTEXT_TOKENS.iter().map(|t| t.to_string()).collect(),
            click_cooldown_ms: 1_000,
            click_min_distance_px: 0.0,
            click_capture_size: 300,
            canvas_size: 512,
            dataset_dir: PathBuf::from("./dataset"),
            status_reset_delay_ms: 2_000,
            status_window: WindowBounds {
                x: 10.0,
                y: 10.0,
                width: 200.0,
                height: 70.0,
            },
            stop_timeout_ms: 1_000,
            debug: false,
        }
    }
}

impl HunterSettings {
    /// Loads settings from `CHARACTER_HUNTER_SETTINGS` (or the default file in
    /// the working directory) and applies environment overrides.
    pub fn from_env() -> Result<Self> {
        let path = std::env::var_os(SETTINGS_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE));

        let mut settings = Self::load_or_init(&path)?;
        settings.apply_debug(debug_enabled());
        Ok(settings)
    }

    /// Reads `path`, writing the defaults there first if it does not exist.
    /// A file that fails to parse falls back to defaults and is left untouched.
    pub fn load_or_init(path: &Path) -> Result<Self> {
        if !path.exists() {
            let settings = Self::default();
            settings.persist(path)?;
            log::info!("Wrote default settings to {}", path.display());
            return Ok(settings);
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;

        Ok(serde_json::from_str(&contents).unwrap_or_else(|err| {
            log::warn!(
                "Ignoring unreadable settings in {} ({err}); using defaults",
                path.display()
            );
            Self::default()
        }))
    }

    pub fn persist(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(path, serialized)
            .with_context(|| format!("Failed to write settings to {}", path.display()))
    }

    fn apply_debug(&mut self, debug: bool) {
        self.debug = debug;
        if debug {
            self.poll_interval_ms = self.poll_interval_ms.min(500);
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn min_capture_interval(&self) -> Duration {
        Duration::from_millis(self.min_capture_interval_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    pub fn ocr_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.ocr_refresh_interval_ms)
    }

    pub fn click_cooldown(&self) -> Duration {
        Duration::from_millis(self.click_cooldown_ms)
    }

    pub fn status_reset_delay(&self) -> Duration {
        Duration::from_millis(self.status_reset_delay_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let settings = HunterSettings::load_or_init(&path).unwrap();

        assert!(path.exists());
        assert_eq!(settings.canvas_size, 512);
        assert_eq!(settings.click_cooldown(), Duration::from_secs(1));
        assert_eq!(settings.click_min_distance_px, 0.0);
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"target_app": "Firefox", "canvas_size": 256}"#).unwrap();

        let settings = HunterSettings::load_or_init(&path).unwrap();

        assert_eq!(settings.target_app, "Firefox");
        assert_eq!(settings.canvas_size, 256);
        assert_eq!(settings.click_capture_size, 300);
    }

    #[test]
    fn garbage_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "not json").unwrap();

        let settings = HunterSettings::load_or_init(&path).unwrap();

        assert_eq!(settings.target_app, "Google Chrome");
        assert_eq!(fs::read_to_string(&path).unwrap(), "not json");
    }

    #[test]
    fn debug_mode_tightens_poll_interval() {
        let mut settings = HunterSettings::default();
        settings.apply_debug(true);
        assert!(settings.debug);
        assert_eq!(settings.poll_interval(), Duration::from_millis(500));
    }
}
