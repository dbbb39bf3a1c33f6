//! Persisted runtime settings.
//!
//! [`Settings`] is read once when a simulation starts and handed to
//! [`Simulation::start`](crate::runtime::Simulation::start). Files may be
//! RON, TOML or JSON; the format follows the file extension.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ===========================================================================
// Errors
// ===========================================================================

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("unsupported settings format: {file}")]
    UnsupportedFormat { file: PathBuf },

    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    #[error("could not encode settings for {file}: {detail}")]
    Encode { file: PathBuf, detail: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

pub fn detect_format(path: &Path) -> Result<Format, SettingsError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(SettingsError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

// ===========================================================================
// Runtime mode
// ===========================================================================

/// Where the tick loop runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeMode {
    /// Stepped once per frame on the caller's thread.
    #[default]
    HostLoop,
    /// A background thread owning its own copy of the state.
    Worker,
}

impl RuntimeMode {
    /// Parse a persisted mode string. Accepts `host_loop`/`host-loop`/`host`
    /// and `worker`, ignoring case.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "host_loop" | "host" => Some(RuntimeMode::HostLoop),
            "worker" => Some(RuntimeMode::Worker),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RuntimeMode::HostLoop => "host_loop",
            RuntimeMode::Worker => "worker",
        }
    }
}

// ===========================================================================
// Worker tuning
// ===========================================================================

/// Tuning for the background worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Wall-clock pause between worker ticks. 0 runs flat out.
    pub tick_interval_ms: u64,
    /// Send a STATE message every this many ticks.
    pub state_every: u64,
    /// Capacity of the worker-to-host channel.
    pub channel_capacity: usize,
    /// How long a mode switch waits for the worker's final STATE.
    pub flush_timeout_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 16,
            state_every: 1,
            channel_capacity: 8,
            flush_timeout_ms: 500,
        }
    }
}

impl WorkerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }
}

// ===========================================================================
// Settings
// ===========================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub mode: RuntimeMode,
    /// Record per-phase tick timings (sent to the worker in INIT).
    pub profiler: bool,
    pub worker: WorkerConfig,
}

/// On-disk shape. `mode` is read as free text so that unknown values fall
/// back to the host loop instead of failing the whole file.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct RawSettings {
    mode: Option<String>,
    profiler: bool,
    worker: WorkerConfig,
}

impl From<RawSettings> for Settings {
    fn from(raw: RawSettings) -> Self {
        let mode = match raw.mode.as_deref() {
            None => RuntimeMode::HostLoop,
            Some(s) => RuntimeMode::parse(s).unwrap_or_else(|| {
                log::warn!("unrecognized runtime mode {s:?}, using host loop");
                RuntimeMode::HostLoop
            }),
        };
        Settings {
            mode,
            profiler: raw.profiler,
            worker: raw.worker,
        }
    }
}

impl Settings {
    pub fn with_mode(mode: RuntimeMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Parse settings text in the given format.
    pub fn parse(content: &str, format: Format) -> Result<Self, String> {
        let raw: RawSettings = match format {
            Format::Ron => ron::from_str(content).map_err(|e| e.to_string())?,
            Format::Toml => toml::from_str(content).map_err(|e| e.to_string())?,
            Format::Json => serde_json::from_str(content).map_err(|e| e.to_string())?,
        };
        Ok(raw.into())
    }

    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let format = detect_format(path)?;
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, format).map_err(|detail| SettingsError::Parse {
            file: path.to_path_buf(),
            detail,
        })
    }

    /// Like [`Settings::load`], but any failure yields the defaults.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(settings) => settings,
            Err(SettingsError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("no settings at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                log::warn!("{e}; using default settings");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let format = detect_format(path)?;
        let raw = RawSettings {
            mode: Some(self.mode.as_str().to_string()),
            profiler: self.profiler,
            worker: self.worker.clone(),
        };
        let encoded = match format {
            Format::Ron => ron::ser::to_string_pretty(&raw, ron::ser::PrettyConfig::default())
                .map_err(|e| e.to_string()),
            Format::Toml => toml::to_string_pretty(&raw).map_err(|e| e.to_string()),
            Format::Json => serde_json::to_string_pretty(&raw).map_err(|e| e.to_string()),
        }
        .map_err(|detail| SettingsError::Encode {
            file: path.to_path_buf(),
            detail,
        })?;
        std::fs::write(path, encoded)?;
        Ok(())
    }
}
