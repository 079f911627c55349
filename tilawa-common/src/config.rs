//! Bootstrap configuration loading
//!
//! Settings come from four sources, highest priority first:
//! 1. Command-line arguments
//! 2. Environment variables (`TILAWA_CONFIG`, `TILAWA_AUDIO_BASE`)
//! 3. TOML configuration file
//! 4. Compiled defaults
//!
//! A missing config file at the default location is not an error: a warning is
//! logged and defaults are used. A config file named explicitly (CLI or
//! `TILAWA_CONFIG`) must exist.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Environment variable naming the TOML config file
pub const CONFIG_ENV_VAR: &str = "TILAWA_CONFIG";

/// Environment variable overriding `audio_base`
pub const AUDIO_BASE_ENV_VAR: &str = "TILAWA_AUDIO_BASE";

/// Largest accepted single-track gain
pub const MAX_GAIN: f32 = 2.0;

/// What the sequencer does when a track ends before its successor is decoded
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnderrunPolicy {
    /// Advance the cursor and start the next track as soon as its decode lands
    #[default]
    Wait,
    /// Advance the cursor and pause until the caller plays again
    Stop,
}

impl std::str::FromStr for UnderrunPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "wait" => Ok(UnderrunPolicy::Wait),
            "stop" => Ok(UnderrunPolicy::Stop),
            other => Err(Error::Config(format!(
                "Unknown underrun policy '{}' (expected 'wait' or 'stop')",
                other
            ))),
        }
    }
}

/// Complete bootstrap configuration
///
/// Every field has a compiled default, so an empty file (or no file) is valid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TomlConfig {
    /// Directory or HTTP(S) root holding `{language}/{reciter}/{verse}.mp3`
    pub audio_base: String,

    /// Recitation language folder
    pub language: String,

    /// Reciter folder
    pub reciter: String,

    /// Audio output settings
    pub output: OutputConfig,

    /// Sequencer behaviour
    pub playback: PlaybackConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Audio output settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    /// Output device name (None = system default)
    pub device: Option<String>,

    /// Output sample rate in Hz
    pub sample_rate: u32,

    /// Single-track gain, clamped to 0.0..=2.0
    pub gain: f32,

    /// Frames per device callback (None = device default)
    pub buffer_size: Option<u32>,
}

/// Sequencer behaviour
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlaybackConfig {
    pub underrun_policy: UnderrunPolicy,

    /// Timeout for fetching one track over HTTP
    pub fetch_timeout_ms: u64,

    /// EventBus channel capacity
    pub event_capacity: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            audio_base: default_audio_base().to_string_lossy().into_owned(),
            language: "ar".to_string(),
            reciter: "default".to_string(),
            output: OutputConfig::default(),
            playback: PlaybackConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: 44100,
            gain: 1.0,
            buffer_size: None,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            underrun_policy: UnderrunPolicy::Wait,
            fetch_timeout_ms: 15_000,
            event_capacity: 100,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl PlaybackConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

/// Values supplied on the command line
///
/// Each `Some` field wins over environment, file and defaults.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub audio_base: Option<String>,
    pub language: Option<String>,
    pub reciter: Option<String>,
    pub gain: Option<f32>,
    pub underrun_policy: Option<UnderrunPolicy>,
}

impl TomlConfig {
    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{} ({})", e, path.display())))
    }

    /// Parse TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))
    }

    /// Resolve the full configuration from CLI, environment, file and defaults
    pub fn load(overrides: &ConfigOverrides) -> Result<Self> {
        let mut config = match locate_config_file(overrides.config_path.as_deref()) {
            ConfigLocation::Explicit(path) => {
                if !path.exists() {
                    return Err(Error::Config(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
                info!("Loading config from {}", path.display());
                Self::from_file(&path)?
            }
            ConfigLocation::Default(path) if path.exists() => {
                info!("Loading config from {}", path.display());
                Self::from_file(&path)?
            }
            ConfigLocation::Default(path) => {
                warn!(
                    "Config file not found at {}, using defaults",
                    path.display()
                );
                Self::default()
            }
            ConfigLocation::Unavailable => {
                warn!("Could not determine config directory, using defaults");
                Self::default()
            }
        };

        if let Ok(base) = std::env::var(AUDIO_BASE_ENV_VAR) {
            debug!("audio_base from {}: {}", AUDIO_BASE_ENV_VAR, base);
            config.audio_base = base;
        }

        config.apply_overrides(overrides);
        config.validate()
    }

    /// Apply command-line values over whatever was loaded
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(base) = &overrides.audio_base {
            self.audio_base = base.clone();
        }
        if let Some(language) = &overrides.language {
            self.language = language.clone();
        }
        if let Some(reciter) = &overrides.reciter {
            self.reciter = reciter.clone();
        }
        if let Some(gain) = overrides.gain {
            self.output.gain = gain;
        }
        if let Some(policy) = overrides.underrun_policy {
            self.playback.underrun_policy = policy;
        }
    }

    /// Check ranges and clamp gain
    pub fn validate(mut self) -> Result<Self> {
        if self.audio_base.trim().is_empty() {
            return Err(Error::Config("audio_base must not be empty".to_string()));
        }
        if self.language.trim().is_empty() || self.reciter.trim().is_empty() {
            return Err(Error::Config(
                "language and reciter must not be empty".to_string(),
            ));
        }
        if self.output.sample_rate == 0 {
            return Err(Error::Config("output.sample_rate must be > 0".to_string()));
        }
        if self.output.buffer_size == Some(0) {
            return Err(Error::Config("output.buffer_size must be > 0".to_string()));
        }
        if !self.output.gain.is_finite() {
            return Err(Error::Config("output.gain must be a number".to_string()));
        }
        let clamped = self.output.gain.clamp(0.0, MAX_GAIN);
        if clamped != self.output.gain {
            warn!(
                "output.gain {} out of range, clamped to {}",
                self.output.gain, clamped
            );
            self.output.gain = clamped;
        }
        if self.playback.event_capacity == 0 {
            return Err(Error::Config(
                "playback.event_capacity must be >= 1".to_string(),
            ));
        }
        if self.playback.fetch_timeout_ms == 0 {
            return Err(Error::Config(
                "playback.fetch_timeout_ms must be > 0".to_string(),
            ));
        }
        Ok(self)
    }
}

/// Where the config file was looked for
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigLocation {
    /// Named on the command line or by `TILAWA_CONFIG`; must exist
    Explicit(PathBuf),
    /// Platform default location; may be absent
    Default(PathBuf),
    /// No config directory on this platform
    Unavailable,
}

/// Pick the config file following CLI → environment → platform default
pub fn locate_config_file(cli_path: Option<&Path>) -> ConfigLocation {
    if let Some(path) = cli_path {
        return ConfigLocation::Explicit(path.to_path_buf());
    }
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        return ConfigLocation::Explicit(PathBuf::from(path));
    }
    match default_config_path() {
        Some(path) => ConfigLocation::Default(path),
        None => ConfigLocation::Unavailable,
    }
}

/// `<config_dir>/tilawa/config.toml` for the current platform
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tilawa").join("config.toml"))
}

/// OS-dependent default audio root
fn default_audio_base() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("tilawa").join("audio"))
        .unwrap_or_else(|| PathBuf::from("./audio"))
}
