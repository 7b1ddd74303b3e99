//! Application configuration
//!
//! Settings come from an optional TOML file and are then overridden by
//! command-line flags.

use crate::decoder::{DecoderOptions, FfmpegCodecFactory, OptionError, DEFAULT_FFMPEG};
use crate::display::DEFAULT_LOG_MARGIN;
use crate::session::{KeySize, RenderPolicy, DEFAULT_PACING};
use crate::subprocess::LogCapacity;
use crate::ui::SessionSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Executable launched when neither the config file nor the CLI names one
pub const DEFAULT_EXECUTABLE: &str = "aes-stream";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    DecoderOption(#[from] OptionError),
}

/// How decoded frames reach the UI thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// Only the newest undisplayed frame is kept
    #[default]
    Latest,
    /// Every frame is posted, with a fixed pause after each
    Paced,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub mode: RenderMode,
    /// Pause after each frame in paced mode
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            mode: RenderMode::default(),
            interval: DEFAULT_PACING,
        }
    }
}

impl RenderConfig {
    pub fn policy(&self) -> RenderPolicy {
        match self.mode {
            RenderMode::Latest => RenderPolicy::LatestOnly,
            RenderMode::Paced => RenderPolicy::Paced(self.interval),
        }
    }
}

/// Application configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Verbosity level for logging
    #[serde(skip)]
    pub verbose: u8,
    pub executable: PathBuf,
    pub key_size: KeySize,
    /// ffmpeg binary used for elementary-stream decoding
    pub ffmpeg: PathBuf,
    pub decoder: DecoderOptions,
    pub render: RenderConfig,
    pub log: LogCapacity,
    /// Vertical space reserved below the video for the log pane
    pub display_margin: u32,
    /// How long a stopped backend gets before it is killed
    #[serde(with = "humantime_serde")]
    pub terminate_grace: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            verbose: 0,
            executable: PathBuf::from(DEFAULT_EXECUTABLE),
            key_size: KeySize::default(),
            ffmpeg: PathBuf::from(DEFAULT_FFMPEG),
            decoder: DecoderOptions::default(),
            render: RenderConfig::default(),
            log: LogCapacity::default(),
            display_margin: DEFAULT_LOG_MARGIN,
            terminate_grace: Duration::from_secs(2),
        }
    }
}

impl AppConfig {
    /// Load from a TOML file; missing keys keep their defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load `path` when given, otherwise start from defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn with_verbose(mut self, verbose: u8) -> Self {
        self.verbose = verbose;
        self
    }

    /// Apply `key=value` decoder overrides in order
    pub fn apply_decoder_overrides<S: AsRef<str>>(
        &mut self,
        pairs: &[S],
    ) -> Result<(), ConfigError> {
        for pair in pairs {
            self.decoder.apply_pair(pair.as_ref())?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.log.capacity == 0 {
            return Err(ConfigError::Invalid(
                "log.capacity must be at least 1".to_string(),
            ));
        }
        if self.log.evict_batch == 0 || self.log.evict_batch > self.log.capacity {
            return Err(ConfigError::Invalid(format!(
                "log.evict_batch must be between 1 and the capacity ({}), got {}",
                self.log.capacity, self.log.evict_batch
            )));
        }
        if self.executable.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("executable must not be empty".to_string()));
        }
        Ok(())
    }

    /// Controller settings using the ffmpeg-backed codec
    pub fn session_settings(&self) -> SessionSettings {
        let mut settings = SessionSettings::new(
            self.executable.clone(),
            Arc::new(FfmpegCodecFactory::new(self.ffmpeg.clone())),
        );
        settings.terminate_grace = self.terminate_grace;
        settings.decoder_options = self.decoder.clone();
        settings.render = self.render.policy();
        settings.log_capacity = self.log;
        settings.display_margin = self.display_margin;
        settings
    }

    /// Get the log level string based on verbosity
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            2 => "trace,tokio=info",
            _ => "trace",
        }
    }
}
