//! Low-latency decoder options
//!
//! Options are settable from the config file and from `key=value` pairs on
//! the command line. The key vocabulary follows the names understood by
//! ffmpeg so the same map can be handed to the external decoder.

use super::demux::TS_PACKET_SIZE;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum OptionError {
    #[error("Unknown decoder option '{0}'")]
    UnknownKey(String),

    #[error("Invalid value '{value}' for decoder option '{key}'")]
    InvalidValue { key: String, value: String },

    #[error("Decoder option '{0}' must be written as key=value")]
    MissingValue(String),
}

/// Decoder thread count: `auto` or a fixed positive number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ThreadCount {
    #[default]
    Auto,
    Fixed(usize),
}

impl FromStr for ThreadCount {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "auto" | "0" => Ok(ThreadCount::Auto),
            other => other
                .parse::<usize>()
                .map(ThreadCount::Fixed)
                .map_err(|_| format!("expected 'auto' or a thread count, got '{}'", other)),
        }
    }
}

impl TryFrom<String> for ThreadCount {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ThreadCount> for String {
    fn from(value: ThreadCount) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ThreadCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadCount::Auto => f.write_str("auto"),
            ThreadCount::Fixed(n) => write!(f, "{}", n),
        }
    }
}

fn default_hwaccel() -> Option<String> {
    if cfg!(windows) {
        Some("dxva2".to_string())
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderOptions {
    pub hwaccel: Option<String>,
    pub no_buffer: bool,
    pub low_delay: bool,
    /// Bytes examined while looking for the video program
    pub probe_size: usize,
    /// Wall-clock budget for finding the video program, from `open`
    #[serde(with = "humantime_serde")]
    pub analyze_duration: Duration,
    /// Advisory only; a single video stream has nothing to interleave
    #[serde(with = "humantime_serde")]
    pub max_interleave_delta: Duration,
    pub threads: ThreadCount,
    pub seekable: bool,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            hwaccel: default_hwaccel(),
            no_buffer: true,
            low_delay: true,
            probe_size: 4096,
            analyze_duration: Duration::from_millis(200),
            max_interleave_delta: Duration::from_millis(500),
            threads: ThreadCount::Auto,
            seekable: false,
        }
    }
}

impl DecoderOptions {
    /// Build options from a key/value map, starting from the defaults.
    ///
    /// Unknown keys and unparseable values are logged and ignored.
    pub fn from_option_map<I, K, V>(options: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut result = Self::default();
        result.merge_option_map(options);
        result
    }

    /// Apply a key/value map on top of the current values, warning on bad entries.
    pub fn merge_option_map<I, K, V>(&mut self, options: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in options {
            if let Err(e) = self.apply(key.as_ref(), value.as_ref()) {
                tracing::warn!("{}; ignoring", e);
            }
        }
    }

    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), OptionError> {
        let invalid = || OptionError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        };

        match key {
            "hwaccel" => {
                self.hwaccel = match value.trim() {
                    "" | "none" => None,
                    other => Some(other.to_string()),
                };
            }
            "fflags" => self.no_buffer = has_flag(value, "nobuffer"),
            "flags" => self.low_delay = has_flag(value, "low_delay"),
            "probesize" => {
                self.probe_size = value.trim().parse().map_err(|_| invalid())?;
            }
            "analyzeduration" => {
                let micros: u64 = value.trim().parse().map_err(|_| invalid())?;
                self.analyze_duration = Duration::from_micros(micros);
            }
            "max_interleave_delta" => {
                let micros: u64 = value.trim().parse().map_err(|_| invalid())?;
                self.max_interleave_delta = Duration::from_micros(micros);
            }
            "threads" => self.threads = value.parse().map_err(|_| invalid())?,
            "seekable" => {
                self.seekable = match value.trim() {
                    "1" | "true" => true,
                    "0" | "false" => false,
                    _ => return Err(invalid()),
                };
            }
            _ => return Err(OptionError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    /// Parse a single `key=value` argument
    pub fn apply_pair(&mut self, pair: &str) -> Result<(), OptionError> {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| OptionError::MissingValue(pair.to_string()))?;
        self.apply(key.trim(), value)
    }

    /// Render the options under the decoder's own key names
    pub fn to_option_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        if let Some(hwaccel) = &self.hwaccel {
            map.insert("hwaccel".to_string(), hwaccel.clone());
        }
        if self.no_buffer {
            map.insert("fflags".to_string(), "nobuffer".to_string());
        }
        if self.low_delay {
            map.insert("flags".to_string(), "low_delay".to_string());
        }
        map.insert("probesize".to_string(), self.probe_size.to_string());
        map.insert(
            "analyzeduration".to_string(),
            self.analyze_duration.as_micros().to_string(),
        );
        map.insert(
            "max_interleave_delta".to_string(),
            self.max_interleave_delta.as_micros().to_string(),
        );
        map.insert("threads".to_string(), self.threads.to_string());
        map.insert(
            "seekable".to_string(),
            if self.seekable { "1" } else { "0" }.to_string(),
        );
        map
    }

    /// Probe budget in bytes; never less than two transport packets
    pub fn probe_budget(&self) -> usize {
        self.probe_size.max(2 * TS_PACKET_SIZE)
    }
}

/// Flag lists such as `+nobuffer+genpts`
fn has_flag(value: &str, flag: &str) -> bool {
    value
        .split(['+', ',', '|'])
        .map(str::trim)
        .any(|f| f == flag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_low_latency() {
        let options = DecoderOptions::default();
        assert!(options.no_buffer);
        assert!(options.low_delay);
        assert_eq!(options.probe_size, 4096);
        assert_eq!(options.analyze_duration, Duration::from_millis(200));
        assert_eq!(options.max_interleave_delta, Duration::from_millis(500));
        assert_eq!(options.threads, ThreadCount::Auto);
        assert!(!options.seekable);
        if cfg!(windows) {
            assert_eq!(options.hwaccel.as_deref(), Some("dxva2"));
        } else {
            assert_eq!(options.hwaccel, None);
        }
    }

    #[test]
    fn test_option_map_round_trips_default_keys() {
        let options = DecoderOptions::default();
        let map = options.to_option_map();
        assert_eq!(map["fflags"], "nobuffer");
        assert_eq!(map["flags"], "low_delay");
        assert_eq!(map["probesize"], "4096");
        assert_eq!(map["analyzeduration"], "200000");
        assert_eq!(map["max_interleave_delta"], "500000");
        assert_eq!(map["threads"], "auto");
        assert_eq!(map["seekable"], "0");

        assert_eq!(DecoderOptions::from_option_map(&map), options);
    }

    #[test]
    fn test_unknown_and_invalid_entries_are_ignored() {
        let options = DecoderOptions::from_option_map([
            ("probesize", "not-a-number"),
            ("frobnicate", "1"),
            ("threads", "4"),
        ]);
        assert_eq!(options.probe_size, 4096);
        assert_eq!(options.threads, ThreadCount::Fixed(4));
    }

    #[test]
    fn test_apply_reports_errors() {
        let mut options = DecoderOptions::default();
        assert_eq!(
            options.apply("bogus", "1"),
            Err(OptionError::UnknownKey("bogus".to_string()))
        );
        assert!(matches!(
            options.apply("seekable", "maybe"),
            Err(OptionError::InvalidValue { .. })
        ));
        assert!(matches!(
            options.apply_pair("probesize"),
            Err(OptionError::MissingValue(_))
        ));
    }

    #[test]
    fn test_flag_parsing() {
        let mut options = DecoderOptions::default();
        options.apply("fflags", "+genpts").unwrap();
        assert!(!options.no_buffer);
        options.apply("fflags", "+genpts+nobuffer").unwrap();
        assert!(options.no_buffer);
        options.apply_pair("hwaccel=none").unwrap();
        assert_eq!(options.hwaccel, None);
        options.apply_pair("analyzeduration=1000000").unwrap();
        assert_eq!(options.analyze_duration, Duration::from_secs(1));
    }

    #[test]
    fn test_probe_budget_floor() {
        let options = DecoderOptions {
            probe_size: 10,
            ..Default::default()
        };
        assert_eq!(options.probe_budget(), 376);
    }

    #[test]
    fn test_toml_deserialization() {
        let options: DecoderOptions = toml::from_str(
            r#"
            probe_size = 8192
            analyze_duration = "1s"
            threads = "2"
            "#,
        )
        .unwrap();
        assert_eq!(options.probe_size, 8192);
        assert_eq!(options.analyze_duration, Duration::from_secs(1));
        assert_eq!(options.threads, ThreadCount::Fixed(2));
        assert!(options.low_delay);
    }
}
