//! Session identity and the background work of a running session

pub mod tasks;

pub use tasks::{spawn_session, SessionContext, SessionTasks};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Delay after each frame under [`RenderPolicy::Paced`]
pub const DEFAULT_PACING: Duration = Duration::from_millis(10);

/// Cipher key size passed to the backend as its only argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum KeySize {
    Aes128,
    Aes192,
    #[default]
    Aes256,
}

impl KeySize {
    pub const ALL: [KeySize; 3] = [KeySize::Aes128, KeySize::Aes192, KeySize::Aes256];

    pub fn bits(&self) -> u16 {
        match self {
            KeySize::Aes128 => 128,
            KeySize::Aes192 => 192,
            KeySize::Aes256 => 256,
        }
    }

    /// Command-line argument for the backend
    pub fn as_arg(&self) -> String {
        self.bits().to_string()
    }
}

impl TryFrom<u16> for KeySize {
    type Error = String;

    fn try_from(bits: u16) -> Result<Self, Self::Error> {
        match bits {
            128 => Ok(KeySize::Aes128),
            192 => Ok(KeySize::Aes192),
            256 => Ok(KeySize::Aes256),
            other => Err(format!("unsupported key size {} (expected 128, 192 or 256)", other)),
        }
    }
}

impl From<KeySize> for u16 {
    fn from(key_size: KeySize) -> Self {
        key_size.bits()
    }
}

impl FromStr for KeySize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bits: u16 = s
            .trim()
            .parse()
            .map_err(|_| format!("invalid key size '{}' (expected 128, 192 or 256)", s))?;
        KeySize::try_from(bits)
    }
}

impl fmt::Display for KeySize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits())
    }
}

/// Identifies one start-to-exit run of the backend.
///
/// Events carry it so that late events from a superseded run are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub fn first() -> Self {
        Self(1)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// How decoded frames reach the UI thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderPolicy {
    /// Only the newest undisplayed frame is kept; older ones are dropped
    #[default]
    LatestOnly,
    /// Every frame is posted in order, then the decode task sleeps
    Paced(Duration),
}

impl fmt::Display for RenderPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderPolicy::LatestOnly => f.write_str("latest"),
            RenderPolicy::Paced(delay) => write!(f, "paced ({:?})", delay),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_size_argument() {
        let args: Vec<String> = KeySize::ALL.iter().map(KeySize::as_arg).collect();
        assert_eq!(args, vec!["128", "192", "256"]);
    }

    #[test]
    fn test_key_size_parsing() {
        assert_eq!("192".parse::<KeySize>(), Ok(KeySize::Aes192));
        assert_eq!(" 256 ".parse::<KeySize>(), Ok(KeySize::Aes256));
        assert!("512".parse::<KeySize>().is_err());
        assert!("aes".parse::<KeySize>().is_err());
    }

    #[test]
    fn test_key_size_serde_as_integer() {
        #[derive(Deserialize, Serialize)]
        struct Wrapper {
            key_size: KeySize,
        }

        let parsed: Wrapper = toml::from_str("key_size = 128").unwrap();
        assert_eq!(parsed.key_size, KeySize::Aes128);
        assert!(toml::from_str::<Wrapper>("key_size = 100").is_err());

        let rendered = toml::to_string(&Wrapper {
            key_size: KeySize::Aes192,
        })
        .unwrap();
        assert_eq!(rendered.trim(), "key_size = 192");
    }

    #[test]
    fn test_session_ids_increase() {
        let first = SessionId::first();
        let second = first.next();
        assert!(second > first);
        assert_eq!(second.to_string(), "session-2");
    }
}
