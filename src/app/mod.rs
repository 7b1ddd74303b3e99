//! Application module
//!
//! Configuration loading, logging setup and fatal error reporting for the
//! `streamtap` binary.

pub mod config;
pub mod error_handling;
pub mod logging;

pub use config::{AppConfig, ConfigError, RenderConfig, RenderMode, DEFAULT_EXECUTABLE};
pub use error_handling::handle_fatal_error;
pub use logging::init_logging;
