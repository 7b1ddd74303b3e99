//! Output tap and operator log
//!
//! This module provides the non-destructive tee placed over the backend's
//! stdout and the bounded log buffer that every background task writes into.

pub mod log_sink;
pub mod tee;
pub mod types;

pub use log_sink::LogSink;
pub use tee::ByteTee;
pub use types::{LogCapacity, LogEntry, TeeSummary, SUMMARY_BYTES};
