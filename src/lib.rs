//! # streamtap
//!
//! Supervises a backend process that writes an MPEG transport stream to its
//! stdout, decodes the video from that stream and hands frames to a UI
//! surface, while keeping a bounded operator log of everything that happens.
//!
//! ## Modules
//!
//! - `app` - Configuration, logging setup and fatal error reporting
//! - `decoder` - Transport stream demuxing and frame decoding
//! - `display` - Frame conversion and native-resolution tracking
//! - `error` - Application-wide error type with numeric codes
//! - `session` - Per-session background tasks
//! - `subprocess` - Backend process supervision, output tap and operator log
//! - `ui` - UI-thread event loop and surfaces
//! - `testing` - Testing utilities and fixtures
pub mod app;
pub mod decoder;
pub mod display;
pub mod error;
pub mod session;
pub mod subprocess;
pub mod ui;

pub mod testing;
