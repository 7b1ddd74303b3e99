//! Testing utilities and fixtures
//!
//! Shared by unit tests and the integration tests under `tests/`: a
//! recording UI surface, a synthetic transport stream builder with a codec
//! that needs no external decoder, and stub backend executables.

pub mod fixtures;
pub mod helpers;
pub mod mocks;

pub use fixtures::{synthetic_stream, RawVideoCodecFactory, TsStreamBuilder};
pub use helpers::{StubBackend, StubBackendBuilder};
pub use mocks::RecordingSurface;
