//! Shared setup for integration tests

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use streamtap::session::RenderPolicy;
use streamtap::subprocess::LogCapacity;
use streamtap::testing::RawVideoCodecFactory;
use streamtap::ui::{SessionController, SessionSettings};

/// Settings that keep every frame and every log line of a short session
pub fn test_settings(executable: &Path) -> SessionSettings {
    let mut settings = SessionSettings::new(executable, Arc::new(RawVideoCodecFactory));
    settings.render = RenderPolicy::Paced(Duration::from_millis(1));
    settings.log_capacity = LogCapacity {
        capacity: 200,
        evict_batch: 100,
    };
    settings.terminate_grace = Duration::from_secs(2);
    // Shell stubs can be slow to start on a loaded machine
    settings.decoder_options.analyze_duration = Duration::from_secs(5);
    settings
}

/// Controller bound to the current tokio runtime
pub fn test_controller(executable: &Path) -> SessionController {
    controller_with(test_settings(executable))
}

pub fn controller_with(settings: SessionSettings) -> SessionController {
    SessionController::new(settings, tokio::runtime::Handle::current())
}
