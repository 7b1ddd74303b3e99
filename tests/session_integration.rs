//! End-to-end sessions against stub backend executables

#![cfg(unix)]

mod common;

use common::{controller_with, test_controller, test_settings};
use std::path::Path;
use std::time::Duration;
use streamtap::session::{KeySize, RenderPolicy};
use streamtap::subprocess::StopOutcome;
use streamtap::testing::{synthetic_stream, RecordingSurface, StubBackend};
use streamtap::ui::ControlState;

async fn run_to_completion(
    controller: &mut streamtap::ui::SessionController,
    surface: &mut RecordingSurface,
) {
    tokio::time::timeout(Duration::from_secs(20), controller.run_until_idle(surface))
        .await
        .expect("session did not finish in time");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_streams_frames_and_reports_exit() {
    let stub = StubBackend::builder()
        .with_stdout(synthetic_stream(160, 120, 2))
        .with_stderr(b"encrypting with key\n".to_vec())
        .with_exit_code(0)
        .build()
        .unwrap();

    let mut controller = test_controller(stub.path());
    let mut surface = RecordingSurface::new();

    controller
        .on_start_requested(KeySize::Aes256, &mut surface)
        .unwrap();
    assert_eq!(surface.controls.first(), Some(&ControlState::RUNNING));

    run_to_completion(&mut controller, &mut surface).await;

    assert_eq!(surface.resizes, vec![(160, 420)]);
    assert_eq!(surface.rendered, vec![(160, 120), (160, 120)]);
    assert_eq!(
        surface.history_matching("Process exited with return code"),
        vec!["Process exited with return code 0"]
    );
    assert_eq!(
        surface.history_matching("ERR: "),
        vec!["ERR: encrypting with key"]
    );
    assert!(surface.errors.is_empty());
    assert_eq!(surface.last_controls(), Some(ControlState::IDLE));
    assert_eq!(controller.display().native_resolution(), Some((160, 120)));
    assert_eq!(stub.recorded_args().unwrap(), vec!["256"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_latest_only_renders_final_frame() {
    let stub = StubBackend::builder()
        .with_stdout(synthetic_stream(160, 120, 3))
        .build()
        .unwrap();

    let mut settings = test_settings(stub.path());
    settings.render = RenderPolicy::LatestOnly;
    let mut controller = controller_with(settings);
    let mut surface = RecordingSurface::new();

    controller
        .on_start_requested(KeySize::Aes256, &mut surface)
        .unwrap();
    run_to_completion(&mut controller, &mut surface).await;

    assert_eq!(surface.resizes, vec![(160, 420)]);
    assert!(!surface.rendered.is_empty());
    assert!(surface.rendered.len() <= 3);
    assert!(surface.rendered.iter().all(|&size| size == (160, 120)));

    // Third frame of synthetic_stream: shade 80
    let last = surface.last_bitmap.as_ref().expect("no frame rendered");
    assert_eq!(last.pixel(0, 0), Some([80, 175, 128, 255]));
    assert_eq!(last.pixel(159, 119), Some([80, 175, 128, 255]));
    assert_eq!(
        surface.history_matching("Process exited with return code"),
        vec!["Process exited with return code 0"]
    );
    assert_eq!(surface.last_controls(), Some(ControlState::IDLE));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_key_size_is_passed_as_argument() {
    let stub = StubBackend::builder().build().unwrap();

    let mut controller = test_controller(stub.path());
    let mut surface = RecordingSurface::new();
    controller
        .on_start_requested(KeySize::Aes128, &mut surface)
        .unwrap();
    run_to_completion(&mut controller, &mut surface).await;

    assert_eq!(stub.recorded_args().unwrap(), vec!["128"]);
}

#[tokio::test]
async fn test_missing_executable_reports_once() {
    let mut controller = test_controller(Path::new("/nonexistent/streamtap-backend"));
    let mut surface = RecordingSurface::new();

    let result = controller.on_start_requested(KeySize::Aes256, &mut surface);

    assert!(result.is_err());
    assert_eq!(surface.errors.len(), 1);
    assert_eq!(surface.last_controls(), Some(ControlState::IDLE));
    assert!(controller.current_session().is_none());
    assert!(!controller.is_running());
    assert_eq!(surface.history_matching("Failed to start process").len(), 1);
    assert!(surface.resizes.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_terminates_lingering_backend() {
    let stub = StubBackend::builder().lingering(30).build().unwrap();

    let mut controller = test_controller(stub.path());
    let mut surface = RecordingSurface::new();
    controller
        .on_start_requested(KeySize::Aes192, &mut surface)
        .unwrap();

    assert_eq!(
        controller.on_stop_requested(&mut surface),
        StopOutcome::Terminating
    );
    assert_eq!(
        controller.on_stop_requested(&mut surface),
        StopOutcome::NotRunning
    );

    run_to_completion(&mut controller, &mut surface).await;

    assert_eq!(surface.history_matching("Stopping process").len(), 1);
    assert_eq!(
        surface.history_matching("Process exited with return code"),
        vec!["Process exited with return code -15"]
    );
    assert!(surface.rendered.is_empty());
    assert_eq!(surface.last_controls(), Some(ControlState::IDLE));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_non_video_output_is_logged_and_session_ends() {
    let stub = StubBackend::builder()
        .with_stdout(b"not a transport stream".to_vec())
        .with_exit_code(3)
        .build()
        .unwrap();

    let mut controller = test_controller(stub.path());
    let mut surface = RecordingSurface::new();
    controller
        .on_start_requested(KeySize::Aes256, &mut surface)
        .unwrap();
    run_to_completion(&mut controller, &mut surface).await;

    assert_eq!(
        surface.history_matching("Failed to open video stream").len(),
        1
    );
    assert_eq!(
        surface.history_matching("Process exited with return code"),
        vec!["Process exited with return code 3"]
    );
    assert!(surface.rendered.is_empty());
    assert!(surface.errors.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_restart_after_exit_starts_a_new_session() {
    let stub = StubBackend::builder()
        .with_stdout(synthetic_stream(32, 16, 1))
        .build()
        .unwrap();

    let mut controller = test_controller(stub.path());
    let mut surface = RecordingSurface::new();

    let first = controller
        .on_start_requested(KeySize::Aes256, &mut surface)
        .unwrap();
    run_to_completion(&mut controller, &mut surface).await;

    let second = controller
        .on_start_requested(KeySize::Aes256, &mut surface)
        .unwrap();
    run_to_completion(&mut controller, &mut surface).await;

    assert_ne!(first, second);
    assert_eq!(controller.current_session(), Some(second));
    assert_eq!(surface.resizes, vec![(32, 316), (32, 316)]);
    assert_eq!(surface.rendered.len(), 2);
    assert_eq!(
        surface.history_matching("Process exited with return code 0").len(),
        2
    );
}
