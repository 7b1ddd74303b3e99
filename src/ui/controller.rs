//! Session lifecycle as seen from the UI thread

use super::{ControlState, LogView, UiDispatcher, UiEvent, UiSurface};
use crate::decoder::{CodecFactory, DecodedFrame, DecoderOptions};
use crate::display::{DisplaySink, FrameMailbox, DEFAULT_LOG_MARGIN};
use crate::session::{spawn_session, KeySize, RenderPolicy, SessionContext, SessionId};
use crate::subprocess::{LogCapacity, LogSink, ProcessSupervisor, SpawnError, StopOutcome};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

/// Static configuration of a [`SessionController`]
#[derive(Clone)]
pub struct SessionSettings {
    pub executable: PathBuf,
    pub terminate_grace: Duration,
    pub decoder_options: DecoderOptions,
    pub codec: Arc<dyn CodecFactory>,
    pub render: RenderPolicy,
    pub log_capacity: LogCapacity,
    pub display_margin: u32,
}

impl SessionSettings {
    pub fn new(executable: impl Into<PathBuf>, codec: Arc<dyn CodecFactory>) -> Self {
        Self {
            executable: executable.into(),
            terminate_grace: Duration::from_secs(2),
            decoder_options: DecoderOptions::default(),
            codec,
            render: RenderPolicy::default(),
            log_capacity: LogCapacity::default(),
            display_margin: DEFAULT_LOG_MARGIN,
        }
    }
}

struct ActiveSession {
    id: SessionId,
    mailbox: Arc<FrameMailbox>,
    process_running: bool,
    decoding: bool,
}

/// Owns the UI-thread state of the application and reacts to [`UiEvent`]s.
pub struct SessionController {
    runtime: Handle,
    supervisor: Arc<ProcessSupervisor>,
    settings: SessionSettings,
    log: LogSink,
    dispatcher: UiDispatcher,
    events: mpsc::UnboundedReceiver<UiEvent>,
    display: DisplaySink,
    log_view: LogView,
    active: Option<ActiveSession>,
    last_id: Option<SessionId>,
}

impl SessionController {
    pub fn new(settings: SessionSettings, runtime: Handle) -> Self {
        let (dispatcher, events) = UiDispatcher::channel();
        let log = LogSink::new(settings.log_capacity);
        let notify = dispatcher.clone();
        log.set_notifier(move || {
            notify.post(UiEvent::LogUpdated);
        });

        Self {
            runtime,
            supervisor: Arc::new(ProcessSupervisor::new(
                settings.executable.clone(),
                settings.terminate_grace,
            )),
            display: DisplaySink::new(settings.display_margin),
            settings,
            log,
            dispatcher,
            events,
            log_view: LogView::new(),
            active: None,
            last_id: None,
        }
    }

    pub fn dispatcher(&self) -> UiDispatcher {
        self.dispatcher.clone()
    }

    pub fn log(&self) -> &LogSink {
        &self.log
    }

    pub fn display(&self) -> &DisplaySink {
        &self.display
    }

    pub fn current_session(&self) -> Option<SessionId> {
        self.active.as_ref().map(|s| s.id)
    }

    /// Whether the backend of the current session is still alive
    pub fn is_running(&self) -> bool {
        self.active.as_ref().is_some_and(|s| s.process_running)
    }

    /// Whether no session work remains: process exited and decode finished
    pub fn is_idle(&self) -> bool {
        self.active
            .as_ref()
            .map_or(true, |s| !s.process_running && !s.decoding)
    }

    /// Launch the backend with `key_size`.
    ///
    /// A spawn failure is reported to the operator here and leaves Start
    /// enabled; no background work is started in that case.
    pub fn on_start_requested(
        &mut self,
        key_size: KeySize,
        surface: &mut dyn UiSurface,
    ) -> Result<SessionId, SpawnError> {
        let _runtime = self.runtime.enter();

        let handle = match self.supervisor.start(&key_size.as_arg()) {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!("Failed to start backend: {}", e);
                self.log.append(format!("Failed to start process: {}", e));
                surface.notify_error(&e.to_string());
                self.flush_log(surface);
                surface.set_controls(ControlState::IDLE);
                return Err(e);
            }
        };

        let id = self.last_id.map_or_else(SessionId::first, |id| id.next());
        self.last_id = Some(id);
        self.display.reset();

        self.log.append(format!(
            "Started {} with key size {} (pid {})",
            self.settings.executable.display(),
            key_size,
            handle.pid()
        ));

        let mailbox = Arc::new(FrameMailbox::new());
        let ctx = SessionContext {
            id,
            supervisor: Arc::clone(&self.supervisor),
            log: self.log.clone(),
            dispatcher: self.dispatcher.clone(),
            decoder_options: self.settings.decoder_options.clone(),
            codec: Arc::clone(&self.settings.codec),
            render: self.settings.render,
            mailbox: Arc::clone(&mailbox),
        };
        let tasks = spawn_session(&self.runtime, ctx, handle);

        self.active = Some(ActiveSession {
            id,
            mailbox,
            process_running: true,
            decoding: tasks.decode.is_some(),
        });
        surface.set_controls(ControlState::RUNNING);
        self.flush_log(surface);
        Ok(id)
    }

    /// Ask the backend to terminate; returns without waiting for it.
    pub fn on_stop_requested(&mut self, surface: &mut dyn UiSurface) -> StopOutcome {
        let outcome = self.supervisor.stop();
        if outcome == StopOutcome::Terminating {
            self.log.append("Stopping process");
            self.flush_log(surface);
        }
        outcome
    }

    /// Handle one event; `false` when the UI loop should exit.
    pub fn handle(&mut self, event: UiEvent, surface: &mut dyn UiSurface) -> bool {
        match event {
            UiEvent::LogUpdated => self.flush_log(surface),
            UiEvent::FrameReady(id) => {
                if let Some(frame) = self.session(id).and_then(|s| s.mailbox.take()) {
                    self.present(&frame, surface);
                }
            }
            UiEvent::Frame(id, frame) => {
                if self.session(id).is_some() {
                    self.present(&frame, surface);
                }
            }
            UiEvent::DecodeFinished(id) => {
                if let Some(session) = self.session_mut(id) {
                    session.decoding = false;
                }
            }
            UiEvent::SessionEnded(id, code) => {
                if let Some(session) = self.session_mut(id) {
                    session.process_running = false;
                    tracing::info!("{} ended with {:?}", id, code);
                    surface.set_controls(ControlState::IDLE);
                }
            }
            UiEvent::StartRequested(key_size) => {
                if self.is_running() {
                    tracing::debug!("Start ignored while a session is running");
                } else {
                    let _ = self.on_start_requested(key_size, surface);
                }
            }
            UiEvent::StopRequested => {
                self.on_stop_requested(surface);
            }
            UiEvent::Shutdown => {
                self.supervisor.stop();
                self.flush_log(surface);
                return false;
            }
        }
        true
    }

    /// Drain events on the current thread until shutdown, or until the
    /// session finishes when `until_idle` is set.
    pub fn run_blocking(&mut self, surface: &mut dyn UiSurface, until_idle: bool) {
        if until_idle && self.is_idle() {
            self.drain_pending(surface);
            return;
        }
        while let Some(event) = self.events.blocking_recv() {
            if !self.handle(event, surface) {
                break;
            }
            if until_idle && self.is_idle() {
                self.drain_pending(surface);
                break;
            }
        }
    }

    /// Async variant of [`run_blocking`](Self::run_blocking) with `until_idle` set.
    pub async fn run_until_idle(&mut self, surface: &mut dyn UiSurface) {
        if self.is_idle() {
            self.drain_pending(surface);
            return;
        }
        while let Some(event) = self.events.recv().await {
            if !self.handle(event, surface) || self.is_idle() {
                break;
            }
        }
        self.drain_pending(surface);
    }

    /// Handle everything already queued without waiting for more
    pub fn drain_pending(&mut self, surface: &mut dyn UiSurface) {
        while let Ok(event) = self.events.try_recv() {
            if !self.handle(event, surface) {
                break;
            }
        }
        self.flush_log(surface);
    }

    fn present(&mut self, frame: &DecodedFrame, surface: &mut dyn UiSurface) {
        // Failures are already in the log
        let _ = self.display.on_frame(frame, surface, &self.log);
    }

    fn flush_log(&mut self, surface: &mut dyn UiSurface) {
        self.log_view.flush(&self.log, surface);
    }

    fn session(&self, id: SessionId) -> Option<&ActiveSession> {
        self.active.as_ref().filter(|s| s.id == id)
    }

    fn session_mut(&mut self, id: SessionId) -> Option<&mut ActiveSession> {
        self.active.as_mut().filter(|s| s.id == id)
    }
}
