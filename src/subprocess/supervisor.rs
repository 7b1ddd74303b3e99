//! Lifecycle supervision for the backend process
//!
//! At most one backend runs at a time. The supervisor owns the slot that
//! records the live process; [`ProcessHandle`] carries the child itself and
//! clears the slot when it is dropped, so a handle that is never monitored
//! cannot leave the supervisor wedged in the "running" state.

use super::error::{ProcessError, SpawnError};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::oneshot;

/// Terminal status of the backend process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Process returned normally with this code
    Exited(i32),
    /// Process was terminated by this signal
    Signalled(i32),
}

impl ExitCode {
    pub fn success(&self) -> bool {
        matches!(self, ExitCode::Exited(0))
    }

    /// Return code as reported to the operator; signals are negative
    pub fn code(&self) -> i32 {
        match self {
            ExitCode::Exited(code) => *code,
            ExitCode::Signalled(signal) => -signal,
        }
    }

    fn from_status(status: std::process::ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return ExitCode::Exited(code);
        }
        Self::from_signal_status(status)
    }

    #[cfg(unix)]
    fn from_signal_status(status: std::process::ExitStatus) -> Self {
        use std::os::unix::process::ExitStatusExt;
        match status.signal() {
            Some(signal) => ExitCode::Signalled(signal),
            None => ExitCode::Exited(1),
        }
    }

    #[cfg(not(unix))]
    fn from_signal_status(_status: std::process::ExitStatus) -> Self {
        ExitCode::Exited(1)
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Result of a stop request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// A terminate request was handed to the live process
    Terminating,
    /// Nothing to stop: never started, already stopped, or already exited
    NotRunning,
}

struct LiveProcess {
    pid: u32,
    terminate: Option<oneshot::Sender<()>>,
}

type LiveSlot = Arc<Mutex<Option<LiveProcess>>>;

fn lock_slot(slot: &LiveSlot) -> MutexGuard<'_, Option<LiveProcess>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A running backend process and its output pipes
pub struct ProcessHandle {
    pid: u32,
    child: Child,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    terminate_rx: oneshot::Receiver<()>,
    slot: LiveSlot,
}

impl ProcessHandle {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Take the raw stdout pipe (byte source)
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    /// Take the raw stderr pipe (line source)
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.stderr.take()
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        let mut live = lock_slot(&self.slot);
        if live.as_ref().is_some_and(|p| p.pid == self.pid) {
            *live = None;
        }
    }
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.pid)
            .field("stdout", &self.stdout.is_some())
            .field("stderr", &self.stderr.is_some())
            .finish()
    }
}

enum Wake {
    Exited(std::io::Result<std::process::ExitStatus>),
    TerminateRequested,
}

/// Launches the backend and manages its termination
pub struct ProcessSupervisor {
    executable: PathBuf,
    terminate_grace: Duration,
    live: LiveSlot,
}

impl ProcessSupervisor {
    pub fn new(executable: impl Into<PathBuf>, terminate_grace: Duration) -> Self {
        Self {
            executable: executable.into(),
            terminate_grace,
            live: Arc::new(Mutex::new(None)),
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn is_running(&self) -> bool {
        lock_slot(&self.live).is_some()
    }

    pub fn pid(&self) -> Option<u32> {
        lock_slot(&self.live).as_ref().map(|p| p.pid)
    }

    /// Launch the executable with `param` as its sole argument.
    ///
    /// Must be called within a tokio runtime context.
    pub fn start(&self, param: &str) -> Result<ProcessHandle, SpawnError> {
        let mut live = lock_slot(&self.live);
        if let Some(existing) = live.as_ref() {
            tracing::warn!(
                "Refusing to start {}: pid {} is still live",
                self.executable.display(),
                existing.pid
            );
            return Err(SpawnError::AlreadyRunning(existing.pid));
        }

        tracing::debug!("Spawning backend: {} {}", self.executable.display(), param);

        let mut child = self.configure_command(param).spawn().map_err(|e| {
            tracing::error!(
                "Failed to spawn '{}': {:?} (kind: {:?})",
                self.executable.display(),
                e,
                e.kind()
            );
            SpawnError::from_io(e, self.executable.clone())
        })?;

        let pid = child.id().unwrap_or(0);
        let stdout = child
            .stdout
            .take()
            .ok_or(SpawnError::MissingPipe("stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or(SpawnError::MissingPipe("stderr"))?;

        let (terminate_tx, terminate_rx) = oneshot::channel();
        *live = Some(LiveProcess {
            pid,
            terminate: Some(terminate_tx),
        });

        tracing::info!(
            "Started backend {} {} (pid {})",
            self.executable.display(),
            param,
            pid
        );

        Ok(ProcessHandle {
            pid,
            child,
            stdout: Some(stdout),
            stderr: Some(stderr),
            terminate_rx,
            slot: Arc::clone(&self.live),
        })
    }

    /// Request termination of the live process.
    ///
    /// Only the first request on a live process has any effect; the signal
    /// itself is delivered by [`ProcessSupervisor::monitor_exit`].
    pub fn stop(&self) -> StopOutcome {
        let mut live = lock_slot(&self.live);
        let Some(process) = live.as_mut() else {
            tracing::debug!("Stop requested with no live backend");
            return StopOutcome::NotRunning;
        };

        let Some(terminate) = process.terminate.take() else {
            tracing::debug!("Backend pid {} is already stopping", process.pid);
            return StopOutcome::NotRunning;
        };

        if terminate.send(()).is_ok() {
            tracing::info!("Stop requested for backend pid {}", process.pid);
            StopOutcome::Terminating
        } else {
            // The monitor already observed the exit
            StopOutcome::NotRunning
        }
    }

    /// Block until the process exits, delivering any pending terminate request.
    pub async fn monitor_exit(&self, mut handle: ProcessHandle) -> Result<ExitCode, ProcessError> {
        let pid = handle.pid;

        let wake = tokio::select! {
            status = handle.child.wait() => Wake::Exited(status),
            Ok(()) = &mut handle.terminate_rx => Wake::TerminateRequested,
        };

        let status = match wake {
            Wake::Exited(status) => status,
            Wake::TerminateRequested => self.terminate(&mut handle.child, pid).await,
        }
        .map_err(|source| ProcessError::Wait { pid, source })?;

        let code = ExitCode::from_status(status);
        if code.success() {
            tracing::info!("Backend pid {} exited successfully", pid);
        } else {
            tracing::warn!("Backend pid {} exited with code {}", pid, code);
        }
        Ok(code)
    }

    async fn terminate(
        &self,
        child: &mut Child,
        pid: u32,
    ) -> std::io::Result<std::process::ExitStatus> {
        if let Some(status) = child.try_wait()? {
            tracing::debug!("Backend pid {} already exited, not signalling", pid);
            return Ok(status);
        }

        #[cfg(unix)]
        {
            use nix::sys::signal::{self, Signal};
            use nix::unistd::Pid;

            // The backend leads its own process group
            let pgid = Pid::from_raw(-(pid as i32));
            if let Err(e) = signal::kill(pgid, Signal::SIGTERM) {
                tracing::warn!("SIGTERM to backend group {} failed: {}", pid, e);
            }

            match tokio::time::timeout(self.terminate_grace, child.wait()).await {
                Ok(status) => return status,
                Err(_) => tracing::warn!(
                    "Backend pid {} still running {:?} after SIGTERM, killing",
                    pid,
                    self.terminate_grace
                ),
            }
        }

        #[cfg(not(unix))]
        tracing::debug!("Killing backend pid {}", pid);

        child.kill().await?;
        child.wait().await
    }

    fn configure_command(&self, param: &str) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.arg(param)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        {
            cmd.process_group(0);
        }

        #[cfg(windows)]
        {
            const CREATE_NO_WINDOW: u32 = 0x08000000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        cmd
    }
}
