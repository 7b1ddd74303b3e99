use std::path::PathBuf;

/// Failure to launch the backend process.
///
/// Fatal to the session: reported once to the operator, never retried.
#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("Executable not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Permission denied launching {}", .0.display())]
    PermissionDenied(PathBuf),

    #[error("A backend process is already running (pid {0})")]
    AlreadyRunning(u32),

    #[error("Failed to capture {0} of the backend process")]
    MissingPipe(&'static str),

    #[error("Failed to spawn {}: {source}", program.display())]
    Io {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SpawnError {
    /// Map an OS spawn failure onto the taxonomy above
    pub fn from_io(error: std::io::Error, program: PathBuf) -> Self {
        match error.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(program),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(program),
            _ => Self::Io {
                program,
                source: error,
            },
        }
    }
}

/// Failure while supervising an already running process
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Failed waiting for process {pid}: {source}")]
    Wait {
        pid: u32,
        #[source]
        source: std::io::Error,
    },
}
