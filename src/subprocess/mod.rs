pub mod error;
pub mod lines;
pub mod streaming;
pub mod supervisor;

pub use error::{ProcessError, SpawnError};
pub use lines::{lossy_lines, LineStream};
pub use streaming::{ByteTee, LogCapacity, LogEntry, LogSink, TeeSummary};
pub use supervisor::{ExitCode, ProcessHandle, ProcessSupervisor, StopOutcome};
