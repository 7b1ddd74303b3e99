//! Stub backend executables for end-to-end tests

use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A throwaway shell-script backend.
///
/// The script records its arguments, copies prepared bytes to stdout and
/// prepared lines to stderr, then exits with the configured code (or keeps
/// running when asked to linger).
#[derive(Debug)]
pub struct StubBackend {
    dir: TempDir,
    script: PathBuf,
}

impl StubBackend {
    pub fn builder() -> StubBackendBuilder {
        StubBackendBuilder::default()
    }

    pub fn path(&self) -> &Path {
        &self.script
    }

    /// Arguments of the most recent invocation, one per line
    pub fn recorded_args(&self) -> io::Result<Vec<String>> {
        let args = std::fs::read_to_string(self.dir.path().join("args"))?;
        Ok(args.lines().map(str::to_string).collect())
    }
}

#[derive(Debug, Default)]
pub struct StubBackendBuilder {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    exit_code: i32,
    linger_secs: Option<u32>,
}

impl StubBackendBuilder {
    pub fn with_stdout(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.stdout = bytes.into();
        self
    }

    pub fn with_stderr(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.stderr = bytes.into();
        self
    }

    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    /// Keep running for `secs` after writing output instead of exiting
    pub fn lingering(mut self, secs: u32) -> Self {
        self.linger_secs = Some(secs);
        self
    }

    #[cfg(unix)]
    pub fn build(self) -> io::Result<StubBackend> {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new()?;
        let stdout_file = dir.path().join("stdout.bin");
        let stderr_file = dir.path().join("stderr.txt");
        std::fs::write(&stdout_file, &self.stdout)?;
        std::fs::write(&stderr_file, &self.stderr)?;

        let mut script = format!(
            "#!/bin/sh\nprintf '%s\\n' \"$@\" > '{}'\ncat '{}' >&2\ncat '{}'\n",
            dir.path().join("args").display(),
            stderr_file.display(),
            stdout_file.display(),
        );
        match self.linger_secs {
            Some(secs) => script.push_str(&format!("exec sleep {}\n", secs)),
            None => script.push_str(&format!("exit {}\n", self.exit_code)),
        }

        let path = dir.path().join("backend.sh");
        std::fs::write(&path, script)?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;

        Ok(StubBackend { dir, script: path })
    }
}
