//! Interactive child processes for the editor's terminal.

mod reader;
pub mod session;
pub mod terminal;

pub use session::ProcessSession;
pub use terminal::Terminal;

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "proc-{}", self.0)
    }
}

/// Which pipe a line of output came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Idle,
    Running,
    Terminating,
    /// `None` when the child never started or was ended by a signal.
    Exited(Option<i32>),
}

impl ProcessState {
    pub fn is_exited(&self) -> bool {
        matches!(self, ProcessState::Exited(_))
    }
}

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("process I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("process {0} is not running")]
    NotRunning(SessionId),
}

/// What to run and where. No shell is implied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Runs `command` through `shell`, or the platform shell when `None`.
    pub fn shell(command: &str, cwd: impl Into<PathBuf>, shell: Option<&str>) -> Self {
        let (program, flag) = match shell {
            Some(shell) => (shell, if cfg!(windows) { "/C" } else { "-c" }),
            None if cfg!(windows) => ("cmd", "/C"),
            None => ("sh", "-c"),
        };
        Self::new(program, cwd).arg(flag).arg(command)
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_spec() {
        let spec = CommandSpec::shell("ls -la", "/tmp", Some("bash"));
        assert_eq!(spec.program, "bash");
        assert_eq!(spec.args.last().map(String::as_str), Some("ls -la"));
        assert_eq!(spec.cwd, PathBuf::from("/tmp"));
    }

    #[cfg(unix)]
    #[test]
    fn test_default_shell_is_sh() {
        let spec = CommandSpec::shell("echo hi", "/", None);
        assert_eq!(spec.to_string(), "sh -c echo hi");
    }

    #[test]
    fn test_spawn_error_names_program() {
        let err = ProcessError::Spawn {
            program: "nope".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(err.to_string().starts_with("failed to start nope:"));
    }
}
