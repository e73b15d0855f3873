use super::{CommandSpec, OutputStream, ProcessError, ProcessSession, ProcessState, SessionId};
use crate::bridge::UiMessage;
use crate::config::TerminalSettings;
use crate::view::EditorView;
use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use tokio::runtime::Handle;

const HELP: &[&str] = &[
    "Available commands:",
    "  clear          - Clear terminal output",
    "  help           - Show this help message",
    "  cd <path>      - Change directory",
    "",
    "Any other command is run through the shell.",
    "While a command runs, input lines are sent to its stdin.",
];

/// Command line front for [`ProcessSession`]: built-ins, working
/// directory, and at most one running child.
pub struct Terminal {
    runtime: Handle,
    sender: mpsc::Sender<UiMessage>,
    settings: TerminalSettings,
    cwd: PathBuf,
    current: Option<ProcessSession>,
    next_session: u64,
}

impl Terminal {
    pub fn new(
        runtime: Handle,
        sender: mpsc::Sender<UiMessage>,
        settings: TerminalSettings,
        cwd: PathBuf,
    ) -> Self {
        Self {
            runtime,
            sender,
            settings,
            cwd,
            current: None,
            next_session: 1,
        }
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn state(&self) -> ProcessState {
        self.current
            .as_ref()
            .map_or(ProcessState::Idle, ProcessSession::state)
    }

    pub fn current(&self) -> Option<&ProcessSession> {
        self.current.as_ref()
    }

    /// Whether events from `session` belong to this terminal's child.
    pub fn owns(&self, session: SessionId) -> bool {
        self.current.as_ref().map(ProcessSession::id) == Some(session)
    }

    /// Handles one line of user input. While a child is alive the line goes
    /// to its stdin; otherwise it is a built-in or a shell command. Returns
    /// the id of a newly started session.
    pub fn submit(
        &mut self,
        input: &str,
        view: &mut dyn EditorView,
    ) -> Result<Option<SessionId>, ProcessError> {
        if let Some(session) = self.current.as_ref().filter(|s| !s.state().is_exited()) {
            view.append_output(OutputStream::Stdout, input);
            session.write_line(input)?;
            return Ok(None);
        }

        let command = input.trim();
        if command.is_empty() {
            return Ok(None);
        }
        view.append_output(OutputStream::Stdout, &format!("$ {}", command));

        match command {
            "clear" => {
                view.clear_output();
                view.append_output(
                    OutputStream::Stdout,
                    &format!("Working directory: {}", self.cwd.display()),
                );
            }
            "help" => {
                for line in HELP {
                    view.append_output(OutputStream::Stdout, line);
                }
            }
            "cd" => self.cd("~", view),
            _ if command.starts_with("cd ") => self.cd(command[3..].trim(), view),
            _ => return Ok(Some(self.run(command))),
        }
        Ok(None)
    }

    fn cd(&mut self, path: &str, view: &mut dyn EditorView) {
        match self.change_dir(path) {
            Ok(cwd) => {
                let line = format!("Changed directory to: {}", cwd.display());
                view.append_output(OutputStream::Stdout, &line);
            }
            Err(e) => view.append_output(OutputStream::Stderr, &format!("Error: {}", e)),
        }
    }

    /// Resolves `path` (`~`, relative or absolute) against the current
    /// directory and switches to it.
    pub fn change_dir(&mut self, path: &str) -> Result<&Path> {
        let target = if path == "~" {
            dirs::home_dir().unwrap_or_else(|| self.cwd.clone())
        } else if let Some(rest) = path.strip_prefix("~/") {
            match dirs::home_dir() {
                Some(home) => home.join(rest),
                None => bail!("No home directory"),
            }
        } else {
            self.cwd.join(path)
        };

        if !target.is_dir() {
            bail!("Directory not found: {}", target.display());
        }
        self.cwd = target.canonicalize().unwrap_or(target);
        tracing::debug!("Terminal cwd is now {}", self.cwd.display());
        Ok(&self.cwd)
    }

    /// Runs `command` through the shell in the current directory.
    pub fn run(&mut self, command: &str) -> SessionId {
        let spec = CommandSpec::shell(command, self.cwd.clone(), self.settings.shell.as_deref());
        self.launch(spec)
    }

    /// Starts an explicit command. A child that is still alive is asked to
    /// terminate first; its remaining events are no longer owned here.
    pub fn launch(&mut self, spec: CommandSpec) -> SessionId {
        if let Some(previous) = self.current.take() {
            previous.terminate();
        }
        let id = SessionId(self.next_session);
        self.next_session += 1;
        let session = ProcessSession::start(
            &self.runtime,
            id,
            spec,
            self.settings.terminate_grace(),
            self.sender.clone(),
        );
        self.current = Some(session);
        id
    }

    pub fn terminate(&self) -> bool {
        self.current.as_ref().is_some_and(ProcessSession::terminate)
    }

    /// Text shown once a session ends, mirroring a shell's exit report.
    pub fn exit_report(code: Option<i32>) -> String {
        match code {
            Some(0) => "Completed successfully.".to_string(),
            Some(code) => format!("Exit code: {}", code),
            None => "Terminated.".to_string(),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::bridge::AsyncBridge;
    use crate::view::RecordingView;
    use std::time::Duration;
    use tokio::runtime::Runtime;

    fn terminal(rt: &Runtime, bridge: &AsyncBridge, cwd: PathBuf) -> Terminal {
        let settings = TerminalSettings {
            shell: None,
            terminate_grace_ms: 200,
        };
        Terminal::new(rt.handle().clone(), bridge.sender(), settings, cwd)
    }

    fn lines(view: &RecordingView) -> Vec<&str> {
        view.output.iter().map(|(_, line)| line.as_str()).collect()
    }

    #[test]
    fn test_builtins_do_not_spawn() {
        let rt = Runtime::new().unwrap();
        let bridge = AsyncBridge::new();
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let mut term = terminal(&rt, &bridge, dir.path().canonicalize().unwrap());
        let mut view = RecordingView::default();

        assert_eq!(term.submit("help", &mut view).unwrap(), None);
        assert!(lines(&view).contains(&"Available commands:"));

        assert_eq!(term.submit("cd sub", &mut view).unwrap(), None);
        assert!(term.cwd().ends_with("sub"));

        term.submit("cd ..", &mut view).unwrap();
        assert_eq!(term.cwd(), dir.path().canonicalize().unwrap());

        term.submit("cd missing", &mut view).unwrap();
        assert!(view.output.last().unwrap().1.starts_with("Error: Directory not found"));
        assert_eq!(view.output.last().unwrap().0, OutputStream::Stderr);

        term.submit("clear", &mut view).unwrap();
        assert_eq!(view.output.len(), 1);
        assert!(view.output[0].1.starts_with("Working directory:"));

        assert_eq!(term.state(), ProcessState::Idle);
        assert!(bridge.recv_timeout(Duration::from_millis(50)).is_none());
    }

    #[test]
    fn test_command_runs_in_cwd_and_input_routes_to_child() {
        let rt = Runtime::new().unwrap();
        let bridge = AsyncBridge::new();
        let dir = tempfile::tempdir().unwrap();
        let cwd = dir.path().canonicalize().unwrap();
        let mut term = terminal(&rt, &bridge, cwd.clone());
        let mut view = RecordingView::default();

        let id = term.submit("pwd; read name; echo hi $name", &mut view).unwrap().unwrap();
        assert!(term.owns(id));
        assert_eq!(term.submit("bob", &mut view).unwrap(), None);

        let mut out = Vec::new();
        loop {
            match bridge.recv_timeout(Duration::from_secs(10)).unwrap() {
                UiMessage::ProcessOutput { line, .. } => out.push(line),
                UiMessage::ProcessExited { code, .. } => {
                    assert_eq!(code, Some(0));
                    break;
                }
                other => panic!("unexpected message: {other:?}"),
            }
        }
        assert_eq!(out, vec![cwd.display().to_string(), "hi bob".to_string()]);
        assert_eq!(lines(&view), vec!["$ pwd; read name; echo hi $name", "bob"]);
    }

    #[test]
    fn test_exit_report() {
        assert_eq!(Terminal::exit_report(Some(0)), "Completed successfully.");
        assert_eq!(Terminal::exit_report(Some(2)), "Exit code: 2");
        assert_eq!(Terminal::exit_report(None), "Terminated.");
    }
}
