use super::reader::LineReader;
use super::{CommandSpec, OutputStream, ProcessError, ProcessState, SessionId};
use crate::bridge::UiMessage;
use crate::constants::OUTPUT_DRAIN_TIMEOUT;
use std::process::{ExitStatus, Stdio};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::runtime::Handle;
use tokio::sync::{mpsc as queue, Notify};
use tokio::time::Instant;

/// A supervised child process.
///
/// The child runs under a supervisor task that services stdout, stderr,
/// the stdin queue and termination requests in one `select!` loop, so a
/// full pipe on one stream never stalls the others. All output and the
/// final exit report reach the UI through the bridge.
pub struct ProcessSession {
    id: SessionId,
    spec: CommandSpec,
    state: Arc<Mutex<ProcessState>>,
    stdin: queue::UnboundedSender<String>,
    terminate: Arc<Notify>,
}

impl ProcessSession {
    /// Spawns `spec` on the runtime. Never fails here: a spawn failure is
    /// posted as `ProcessFailed` and the session goes straight to `Exited`.
    pub fn start(
        runtime: &Handle,
        id: SessionId,
        spec: CommandSpec,
        grace: Duration,
        sender: mpsc::Sender<UiMessage>,
    ) -> Self {
        let state = Arc::new(Mutex::new(ProcessState::Running));
        let terminate = Arc::new(Notify::new());
        let (stdin, stdin_rx) = queue::unbounded_channel();

        let supervisor = Supervisor {
            id,
            sender,
            state: Arc::clone(&state),
            terminate: Arc::clone(&terminate),
            grace,
        };
        let command = spec.clone();
        runtime.spawn(supervisor.run(command, stdin_rx));

        tracing::info!("Started {} in {}: {}", id, spec.cwd.display(), spec);
        Self {
            id,
            spec,
            state,
            stdin,
            terminate,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn command(&self) -> &CommandSpec {
        &self.spec
    }

    pub fn state(&self) -> ProcessState {
        *lock(&self.state)
    }

    pub fn is_running(&self) -> bool {
        self.state() == ProcessState::Running
    }

    /// Queues one line for the child's stdin. Lines are written in the
    /// order they were queued, each followed by a newline and a flush.
    pub fn write_line(&self, text: &str) -> Result<(), ProcessError> {
        if !self.is_running() {
            return Err(ProcessError::NotRunning(self.id));
        }
        self.stdin
            .send(text.to_string())
            .map_err(|_| ProcessError::NotRunning(self.id))
    }

    /// Asks the child to finish: stdin is closed, and if it is still alive
    /// after the grace period it is killed. Returns false if it already
    /// exited.
    pub fn terminate(&self) -> bool {
        {
            let mut state = lock(&self.state);
            match *state {
                ProcessState::Running => *state = ProcessState::Terminating,
                ProcessState::Terminating => return true,
                _ => return false,
            }
        }
        tracing::info!("Terminating {}", self.id);
        self.terminate.notify_one();
        true
    }
}

fn lock(state: &Mutex<ProcessState>) -> MutexGuard<'_, ProcessState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Supervisor {
    id: SessionId,
    sender: mpsc::Sender<UiMessage>,
    state: Arc<Mutex<ProcessState>>,
    terminate: Arc<Notify>,
    grace: Duration,
}

impl Supervisor {
    fn post(&self, message: UiMessage) {
        if self.sender.send(message).is_err() {
            tracing::debug!("UI gone, dropping event from {}", self.id);
        }
    }

    fn set_state(&self, next: ProcessState) {
        *lock(&self.state) = next;
    }

    /// Forwards one read result. Returns whether the stream is still open.
    fn forward(&self, stream: OutputStream, read: std::io::Result<Option<String>>) -> bool {
        match read {
            Ok(Some(line)) => {
                self.post(UiMessage::ProcessOutput {
                    session: self.id,
                    stream,
                    line,
                });
                true
            }
            Ok(None) => false,
            Err(e) => {
                tracing::warn!("Read error on {} {:?}: {}", self.id, stream, e);
                self.post(UiMessage::ProcessOutput {
                    session: self.id,
                    stream: OutputStream::Stderr,
                    line: ProcessError::Io(e).to_string(),
                });
                false
            }
        }
    }

    async fn run(self, spec: CommandSpec, stdin_rx: queue::UnboundedReceiver<String>) {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .current_dir(&spec.cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so a kill also reaches whatever the child started.
        #[cfg(unix)]
        command.process_group(0);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(source) => {
                let error = ProcessError::Spawn {
                    program: spec.program.clone(),
                    source,
                };
                tracing::error!("{}: {}", self.id, error);
                self.set_state(ProcessState::Exited(None));
                self.post(UiMessage::ProcessFailed {
                    session: self.id,
                    error: error.to_string(),
                });
                return;
            }
        };

        let group = child.id();
        let mut stdout = child.stdout.take().map(LineReader::new);
        let mut stderr = child.stderr.take().map(LineReader::new);
        let mut writer = child
            .stdin
            .take()
            .map(|pipe| tokio::spawn(feed_stdin(self.id, pipe, stdin_rx, self.sender.clone())));

        let mut stdout_open = stdout.is_some();
        let mut stderr_open = stderr.is_some();
        let mut kill_at: Option<Instant> = None;

        let status = loop {
            tokio::select! {
                read = next_line(&mut stdout), if stdout_open => {
                    stdout_open = self.forward(OutputStream::Stdout, read);
                }
                read = next_line(&mut stderr), if stderr_open => {
                    stderr_open = self.forward(OutputStream::Stderr, read);
                }
                _ = self.terminate.notified(), if kill_at.is_none() => {
                    // Closing stdin is the polite request to finish.
                    if let Some(writer) = writer.take() {
                        writer.abort();
                    }
                    kill_at = Some(Instant::now() + self.grace);
                }
                _ = wait_until(kill_at), if kill_at.is_some() => {
                    tracing::warn!("{} ignored termination for {:?}, killing", self.id, self.grace);
                    kill(self.id, &mut child, group);
                    kill_at = None;
                }
                status = child.wait() => break status,
            }
        };
        if let Some(writer) = writer.take() {
            writer.abort();
        }

        let drain = async {
            while stdout_open || stderr_open {
                tokio::select! {
                    read = next_line(&mut stdout), if stdout_open => {
                        stdout_open = self.forward(OutputStream::Stdout, read);
                    }
                    read = next_line(&mut stderr), if stderr_open => {
                        stderr_open = self.forward(OutputStream::Stderr, read);
                    }
                }
            }
        };
        if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, drain).await.is_err() {
            // A grandchild can keep the pipes open after the child exits.
            tracing::debug!("{} output still open after exit, not waiting", self.id);
        }

        let code = exit_code(self.id, status);
        tracing::info!("{} exited with {:?}", self.id, code);
        self.set_state(ProcessState::Exited(code));
        self.post(UiMessage::ProcessExited {
            session: self.id,
            code,
        });
    }
}

/// Kills the child's whole process group where there is one, else the child.
fn kill(id: SessionId, child: &mut Child, group: Option<u32>) {
    #[cfg(unix)]
    if let Some(pgid) = group.and_then(|pgid| i32::try_from(pgid).ok()) {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
            Ok(()) => return,
            Err(e) => tracing::warn!("Failed to kill process group of {}: {}", id, e),
        }
    }
    #[cfg(not(unix))]
    let _ = group;

    if let Err(e) = child.start_kill() {
        tracing::warn!("Failed to kill {}: {}", id, e);
    }
}

fn exit_code(id: SessionId, status: std::io::Result<ExitStatus>) -> Option<i32> {
    match status {
        Ok(status) => status.code(),
        Err(e) => {
            tracing::error!("Failed to wait for {}: {}", id, e);
            None
        }
    }
}

async fn feed_stdin(
    id: SessionId,
    mut pipe: ChildStdin,
    mut lines: queue::UnboundedReceiver<String>,
    sender: mpsc::Sender<UiMessage>,
) {
    while let Some(mut line) = lines.recv().await {
        line.push('\n');
        let written = async {
            pipe.write_all(line.as_bytes()).await?;
            pipe.flush().await
        };
        if let Err(e) = written.await {
            tracing::warn!("Write to {} stdin failed: {}", id, e);
            let _ = sender.send(UiMessage::ProcessOutput {
                session: id,
                stream: OutputStream::Stderr,
                line: ProcessError::Io(e).to_string(),
            });
            return;
        }
    }
}

async fn next_line<R: AsyncRead + Unpin>(
    reader: &mut Option<LineReader<R>>,
) -> std::io::Result<Option<String>> {
    match reader {
        Some(reader) => reader.next_line().await,
        None => Ok(None),
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::bridge::AsyncBridge;
    use std::path::PathBuf;
    use tokio::runtime::Runtime;

    const WAIT: Duration = Duration::from_secs(10);

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh", std::env::temp_dir()).arg("-c").arg(script)
    }

    /// Collects events until the session reports its end.
    fn collect(bridge: &AsyncBridge) -> (Vec<(OutputStream, String)>, UiMessage) {
        let mut lines = Vec::new();
        loop {
            match bridge.recv_timeout(WAIT).expect("process never finished") {
                UiMessage::ProcessOutput { stream, line, .. } => lines.push((stream, line)),
                end @ (UiMessage::ProcessExited { .. } | UiMessage::ProcessFailed { .. }) => {
                    return (lines, end)
                }
                other => panic!("unexpected message: {other:?}"),
            }
        }
    }

    fn start(rt: &Runtime, bridge: &AsyncBridge, spec: CommandSpec) -> ProcessSession {
        ProcessSession::start(
            rt.handle(),
            SessionId(1),
            spec,
            Duration::from_millis(200),
            bridge.sender(),
        )
    }

    #[test]
    fn test_stdout_and_stderr_then_exit_code() {
        let rt = Runtime::new().unwrap();
        let bridge = AsyncBridge::new();
        let session = start(&rt, &bridge, sh("echo A; echo B >&2; exit 0"));

        let (lines, end) = collect(&bridge);
        assert!(lines.contains(&(OutputStream::Stdout, "A".to_string())));
        assert!(lines.contains(&(OutputStream::Stderr, "B".to_string())));
        assert_eq!(lines.len(), 2);
        assert!(matches!(end, UiMessage::ProcessExited { code: Some(0), .. }));
        assert_eq!(session.state(), ProcessState::Exited(Some(0)));
        assert!(bridge.recv_timeout(Duration::from_millis(100)).is_none());
    }

    #[test]
    fn test_nonzero_exit_code() {
        let rt = Runtime::new().unwrap();
        let bridge = AsyncBridge::new();
        let _session = start(&rt, &bridge, sh("exit 3"));

        let (lines, end) = collect(&bridge);
        assert!(lines.is_empty());
        assert!(matches!(end, UiMessage::ProcessExited { code: Some(3), .. }));
    }

    #[test]
    fn test_stdin_lines_arrive_in_order() {
        let rt = Runtime::new().unwrap();
        let bridge = AsyncBridge::new();
        let session = start(&rt, &bridge, CommandSpec::new("head", std::env::temp_dir()).arg("-n").arg("3"));

        for line in ["one", "two", "three"] {
            session.write_line(line).unwrap();
        }

        let (lines, end) = collect(&bridge);
        let stdout: Vec<_> = lines.into_iter().map(|(_, line)| line).collect();
        assert_eq!(stdout, vec!["one", "two", "three"]);
        assert!(matches!(end, UiMessage::ProcessExited { code: Some(0), .. }));
        assert!(matches!(
            session.write_line("four"),
            Err(ProcessError::NotRunning(SessionId(1)))
        ));
    }

    #[test]
    fn test_spawn_failure_is_single_error_event() {
        let rt = Runtime::new().unwrap();
        let bridge = AsyncBridge::new();
        let session = start(
            &rt,
            &bridge,
            CommandSpec::new("definitely-not-a-real-program-7f3a", PathBuf::from("/")),
        );

        let (lines, end) = collect(&bridge);
        assert!(lines.is_empty());
        match end {
            UiMessage::ProcessFailed { session, error } => {
                assert_eq!(session, SessionId(1));
                assert!(error.contains("definitely-not-a-real-program-7f3a"));
            }
            other => panic!("unexpected message: {other:?}"),
        }
        assert_eq!(session.state(), ProcessState::Exited(None));
        assert!(bridge.recv_timeout(Duration::from_millis(100)).is_none());
    }

    #[test]
    fn test_terminate_closes_stdin_first() {
        let rt = Runtime::new().unwrap();
        let bridge = AsyncBridge::new();
        // `cat` exits on its own once stdin closes.
        let session = start(&rt, &bridge, CommandSpec::new("cat", std::env::temp_dir()));
        session.write_line("hello").unwrap();
        match bridge.recv_timeout(WAIT) {
            Some(UiMessage::ProcessOutput { line, .. }) => assert_eq!(line, "hello"),
            other => panic!("unexpected message: {other:?}"),
        }

        assert!(session.terminate());
        let (_, end) = collect(&bridge);
        assert!(matches!(end, UiMessage::ProcessExited { code: Some(0), .. }));
        assert!(!session.terminate());
    }

    #[test]
    fn test_terminate_kills_after_grace() {
        let rt = Runtime::new().unwrap();
        let bridge = AsyncBridge::new();
        let session = start(&rt, &bridge, CommandSpec::new("sleep", std::env::temp_dir()).arg("30"));

        assert!(session.terminate());
        assert_eq!(session.state(), ProcessState::Terminating);
        assert!(session.write_line("ignored").is_err());

        let (_, end) = collect(&bridge);
        assert!(matches!(end, UiMessage::ProcessExited { code: None, .. }));
        assert_eq!(session.state(), ProcessState::Exited(None));
    }

    #[test]
    fn test_stdin_write_failure_is_reported_as_output() {
        let rt = Runtime::new().unwrap();
        let bridge = AsyncBridge::new();
        let session = start(&rt, &bridge, sh("exec 0<&-; sleep 1"));
        // Give the shell time to close its end of the pipe.
        std::thread::sleep(Duration::from_millis(300));
        session.write_line("nobody reads this").unwrap();

        let (lines, end) = collect(&bridge);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].0, OutputStream::Stderr);
        assert!(lines[0].1.starts_with("process I/O error:"), "{}", lines[0].1);
        assert!(matches!(end, UiMessage::ProcessExited { code: Some(0), .. }));
    }

    /// Whether `pid` names a live, non-zombie process.
    #[cfg(target_os = "linux")]
    fn is_alive(pid: &str) -> bool {
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => stat
                .rsplit(')')
                .next()
                .is_some_and(|rest| !rest.trim_start().starts_with('Z')),
            Err(_) => false,
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_kill_reaches_background_children() {
        let rt = Runtime::new().unwrap();
        let bridge = AsyncBridge::new();
        let session = start(&rt, &bridge, sh("sleep 30 & echo $!; wait"));
        let pid = match bridge.recv_timeout(WAIT) {
            Some(UiMessage::ProcessOutput { line, .. }) => line,
            other => panic!("unexpected message: {other:?}"),
        };
        assert!(is_alive(&pid));

        assert!(session.terminate());
        let (_, end) = collect(&bridge);
        assert!(matches!(end, UiMessage::ProcessExited { code: None, .. }));

        let deadline = std::time::Instant::now() + WAIT;
        while is_alive(&pid) {
            assert!(std::time::Instant::now() < deadline, "background child {} survived", pid);
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}
