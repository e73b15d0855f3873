//! The editor core: documents, the editing surface, and the background
//! subsystems wired together on the UI thread.

use crate::api::gateway::{AiOutcome, AsyncRequestGateway, ProviderFactory, RequestContext};
use crate::api::gateway::{RequestId, RequestState};
use crate::api::prompts::{strip_code_fence, AiAction, ResultTarget};
use crate::api::create_provider;
use crate::bridge::{AsyncBridge, UiMessage};
use crate::config::AppConfig;
use crate::highlight::{HighlightJob, Highlighter, Token};
use crate::process::{OutputStream, ProcessError, SessionId, Terminal};
use crate::session::{DocumentId, DocumentSessionManager, SessionError, TextEdit};
use crate::utils::{open_file, save_file};
use crate::view::EditorView;
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tokio::runtime::Handle;

/// Owns every piece of editor state. Lives on the UI thread; background
/// work reports back through the bridge and is applied in [`Editor::pump`].
pub struct Editor<V: EditorView> {
    config: AppConfig,
    view: V,
    sessions: DocumentSessionManager,
    bridge: AsyncBridge,
    highlighter: Highlighter,
    gateway: AsyncRequestGateway,
    terminal: Terminal,
}

impl<V: EditorView> Editor<V> {
    pub fn new(runtime: Handle, config: AppConfig, view: V) -> Self {
        Self::with_provider_factory(runtime, config, view, Box::new(create_provider))
    }

    /// An editor whose assistant backends come from `factory`.
    pub fn with_provider_factory(
        runtime: Handle,
        config: AppConfig,
        mut view: V,
        factory: Box<ProviderFactory>,
    ) -> Self {
        let bridge = AsyncBridge::new();
        let highlighter = Highlighter::new(runtime.clone(), bridge.sender(), config.highlight.clone());
        let gateway = AsyncRequestGateway::with_factory(runtime.clone(), bridge.sender(), factory);
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let terminal = Terminal::new(runtime, bridge.sender(), config.terminal.clone(), cwd);

        let sessions = DocumentSessionManager::new();
        view.present(sessions.active());

        Self {
            config,
            view,
            sessions,
            bridge,
            highlighter,
            gateway,
            terminal,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut V {
        &mut self.view
    }

    pub fn sessions(&self) -> &DocumentSessionManager {
        &self.sessions
    }

    pub fn terminal(&self) -> &Terminal {
        &self.terminal
    }

    pub fn request_state(&self, id: RequestId) -> Option<RequestState> {
        self.gateway.state(id)
    }

    fn highlight_active_now(&self) {
        self.highlighter
            .submit_now(HighlightJob::snapshot(self.sessions.active()));
    }

    /// Opens an empty untitled document and shows it.
    pub fn new_document(&mut self) -> DocumentId {
        let id = self.sessions.new_document(None, String::new());
        // Just created, so it exists.
        let _ = self.switch_to(id);
        id
    }

    /// Opens `path` in a new document, or shows it if it is already open.
    pub fn open_file(&mut self, path: &Path) -> Result<DocumentId> {
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let already_open = self
            .sessions
            .documents()
            .find(|d| d.path() == Some(canonical.as_path()))
            .map(|d| d.id());
        if let Some(id) = already_open {
            self.switch_to(id)?;
            return Ok(id);
        }

        let text = open_file(&canonical)?;
        let id = self.sessions.new_document(Some(canonical), text);
        self.switch_to(id)?;
        tracing::info!("Opened {}", path.display());
        Ok(id)
    }

    /// Saves the active document, to `path` if given (save as) or to its
    /// own file otherwise.
    pub fn save_active(&mut self, path: Option<PathBuf>) -> Result<PathBuf> {
        let document = self.sessions.active();
        let Some(path) = path.or_else(|| document.path().map(Path::to_path_buf)) else {
            bail!("{} has no file name yet; save it with a path", document.title());
        };
        save_file(&path, document.text())
            .with_context(|| format!("Failed to save {}", document.title()))?;

        // Stored the way open_file looks it up.
        let path = path.canonicalize().unwrap_or(path);
        let id = document.id();
        self.sessions.mark_saved(id, path.clone())?;
        // The name may have changed the language.
        self.highlight_active_now();
        tracing::info!("Saved {} to {}", id, path.display());
        Ok(path)
    }

    /// Discards unsaved changes in the active document and reloads it from
    /// its file.
    pub fn reload_active(&mut self) -> Result<()> {
        let document = self.sessions.active();
        let Some(path) = document.path().map(Path::to_path_buf) else {
            bail!("{} has no file to reload from", document.title());
        };
        let id = document.id();
        let text = open_file(&path)?;

        self.highlighter.cancel(id);
        self.sessions.replace_text(id, text)?;
        self.view.apply_content(self.sessions.active());
        self.highlight_active_now();
        tracing::info!("Reloaded {} from {}", id, path.display());
        Ok(())
    }

    /// Binds `id` to the surface. Pending highlighting for the outgoing
    /// document is dropped and the incoming one is highlighted right away.
    pub fn switch_to(&mut self, id: DocumentId) -> Result<(), SessionError> {
        let outgoing = self.sessions.active_id();
        self.sessions.switch_to(id, &mut self.view)?;
        if outgoing != id {
            self.highlighter.cancel(outgoing);
            self.highlight_active_now();
        }
        Ok(())
    }

    pub fn close(&mut self, id: DocumentId) -> Result<(), SessionError> {
        let was_active = self.sessions.active_id() == id;
        self.sessions.close(id, &mut self.view)?;
        self.highlighter.cancel(id);
        if was_active {
            self.highlight_active_now();
        }
        Ok(())
    }

    /// Applies an edit from the surface to the active document and queues
    /// debounced highlighting. Returns the new generation.
    pub fn edit(&mut self, edit: TextEdit) -> u64 {
        let document = self.sessions.apply_edit(&edit);
        let generation = document.generation();
        self.highlighter.submit(HighlightJob::snapshot(document));
        generation
    }

    /// Runs an assistant action on `selection`, or on the whole active
    /// document when there is none. The outcome arrives through [`pump`].
    ///
    /// [`pump`]: Editor::pump
    pub fn ask_ai(&mut self, action: AiAction, selection: Option<&str>) -> RequestId {
        let document = self.sessions.active();
        let code = selection.unwrap_or(document.text());
        let prompt = action.prompt(code);
        let context = RequestContext {
            document: document.id(),
            generation: document.generation(),
            title: action.title().to_string(),
            target: action.target(),
            cursor_offset: document.offset_of(self.view.capture().cursor),
        };

        match self.config.active_provider() {
            Ok(provider) => self
                .gateway
                .send(provider, prompt, self.config.ai.timeout(), context),
            Err(e) => self.gateway.reject(e, context),
        }
    }

    /// Feeds one line to the terminal: stdin of the running command, a
    /// built-in, or a new shell command.
    pub fn run_in_terminal(&mut self, input: &str) -> Result<Option<SessionId>, ProcessError> {
        self.terminal.submit(input, &mut self.view)
    }

    pub fn terminate_process(&self) -> bool {
        self.terminal.terminate()
    }

    /// Applies everything background work has posted since the last call.
    /// Call once per UI frame. Returns how many messages were handled.
    pub fn pump(&mut self) -> usize {
        let messages = self.bridge.try_recv_all();
        let count = messages.len();
        for message in messages {
            self.handle_message(message);
        }
        count
    }

    fn handle_message(&mut self, message: UiMessage) {
        match message {
            UiMessage::Highlighted {
                document,
                generation,
                tokens,
            } => self.on_highlighted(document, generation, tokens),
            UiMessage::AiFinished {
                request,
                context,
                outcome,
            } => self.on_ai_finished(request, context, outcome),
            UiMessage::ProcessOutput {
                session,
                stream,
                line,
            } => {
                let line = self.label(session, line);
                self.view.append_output(stream, &line);
            }
            UiMessage::ProcessFailed { session, error } => {
                let line = self.label(session, format!("Error: {}", error));
                self.view.append_output(OutputStream::Stderr, &line);
            }
            UiMessage::ProcessExited { session, code } => {
                let stream = match code {
                    Some(0) => OutputStream::Stdout,
                    _ => OutputStream::Stderr,
                };
                let line = self.label(session, Terminal::exit_report(code));
                self.view.append_output(stream, &line);
            }
        }
    }

    /// Output from a session the terminal has moved on from is tagged with
    /// its id.
    fn label(&self, session: SessionId, line: String) -> String {
        if self.terminal.owns(session) {
            line
        } else {
            format!("[{}] {}", session, line)
        }
    }

    fn on_highlighted(&mut self, id: DocumentId, generation: u64, tokens: Vec<Token>) {
        let Some(document) = self.sessions.get(id) else {
            tracing::debug!("Discarding highlight for closed document {}", id);
            return;
        };
        if id != self.sessions.active_id() {
            tracing::debug!("Discarding highlight for background document {}", id);
            return;
        }
        if document.generation() != generation {
            tracing::debug!(
                "Discarding stale highlight for {} (gen {} != {})",
                id,
                generation,
                document.generation()
            );
            return;
        }
        self.view.apply_highlight(id, &tokens);
    }

    fn on_ai_finished(&mut self, request: RequestId, context: RequestContext, outcome: AiOutcome) {
        let reply = match outcome {
            Ok(reply) => reply,
            Err(e) => {
                self.view
                    .show_error(&format!("{} failed: {}", context.title, e));
                return;
            }
        };

        if context.target == ResultTarget::Panel {
            self.view.show_result(&context.title, &reply);
            return;
        }

        let current = self.sessions.get(context.document).is_some_and(|d| {
            d.id() == self.sessions.active_id() && d.generation() == context.generation
        });
        if !current {
            tracing::debug!(
                "Document {} moved on since {}; showing result instead of inserting",
                context.document,
                request
            );
            self.view.show_result(&context.title, &reply);
            return;
        }

        let insertion = strip_code_fence(&reply);
        let document = self
            .sessions
            .apply_edit(&TextEdit::insert(context.cursor_offset, insertion));
        self.view.apply_content(document);
        self.highlighter.submit(HighlightJob::snapshot(document));
    }
}

impl<V: EditorView> Drop for Editor<V> {
    fn drop(&mut self) {
        self.terminal.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::RecordingView;
    use std::time::Duration;
    use tokio::runtime::Runtime;

    fn editor(rt: &Runtime) -> Editor<RecordingView> {
        let mut config = AppConfig::default();
        config.highlight.debounce_ms = 20;
        Editor::new(rt.handle().clone(), config, RecordingView::default())
    }

    fn pump_for(editor: &mut Editor<RecordingView>, window: Duration) {
        let deadline = std::time::Instant::now() + window;
        while std::time::Instant::now() < deadline {
            editor.pump();
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_initial_document_is_presented() {
        let rt = Runtime::new().unwrap();
        let editor = editor(&rt);
        assert_eq!(editor.view().presented.len(), 1);
        assert_eq!(editor.view().presented[0].0, editor.sessions().active_id());
    }

    #[test]
    fn test_new_document_switches_and_close_keeps_one() {
        let rt = Runtime::new().unwrap();
        let mut editor = editor(&rt);
        let first = editor.sessions().active_id();
        let second = editor.new_document();

        assert_eq!(editor.sessions().active_id(), second);
        editor.close(second).unwrap();
        assert_eq!(editor.sessions().active_id(), first);
        assert_eq!(editor.close(first), Err(SessionError::LastDocument));
    }

    #[test]
    fn test_save_without_path_is_refused() {
        let rt = Runtime::new().unwrap();
        let mut editor = editor(&rt);
        assert!(editor.save_active(None).is_err());
    }

    #[test]
    fn test_save_as_then_reopen_switches_to_existing() {
        let rt = Runtime::new().unwrap();
        let mut editor = editor(&rt);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().canonicalize().unwrap().join("lib.rs");

        editor.edit(TextEdit::insert(0, "pub fn f() {}"));
        let saved = editor.save_active(Some(path.clone())).unwrap();
        assert_eq!(saved, path);
        assert!(!editor.sessions().active().is_dirty());
        assert_eq!(editor.sessions().active().title(), "lib.rs");

        let first = editor.sessions().active_id();
        editor.new_document();
        let reopened = editor.open_file(&path).unwrap();
        assert_eq!(reopened, first);
        assert_eq!(editor.sessions().len(), 2);
    }

    #[test]
    fn test_save_as_with_unnormalized_path_reopens_same_document() {
        let rt = Runtime::new().unwrap();
        let mut editor = editor(&rt);
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let roundabout = dir.path().join("sub").join("..").join("rel.rs");

        editor.edit(TextEdit::insert(0, "fn g() {}"));
        let saved = editor.save_active(Some(roundabout.clone())).unwrap();
        let canonical = dir.path().canonicalize().unwrap().join("rel.rs");
        assert_eq!(saved, canonical);
        assert_eq!(editor.sessions().active().path(), Some(canonical.as_path()));

        let first = editor.sessions().active_id();
        editor.new_document();
        assert_eq!(editor.open_file(&dir.path().join("rel.rs")).unwrap(), first);
        editor.new_document();
        assert_eq!(editor.open_file(&roundabout).unwrap(), first);
        assert_eq!(editor.sessions().len(), 3);
    }

    #[test]
    fn test_reload_discards_unsaved_changes() {
        let rt = Runtime::new().unwrap();
        let mut editor = editor(&rt);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "on disk").unwrap();

        editor.open_file(&path).unwrap();
        let before = editor.sessions().active().generation();
        editor.edit(TextEdit::insert(0, "scratch "));
        assert!(editor.sessions().active().is_dirty());

        editor.reload_active().unwrap();
        let document = editor.sessions().active();
        assert_eq!(document.text(), "on disk");
        assert!(!document.is_dirty());
        assert!(document.generation() > before + 1);
        assert_eq!(editor.view().contents.last().unwrap().1, "on disk");
    }

    #[test]
    fn test_reload_untitled_is_refused() {
        let rt = Runtime::new().unwrap();
        let mut editor = editor(&rt);
        editor.edit(TextEdit::insert(0, "x"));
        assert!(editor.reload_active().is_err());
        assert_eq!(editor.sessions().active().text(), "x");
    }

    #[test]
    fn test_switch_cancels_outgoing_highlight() {
        let rt = Runtime::new().unwrap();
        let mut editor = editor(&rt);
        let first = editor.sessions().active_id();
        editor.edit(TextEdit::insert(0, "let a = 1;"));
        let second = editor.new_document();
        editor.edit(TextEdit::insert(0, "x"));

        pump_for(&mut editor, Duration::from_millis(200));

        let highlighted: Vec<_> = editor.view().highlights.iter().map(|(id, _)| *id).collect();
        assert!(!highlighted.contains(&first));
        assert!(highlighted.contains(&second));
    }
}
