//! Open documents and the single shared editing surface they take turns on.
//!
//! The manager is an explicit value handed to whoever needs the current
//! document; there is no global "active buffer". Every edit bumps the
//! document's generation, which background results are checked against.

use crate::constants::UNTITLED_TITLE;
use crate::view::EditorView;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(pub u64);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Zero-based line and column (columns count chars, not bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CursorPosition {
    pub line: usize,
    pub column: usize,
}

impl CursorPosition {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// What the editing surface shows besides the text itself.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ViewState {
    pub cursor: CursorPosition,
    /// Vertical scroll position as a fraction of the document (0.0 = top).
    pub scroll: f64,
}

/// A raw edit reported by the editing surface, in byte offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    pub offset: usize,
    pub deleted_len: usize,
    pub inserted: String,
}

impl TextEdit {
    pub fn insert(offset: usize, text: impl Into<String>) -> Self {
        Self {
            offset,
            deleted_len: 0,
            inserted: text.into(),
        }
    }

    pub fn delete(offset: usize, len: usize) -> Self {
        Self {
            offset,
            deleted_len: len,
            inserted: String::new(),
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SessionError {
    #[error("cannot close the last remaining document")]
    LastDocument,
    #[error("no open document with id {0}")]
    UnknownDocument(DocumentId),
}

#[derive(Debug, Clone)]
pub struct Document {
    id: DocumentId,
    path: Option<PathBuf>,
    text: String,
    dirty: bool,
    view: ViewState,
    generation: u64,
}

impl Document {
    fn new(id: DocumentId, path: Option<PathBuf>, text: String) -> Self {
        Self {
            id,
            path,
            text,
            dirty: false,
            view: ViewState::default(),
            generation: 0,
        }
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Cursor and scroll as saved when the document last left the surface.
    pub fn view_state(&self) -> ViewState {
        self.view
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Tab title: the file name (or "Untitled"), marked with `*` when modified.
    pub fn title(&self) -> String {
        match self.path.as_deref().and_then(Path::file_name) {
            Some(name) => {
                let marker = if self.dirty { "*" } else { "" };
                format!("{}{}", marker, name.to_string_lossy())
            }
            None if self.dirty => format!("{}*", UNTITLED_TITLE),
            None => UNTITLED_TITLE.to_string(),
        }
    }

    /// What the tokenizer should treat this document as.
    pub fn language_hint(&self) -> String {
        self.path
            .as_deref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Byte offset of a cursor position, clamped to the document.
    pub fn offset_of(&self, cursor: CursorPosition) -> usize {
        let mut line_start = 0;
        for _ in 0..cursor.line {
            match self.text[line_start..].find('\n') {
                Some(nl) => line_start += nl + 1,
                None => return self.text.len(),
            }
        }
        let line_end = self.text[line_start..]
            .find('\n')
            .map_or(self.text.len(), |nl| line_start + nl);
        self.text[line_start..line_end]
            .char_indices()
            .nth(cursor.column)
            .map_or(line_end, |(i, _)| line_start + i)
    }

    fn apply(&mut self, edit: &TextEdit) {
        let start = floor_char_boundary(&self.text, edit.offset);
        let end = floor_char_boundary(&self.text, start.saturating_add(edit.deleted_len));
        self.text.replace_range(start..end, &edit.inserted);
        self.touch();
        self.dirty = true;
    }

    fn touch(&mut self) {
        self.generation += 1;
    }
}

fn floor_char_boundary(text: &str, index: usize) -> usize {
    let mut index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Owns the open documents and which one is bound to the editing surface.
#[derive(Debug)]
pub struct DocumentSessionManager {
    documents: Vec<Document>,
    active: usize,
    next_id: u64,
}

impl Default for DocumentSessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentSessionManager {
    /// Starts with a single empty untitled document, active.
    pub fn new() -> Self {
        Self {
            documents: vec![Document::new(DocumentId(1), None, String::new())],
            active: 0,
            next_id: 2,
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Always false; at least one document exists.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn ids(&self) -> Vec<DocumentId> {
        self.documents.iter().map(Document::id).collect()
    }

    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.documents.iter()
    }

    pub fn active(&self) -> &Document {
        &self.documents[self.active]
    }

    pub fn active_id(&self) -> DocumentId {
        self.active().id
    }

    pub fn get(&self, id: DocumentId) -> Option<&Document> {
        self.documents.iter().find(|d| d.id == id)
    }

    fn index_of(&self, id: DocumentId) -> Result<usize, SessionError> {
        self.documents
            .iter()
            .position(|d| d.id == id)
            .ok_or(SessionError::UnknownDocument(id))
    }

    /// Opens a document without switching to it.
    pub fn new_document(&mut self, path: Option<PathBuf>, text: String) -> DocumentId {
        let id = DocumentId(self.next_id);
        self.next_id += 1;
        self.documents.push(Document::new(id, path, text));
        tracing::debug!("Opened document {}", id);
        id
    }

    /// Binds `id` to the editing surface.
    ///
    /// The outgoing document keeps the surface's cursor and scroll; the
    /// incoming one is presented with whatever it saved when it left.
    pub fn switch_to(
        &mut self,
        id: DocumentId,
        view: &mut dyn EditorView,
    ) -> Result<(), SessionError> {
        let index = self.index_of(id)?;
        if index == self.active {
            return Ok(());
        }
        self.documents[self.active].view = view.capture();
        self.active = index;
        view.present(&self.documents[index]);
        tracing::debug!("Switched to document {}", id);
        Ok(())
    }

    /// Closes a document. The last remaining document cannot be closed.
    pub fn close(&mut self, id: DocumentId, view: &mut dyn EditorView) -> Result<(), SessionError> {
        let index = self.index_of(id)?;
        if self.documents.len() <= 1 {
            return Err(SessionError::LastDocument);
        }
        self.documents.remove(index);
        if index == self.active {
            self.active = index.min(self.documents.len() - 1);
            view.present(&self.documents[self.active]);
        } else if index < self.active {
            self.active -= 1;
        }
        tracing::debug!("Closed document {}", id);
        Ok(())
    }

    /// Applies a surface edit to the active document and bumps its generation.
    pub fn apply_edit(&mut self, edit: &TextEdit) -> &Document {
        let document = &mut self.documents[self.active];
        document.apply(edit);
        document
    }

    /// Replaces a document's contents wholesale (reload from disk).
    pub fn replace_text(&mut self, id: DocumentId, text: String) -> Result<(), SessionError> {
        let index = self.index_of(id)?;
        let document = &mut self.documents[index];
        document.text = text;
        document.dirty = false;
        document.touch();
        Ok(())
    }

    /// Records a successful save, adopting `path` as the backing file.
    pub fn mark_saved(&mut self, id: DocumentId, path: PathBuf) -> Result<(), SessionError> {
        let index = self.index_of(id)?;
        let document = &mut self.documents[index];
        document.path = Some(path);
        document.dirty = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::RecordingView;

    #[test]
    fn test_starts_with_one_untitled_document() {
        let manager = DocumentSessionManager::new();
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.active().title(), "Untitled");
        assert_eq!(manager.active().generation(), 0);
    }

    #[test]
    fn test_closing_last_document_is_rejected() {
        let mut manager = DocumentSessionManager::new();
        let mut view = RecordingView::default();
        let only = manager.active_id();
        assert_eq!(manager.close(only, &mut view), Err(SessionError::LastDocument));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_switch_round_trip_restores_view_state() {
        let mut manager = DocumentSessionManager::new();
        let mut view = RecordingView::default();
        let a = manager.active_id();
        let b = manager.new_document(None, "second".to_string());

        view.state = ViewState {
            cursor: CursorPosition::new(4, 2),
            scroll: 0.25,
        };
        manager.switch_to(b, &mut view).unwrap();
        assert_eq!(view.presented.last(), Some(&(b, "second".to_string())));

        view.state = ViewState {
            cursor: CursorPosition::new(0, 1),
            scroll: 0.9,
        };
        manager.switch_to(a, &mut view).unwrap();

        assert_eq!(manager.active_id(), a);
        assert_eq!(view.state.cursor, CursorPosition::new(4, 2));
        assert_eq!(view.state.scroll, 0.25);
        assert_eq!(manager.get(b).unwrap().view_state().scroll, 0.9);
    }

    #[test]
    fn test_switch_to_unknown_document_changes_nothing() {
        let mut manager = DocumentSessionManager::new();
        let mut view = RecordingView::default();
        let err = manager.switch_to(DocumentId(99), &mut view).unwrap_err();
        assert_eq!(err, SessionError::UnknownDocument(DocumentId(99)));
        assert!(view.presented.is_empty());
    }

    #[test]
    fn test_edits_bump_generation_and_dirty() {
        let mut manager = DocumentSessionManager::new();
        manager.apply_edit(&TextEdit::insert(0, "hello"));
        let doc = manager.apply_edit(&TextEdit::insert(5, " world"));
        assert_eq!(doc.text(), "hello world");
        assert_eq!(doc.generation(), 2);
        assert!(doc.is_dirty());
        assert_eq!(doc.title(), "Untitled*");

        let doc = manager.apply_edit(&TextEdit::delete(0, 6));
        assert_eq!(doc.text(), "world");
        assert_eq!(doc.generation(), 3);
    }

    #[test]
    fn test_edit_offsets_are_clamped_to_char_boundaries() {
        let mut manager = DocumentSessionManager::new();
        manager.apply_edit(&TextEdit::insert(0, "héllo"));
        // Offset 2 is inside the two-byte 'é'.
        let doc = manager.apply_edit(&TextEdit::insert(2, "X"));
        assert_eq!(doc.text(), "hXéllo");
        let doc = manager.apply_edit(&TextEdit::insert(1000, "!"));
        assert_eq!(doc.text(), "hXéllo!");
        let doc = manager.apply_edit(&TextEdit::delete(5, 1000));
        assert_eq!(doc.text(), "hXél");
    }

    #[test]
    fn test_closing_active_presents_neighbor() {
        let mut manager = DocumentSessionManager::new();
        let mut view = RecordingView::default();
        let a = manager.active_id();
        let b = manager.new_document(None, "b".to_string());
        let c = manager.new_document(None, "c".to_string());

        manager.switch_to(c, &mut view).unwrap();
        manager.close(c, &mut view).unwrap();
        assert_eq!(manager.active_id(), b);
        assert_eq!(view.presented.last().map(|(id, _)| *id), Some(b));

        manager.close(a, &mut view).unwrap();
        assert_eq!(manager.active_id(), b);
        assert_eq!(manager.ids(), vec![b]);
    }

    #[test]
    fn test_title_uses_file_name() {
        let mut manager = DocumentSessionManager::new();
        let id = manager.new_document(Some(PathBuf::from("/path/to/test.py")), String::new());
        assert_eq!(manager.get(id).unwrap().title(), "test.py");
        assert_eq!(manager.get(id).unwrap().language_hint(), "/path/to/test.py");

        let mut view = RecordingView::default();
        manager.switch_to(id, &mut view).unwrap();
        manager.apply_edit(&TextEdit::insert(0, "x"));
        assert_eq!(manager.active().title(), "*test.py");

        manager.mark_saved(id, PathBuf::from("/path/to/other.py")).unwrap();
        assert_eq!(manager.active().title(), "other.py");
    }

    #[test]
    fn test_replace_text_is_clean_but_new_generation() {
        let mut manager = DocumentSessionManager::new();
        let id = manager.active_id();
        manager.apply_edit(&TextEdit::insert(0, "draft"));
        manager.replace_text(id, "from disk".to_string()).unwrap();
        let doc = manager.active();
        assert_eq!(doc.text(), "from disk");
        assert!(!doc.is_dirty());
        assert_eq!(doc.generation(), 2);
    }

    #[test]
    fn test_offset_of_cursor() {
        let mut manager = DocumentSessionManager::new();
        let doc = manager.apply_edit(&TextEdit::insert(0, "ab\nçd\nlast"));
        assert_eq!(doc.offset_of(CursorPosition::new(0, 1)), 1);
        assert_eq!(doc.offset_of(CursorPosition::new(1, 1)), 5);
        assert_eq!(doc.offset_of(CursorPosition::new(1, 10)), 6);
        assert_eq!(doc.offset_of(CursorPosition::new(2, 4)), 11);
        assert_eq!(doc.offset_of(CursorPosition::new(9, 0)), 11);
    }
}
