//! The editing surface as seen by the core.
//!
//! Rendering is someone else's job; the core only needs to read the live
//! cursor/scroll and to push content, highlights, output and messages.

use crate::highlight::Token;
use crate::process::OutputStream;
use crate::session::{Document, DocumentId, ViewState};

pub trait EditorView {
    /// Live cursor and scroll of whatever document is on the surface.
    fn capture(&self) -> ViewState;
    /// Binds a document's text and saved view state to the surface.
    fn present(&mut self, document: &Document);
    /// Refreshes the text of the bound document after the core changed it,
    /// keeping the live cursor and scroll.
    fn apply_content(&mut self, document: &Document);
    fn apply_highlight(&mut self, document: DocumentId, tokens: &[Token]);
    fn append_output(&mut self, stream: OutputStream, line: &str);
    fn clear_output(&mut self);
    fn show_result(&mut self, title: &str, text: &str);
    fn show_error(&mut self, message: &str);
}

/// Headless surface that records every call. Used by tests and scripting.
#[derive(Debug, Default)]
pub struct RecordingView {
    pub state: ViewState,
    /// `(document, text)` for every `present` call.
    pub presented: Vec<(DocumentId, String)>,
    /// `(document, text)` for every `apply_content` call.
    pub contents: Vec<(DocumentId, String)>,
    pub highlights: Vec<(DocumentId, Vec<Token>)>,
    pub output: Vec<(OutputStream, String)>,
    pub results: Vec<(String, String)>,
    pub errors: Vec<String>,
}

impl RecordingView {
    /// Number of user-facing outcomes (results, errors, insertions) so far.
    pub fn feedback_count(&self) -> usize {
        self.results.len() + self.errors.len() + self.contents.len()
    }
}

impl EditorView for RecordingView {
    fn capture(&self) -> ViewState {
        self.state
    }

    fn present(&mut self, document: &Document) {
        self.state = document.view_state();
        self.presented
            .push((document.id(), document.text().to_string()));
    }

    fn apply_content(&mut self, document: &Document) {
        self.contents
            .push((document.id(), document.text().to_string()));
    }

    fn apply_highlight(&mut self, document: DocumentId, tokens: &[Token]) {
        self.highlights.push((document, tokens.to_vec()));
    }

    fn append_output(&mut self, stream: OutputStream, line: &str) {
        self.output.push((stream, line.to_string()));
    }

    fn clear_output(&mut self) {
        self.output.clear();
    }

    fn show_result(&mut self, title: &str, text: &str) {
        self.results.push((title.to_string(), text.to_string()));
    }

    fn show_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }
}
