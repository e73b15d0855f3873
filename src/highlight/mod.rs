//! Background syntax highlighting.
//!
//! Edits are debounced per document; when a document goes quiet its latest
//! snapshot is tokenized on the blocking pool and the tokens are posted back
//! through the bridge tagged with the snapshot's generation. Whether they
//! still apply is decided on the UI thread.

pub mod debounce;
pub mod tokenizer;

pub use debounce::DebounceScheduler;
pub use tokenizer::{tokenize, Language, Token, TokenKind};

use crate::bridge::UiMessage;
use crate::config::HighlightSettings;
use crate::session::{Document, DocumentId};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;

/// An immutable snapshot of a document handed to a tokenization worker.
#[derive(Debug, Clone)]
pub struct HighlightJob {
    pub document: DocumentId,
    pub generation: u64,
    pub text: Arc<str>,
    pub language_hint: String,
}

impl HighlightJob {
    pub fn snapshot(document: &Document) -> Self {
        Self {
            document: document.id(),
            generation: document.generation(),
            text: Arc::from(document.text()),
            language_hint: document.language_hint(),
        }
    }

    /// Tokenizes the snapshot. Runs off the UI thread.
    pub fn run(&self, max_bytes: usize) -> Vec<Token> {
        let started = Instant::now();
        let tokens = tokenize(&self.text, &self.language_hint, max_bytes);
        tracing::debug!(
            "Tokenized document {} gen {} ({} bytes, {} tokens) in {:.2}ms",
            self.document,
            self.generation,
            self.text.len(),
            tokens.len(),
            started.elapsed().as_secs_f64() * 1000.0
        );
        tokens
    }
}

pub struct Highlighter {
    scheduler: DebounceScheduler<DocumentId>,
    sender: mpsc::Sender<UiMessage>,
    settings: HighlightSettings,
}

impl Highlighter {
    pub fn new(runtime: Handle, sender: mpsc::Sender<UiMessage>, settings: HighlightSettings) -> Self {
        Self {
            scheduler: DebounceScheduler::new(runtime),
            sender,
            settings,
        }
    }

    /// Queues `job` behind the debounce delay, replacing any pending job
    /// for the same document.
    pub fn submit(&self, job: HighlightJob) {
        self.schedule(job, self.settings.debounce());
    }

    /// Queues `job` without waiting for a quiet period (document switches,
    /// loads). It is still replaceable until it starts.
    pub fn submit_now(&self, job: HighlightJob) {
        self.schedule(job, Duration::ZERO);
    }

    fn schedule(&self, job: HighlightJob, delay: Duration) {
        let sender = self.sender.clone();
        let max_bytes = self.settings.max_bytes;
        self.scheduler.schedule(job.document, delay, move || {
            let tokens = job.run(max_bytes);
            // The UI may already be gone during shutdown.
            let _ = sender.send(UiMessage::Highlighted {
                document: job.document,
                generation: job.generation,
                tokens,
            });
        });
    }

    pub fn cancel(&self, document: DocumentId) -> bool {
        self.scheduler.cancel(&document)
    }

    pub fn is_pending(&self, document: DocumentId) -> bool {
        self.scheduler.is_pending(&document)
    }
}
