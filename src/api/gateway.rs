//! Issues generative requests off the UI thread and reports each one exactly once.
//!
//! A request is `Pending` until the first of its backend call or its timer
//! settles it in the [`RequestLedger`]. Only that first settlement is posted
//! to the UI; a reply that arrives after the timer fired is logged and
//! dropped. Timeouts are soft: the backend call is left to finish on its own.

use crate::api::prompts::ResultTarget;
use crate::api::{create_provider, AiProvider, ApiError, Message};
use crate::bridge::UiMessage;
use crate::config::ProviderConfig;
use crate::constants::{AI_SETTLED_HISTORY, AI_SYSTEM_PROMPT};
use crate::session::DocumentId;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Pending,
    Completed,
    Failed,
    TimedOut,
}

impl RequestState {
    fn of(outcome: &AiOutcome) -> Self {
        match outcome {
            Ok(_) => RequestState::Completed,
            Err(ApiError::Timeout(_)) => RequestState::TimedOut,
            Err(_) => RequestState::Failed,
        }
    }
}

/// The terminal result of a request: the reply text or why there is none.
pub type AiOutcome = Result<String, ApiError>;

/// What the request was about, carried back to the UI with its outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestContext {
    pub document: DocumentId,
    /// Document generation when the request was issued.
    pub generation: u64,
    pub title: String,
    pub target: ResultTarget,
    /// Byte offset of the cursor when the request was issued.
    pub cursor_offset: usize,
}

#[derive(Debug, Default)]
struct LedgerEntries {
    states: HashMap<RequestId, RequestState>,
    /// Settled ids, oldest first.
    settled: VecDeque<RequestId>,
}

/// Lifecycle of the requests issued by a gateway. Pending requests are
/// always tracked; only the most recent `history` settled ones are kept.
#[derive(Debug)]
pub struct RequestLedger {
    entries: Mutex<LedgerEntries>,
    history: usize,
}

impl Default for RequestLedger {
    fn default() -> Self {
        Self::with_history(AI_SETTLED_HISTORY)
    }
}

impl RequestLedger {
    pub fn with_history(history: usize) -> Self {
        Self {
            entries: Mutex::new(LedgerEntries::default()),
            history,
        }
    }

    fn open(&self, id: RequestId) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .states
            .insert(id, RequestState::Pending);
    }

    /// Moves a pending request to the outcome's terminal state.
    /// Returns false if the request had already settled.
    fn settle(&self, id: RequestId, outcome: &AiOutcome) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.states.get_mut(&id) {
            Some(state @ RequestState::Pending) => *state = RequestState::of(outcome),
            _ => return false,
        }
        entries.settled.push_back(id);
        while entries.settled.len() > self.history {
            if let Some(oldest) = entries.settled.pop_front() {
                entries.states.remove(&oldest);
            }
        }
        true
    }

    /// `None` for unknown ids and for settled ids that aged out.
    pub fn state(&self, id: RequestId) -> Option<RequestState> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .states
            .get(&id)
            .copied()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .states
            .len()
    }
}

/// Builds a backend from its configuration entry.
pub type ProviderFactory =
    dyn Fn(&ProviderConfig) -> Result<Arc<dyn AiProvider>, ApiError> + Send + Sync;

pub struct AsyncRequestGateway {
    runtime: Handle,
    sender: mpsc::Sender<UiMessage>,
    ledger: Arc<RequestLedger>,
    next_id: AtomicU64,
    factory: Box<ProviderFactory>,
}

impl AsyncRequestGateway {
    pub fn new(runtime: Handle, sender: mpsc::Sender<UiMessage>) -> Self {
        Self::with_factory(runtime, sender, Box::new(create_provider))
    }

    /// A gateway resolving backends through `factory` instead of the built-ins.
    pub fn with_factory(
        runtime: Handle,
        sender: mpsc::Sender<UiMessage>,
        factory: Box<ProviderFactory>,
    ) -> Self {
        Self {
            runtime,
            sender,
            ledger: Arc::new(RequestLedger::default()),
            next_id: AtomicU64::new(1),
            factory,
        }
    }

    pub fn state(&self, id: RequestId) -> Option<RequestState> {
        self.ledger.state(id)
    }

    /// Settles a request that could not be issued at all (no usable
    /// provider). The error is still delivered through the bridge once.
    pub fn reject(&self, error: ApiError, context: RequestContext) -> RequestId {
        let id = RequestId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.ledger.open(id);
        tracing::warn!("Request {} not sent: {}", id, error);
        settle(&self.ledger, &self.sender, id, context, Err(error));
        id
    }

    /// Issues a single attempt of `prompt` against `provider`.
    ///
    /// Configuration and backend resolution are checked here, before anything
    /// is spawned; failing either settles the request immediately. The outcome
    /// arrives as one [`UiMessage::AiFinished`].
    pub fn send(
        &self,
        provider: &ProviderConfig,
        prompt: String,
        timeout: Duration,
        context: RequestContext,
    ) -> RequestId {
        let id = RequestId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.ledger.open(id);

        let backend = match provider.validate().and_then(|()| (self.factory)(provider)) {
            Ok(backend) => backend,
            Err(e) => {
                tracing::warn!("Request {} not sent: {}", id, e);
                settle(&self.ledger, &self.sender, id, context, Err(e));
                return id;
            }
        };

        let system = provider
            .system_prompt
            .clone()
            .unwrap_or_else(|| AI_SYSTEM_PROMPT.to_string());
        let messages = vec![Message::system(system), Message::user(prompt)];

        let timer = self.runtime.spawn({
            let ledger = Arc::clone(&self.ledger);
            let sender = self.sender.clone();
            let context = context.clone();
            async move {
                tokio::time::sleep(timeout).await;
                if settle(&ledger, &sender, id, context, Err(ApiError::Timeout(timeout))) {
                    tracing::warn!("Request {} timed out after {:?}", id, timeout);
                }
            }
        });
        let timer = timer.abort_handle();

        let ledger = Arc::clone(&self.ledger);
        let sender = self.sender.clone();
        let runtime = self.runtime.clone();
        self.runtime.spawn(async move {
            let started = Instant::now();
            let name = backend.name().to_string();
            tracing::debug!("Request {} sent to {}", id, name);
            // A panicking backend only ends its own task.
            let call = runtime.spawn(async move { backend.complete(messages).await });
            let outcome = match call.await {
                Ok(outcome) => outcome,
                Err(e) => Err(ApiError::Response(format!("{} backend crashed: {}", name, e))),
            };
            match &outcome {
                Ok(reply) => tracing::info!(
                    "Request {} answered by {} in {:.2}s ({} chars)",
                    id,
                    name,
                    started.elapsed().as_secs_f64(),
                    reply.len()
                ),
                Err(e) => tracing::error!("Request {} failed: {}", id, e),
            }
            timer.abort();
            settle(&ledger, &sender, id, context, outcome);
        });

        id
    }
}

fn settle(
    ledger: &RequestLedger,
    sender: &mpsc::Sender<UiMessage>,
    request: RequestId,
    context: RequestContext,
    outcome: AiOutcome,
) -> bool {
    if !ledger.settle(request, &outcome) {
        tracing::debug!("Dropping late outcome for request {}", request);
        return false;
    }
    let _ = sender.send(UiMessage::AiFinished {
        request,
        context,
        outcome,
    });
    true
}
