//! Async bridge: the one-way channel from background work to the UI thread.
//!
//! Workers (tokenization jobs, generative requests, process supervisors) run
//! on the tokio runtime and only ever *send* a [`UiMessage`]. The UI thread
//! drains the channel between frames and is the only place state is mutated.

use crate::api::gateway::{AiOutcome, RequestContext, RequestId};
use crate::highlight::Token;
use crate::process::{OutputStream, SessionId};
use crate::session::DocumentId;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Messages sent from background tasks to the synchronous UI loop.
#[derive(Debug)]
pub enum UiMessage {
    /// A tokenization job finished for the given document state.
    Highlighted {
        document: DocumentId,
        /// Generation of the snapshot that was tokenized.
        generation: u64,
        tokens: Vec<Token>,
    },

    /// A generative request reached its terminal outcome. Sent once per request.
    AiFinished {
        request: RequestId,
        context: RequestContext,
        outcome: AiOutcome,
    },

    /// One line of child output, without its line terminator.
    ProcessOutput {
        session: SessionId,
        stream: OutputStream,
        line: String,
    },

    /// The child could not be started; no exit report follows.
    ProcessFailed { session: SessionId, error: String },

    /// The child exited and its output has been drained.
    /// `code` is `None` when it was ended by a signal.
    ProcessExited {
        session: SessionId,
        code: Option<i32>,
    },
}

#[derive(Clone)]
pub struct AsyncBridge {
    sender: mpsc::Sender<UiMessage>,
    // Receiver wrapped in Arc<Mutex<>> to allow cloning
    receiver: Arc<Mutex<mpsc::Receiver<UiMessage>>>,
}

impl AsyncBridge {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
        }
    }

    /// A sender for a background task. Cheap to clone.
    pub fn sender(&self) -> mpsc::Sender<UiMessage> {
        self.sender.clone()
    }

    /// Drains every pending message without blocking, in send order.
    pub fn try_recv_all(&self) -> Vec<UiMessage> {
        let receiver = self.receiver.lock().unwrap_or_else(PoisonError::into_inner);
        receiver.try_iter().collect()
    }

    /// Waits up to `timeout` for the next message.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<UiMessage> {
        let receiver = self.receiver.lock().unwrap_or_else(PoisonError::into_inner);
        receiver.recv_timeout(timeout).ok()
    }
}

impl Default for AsyncBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exited(session: u64, code: i32) -> UiMessage {
        UiMessage::ProcessExited {
            session: SessionId(session),
            code: Some(code),
        }
    }

    #[test]
    fn test_bridge_preserves_send_order() {
        let bridge = AsyncBridge::new();
        let sender = bridge.sender();
        sender.send(exited(1, 0)).unwrap();
        sender.send(exited(2, 1)).unwrap();

        let messages = bridge.try_recv_all();
        assert_eq!(messages.len(), 2);
        match &messages[0] {
            UiMessage::ProcessExited { session, code } => {
                assert_eq!(*session, SessionId(1));
                assert_eq!(*code, Some(0));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_bridge_no_messages() {
        let bridge = AsyncBridge::new();
        assert!(bridge.try_recv_all().is_empty());
        assert!(bridge.recv_timeout(Duration::from_millis(5)).is_none());
    }

    #[test]
    fn test_bridge_accepts_sends_from_other_threads() {
        let bridge = AsyncBridge::new();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let sender = bridge.sender();
                std::thread::spawn(move || sender.send(exited(i, 0)).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(bridge.try_recv_all().len(), 4);
    }
}
