use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

struct Pending {
    ticket: u64,
    timer: JoinHandle<()>,
}

struct Timers<K> {
    pending: HashMap<K, Pending>,
    next_ticket: u64,
}

/// Trailing-edge debouncer keyed by logical stream (one per document).
///
/// Scheduling replaces whatever is pending for the key; the job runs on the
/// blocking pool once `delay` passes without another `schedule` for that key.
/// A timer only fires if its ticket is still the registered one, checked
/// under the same lock `schedule` and `cancel` take, so once either returns
/// the replaced job can no longer run.
pub struct DebounceScheduler<K> {
    runtime: Handle,
    timers: Arc<Mutex<Timers<K>>>,
}

impl<K> DebounceScheduler<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            timers: Arc::new(Mutex::new(Timers {
                pending: HashMap::new(),
                next_ticket: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Timers<K>> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn schedule<F>(&self, key: K, delay: Duration, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut timers = self.lock();
        let ticket = timers.next_ticket;
        timers.next_ticket += 1;
        if let Some(previous) = timers.pending.remove(&key) {
            previous.timer.abort();
        }

        let shared = Arc::clone(&self.timers);
        let fire_key = key.clone();
        let timer = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let current = {
                let mut timers = shared.lock().unwrap_or_else(PoisonError::into_inner);
                match timers.pending.get(&fire_key) {
                    Some(pending) if pending.ticket == ticket => {
                        timers.pending.remove(&fire_key);
                        true
                    }
                    _ => false,
                }
            };
            if !current {
                return;
            }
            if let Err(e) = tokio::task::spawn_blocking(job).await {
                tracing::warn!("Debounced job failed: {}", e);
            }
        });
        timers.pending.insert(key, Pending { ticket, timer });
    }

    /// Drops the pending job for `key`. Returns whether one was pending.
    pub fn cancel(&self, key: &K) -> bool {
        match self.lock().pending.remove(key) {
            Some(pending) => {
                pending.timer.abort();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        for (_, pending) in self.lock().pending.drain() {
            pending.timer.abort();
        }
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.lock().pending.contains_key(key)
    }
}

impl<K> Drop for DebounceScheduler<K> {
    fn drop(&mut self) {
        let mut timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
        for (_, pending) in timers.pending.drain() {
            pending.timer.abort();
        }
    }
}
