use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use log::debug;
use tokio::task::AbortHandle;

use crate::error::Result;

struct DeferredState<T> {
    /// `Some(None)` once the task ended with an error
    outcome: OnceLock<Option<T>>,
    cancelled: AtomicBool,
    abort: Mutex<Option<AbortHandle>>,
}

impl<T> DeferredState<T> {
    fn new() -> Self {
        Self {
            outcome: OnceLock::new(),
            cancelled: AtomicBool::new(false),
            abort: Mutex::new(None),
        }
    }
}

/// Handle to a fire-and-forget background computation.
///
/// The only way to read the value is [`Deferred::peek`], which never waits:
/// a task that is still running, was cancelled or failed reads as absent.
pub struct Deferred<T> {
    state: Arc<DeferredState<T>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> std::fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deferred")
            .field("finished", &self.is_finished())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl<T: Send + Sync + 'static> Deferred<T> {
    /// Spawns `future` on the current tokio runtime and returns immediately.
    pub fn spawn<F>(what: &str, future: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let state = Arc::new(DeferredState::new());
        let task_state = Arc::clone(&state);
        let what = what.to_string();

        let handle = tokio::spawn(async move {
            let outcome = match future.await {
                Ok(value) => Some(value),
                Err(e) => {
                    debug!("Background task '{what}' failed: {e}");
                    None
                }
            };
            let _ = task_state.outcome.set(outcome);
        });

        *state.abort.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle.abort_handle());

        Self { state }
    }
}

impl<T> Deferred<T> {
    /// Already completed handle.
    pub fn ready(value: T) -> Self {
        let state = DeferredState::new();
        let _ = state.outcome.set(Some(value));
        Self {
            state: Arc::new(state),
        }
    }

    /// Finished-or-absent view of the result.
    pub fn peek(&self) -> Option<&T> {
        if self.is_cancelled() {
            return None;
        }

        self.state.outcome.get().and_then(Option::as_ref)
    }

    pub fn is_finished(&self) -> bool {
        self.is_cancelled() || self.state.outcome.get().is_some()
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }

    /// Cancels a task that has not completed yet. Returns `false` when the
    /// task had already finished.
    pub fn cancel(&self) -> bool {
        if self.state.outcome.get().is_some() {
            return false;
        }

        self.state.cancelled.store(true, Ordering::Release);

        if let Some(handle) = self
            .state
            .abort
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }

        true
    }
}
