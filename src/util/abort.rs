//! Cancellation tokens shaped after the DOM `AbortController` / `AbortSignal` pair.
//!
//! Every long-lived wait in the SDK accepts an optional [`AbortSignal`]. Aborting is
//! idempotent and runs the registered listeners once, outside of the internal lock, so a
//! listener may register or remove other listeners while it runs.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::util::subscribe::Subscription;

type AbortListener = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct AbortState {
    aborted: bool,
    next_id: u64,
    listeners: Vec<(u64, AbortListener)>,
}

/// Owner side of a cancellation token.
#[derive(Clone, Default)]
pub struct AbortController {
    signal: AbortSignal,
}

impl AbortController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) -> AbortSignal {
        self.signal.clone()
    }

    /// Aborts the signal. Subsequent calls are no-ops.
    pub fn abort(&self) {
        let listeners = {
            let mut state = self.signal.inner.lock().unwrap();
            if state.aborted {
                return;
            }
            state.aborted = true;
            std::mem::take(&mut state.listeners)
        };

        for (_, listener) in listeners {
            listener();
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.signal.is_aborted()
    }
}

impl fmt::Debug for AbortController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortController")
            .field("aborted", &self.is_aborted())
            .finish()
    }
}

/// Observer side of a cancellation token. Cheap to clone.
#[derive(Clone, Default)]
pub struct AbortSignal {
    inner: Arc<Mutex<AbortState>>,
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        self.inner.lock().unwrap().aborted
    }

    /// Registers `listener` to run when the signal aborts.
    ///
    /// Like the DOM `abort` event, nothing fires for a signal that is already aborted;
    /// callers check [`AbortSignal::is_aborted`] first. Dropping the returned
    /// subscription removes the listener.
    pub fn on_abort<F>(&self, listener: F) -> Subscription
    where
        F: FnOnce() + Send + 'static,
    {
        let id = {
            let mut state = self.inner.lock().unwrap();
            if state.aborted {
                return Subscription::noop();
            }
            state.next_id += 1;
            let id = state.next_id;
            state.listeners.push((id, Box::new(listener)));
            id
        };

        let state = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(state) = state.upgrade() {
                if let Ok(mut guard) = state.lock() {
                    guard.listeners.retain(|(listener_id, _)| *listener_id != id);
                }
            }
        })
    }

    pub fn listener_count(&self) -> usize {
        self.inner.lock().unwrap().listeners.len()
    }
}

impl fmt::Debug for AbortSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortSignal")
            .field("aborted", &self.is_aborted())
            .finish()
    }
}
