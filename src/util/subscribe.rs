use std::fmt;

pub type Unsubscribe = Box<dyn FnOnce() + Send + 'static>;

/// Handle returned by every `subscribe`/`listen` style call in the SDK.
///
/// Dropping the handle runs its cleanup exactly once. Call [`Subscription::detach`] to keep
/// the registration alive for the rest of the page session.
#[must_use = "dropping a Subscription immediately removes the registration"]
pub struct Subscription {
    cleanup: Option<Unsubscribe>,
}

impl Subscription {
    /// Creates a subscription with a cleanup callback that runs on drop.
    pub fn new<F>(cleanup: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            cleanup: Some(Box::new(cleanup)),
        }
    }

    /// Returns a subscription that performs no cleanup work.
    pub fn noop() -> Self {
        Self { cleanup: None }
    }

    /// Runs the cleanup now. Equivalent to dropping the handle.
    pub fn unsubscribe(mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }

    /// Forgets the cleanup so the registration outlives this handle.
    pub fn detach(mut self) {
        self.cleanup.take();
    }

    pub fn is_active(&self) -> bool {
        self.cleanup.is_some()
    }
}

impl Default for Subscription {
    fn default() -> Self {
        Self::noop()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn cleanup_runs_once_on_drop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let subscription = Subscription::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        drop(subscription);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn detach_skips_cleanup() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        Subscription::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .detach();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
