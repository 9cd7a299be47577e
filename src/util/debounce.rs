use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::platform::runtime::{sleep, spawn_detached};

type DebouncedFn<T> = Arc<dyn Fn(T) + Send + Sync + 'static>;

/// Collapses bursts of calls into one invocation `delay` after the last call.
///
/// With [`Debouncer::leading`] the first call of a burst runs synchronously; later calls
/// inside the burst are dropped and only push the end of the window back.
pub struct Debouncer<T> {
    callback: DebouncedFn<T>,
    delay: Duration,
    run_immediately: bool,
    generation: Arc<AtomicU64>,
    pending: Arc<Mutex<Option<u64>>>,
}

impl<T> Clone for Debouncer<T> {
    fn clone(&self) -> Self {
        Self {
            callback: Arc::clone(&self.callback),
            delay: self.delay,
            run_immediately: self.run_immediately,
            generation: Arc::clone(&self.generation),
            pending: Arc::clone(&self.pending),
        }
    }
}

impl<T> Debouncer<T>
where
    T: Send + 'static,
{
    pub fn new<F>(delay: Duration, callback: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(callback),
            delay,
            run_immediately: false,
            generation: Arc::new(AtomicU64::new(0)),
            pending: Arc::new(Mutex::new(None)),
        }
    }

    pub fn leading(mut self) -> Self {
        self.run_immediately = true;
        self
    }

    pub fn call(&self, args: T) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let run_now = {
            let mut pending = self.pending.lock().unwrap();
            let idle = pending.is_none();
            *pending = Some(generation);
            self.run_immediately && idle
        };

        // Leading mode never fires on the trailing edge; the timer only closes the burst.
        let trailing_args = if self.run_immediately {
            if run_now {
                (self.callback)(args);
            }
            None
        } else {
            Some(args)
        };

        let callback = Arc::clone(&self.callback);
        let latest = Arc::clone(&self.generation);
        let pending = Arc::clone(&self.pending);
        let delay = self.delay;
        spawn_detached(async move {
            sleep(delay).await;
            if latest.load(Ordering::SeqCst) != generation {
                return;
            }
            {
                let mut pending = pending.lock().unwrap();
                if *pending != Some(generation) {
                    return;
                }
                pending.take();
            }
            if let Some(args) = trailing_args {
                callback(args);
            }
        });
    }

    /// Drops any pending trailing call.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.pending.lock().unwrap().take();
    }

    pub fn is_pending(&self) -> bool {
        self.pending.lock().unwrap().is_some()
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<u32>>>, impl Fn(u32) + Send + Sync + 'static) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        (calls, move |value| sink.lock().unwrap().push(value))
    }

    #[tokio::test(start_paused = true)]
    async fn trailing_call_uses_last_arguments() {
        let (calls, callback) = recorder();
        let debouncer = Debouncer::new(Duration::from_millis(200), callback);

        debouncer.call(1);
        debouncer.call(2);
        tokio::time::sleep(Duration::from_millis(100)).await;
        debouncer.call(3);
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(calls.lock().unwrap().as_slice(), &[3]);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn leading_mode_runs_first_call_only() {
        let (calls, callback) = recorder();
        let debouncer = Debouncer::new(Duration::from_millis(200), callback).leading();

        debouncer.call(1);
        debouncer.call(2);
        tokio::time::sleep(Duration::from_millis(250)).await;
        debouncer.call(3);

        assert_eq!(calls.lock().unwrap().as_slice(), &[1, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn leading_mode_drops_calls_inside_the_window() {
        let (calls, callback) = recorder();
        let debouncer = Debouncer::new(Duration::from_millis(200), callback).leading();

        debouncer.call(1);
        tokio::time::sleep(Duration::from_millis(150)).await;
        debouncer.call(2);
        tokio::time::sleep(Duration::from_millis(150)).await;
        debouncer.call(3);
        assert!(debouncer.is_pending());
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(calls.lock().unwrap().as_slice(), &[1]);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_drops_pending_call() {
        let (calls, callback) = recorder();
        let debouncer = Debouncer::new(Duration::from_millis(200), callback);

        debouncer.call(1);
        debouncer.cancel();
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert!(calls.lock().unwrap().is_empty());
    }
}
