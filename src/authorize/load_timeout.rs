use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use crate::element::events::HostEventEmitter;
use crate::platform::runtime::{sleep, spawn_detached};

pub const TIMEOUT_ERROR_CODE: &str = "temporarily_unavailable";
pub const TIMEOUT_ERROR_MESSAGE: &str = "Shop login is temporarily unavailable";

/// Fires an `error` host event when the authorization frame does not report `loaded` in
/// time.
#[derive(Clone)]
pub struct LoadTimeout {
    emitter: HostEventEmitter,
    delay: Duration,
    generation: Arc<AtomicU64>,
    armed: Arc<Mutex<Option<u64>>>,
}

impl LoadTimeout {
    pub fn new(emitter: HostEventEmitter, delay: Duration) -> Self {
        Self {
            emitter,
            delay,
            generation: Arc::new(AtomicU64::new(0)),
            armed: Arc::new(Mutex::new(None)),
        }
    }

    /// Arms the timer, replacing any timer already running.
    pub fn start(&self) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.armed.lock().unwrap() = Some(generation);

        let armed = Arc::clone(&self.armed);
        let emitter = self.emitter.clone();
        let delay = self.delay;
        spawn_detached(async move {
            sleep(delay).await;
            let fire = {
                let mut armed = armed.lock().unwrap();
                if *armed == Some(generation) {
                    armed.take();
                    true
                } else {
                    false
                }
            };
            if fire {
                emitter.emit(
                    "error",
                    Some(json!({
                        "message": TIMEOUT_ERROR_MESSAGE,
                        "code": TIMEOUT_ERROR_CODE,
                    })),
                    false,
                );
            }
        });
    }

    pub fn clear(&self) {
        self.armed.lock().unwrap().take();
    }

    pub fn is_pending(&self) -> bool {
        self.armed.lock().unwrap().is_some()
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::diagnostics::RecordingReporter;
    use crate::platform::memory::MemoryElement;

    fn timeout() -> (LoadTimeout, Arc<MemoryElement>) {
        let element = MemoryElement::new();
        let emitter = HostEventEmitter::with_element(element.clone(), RecordingReporter::new());
        (LoadTimeout::new(emitter, Duration::from_secs(10)), element)
    }

    #[tokio::test(start_paused = true)]
    async fn fires_error_after_delay() {
        let (timeout, element) = timeout();
        timeout.start();

        tokio::time::sleep(Duration::from_millis(9_999)).await;
        assert!(element.events().is_empty());

        tokio::time::sleep(Duration::from_millis(2)).await;
        let events = element.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "error");
        assert!(!events[0].bubbles);
        assert_eq!(
            events[0].detail.as_ref().unwrap()["code"],
            "temporarily_unavailable"
        );
        assert!(!timeout.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn clear_prevents_firing() {
        let (timeout, element) = timeout();
        timeout.start();
        timeout.clear();
        timeout.clear();

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(element.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_replaces_previous_timer() {
        let (timeout, element) = timeout();
        timeout.start();
        tokio::time::sleep(Duration::from_secs(5)).await;
        timeout.start();

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(element.events().is_empty());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(element.event_names(), ["error"]);
    }
}
