//! Delivery of analytics events to the host-provided producer.

use std::sync::{Arc, LazyLock, Mutex};

use async_trait::async_trait;
use regex::Regex;

use crate::analytics::error::{producer_error, AnalyticsError, AnalyticsResult};
use crate::analytics::events::AnalyticsEvent;
use crate::platform::runtime::spawn_detached;
use crate::util::retry::{retry_with_backoff, RetryConfig};

pub type ErrorCallback = Box<dyn FnOnce(AnalyticsError) + Send + 'static>;

/// Host capability that ships an event to the analytics backend.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait AnalyticsProducer: Send + Sync {
    async fn produce(&self, event: AnalyticsEvent) -> AnalyticsResult<()>;
}

/// Fire-and-forget event sink used by the tracker. `on_error` runs if delivery fails.
pub trait AnalyticsSink: Send + Sync {
    fn record(&self, event: AnalyticsEvent, on_error: Option<ErrorCallback>);
}

/// Sink that hands events to an [`AnalyticsProducer`] on a background task, retrying
/// failed deliveries with a fixed backoff.
pub struct ProducerSink {
    producer: Arc<dyn AnalyticsProducer>,
    retry: RetryConfig,
}

impl ProducerSink {
    pub fn new(producer: Arc<dyn AnalyticsProducer>) -> Self {
        Self {
            producer,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

impl AnalyticsSink for ProducerSink {
    fn record(&self, event: AnalyticsEvent, on_error: Option<ErrorCallback>) {
        let producer = Arc::clone(&self.producer);
        let retry = self.retry.clone();
        spawn_detached(async move {
            let result = retry_with_backoff(&retry, |_| producer.produce(event.clone())).await;
            if let (Err(error), Some(on_error)) = (result, on_error) {
                on_error(error.source);
            }
        });
    }
}

/// Sink that keeps events in memory. Optionally fails every delivery.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<AnalyticsEvent>>,
    failure: Mutex<Option<String>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_with(&self, message: impl Into<String>) {
        *self.failure.lock().unwrap() = Some(message.into());
    }

    pub fn events(&self) -> Vec<AnalyticsEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn events_for(&self, schema_id: &str) -> Vec<AnalyticsEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.schema_id == schema_id)
            .cloned()
            .collect()
    }
}

impl AnalyticsSink for MemorySink {
    fn record(&self, event: AnalyticsEvent, on_error: Option<ErrorCallback>) {
        let failure = self.failure.lock().unwrap().clone();
        match failure {
            Some(message) => {
                if let Some(on_error) = on_error {
                    on_error(producer_error(message));
                }
            }
            None => self.events.lock().unwrap().push(event),
        }
    }
}

static CANNOT_READ_STATUS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Cannot read properties of (null|undefined) \(reading 'status'\)").unwrap()
});
static NOT_AN_OBJECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(null|undefined) is not an object \(evaluating '[a-zA-Z]+\.status'\)").unwrap()
});
static IS_NULL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-zA-Z]+ is (null|undefined)").unwrap());

const IGNORED_FRAGMENTS: &[&str] = &[
    "Invalid agent:",
    ".text is not a function",
    "event_sent_at_ms metadata field cannot be empty",
    "event_created_at_ms metadata field cannot be empty.",
];

/// `false` for producer failures that are known noise (bot traffic, broken response reads).
pub fn is_useful_error(message: &str) -> bool {
    !IGNORED_FRAGMENTS
        .iter()
        .any(|fragment| message.contains(fragment))
        && !CANNOT_READ_STATUS.is_match(message)
        && !NOT_AN_OBJECT.is_match(message)
        && !IS_NULL.is_match(message)
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use serde_json::Map;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn noise_is_filtered() {
        assert!(is_useful_error("schema validation failed"));
        assert!(!is_useful_error("Invalid agent: bingbot"));
        assert!(!is_useful_error("Cannot read properties of null (reading 'status')"));
        assert!(!is_useful_error("undefined is not an object (evaluating 'n.status')"));
        assert!(!is_useful_error("n is undefined"));
    }

    struct FlakyProducer {
        calls: AtomicU32,
        failures: u32,
    }

    #[async_trait]
    impl AnalyticsProducer for FlakyProducer {
        async fn produce(&self, _event: AnalyticsEvent) -> AnalyticsResult<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                Err(producer_error("A network failure may have prevented the request from completing"))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn producer_sink_retries_then_reports() {
        let producer = Arc::new(FlakyProducer {
            calls: AtomicU32::new(0),
            failures: 10,
        });
        let sink = ProducerSink::new(producer.clone());
        let (sender, receiver) = futures::channel::oneshot::channel();

        sink.record(
            AnalyticsEvent::new("schema/1.0", Map::new()),
            Some(Box::new(move |error| {
                let _ = sender.send(error);
            })),
        );

        let error = receiver.await.unwrap();
        assert_eq!(error.code_str(), "analytics/producer");
        assert_eq!(producer.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn producer_sink_recovers_from_transient_failure() {
        let producer = Arc::new(FlakyProducer {
            calls: AtomicU32::new(0),
            failures: 1,
        });
        let sink = ProducerSink::new(producer.clone());
        sink.record(
            AnalyticsEvent::new("schema/1.0", Map::new()),
            Some(Box::new(|_| panic!("delivery should succeed"))),
        );

        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        assert_eq!(producer.calls.load(Ordering::SeqCst), 2);
    }
}
