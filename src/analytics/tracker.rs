use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock, Mutex};
use std::time::Duration;

use serde_json::{json, Map, Value};

use crate::analytics::error::invalid_argument;
use crate::analytics::events::{
    insert_present, AnalyticsData, AnalyticsEvent, MessageDirection, ModalState,
    ModalStateChange, UserAction, FEATURE_INITIALIZE_SCHEMA, MODAL_STATE_CHANGE_SCHEMA,
    PAGE_IMPRESSION_SCHEMA, POST_MESSAGE_TRANSMISSION_SCHEMA, SDK_VERSION,
    SKIP_MESSAGE_EVENT_TYPES, USER_ACTION_SCHEMA,
};
use crate::analytics::producer::{is_useful_error, AnalyticsSink, ErrorCallback};
use crate::analytics::trekkie::{
    trekkie_attributes, TrekkieAttributes, TrekkieSource, DEFAULT_TREKKIE_ATTRIBUTES,
};
use crate::config::DEFAULT_TREKKIE_TIMEOUT;
use crate::diagnostics::ErrorReporter;
use crate::logger::Logger;
use crate::util::errors::{ErrorName, ShopJsError};

static LOGGER: LazyLock<Logger> = LazyLock::new(|| Logger::new("@shop-login/analytics"));

/// Derives analytics events from SDK activity and hands them to an [`AnalyticsSink`].
///
/// Every event is skipped while the analytics data has no `flow`.
#[derive(Clone)]
pub struct AnalyticsTracker {
    inner: Arc<TrackerInner>,
}

struct TrackerInner {
    data: Mutex<AnalyticsData>,
    sink: Arc<dyn AnalyticsSink>,
    reporter: Arc<dyn ErrorReporter>,
    trekkie: Option<Arc<dyn TrekkieSource>>,
    trekkie_timeout: Duration,
    dev_mode: bool,
    previous_modal_state: Mutex<Option<ModalState>>,
    tracked_page_impressions: Arc<Mutex<HashSet<String>>>,
    feature_initialized: AtomicBool,
}

impl fmt::Debug for AnalyticsTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyticsTracker")
            .field("data", &*self.inner.data.lock().unwrap())
            .field("dev_mode", &self.inner.dev_mode)
            .finish()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PageImpression {
    pub page: String,
    pub allow_duplicates: bool,
    pub shop_account_uuid: Option<String>,
}

impl AnalyticsTracker {
    pub fn new(
        data: AnalyticsData,
        sink: Arc<dyn AnalyticsSink>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        Self::with_options(data, sink, reporter, None, DEFAULT_TREKKIE_TIMEOUT, false)
    }

    pub fn with_options(
        data: AnalyticsData,
        sink: Arc<dyn AnalyticsSink>,
        reporter: Arc<dyn ErrorReporter>,
        trekkie: Option<Arc<dyn TrekkieSource>>,
        trekkie_timeout: Duration,
        dev_mode: bool,
    ) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                data: Mutex::new(data),
                sink,
                reporter,
                trekkie,
                trekkie_timeout,
                dev_mode,
                previous_modal_state: Mutex::new(None),
                tracked_page_impressions: Arc::new(Mutex::new(HashSet::new())),
                feature_initialized: AtomicBool::new(false),
            }),
        }
    }

    pub fn analytics_data(&self) -> AnalyticsData {
        self.inner.data.lock().unwrap().clone()
    }

    /// Applies `update` to the analytics data. Returns `false` when nothing changed.
    pub fn update_analytics_data<F>(&self, update: F) -> bool
    where
        F: FnOnce(&mut AnalyticsData),
    {
        let mut data = self.inner.data.lock().unwrap();
        let mut updated = data.clone();
        update(&mut updated);
        if updated == *data {
            return false;
        }
        *data = updated;
        true
    }

    pub fn clear_tracked_page_impressions(&self) {
        self.inner.tracked_page_impressions.lock().unwrap().clear();
    }

    pub fn track_modal_state_change(&self, change: ModalStateChange) {
        let data = self.analytics_data();
        let Some(flow) = data.flow.clone() else {
            return;
        };

        let previous = self
            .inner
            .previous_modal_state
            .lock()
            .unwrap()
            .replace(change.current_state);

        let mut payload = Map::new();
        payload.insert("analyticsTraceId".into(), json!(data.analytics_trace_id));
        insert_present(&mut payload, "checkoutToken", data.checkout_token.as_ref());
        payload.insert("currentState".into(), json!(change.current_state.as_str()));
        if let Some(dismiss_method) = &change.dismiss_method {
            payload.insert("dismissMethod".into(), json!(dismiss_method));
        }
        payload.insert("flow".into(), json!(flow));
        payload.insert("flowVersion".into(), json!(data.flow_version));
        if let Some(previous) = previous {
            payload.insert("previousState".into(), json!(previous.as_str()));
        }
        payload.insert("reason".into(), json!(change.reason));

        self.produce(AnalyticsEvent::new(MODAL_STATE_CHANGE_SCHEMA, payload), None, None);
    }

    pub fn track_user_action(&self, action: UserAction) {
        let data = self.analytics_data();
        let Some(flow) = data.flow.clone() else {
            return;
        };

        let mut payload = Map::new();
        insert_present(&mut payload, "apiKey", data.api_key.as_ref());
        insert_present(&mut payload, "checkoutToken", data.checkout_token.as_ref());
        insert_present(&mut payload, "checkoutVersion", data.checkout_version.as_ref());
        insert_present(&mut payload, "shopId", data.shop_id.as_ref());
        payload.insert("analyticsTraceId".into(), json!(data.analytics_trace_id));
        payload.insert("flow".into(), json!(flow));
        payload.insert("flowVersion".into(), json!(data.flow_version));
        payload.insert("sdkVersion".into(), json!(SDK_VERSION));
        payload.insert(
            "shopPermanentDomain".into(),
            json!(data.shop_permanent_domain.unwrap_or_default()),
        );
        payload.insert("userAction".into(), json!(action.as_str()));

        self.produce(AnalyticsEvent::new(USER_ACTION_SCHEMA, payload), None, None);
    }

    /// Records one cross-document message. Chatty types are skipped.
    pub fn track_post_message_transmission(
        &self,
        direction: MessageDirection,
        event_type: &str,
        message_id: Option<&str>,
        email: Option<&str>,
    ) {
        if SKIP_MESSAGE_EVENT_TYPES.contains(&event_type) {
            return;
        }

        let data = self.analytics_data();
        LOGGER.debug(format!(
            "post message {} {event_type}",
            direction.as_str()
        ));

        let mut payload = Map::new();
        if let Some(message_id) = message_id {
            payload.insert("messageId".into(), json!(message_id));
        }
        payload.insert("messageDirection".into(), json!(direction.as_str()));
        payload.insert("actor".into(), json!("shop-js"));
        payload.insert("payloadType".into(), json!(event_type));
        payload.insert(
            "clientTimestampMs".into(),
            json!(chrono::Utc::now().timestamp_millis()),
        );
        payload.insert("analyticsTraceId".into(), json!(data.analytics_trace_id));
        insert_present(&mut payload, "checkoutToken", data.checkout_token.as_ref());
        insert_present(&mut payload, "shopifyDomain", data.shop_permanent_domain.as_ref());
        if let Some(email) = email {
            payload.insert("email".into(), json!(email));
        }

        self.produce(
            AnalyticsEvent::new(POST_MESSAGE_TRANSMISSION_SCHEMA, payload),
            None,
            None,
        );
    }

    /// Records a page impression once per page unless `allow_duplicates` is set. A failed
    /// delivery forgets the page so it can be tracked again.
    pub async fn track_page_impression(&self, impression: PageImpression) {
        let data = self.analytics_data();
        let Some(flow) = data.flow.clone() else {
            return;
        };

        {
            let mut tracked = self.inner.tracked_page_impressions.lock().unwrap();
            if !impression.allow_duplicates && tracked.contains(&impression.page) {
                return;
            }
            tracked.insert(impression.page.clone());
        }

        let attributes = self.trekkie_attributes().await;

        let mut payload = Map::new();
        insert_present(&mut payload, "apiKey", data.api_key.as_ref());
        insert_present(&mut payload, "checkoutToken", data.checkout_token.as_ref());
        insert_present(&mut payload, "shopAccountUuid", impression.shop_account_uuid.as_ref());
        payload.insert("analyticsTraceId".into(), json!(data.analytics_trace_id));
        payload.insert("flow".into(), json!(flow));
        payload.insert("flowVersion".into(), json!(data.flow_version));
        payload.insert("pageName".into(), json!(impression.page));
        payload.insert("sdkVersion".into(), json!(SDK_VERSION));
        payload.insert(
            "shopPermanentDomain".into(),
            json!(data.shop_permanent_domain.unwrap_or_default()),
        );

        let tracked = Arc::clone(&self.inner.tracked_page_impressions);
        let page = impression.page;
        let forget_page: ErrorCallback = Box::new(move |_| {
            tracked.lock().unwrap().remove(&page);
        });

        self.produce(
            AnalyticsEvent::new(PAGE_IMPRESSION_SCHEMA, payload),
            Some(attributes),
            Some(forget_page),
        );
    }

    /// Records the feature initialization. A second call is reported as a logic error but
    /// still produces the event.
    pub async fn track_feature_initialization(&self) {
        let data = self.analytics_data();
        let Some(flow) = data.flow.clone() else {
            return;
        };

        if self.inner.feature_initialized.load(Ordering::SeqCst) {
            self.inner.reporter.notify(ShopJsError::with_trace_id(
                format!("Feature Initialize Event already emitted once for the feature {flow}"),
                ErrorName::MonorailLogicError,
                data.analytics_trace_id.clone(),
            ));
        }

        let attributes = self.trekkie_attributes().await;

        let mut payload = Map::new();
        insert_present(&mut payload, "apiKey", data.api_key.as_ref());
        insert_present(&mut payload, "checkoutToken", data.checkout_token.as_ref());
        insert_present(&mut payload, "shopId", data.shop_id.as_ref());
        payload.extend(attributes);
        payload.insert("analyticsTraceId".into(), json!(data.analytics_trace_id));
        payload.insert("flow".into(), json!(flow));
        payload.insert("flowVersion".into(), json!(data.flow_version));
        payload.insert("sdkVersion".into(), json!(SDK_VERSION));
        payload.insert(
            "shopPermanentDomain".into(),
            json!(data.shop_permanent_domain.unwrap_or_default()),
        );
        payload.insert(
            "source".into(),
            json!(data.source.unwrap_or_else(|| "unspecified".to_owned())),
        );
        payload.insert("uxMode".into(), data.ux_mode.map(Value::String).unwrap_or(Value::Null));

        self.inner.feature_initialized.store(true, Ordering::SeqCst);
        self.produce(AnalyticsEvent::new(FEATURE_INITIALIZE_SCHEMA, payload), None, None);
    }

    async fn trekkie_attributes(&self) -> TrekkieAttributes {
        trekkie_attributes(
            self.inner.trekkie.as_deref(),
            DEFAULT_TREKKIE_ATTRIBUTES,
            self.inner.trekkie_timeout,
        )
        .await
    }

    /// Sends `event` to the sink, merging `trekkie` attributes into its payload.
    ///
    /// Trekkie attributes that were looked up but came back empty mean the event would fail
    /// schema validation, so the event is dropped and reported instead.
    fn produce(
        &self,
        mut event: AnalyticsEvent,
        trekkie: Option<TrekkieAttributes>,
        on_error: Option<ErrorCallback>,
    ) {
        if self.inner.dev_mode {
            return;
        }

        if let Some(attributes) = trekkie {
            if attributes.is_empty() {
                let error = invalid_argument("trekkie attributes are empty");
                self.inner.reporter.notify(ShopJsError::new(
                    format!("{}: {}", event.schema_id, error.message()),
                    ErrorName::MonorailLogicError,
                ));
                if let Some(on_error) = on_error {
                    on_error(error);
                }
                return;
            }
            event.payload.extend(attributes);
        }

        let reporter = Arc::clone(&self.inner.reporter);
        let trace_id = self.analytics_data().analytics_trace_id;
        let schema_id = event.schema_id.clone();
        self.inner.sink.record(
            event,
            Some(Box::new(move |error| {
                LOGGER.warn(format!("failed to produce {schema_id}: {error}"));
                if is_useful_error(error.message()) {
                    reporter.notify(ShopJsError::with_trace_id(
                        error.message(),
                        ErrorName::MonorailProducerError,
                        trace_id,
                    ));
                }
                if let Some(on_error) = on_error {
                    on_error(error);
                }
            })),
        );
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::analytics::producer::MemorySink;
    use crate::diagnostics::RecordingReporter;
    use async_trait::async_trait;

    fn tracker(flow: Option<&str>) -> (AnalyticsTracker, Arc<MemorySink>, Arc<RecordingReporter>) {
        let sink = MemorySink::new();
        let reporter = RecordingReporter::new();
        let mut data = AnalyticsData::new("trace-1");
        data.flow = flow.map(str::to_owned);
        (AnalyticsTracker::new(data, sink.clone(), reporter.clone()), sink, reporter)
    }

    #[test]
    fn modal_changes_carry_previous_state() {
        let (tracker, sink, _) = tracker(Some("default"));
        tracker.track_modal_state_change(ModalStateChange::new(ModalState::Loaded, "event_loaded"));
        tracker.track_modal_state_change(
            ModalStateChange::new(ModalState::Hidden, "user_dismissed").dismissed_by("close_button"),
        );

        let events = sink.events_for(MODAL_STATE_CHANGE_SCHEMA);
        assert_eq!(events.len(), 2);
        assert!(events[0].field("previousState").is_none());
        assert_eq!(events[1].field("previousState"), Some(&json!("loaded")));
        assert_eq!(events[1].field("dismissMethod"), Some(&json!("close_button")));
        assert_eq!(events[1].field("flowVersion"), Some(&json!("unspecified")));
    }

    #[test]
    fn events_need_a_flow() {
        let (tracker, sink, _) = tracker(None);
        tracker.track_user_action(UserAction::EmailEntered);
        tracker.track_modal_state_change(ModalStateChange::new(ModalState::Shown, "auto"));
        assert!(sink.events().is_empty());
    }

    #[test]
    fn chatty_message_types_are_skipped() {
        let (tracker, sink, _) = tracker(Some("default"));
        tracker.track_post_message_transmission(MessageDirection::Incoming, "resize_iframe", Some("m1"), None);
        tracker.track_post_message_transmission(
            MessageDirection::Outgoing,
            "emailsubmitted",
            Some("m2"),
            Some("buyer@example.com"),
        );

        let events = sink.events_for(POST_MESSAGE_TRANSMISSION_SCHEMA);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].field("payloadType"), Some(&json!("emailsubmitted")));
        assert_eq!(events[0].field("messageDirection"), Some(&json!("outgoing")));
    }

    #[test]
    fn producer_failures_are_reported_when_useful() {
        let (tracker, sink, reporter) = tracker(Some("default"));
        sink.fail_with("schema mismatch");
        tracker.track_user_action(UserAction::EmailEntered);
        sink.fail_with("Invalid agent: bot");
        tracker.track_user_action(UserAction::EmailEntered);

        let errors = reporter.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].name, ErrorName::MonorailProducerError);
        assert_eq!(errors[0].analytics_trace_id, "trace-1");
    }

    struct Storefront;

    #[async_trait]
    impl TrekkieSource for Storefront {
        fn is_available(&self) -> bool {
            true
        }

        async fn default_attributes(&self) -> TrekkieAttributes {
            json!({"uniqToken": "u", "visitToken": "v"}).as_object().cloned().unwrap_or_default()
        }
    }

    #[tokio::test]
    async fn page_impressions_are_deduplicated() {
        let sink = MemorySink::new();
        let tracker = AnalyticsTracker::with_options(
            AnalyticsData::new("trace").with_flow("default"),
            sink.clone(),
            RecordingReporter::new(),
            Some(Arc::new(Storefront)),
            Duration::from_secs(10),
            false,
        );
        let impression = PageImpression {
            page: "PERSONALIZE_PAGE".into(),
            ..PageImpression::default()
        };

        tracker.track_page_impression(impression.clone()).await;
        tracker.track_page_impression(impression).await;

        let events = sink.events_for(PAGE_IMPRESSION_SCHEMA);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].field("uniqToken"), Some(&json!("u")));
    }

    #[tokio::test]
    async fn empty_trekkie_attributes_drop_the_event() {
        let (tracker, sink, reporter) = tracker(Some("default"));
        let impression = PageImpression {
            page: "EMAIL_PAGE".into(),
            ..PageImpression::default()
        };

        tracker.track_page_impression(impression.clone()).await;
        assert!(sink.events().is_empty());
        assert_eq!(reporter.errors()[0].name, ErrorName::MonorailLogicError);

        // The failed page is forgotten, so it is attempted again.
        tracker.track_page_impression(impression).await;
        assert_eq!(reporter.errors().len(), 2);
    }

    #[tokio::test]
    async fn second_feature_initialization_is_a_logic_error() {
        let (tracker, sink, reporter) = tracker(Some("default"));
        tracker.track_feature_initialization().await;
        tracker.track_feature_initialization().await;

        assert_eq!(sink.events_for(FEATURE_INITIALIZE_SCHEMA).len(), 2);
        assert_eq!(reporter.errors().len(), 1);
        assert!(reporter.errors()[0].message.contains("default"));
    }
}
