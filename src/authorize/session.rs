//! One authorization widget instance: frame traffic, modal state and the popup path wired
//! together.

use std::sync::{Arc, LazyLock, Mutex};

use crate::analytics::AnalyticsTracker;
use crate::authorize::bus::{BusOptions, MessageBus, MessageWaiter, SourceRef};
use crate::authorize::email::{EmailListener, EmailListenerOptions};
use crate::authorize::error::{AuthorizeError, AuthorizeResult};
use crate::authorize::listener::{
    authorize_allowed_origins, AuthorizeEventHandlers, AuthorizeMessageDispatcher,
};
use crate::authorize::load_timeout::LoadTimeout;
use crate::authorize::message::{Message, MessagePayload, OutboundMessage};
use crate::authorize::post::MessagePoster;
use crate::authorize::request::AuthorizeRequest;
use crate::authorize::state::{
    AuthorizeAction, AuthorizeState, AuthorizeStateChange, AuthorizeStateStore, DismissMethod,
    ModalReason,
};
use crate::authorize::url::{AuthorizeUrlParams, UxMode};
use crate::authorize::windoid::{
    WindoidCoordinator, WindoidEventHandlers, WindoidMessageHandler, WINDOID_KEY,
};
use crate::diagnostics::ErrorReporter;
use crate::element::events::HostEventEmitter;
use crate::logger::Logger;
use crate::platform::{FrameHandle, MessageChannel, WindoidHost};
use crate::util::abort::AbortSignal;
use crate::util::subscribe::Subscription;
use crate::util::validators::validate_storefront_origin;

static LOGGER: LazyLock<Logger> = LazyLock::new(|| Logger::new("@shop-login/authorize-session"));

/// Maps a frame or popup message onto the state machine. `None` leaves state untouched.
pub fn action_for_message(message: &Message, auto_open: bool) -> Option<AuthorizeAction> {
    match &message.payload {
        MessagePayload::Loaded { user_found, .. } => Some(AuthorizeAction::Loaded {
            auto_open,
            session_detected: *user_found,
        }),
        MessagePayload::Restarted => Some(AuthorizeAction::Reset),
        MessagePayload::WindoidOpened => Some(AuthorizeAction::WindoidOpened),
        MessagePayload::WindoidClosed => Some(AuthorizeAction::WindoidClosed),
        MessagePayload::Close | MessagePayload::CloseRequested => Some(AuthorizeAction::HideModal {
            reason: ModalReason::EventCloseRequested,
            dismiss_method: Some(DismissMethod::IframeClose),
        }),
        MessagePayload::Completed { .. } => Some(AuthorizeAction::HideModal {
            reason: ModalReason::EventCompleted,
            dismiss_method: None,
        }),
        MessagePayload::ModalOpened => Some(AuthorizeAction::ModalDismissible),
        _ => None,
    }
}

/// Everything an [`AuthorizeSession`] reports to or through.
#[derive(Clone)]
pub struct SessionServices {
    pub emitter: HostEventEmitter,
    pub reporter: Arc<dyn ErrorReporter>,
    pub tracker: Option<AnalyticsTracker>,
    pub handlers: Arc<dyn AuthorizeEventHandlers>,
}

#[derive(Clone, Debug, Default)]
pub struct SessionOptions {
    /// Opens the modal as soon as the frame reports a recognized user.
    pub auto_open: bool,
    /// Accepts messages from the core auth domain as well as the pay domains.
    pub include_core_origin: bool,
    pub storefront_origin: Option<String>,
    pub hide_change: Option<bool>,
}

struct SessionInner {
    request: AuthorizeRequest,
    bus: MessageBus,
    store: AuthorizeStateStore,
    poster: MessagePoster,
    email: EmailListener,
    load_timeout: LoadTimeout,
    services: SessionServices,
    auto_open: bool,
    windoid: Mutex<Option<WindoidCoordinator>>,
    subscriptions: Mutex<Vec<Subscription>>,
}

/// Composes the message bus, state store, typed dispatcher, load timeout, email pre-check
/// and popup coordinator around one authorization frame.
#[derive(Clone)]
pub struct AuthorizeSession {
    inner: Arc<SessionInner>,
}

impl AuthorizeSession {
    pub fn new<C>(
        channel: &C,
        frame: Arc<dyn FrameHandle>,
        request: AuthorizeRequest,
        options: SessionOptions,
        services: SessionServices,
    ) -> Self
    where
        C: MessageChannel + ?Sized,
    {
        let config = request.config().clone();
        let storefront_origin = options.storefront_origin.as_deref().filter(|origin| {
            match validate_storefront_origin(origin) {
                Ok(()) => true,
                Err(error) => {
                    LOGGER.warn(format!(
                        "ignoring storefront origin {origin}: {}",
                        AuthorizeError::from(error)
                    ));
                    false
                }
            }
        });
        let allowed_origins = authorize_allowed_origins(
            &config.domains,
            options.include_core_origin,
            storefront_origin,
        );

        let mut bus_options = BusOptions::new(allowed_origins, SourceRef::iframe(Arc::clone(&frame)));
        let mut poster = MessagePoster::new(Arc::clone(&frame), &config.domains);
        if let Some(tracker) = &services.tracker {
            bus_options = bus_options.with_tracker(tracker.clone());
            poster = poster.with_tracker(tracker.clone());
        }
        let bus = MessageBus::new(channel, bus_options);
        let store = AuthorizeStateStore::new(services.tracker.clone(), Arc::clone(&services.reporter));
        let load_timeout = LoadTimeout::new(services.emitter.clone(), config.load_timeout);

        let email = EmailListener::new(
            EmailListenerOptions {
                bus: bus.clone(),
                poster: poster.clone(),
                frame,
                store: store.clone(),
                reporter: Arc::clone(&services.reporter),
                tracker: services.tracker.clone(),
                hide_change: options.hide_change,
                analytics_trace_id: request.analytics_trace_id().to_owned(),
            },
            &config,
        );

        let dispatcher =
            AuthorizeMessageDispatcher::new(Arc::clone(&services.handlers), services.emitter.clone());
        let mut subscriptions = vec![dispatcher.attach(&bus)];
        {
            let store = store.clone();
            let load_timeout = load_timeout.clone();
            let auto_open = options.auto_open;
            subscriptions.push(bus.subscribe(move |message| {
                reduce_message(&store, &load_timeout, message, auto_open);
            }));
        }

        Self {
            inner: Arc::new(SessionInner {
                request,
                bus,
                store,
                poster,
                email,
                load_timeout,
                services,
                auto_open: options.auto_open,
                windoid: Mutex::new(None),
                subscriptions: Mutex::new(subscriptions),
            }),
        }
    }

    /// Enables the popup path on `host`.
    pub fn with_windoid(self, host: Arc<dyn WindoidHost>) -> Self {
        let config = self.inner.request.config();
        let allowed_origins = authorize_allowed_origins(&config.domains, false, None);
        let coordinator =
            WindoidCoordinator::new(host, allowed_origins).with_poll_interval(config.windoid_poll_interval);
        *self.inner.windoid.lock().unwrap() = Some(coordinator);
        self
    }

    pub fn request(&self) -> &AuthorizeRequest {
        &self.inner.request
    }

    pub fn authorize_url(&self) -> String {
        self.inner.request.authorize_url()
    }

    pub fn bus(&self) -> &MessageBus {
        &self.inner.bus
    }

    pub fn store(&self) -> &AuthorizeStateStore {
        &self.inner.store
    }

    pub fn email(&self) -> &EmailListener {
        &self.inner.email
    }

    pub fn state(&self) -> AuthorizeState {
        self.inner.store.state()
    }

    /// Called once the frame starts loading the authorize URL. Arms the load timeout.
    pub fn start(&self) {
        LOGGER.debug("authorize frame loading");
        self.inner.load_timeout.start();
    }

    pub fn is_waiting_for_load(&self) -> bool {
        self.inner.load_timeout.is_pending()
    }

    pub fn subscribe_state<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&AuthorizeStateChange) + Send + Sync + 'static,
    {
        self.inner.store.subscribe(observer)
    }

    pub fn show_modal(&self, reason: ModalReason) -> AuthorizeState {
        self.inner.store.show_modal(reason)
    }

    pub fn hide_modal(&self, reason: ModalReason, dismiss_method: Option<DismissMethod>) -> AuthorizeState {
        self.inner.store.hide_modal(reason, dismiss_method)
    }

    pub fn post(&self, message: &OutboundMessage) -> AuthorizeResult<String> {
        self.inner.poster.post(message)
    }

    pub fn wait_for_message(&self, kind: &str, signal: Option<&AbortSignal>) -> MessageWaiter {
        self.inner.bus.wait_for_message(kind, signal)
    }

    /// Opens the authorization UI in a popup. Popup messages update the modal state and
    /// are mapped to host events by a [`WindoidMessageHandler`]. Returns `false` when the
    /// popup path is disabled or the popup was blocked.
    pub fn open_windoid(&self, handlers: Arc<dyn WindoidEventHandlers>) -> bool {
        let Some(coordinator) = self.inner.windoid.lock().unwrap().clone() else {
            LOGGER.warn("windoid requested without a windoid host");
            return false;
        };

        let url = self.inner.request.authorize_url_with(AuthorizeUrlParams {
            ux_mode: Some(UxMode::Windoid),
            response_mode: Some("web_message".into()),
            ..Default::default()
        });
        let handler = WindoidMessageHandler::new(handlers, self.inner.services.emitter.clone());
        let store = self.inner.store.clone();
        let load_timeout = self.inner.load_timeout.clone();
        let auto_open = self.inner.auto_open;
        let callback = {
            let handler = handler.clone();
            move |message: &Message| {
                reduce_message(&store, &load_timeout, message, auto_open);
                handler.handle(message);
            }
        };

        let popup = coordinator.open(&url, callback, WINDOID_KEY);
        let opened = popup.is_some();
        handler.set_popup(popup);
        opened
    }

    pub fn close_windoid(&self) {
        let coordinator = self.inner.windoid.lock().unwrap().clone();
        if let Some(coordinator) = coordinator {
            coordinator.cleanup(WINDOID_KEY);
        }
    }

    /// Detaches every listener and cancels pending work. Safe to call more than once.
    pub fn destroy(&self) {
        let subscriptions = std::mem::take(&mut *self.inner.subscriptions.lock().unwrap());
        drop(subscriptions);
        self.inner.email.cancel();
        self.inner.load_timeout.clear();
        self.close_windoid();
        self.inner.bus.destroy();
    }
}

fn reduce_message(
    store: &AuthorizeStateStore,
    load_timeout: &LoadTimeout,
    message: &Message,
    auto_open: bool,
) {
    if message.is("loaded") {
        load_timeout.clear();
    }
    if let Some(action) = action_for_message(message, auto_open) {
        store.dispatch(action);
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::authorize::listener::NoopHandlers;
    use crate::config::{AuthDomains, SdkConfig};
    use crate::diagnostics::RecordingReporter;
    use crate::platform::memory::{MemoryElement, MemoryFrame, MemoryMessageChannel};
    use serde_json::json;
    use std::time::Duration;

    const PAY: &str = "https://shop.app";

    fn session(auto_open: bool) -> (MemoryMessageChannel, Arc<MemoryFrame>, Arc<MemoryElement>, AuthorizeSession) {
        let config = SdkConfig::new(
            AuthDomains::new("https://store.example.com", PAY, "https://pay.shopify.com"),
            "https://store.example.com",
        );
        let request = AuthorizeRequest::new(
            AuthorizeUrlParams {
                client_id: Some("abc".into()),
                ..Default::default()
            },
            config,
            "trace-1",
        );
        let channel = MemoryMessageChannel::new();
        let frame = MemoryFrame::attached();
        let element = MemoryElement::new();
        let reporter = RecordingReporter::new();
        let session = AuthorizeSession::new(
            &channel,
            frame.clone(),
            request,
            SessionOptions {
                auto_open,
                ..Default::default()
            },
            SessionServices {
                emitter: HostEventEmitter::with_element(element.clone(), reporter.clone()),
                reporter,
                tracker: None,
                handlers: Arc::new(NoopHandlers),
            },
        );
        (channel, frame, element, session)
    }

    #[test]
    fn maps_messages_to_actions() {
        let loaded = Message::parse(&json!({"type": "loaded", "userFound": true})).unwrap();
        assert_eq!(
            action_for_message(&loaded, true),
            Some(AuthorizeAction::Loaded {
                auto_open: true,
                session_detected: true
            })
        );
        let restarted = Message::parse(&json!({"type": "restarted"})).unwrap();
        assert_eq!(action_for_message(&restarted, false), Some(AuthorizeAction::Reset));
        let resize = Message::parse(&json!({"type": "resize_iframe", "width": 1, "height": 2})).unwrap();
        assert_eq!(action_for_message(&resize, false), None);
    }

    #[tokio::test(start_paused = true)]
    async fn loaded_with_user_auto_opens_and_clears_timeout() {
        let (channel, frame, element, session) = session(true);
        session.start();
        assert!(session.is_waiting_for_load());

        channel.post(PAY, frame.content_window(), json!({"type": "loaded", "userFound": true}));
        let state = session.state();
        assert!(state.loaded);
        assert!(state.modal_visible);
        assert!(!session.is_waiting_for_load());
        assert_eq!(element.event_names(), ["loaded"]);

        channel.post(PAY, frame.content_window(), json!({"type": "close_requested"}));
        assert!(!session.state().modal_visible);

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(element.event_names(), ["loaded"]);
    }

    #[tokio::test(start_paused = true)]
    async fn load_timeout_reports_error() {
        let (_channel, _frame, element, session) = session(false);
        session.start();
        tokio::time::sleep(Duration::from_secs(11)).await;

        let events = element.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "error");
        assert_eq!(events[0].detail.as_ref().unwrap()["code"], json!("temporarily_unavailable"));
    }

    #[test]
    fn destroy_detaches_everything() {
        let (channel, frame, _element, session) = session(false);
        assert_eq!(channel.listener_count(), 1);

        session.destroy();
        session.destroy();
        assert_eq!(channel.listener_count(), 0);

        channel.post(PAY, frame.content_window(), json!({"type": "loaded"}));
        assert!(!session.state().loaded);
    }

    #[test]
    fn invalid_storefront_origin_is_not_trusted() {
        let config = SdkConfig::new(
            AuthDomains::new("https://store.example.com", PAY, "https://pay.shopify.com"),
            "https://store.example.com",
        );
        let request = AuthorizeRequest::new(AuthorizeUrlParams::default(), config, "trace");
        let channel = MemoryMessageChannel::new();
        let frame = MemoryFrame::attached();
        let reporter = RecordingReporter::new();
        let services = SessionServices {
            emitter: HostEventEmitter::new(reporter.clone()),
            reporter,
            tracker: None,
            handlers: Arc::new(NoopHandlers),
        };

        let session = AuthorizeSession::new(
            &channel,
            frame.clone(),
            request.clone(),
            SessionOptions {
                storefront_origin: Some("http://shop.storefront.test".into()),
                ..Default::default()
            },
            services.clone(),
        );
        channel.post("http://shop.storefront.test", frame.content_window(), json!({"type": "loaded"}));
        assert!(!session.state().loaded);
        session.destroy();

        let session = AuthorizeSession::new(
            &channel,
            frame.clone(),
            request,
            SessionOptions {
                storefront_origin: Some("https://shop.storefront.test".into()),
                ..Default::default()
            },
            services,
        );
        channel.post("https://shop.storefront.test", frame.content_window(), json!({"type": "loaded"}));
        assert!(session.state().loaded);
    }

    #[test]
    fn windoid_requires_host() {
        let (_channel, _frame, _element, session) = session(false);
        struct Quiet;
        impl WindoidEventHandlers for Quiet {}
        assert!(!session.open_windoid(Arc::new(Quiet)));
    }
}
