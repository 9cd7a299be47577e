//! Email pre-check: hand the buyer's email to the authorization frame and open the modal
//! once the frame recognizes a Shop user.

use std::collections::HashSet;
use std::pin::pin;
use std::sync::{Arc, LazyLock, Mutex, Weak};
use std::time::Duration;

use futures::future::{select, Either};
use serde_json::{json, Map};

use crate::analytics::{AnalyticsTracker, UserAction};
use crate::authorize::bus::MessageBus;
use crate::authorize::error::{AuthorizeError, AuthorizeResult};
use crate::authorize::message::{Message, MessagePayload, OutboundMessage};
use crate::authorize::post::MessagePoster;
use crate::authorize::state::{AuthorizeStateStore, ModalReason};
use crate::config::SdkConfig;
use crate::diagnostics::{BreadcrumbType, ErrorReporter};
use crate::logger::Logger;
use crate::platform::FrameHandle;
use crate::platform::runtime::spawn_detached;
use crate::util::abort::{AbortController, AbortSignal};
use crate::util::debounce::Debouncer;
use crate::util::errors::{ErrorName, ShopJsError};
use crate::util::subscribe::Subscription;
use crate::util::validators::is_valid_email;

static LOGGER: LazyLock<Logger> = LazyLock::new(|| Logger::new("@shop-login/email-listener"));

pub const CAPTCHA_CHALLENGE_CODE: &str = "captcha_challenge";

/// Waits for an `error` message whose code is `captcha_challenge`.
///
/// Errors with any other code are ignored and the wait starts over. Resolves with
/// [`AuthorizeError::Cancelled`] once `signal` aborts.
pub async fn wait_for_captcha_challenge(
    bus: &MessageBus,
    signal: &AbortSignal,
) -> AuthorizeResult<Message> {
    loop {
        if signal.is_aborted() {
            return Err(AuthorizeError::Cancelled);
        }
        let message = bus.wait_for_message("error", Some(signal)).await?;
        if let MessagePayload::Error { code, .. } = &message.payload {
            if code == CAPTCHA_CHALLENGE_CODE {
                return Ok(message);
            }
        }
    }
}

/// Which input fired an `input` event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputKind {
    Email,
    Password,
}

/// Email and name to submit. Names default to empty strings on the wire.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EmailSubmission {
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl EmailSubmission {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            ..Default::default()
        }
    }

    pub fn with_names(mut self, first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        self.first_name = Some(first_name.into());
        self.last_name = Some(last_name.into());
        self
    }
}

#[derive(Default)]
struct InputTimestamps {
    email: Option<f64>,
    password: Option<f64>,
}

#[derive(Default)]
struct Pending {
    email: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
}

struct EmailInner {
    bus: MessageBus,
    poster: MessagePoster,
    frame: Arc<dyn FrameHandle>,
    store: AuthorizeStateStore,
    reporter: Arc<dyn ErrorReporter>,
    tracker: Option<AnalyticsTracker>,
    hide_change: Option<bool>,
    analytics_trace_id: String,
    password_manager_threshold: Duration,
    debouncer: Debouncer<EmailSubmission>,
    controller: Mutex<Option<AbortController>>,
    tracked: Mutex<HashSet<UserAction>>,
    timestamps: Mutex<InputTimestamps>,
    pending: Mutex<Pending>,
    submitted_email: Mutex<String>,
    loaded_watch: Mutex<Option<Subscription>>,
}

/// Listens for email input and runs the pre-check against the authorization frame.
///
/// Submissions are debounced. A submission is skipped, not queued, while the frame is not
/// loaded or the modal is visible; a pending email is submitted again once the frame
/// reports `loaded`. Starting a submission cancels the one still in flight.
#[derive(Clone)]
pub struct EmailListener {
    inner: Arc<EmailInner>,
}

pub struct EmailListenerOptions {
    pub bus: MessageBus,
    pub poster: MessagePoster,
    pub frame: Arc<dyn FrameHandle>,
    pub store: AuthorizeStateStore,
    pub reporter: Arc<dyn ErrorReporter>,
    pub tracker: Option<AnalyticsTracker>,
    pub hide_change: Option<bool>,
    pub analytics_trace_id: String,
}

impl EmailListener {
    pub fn new(options: EmailListenerOptions, config: &SdkConfig) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<EmailInner>| {
            let weak = weak.clone();
            EmailInner {
                bus: options.bus,
                poster: options.poster,
                frame: options.frame,
                store: options.store,
                reporter: options.reporter,
                tracker: options.tracker,
                hide_change: options.hide_change,
                analytics_trace_id: options.analytics_trace_id,
                password_manager_threshold: config.password_manager_threshold,
                debouncer: Debouncer::new(config.email_debounce, move |submission| {
                    if let Some(inner) = weak.upgrade() {
                        spawn_detached(async move {
                            inner.update_user_information(submission).await;
                        });
                    }
                }),
                controller: Mutex::new(None),
                tracked: Mutex::new(HashSet::new()),
                timestamps: Mutex::new(InputTimestamps::default()),
                pending: Mutex::new(Pending::default()),
                submitted_email: Mutex::new(String::new()),
                loaded_watch: Mutex::new(None),
            }
        });

        let weak = Arc::downgrade(&inner);
        let watch = inner.store.subscribe(move |change| {
            if change.previous_state.loaded || !change.state.loaded {
                return;
            }
            if let Some(inner) = weak.upgrade() {
                inner.schedule_pending();
            }
        });
        *inner.loaded_watch.lock().unwrap() = Some(watch);

        Self { inner }
    }

    /// Sets the email to submit. `None` clears it to an empty submission.
    pub fn update_email(&self, email: Option<&str>) {
        self.inner.pending.lock().unwrap().email = Some(email.unwrap_or_default().to_owned());
        self.inner.schedule_pending();
    }

    /// Names sent alongside the next email submission.
    pub fn update_names(&self, first_name: Option<&str>, last_name: Option<&str>) {
        {
            let mut pending = self.inner.pending.lock().unwrap();
            pending.first_name = Some(first_name.unwrap_or_default().to_owned());
            pending.last_name = Some(last_name.unwrap_or_default().to_owned());
        }
        self.inner.schedule_pending();
    }

    /// Records the `timeStamp` (ms) of an `input` event on the email or password field.
    pub fn record_input(&self, kind: InputKind, timestamp_ms: f64) {
        let mut timestamps = self.inner.timestamps.lock().unwrap();
        match kind {
            InputKind::Email => timestamps.email = Some(timestamp_ms),
            InputKind::Password => timestamps.password = Some(timestamp_ms),
        }
    }

    /// Whether the email and password fields changed together, as a password manager does.
    pub fn is_filled_with_password_manager(&self) -> bool {
        self.inner.is_filled_with_password_manager()
    }

    /// The last email handed to the frame, empty when it was invalid.
    pub fn submitted_email(&self) -> String {
        self.inner.submitted_email.lock().unwrap().clone()
    }

    /// Runs one submission immediately, bypassing the debounce.
    pub async fn update_user_information(&self, submission: EmailSubmission) {
        self.inner.update_user_information(submission).await;
    }

    /// Cancels the pending debounce and the submission in flight.
    pub fn cancel(&self) {
        self.inner.debouncer.cancel();
        let controller = self.inner.controller.lock().unwrap().take();
        if let Some(controller) = controller {
            controller.abort();
        }
    }
}

impl EmailInner {
    fn schedule_pending(&self) {
        if !self.store.state().loaded {
            return;
        }
        let submission = {
            let pending = self.pending.lock().unwrap();
            let Some(email) = pending.email.clone() else {
                return;
            };
            EmailSubmission {
                email,
                first_name: pending.first_name.clone(),
                last_name: pending.last_name.clone(),
            }
        };
        self.debouncer.call(submission);
    }

    fn is_filled_with_password_manager(&self) -> bool {
        let timestamps = self.timestamps.lock().unwrap();
        match (timestamps.email, timestamps.password) {
            (Some(email), Some(password)) => {
                (email - password).abs() < self.password_manager_threshold.as_secs_f64() * 1000.0
            }
            _ => false,
        }
    }

    fn track_once(&self, action: UserAction) {
        if !self.tracked.lock().unwrap().insert(action) {
            return;
        }
        if let Some(tracker) = &self.tracker {
            tracker.track_user_action(action);
        }
    }

    async fn update_user_information(&self, submission: EmailSubmission) {
        let valid = is_valid_email(&submission.email);

        if self.is_filled_with_password_manager() {
            self.track_once(UserAction::PasswordManagerAutofillDetected);
        }
        if valid {
            self.track_once(UserAction::EmailEntered);
        }
        self.reporter
            .leave_breadcrumb("email entered", Map::new(), BreadcrumbType::State);

        let state = self.store.state();
        if self.frame.content_window().is_none() || state.modal_visible || !state.loaded {
            LOGGER.debug("skipping email submission");
            return;
        }

        let email = if valid { submission.email } else { String::new() };

        let controller = AbortController::new();
        let previous = self.controller.lock().unwrap().replace(controller.clone());
        if let Some(previous) = previous {
            previous.abort();
        }

        let result = self
            .submit(
                email,
                submission.first_name.unwrap_or_default(),
                submission.last_name.unwrap_or_default(),
                &controller,
            )
            .await;

        match result {
            Ok(()) => {}
            Err(error) if error.is_cancelled() => {}
            Err(error) => {
                self.reporter.notify(ShopJsError::with_trace_id(
                    format!("Error updating user info: {} - {error}", error.code_str()),
                    ErrorName::AuthorizeError,
                    self.analytics_trace_id.clone(),
                ));
            }
        }
    }

    async fn submit(
        &self,
        email: String,
        first_name: String,
        last_name: String,
        controller: &AbortController,
    ) -> AuthorizeResult<()> {
        *self.submitted_email.lock().unwrap() = email.clone();

        self.poster.post(&OutboundMessage::NameSubmitted {
            first_name: Some(first_name),
            last_name: Some(last_name),
        })?;

        let redacted = if email.is_empty() { "" } else { "redacted" };
        let hide_change = self.hide_change.unwrap_or(!email.is_empty());
        self.poster
            .post(&OutboundMessage::EmailSubmitted { email, hide_change })?;

        let mut metadata = Map::new();
        metadata.insert("email".into(), json!(redacted));
        self.reporter
            .leave_breadcrumb("email submitted", metadata, BreadcrumbType::State);

        let signal = controller.signal();
        let matched = self.bus.wait_for_message("shop_user_matched", Some(&signal));
        let captcha = pin!(wait_for_captcha_challenge(&self.bus, &signal));
        match select(matched, captcha).await {
            Either::Left((result, _)) => {
                result?;
            }
            Either::Right((result, _)) => {
                result?;
            }
        }

        self.store.show_modal(ModalReason::EventShopUserMatched);
        controller.abort();
        self.pending.lock().unwrap().email = None;
        Ok(())
    }
}
