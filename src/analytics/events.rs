use serde_json::{Map, Value};

pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DEFAULT_FLOW_VERSION: &str = "unspecified";

pub const FEATURE_INITIALIZE_SCHEMA: &str =
    "shopify_pay_login_with_shop_sdk_feature_initialize/1.1";
pub const MODAL_STATE_CHANGE_SCHEMA: &str = "shop_identity_modal_state_change/1.4";
pub const PAGE_IMPRESSION_SCHEMA: &str = "shopify_pay_login_with_shop_sdk_page_impressions/3.3";
pub const USER_ACTION_SCHEMA: &str = "shopify_pay_login_with_shop_sdk_user_actions/2.2";
pub const POST_MESSAGE_TRANSMISSION_SCHEMA: &str = "shop_identity_post_message_transmission/1.0";

/// Message types too chatty to be worth a transmission event.
pub const SKIP_MESSAGE_EVENT_TYPES: &[&str] = &[
    "authorize_step_changed",
    "createprequal",
    "resize_iframe",
    "setcomponentstyle",
    "verification_step_changed",
];

/// One analytics event: a schema id plus its JSON payload.
#[derive(Clone, Debug, PartialEq)]
pub struct AnalyticsEvent {
    pub schema_id: String,
    pub payload: Map<String, Value>,
}

impl AnalyticsEvent {
    pub fn new(schema_id: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self {
            schema_id: schema_id.into(),
            payload,
        }
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }
}

/// Identity of the flow being tracked. Events are skipped while `flow` is unset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalyticsData {
    pub analytics_trace_id: String,
    pub api_key: Option<String>,
    pub checkout_token: Option<String>,
    pub checkout_version: Option<String>,
    pub flow: Option<String>,
    pub flow_version: String,
    pub shop_id: Option<String>,
    pub shop_permanent_domain: Option<String>,
    pub source: Option<String>,
    pub ux_mode: Option<String>,
}

impl AnalyticsData {
    pub fn new(analytics_trace_id: impl Into<String>) -> Self {
        Self {
            analytics_trace_id: analytics_trace_id.into(),
            api_key: None,
            checkout_token: None,
            checkout_version: None,
            flow: None,
            flow_version: DEFAULT_FLOW_VERSION.to_owned(),
            shop_id: None,
            shop_permanent_domain: None,
            source: None,
            ux_mode: None,
        }
    }

    pub fn with_flow(mut self, flow: impl Into<String>) -> Self {
        self.flow = Some(flow.into());
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModalState {
    Loaded,
    Shown,
    Hidden,
}

impl ModalState {
    pub fn as_str(self) -> &'static str {
        match self {
            ModalState::Loaded => "loaded",
            ModalState::Shown => "shown",
            ModalState::Hidden => "hidden",
        }
    }

    pub fn from_visibility(visible: bool) -> Self {
        if visible {
            ModalState::Shown
        } else {
            ModalState::Hidden
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageDirection {
    Incoming,
    Outgoing,
}

impl MessageDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageDirection::Incoming => "incoming",
            MessageDirection::Outgoing => "outgoing",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UserAction {
    EmailEntered,
    PasswordManagerAutofillDetected,
}

impl UserAction {
    pub fn as_str(self) -> &'static str {
        match self {
            UserAction::EmailEntered => "EMAIL_ENTERED",
            UserAction::PasswordManagerAutofillDetected => "PASSWORD_MANAGER_AUTOFILL_DETECTED",
        }
    }
}

/// Payload of a modal state change event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModalStateChange {
    pub current_state: ModalState,
    pub reason: String,
    pub dismiss_method: Option<String>,
}

impl ModalStateChange {
    pub fn new(current_state: ModalState, reason: impl Into<String>) -> Self {
        Self {
            current_state,
            reason: reason.into(),
            dismiss_method: None,
        }
    }

    pub fn dismissed_by(mut self, dismiss_method: impl Into<String>) -> Self {
        self.dismiss_method = Some(dismiss_method.into());
        self
    }
}

/// Inserts `value` under `key` only when it is present and non-empty.
pub(crate) fn insert_present(payload: &mut Map<String, Value>, key: &str, value: Option<&String>) {
    if let Some(value) = value.filter(|value| !value.is_empty()) {
        payload.insert(key.to_owned(), Value::String(value.clone()));
    }
}
