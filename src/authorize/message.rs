//! Typed view of the cross-document message protocol.
//!
//! Inbound data is untrusted. [`Message::parse`] accepts any JSON object carrying a string
//! `type`; known types are decoded into [`MessagePayload`] variants and anything else is
//! kept as [`MessagePayload::Unknown`] with the raw data still available.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::authorize::error::{AuthorizeError, AuthorizeResult};

pub const MESSAGE_ID_KEY: &str = "messageId";

/// Field decoder that falls back to the default when the value has the wrong shape, so a
/// known message with one odd field still reaches its handler.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// Variant-specific fields of an inbound message, keyed by its `type`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePayload {
    #[serde(rename_all = "camelCase")]
    Loaded {
        #[serde(default, deserialize_with = "lenient")]
        user_found: bool,
        #[serde(default, deserialize_with = "lenient")]
        login_title: Option<String>,
    },
    Unloaded,
    #[serde(rename_all = "camelCase")]
    Completed {
        #[serde(default, deserialize_with = "lenient")]
        logged_in: bool,
        #[serde(default, deserialize_with = "lenient")]
        should_finalize_login: bool,
        #[serde(default, deserialize_with = "lenient")]
        redirect_uri: Option<String>,
        #[serde(default, deserialize_with = "lenient")]
        email: Option<String>,
        #[serde(default, deserialize_with = "lenient")]
        given_name: Option<String>,
        #[serde(default, deserialize_with = "lenient")]
        avatar: Option<String>,
    },
    Error {
        #[serde(default, deserialize_with = "lenient")]
        code: String,
        #[serde(default, deserialize_with = "lenient")]
        message: String,
        #[serde(default, deserialize_with = "lenient")]
        email: Option<String>,
    },
    ShopUserMatched,
    ShopUserNotMatched,
    UserVerified,
    AuthorizeStepChanged {
        #[serde(default, deserialize_with = "lenient")]
        step: Option<String>,
    },
    VerificationStepChanged {
        #[serde(default, deserialize_with = "lenient")]
        step: Option<String>,
    },
    ResizeIframe {
        #[serde(default, deserialize_with = "lenient")]
        width: f64,
        #[serde(default, deserialize_with = "lenient")]
        height: f64,
    },
    Close,
    CloseRequested,
    PopUpOpened,
    CustomFlowSideEffect,
    PrequalError,
    PrequalMissingInformation,
    PrequalReady,
    PrequalSuccess,
    PrequalBuyerUpsertSuccessful,
    ConfirmSuccess,
    ContinueToCheckout,
    DiscountSaved,
    EmailChangeRequested,
    #[serde(rename = "modalopened")]
    ModalOpened,
    ProcessingStatusUpdated,
    Restarted,
    #[serde(rename = "windoidopened")]
    WindoidOpened,
    #[serde(rename = "windoidclosed")]
    WindoidClosed,
    StripeLinkUserFound,
    PromptChange,
    PromptContinue,
    #[serde(other)]
    Unknown,
}

/// One validated inbound message.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub message_id: Option<String>,
    pub payload: MessagePayload,
    kind: String,
    data: Map<String, Value>,
}

impl Message {
    /// Decodes raw event data. Non-objects and objects without a string `type` are
    /// rejected. Mistyped fields of known types decode as their defaults.
    pub fn parse(data: &Value) -> AuthorizeResult<Self> {
        let Value::Object(object) = data else {
            return Err(AuthorizeError::InvalidMessage(
                "message data is not an object".into(),
            ));
        };
        let Some(kind) = object.get("type").and_then(Value::as_str) else {
            return Err(AuthorizeError::InvalidMessage(
                "message data has no type".into(),
            ));
        };

        let payload = MessagePayload::deserialize(data)
            .map_err(|error| AuthorizeError::InvalidMessage(format!("{kind}: {error}")))?;

        Ok(Self {
            message_id: object
                .get(MESSAGE_ID_KEY)
                .and_then(Value::as_str)
                .map(str::to_owned),
            payload,
            kind: kind.to_owned(),
            data: object.clone(),
        })
    }

    /// Builds a locally synthesized message that never crossed a document boundary.
    pub fn synthesized(payload: MessagePayload, kind: &str) -> Self {
        let mut data = Map::new();
        data.insert("type".into(), Value::String(kind.to_owned()));
        Self {
            message_id: None,
            payload,
            kind: kind.to_owned(),
            data,
        }
    }

    pub fn windoid_opened() -> Self {
        Self::synthesized(MessagePayload::WindoidOpened, "windoidopened")
    }

    pub fn windoid_closed() -> Self {
        Self::synthesized(MessagePayload::WindoidClosed, "windoidclosed")
    }

    /// The raw `type` tag.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Message data as a JSON value, suitable as a host event `detail`.
    pub fn to_value(&self) -> Value {
        Value::Object(self.data.clone())
    }

    /// `true` when the message has both a `messageId` and a `type`.
    pub fn is_trackable(&self) -> bool {
        self.message_id.is_some()
    }
}

/// Messages the SDK posts into the authorization frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    #[serde(rename = "namesubmitted", rename_all = "camelCase")]
    NameSubmitted {
        #[serde(skip_serializing_if = "Option::is_none")]
        first_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        last_name: Option<String>,
    },
    #[serde(rename = "emailsubmitted", rename_all = "camelCase")]
    EmailSubmitted { email: String, hide_change: bool },
}

impl OutboundMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundMessage::NameSubmitted { .. } => "namesubmitted",
            OutboundMessage::EmailSubmitted { .. } => "emailsubmitted",
        }
    }

    /// Serializes the message with `messageId` stamped in.
    pub fn to_value_with_id(&self, message_id: &str) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()));
        if let Value::Object(object) = &mut value {
            object.insert(MESSAGE_ID_KEY.into(), Value::String(message_id.to_owned()));
        }
        value
    }

    /// Email carried by the message, used to tag transmission analytics.
    pub fn email(&self) -> Option<&str> {
        match self {
            OutboundMessage::EmailSubmitted { email, .. } => Some(email),
            OutboundMessage::NameSubmitted { .. } => None,
        }
    }
}
