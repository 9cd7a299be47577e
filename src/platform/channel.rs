//! Platform seams for cross-document messaging and popup control.
//!
//! The authorize core never touches `window` directly; it receives these trait objects
//! from [`crate::platform::memory`] (native hosts, tests) or `platform::browser`
//! (`wasm-web`).

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::util::subscribe::Subscription;

/// Opaque identity of a browsing context (iframe content window or popup).
///
/// `MessageEvent.source` is compared by identity only, so adapters hand out a stable id
/// per window object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(u64);

impl WindowId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

/// Raw `message` event as delivered by the platform, before any validation.
#[derive(Clone, Debug, PartialEq)]
pub struct MessageEnvelope {
    pub origin: String,
    pub source: Option<WindowId>,
    pub data: Value,
}

impl MessageEnvelope {
    pub fn new(origin: impl Into<String>, source: Option<WindowId>, data: Value) -> Self {
        Self {
            origin: origin.into(),
            source,
            data,
        }
    }
}

pub type EnvelopeListener = Arc<dyn Fn(&MessageEnvelope) + Send + Sync + 'static>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelError {
    message: String,
}

impl ChannelError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ChannelError {}

/// The page-wide `message` event stream.
pub trait MessageChannel: Send + Sync {
    /// Attaches `listener` to every message event. Dropping the subscription detaches it.
    fn listen(&self, listener: EnvelopeListener) -> Subscription;
}

/// The authorization iframe embedded by the host element.
pub trait FrameHandle: Send + Sync {
    /// Current `contentWindow`, `None` until the frame is attached.
    fn content_window(&self) -> Option<WindowId>;

    fn post_message(&self, data: &Value, target_origin: &str) -> Result<(), ChannelError>;
}

/// Handle to a popup opened with `window.open`.
pub trait PopupWindow: Send + Sync {
    fn id(&self) -> WindowId;

    fn is_closed(&self) -> bool;

    fn close(&self);
}

/// Viewport and screen numbers needed to center a popup.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ViewportMetrics {
    pub screen_left: f64,
    pub screen_top: f64,
    pub inner_width: f64,
    pub inner_height: f64,
    pub client_width: f64,
    pub client_height: f64,
    pub screen_width: f64,
    pub screen_height: f64,
    pub avail_width: f64,
}

pub type PageEventCallback = Box<dyn FnOnce() + Send + 'static>;

/// Parent-page capabilities used by the windoid coordinator.
pub trait WindoidHost: MessageChannel {
    fn viewport(&self) -> ViewportMetrics;

    /// `window.open(url, name, features)`. `None` when the popup was blocked.
    fn open_popup(&self, url: &str, name: &str, features: &str) -> Option<Arc<dyn PopupWindow>>;

    /// Registers a `{ once: true }` listener for a page lifecycle event such as `pagehide`.
    fn add_page_listener(&self, event: &str, callback: PageEventCallback) -> Subscription;
}
