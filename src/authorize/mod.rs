//! Cross-document authorization core.
//!
//! An authorization frame (or popup) served from the pay domains talks to the host page
//! over `postMessage`. This module validates and types that traffic ([`bus`],
//! [`message`]), folds it into the modal state machine ([`state`]), builds the URLs the
//! frame loads ([`url`], [`request`]) and drives the flows built on top: the email
//! pre-check ([`email`]) and the popup path ([`windoid`]). [`AuthorizeSession`] wires all
//! of it around one frame.

pub mod bus;
pub mod email;
pub mod error;
pub mod listener;
pub mod load_timeout;
pub mod message;
pub mod post;
pub mod request;
pub mod session;
pub mod state;
pub mod url;
pub mod windoid;

pub use bus::{BusOptions, MessageBus, MessageHandler, MessageWaiter, SourceRef};
pub use email::{wait_for_captcha_challenge, EmailListener, EmailListenerOptions, EmailSubmission, InputKind};
pub use error::{AuthorizeError, AuthorizeResult};
pub use listener::{
    authorize_allowed_origins, AuthorizeEventHandlers, AuthorizeMessageDispatcher, NoopHandlers,
};
pub use load_timeout::LoadTimeout;
pub use message::{Message, MessagePayload, OutboundMessage};
pub use post::MessagePoster;
pub use request::{adjusted_ux_mode, build_pre_auth_url, AuthorizeRequest, PreAuthParams};
pub use session::{action_for_message, AuthorizeSession, SessionOptions, SessionServices};
pub use state::{
    reducer, AuthorizeAction, AuthorizeState, AuthorizeStateChange, AuthorizeStateStore,
    DismissMethod, ModalReason,
};
pub use url::{build_authorize_url, build_url_search_params, AuthorizeUrlParams, UxMode};
pub use windoid::{
    popup_center, PopupGeometry, WindoidCoordinator, WindoidEventHandlers, WindoidMessageHandler,
};
