//! Typed handling of authorization frame messages.
//!
//! [`AuthorizeMessageDispatcher`] routes each accepted [`Message`] to the matching
//! [`AuthorizeEventHandlers`] callback and re-emits the events embedding pages listen for
//! on the host element.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::authorize::bus::MessageBus;
use crate::authorize::message::{Message, MessagePayload};
use crate::config::AuthDomains;
use crate::element::events::HostEventEmitter;
use crate::logger::Logger;
use crate::platform::runtime::spawn_detached;
use crate::util::subscribe::Subscription;

static LOGGER: LazyLock<Logger> = LazyLock::new(|| Logger::new("@shop-login/authorize-listener"));

pub const SIGN_IN_COMPLETED_EVENT: &str = "storefront:signincompleted";

/// Callbacks for authorization frame messages. Every method defaults to a no-op.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait AuthorizeEventHandlers: Send + Sync {
    fn on_authorize_step_changed(&self, _message: &Message) {}

    /// `close` and `close_requested`.
    fn on_close(&self) {}

    /// Awaited before the `completed` host event is dispatched.
    async fn on_complete(&self, _message: &Message) {}

    fn on_confirm_success(&self) {}

    fn on_continue_to_checkout(&self) {}

    fn on_custom_flow_side_effect(&self, _message: &Message) {}

    fn on_discount_saved(&self) {}

    fn on_email_change_requested(&self) {}

    fn on_error(&self, _message: &Message) {}

    /// `loaded` for the lead-capture variant of the frame, recognised by its `loginTitle`.
    fn on_lead_capture_loaded(&self, _message: &Message) {}

    fn on_loaded(&self, _message: &Message) {}

    fn on_modal_opened(&self) {}

    fn on_pop_up_opened(&self, _message: &Message) {}

    fn on_prequal_error(&self) {}

    fn on_prequal_missing_information(&self) {}

    fn on_prequal_ready(&self) {}

    fn on_prequal_success(&self) {}

    fn on_processing_status_updated(&self) {}

    fn on_prompt_change(&self) {}

    fn on_prompt_continue(&self) {}

    fn on_resize_iframe(&self, _width: f64, _height: f64) {}

    fn on_restarted(&self) {}

    fn on_shop_user_matched(&self, _message: &Message) {}

    fn on_shop_user_not_matched(&self, _message: &Message) {}

    fn on_stripe_link_user_found(&self, _message: &Message) {}

    fn on_unloaded(&self, _message: &Message) {}

    fn on_user_verified(&self, _message: &Message) {}

    fn on_verification_step_changed(&self, _message: &Message) {}
}

/// Handler set that ignores every message.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopHandlers;

impl AuthorizeEventHandlers for NoopHandlers {}

/// Origins the authorization frame may post from: both pay origins, then the core origin
/// and the storefront when requested.
pub fn authorize_allowed_origins(
    domains: &AuthDomains,
    include_core: bool,
    storefront_origin: Option<&str>,
) -> Vec<String> {
    let mut origins = vec![
        domains.pay_auth_domain.clone(),
        domains.pay_auth_domain_alt.clone(),
    ];
    if include_core {
        origins.push(domains.core_auth_domain.clone());
    }
    if let Some(storefront_origin) = storefront_origin {
        origins.push(storefront_origin.to_owned());
    }
    origins
}

/// Detail of `storefront:signincompleted`: the avatar the storefront theme renders.
pub fn sign_in_completed_detail(
    avatar: Option<&str>,
    given_name: Option<&str>,
    email: Option<&str>,
) -> Value {
    let initial = [given_name, email]
        .into_iter()
        .flatten()
        .find_map(|value| value.chars().next())
        .map(String::from)
        .unwrap_or_default();

    json!({
        "avatar": {
            "tag": "shop-user-avatar",
            "src": avatar.unwrap_or_default(),
            "initial": initial,
        }
    })
}

#[derive(Clone)]
pub struct AuthorizeMessageDispatcher {
    handlers: Arc<dyn AuthorizeEventHandlers>,
    emitter: HostEventEmitter,
}

impl AuthorizeMessageDispatcher {
    pub fn new(handlers: Arc<dyn AuthorizeEventHandlers>, emitter: HostEventEmitter) -> Self {
        Self { handlers, emitter }
    }

    /// Routes every message accepted by `bus` until the subscription is dropped.
    pub fn attach(&self, bus: &MessageBus) -> Subscription {
        let dispatcher = self.clone();
        bus.subscribe(move |message| dispatcher.handle(message))
    }

    pub fn handle(&self, message: &Message) {
        let handlers = &self.handlers;
        match &message.payload {
            MessagePayload::AuthorizeStepChanged { .. } => handlers.on_authorize_step_changed(message),
            MessagePayload::Close | MessagePayload::CloseRequested => handlers.on_close(),
            MessagePayload::Completed { .. } => self.complete(message.clone()),
            MessagePayload::ConfirmSuccess => handlers.on_confirm_success(),
            MessagePayload::ContinueToCheckout => handlers.on_continue_to_checkout(),
            MessagePayload::CustomFlowSideEffect => handlers.on_custom_flow_side_effect(message),
            MessagePayload::DiscountSaved => handlers.on_discount_saved(),
            MessagePayload::EmailChangeRequested => handlers.on_email_change_requested(),
            MessagePayload::Error {
                code,
                message: text,
                email,
            } => {
                handlers.on_error(message);
                self.emitter.emit(
                    "error",
                    Some(json!({"code": code, "message": text, "email": email})),
                    false,
                );
            }
            MessagePayload::Loaded { login_title, .. } => {
                self.emitter.emit("loaded", Some(message.to_value()), false);
                if login_title.is_some() || message.field("loginTitle").is_some() {
                    handlers.on_lead_capture_loaded(message);
                } else {
                    handlers.on_loaded(message);
                }
            }
            MessagePayload::StripeLinkUserFound => handlers.on_stripe_link_user_found(message),
            MessagePayload::Unloaded => handlers.on_unloaded(message),
            MessagePayload::ModalOpened => handlers.on_modal_opened(),
            MessagePayload::PopUpOpened => {
                handlers.on_pop_up_opened(message);
                self.emitter.emit("popuploading", Some(message.to_value()), false);
            }
            MessagePayload::ProcessingStatusUpdated => handlers.on_processing_status_updated(),
            MessagePayload::PrequalError => handlers.on_prequal_error(),
            MessagePayload::PrequalMissingInformation => handlers.on_prequal_missing_information(),
            MessagePayload::PrequalReady => handlers.on_prequal_ready(),
            MessagePayload::PrequalSuccess => handlers.on_prequal_success(),
            MessagePayload::ResizeIframe { width, height } => handlers.on_resize_iframe(*width, *height),
            MessagePayload::Restarted => {
                handlers.on_restarted();
                self.emitter.emit("restarted", None, false);
            }
            MessagePayload::ShopUserMatched => handlers.on_shop_user_matched(message),
            MessagePayload::ShopUserNotMatched => handlers.on_shop_user_not_matched(message),
            MessagePayload::UserVerified => handlers.on_user_verified(message),
            MessagePayload::VerificationStepChanged { .. } => {
                handlers.on_verification_step_changed(message)
            }
            MessagePayload::PromptChange => handlers.on_prompt_change(),
            MessagePayload::PromptContinue => handlers.on_prompt_continue(),
            MessagePayload::PrequalBuyerUpsertSuccessful
            | MessagePayload::WindoidOpened
            | MessagePayload::WindoidClosed
            | MessagePayload::Unknown => {
                LOGGER.debug(format!("no authorize handler for {}", message.kind()));
            }
        }
    }

    /// `on_complete` may suspend, so completion continues on a detached task.
    fn complete(&self, message: Message) {
        let handlers = Arc::clone(&self.handlers);
        let emitter = self.emitter.clone();
        spawn_detached(async move {
            handlers.on_complete(&message).await;
            emitter.emit("completed", Some(message.to_value()), false);

            if let MessagePayload::Completed {
                logged_in: true,
                should_finalize_login: true,
                avatar,
                given_name,
                email,
                ..
            } = &message.payload
            {
                emitter.emit(
                    SIGN_IN_COMPLETED_EVENT,
                    Some(sign_in_completed_detail(
                        avatar.as_deref(),
                        given_name.as_deref(),
                        email.as_deref(),
                    )),
                    true,
                );
            }
        });
    }
}
