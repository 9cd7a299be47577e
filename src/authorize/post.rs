//! Outbound messages into the authorization frame.

use std::sync::{Arc, LazyLock};

use crate::analytics::{AnalyticsTracker, MessageDirection};
use crate::authorize::error::{AuthorizeError, AuthorizeResult};
use crate::authorize::message::OutboundMessage;
use crate::config::AuthDomains;
use crate::logger::Logger;
use crate::platform::FrameHandle;
use crate::util::ids::generate_uuid_v4;

static LOGGER: LazyLock<Logger> = LazyLock::new(|| Logger::new("@shop-login/post-message"));

/// Posts messages to the frame's content window, once per pay origin.
///
/// Each message is stamped with a fresh `messageId`. Delivery to both pay origins keeps
/// the protocol working while the frame migrates between them.
#[derive(Clone)]
pub struct MessagePoster {
    frame: Arc<dyn FrameHandle>,
    target_origins: Vec<String>,
    tracker: Option<AnalyticsTracker>,
}

impl MessagePoster {
    pub fn new(frame: Arc<dyn FrameHandle>, domains: &AuthDomains) -> Self {
        Self {
            frame,
            target_origins: domains.pay_origins().iter().map(|origin| (*origin).to_owned()).collect(),
            tracker: None,
        }
    }

    /// Records an outgoing transmission event for every message sent.
    pub fn with_tracker(mut self, tracker: AnalyticsTracker) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn target_origins(&self) -> &[String] {
        &self.target_origins
    }

    /// Sends `message` and returns its `messageId`.
    ///
    /// Fails without posting anything when the frame has no content window. A failure for
    /// one origin does not stop delivery to the other; the first failure is returned.
    pub fn post(&self, message: &OutboundMessage) -> AuthorizeResult<String> {
        if self.frame.content_window().is_none() {
            LOGGER.error(format!("content window undefined for event {}", message.kind()));
            return Err(AuthorizeError::Channel(format!(
                "content window undefined for event {}",
                message.kind()
            )));
        }

        let message_id = generate_uuid_v4();
        let data = message.to_value_with_id(&message_id);

        let mut first_error = None;
        for origin in &self.target_origins {
            if let Err(error) = self.frame.post_message(&data, origin) {
                LOGGER.warn(format!("failed to post {} to {origin}: {error}", message.kind()));
                first_error.get_or_insert(error);
            }
        }

        if let Some(tracker) = &self.tracker {
            tracker.track_post_message_transmission(
                MessageDirection::Outgoing,
                message.kind(),
                Some(&message_id),
                message.email(),
            );
        }

        match first_error {
            Some(error) => Err(error.into()),
            None => Ok(message_id),
        }
    }
}
