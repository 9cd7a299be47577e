//! Popup ("windoid") coordination.
//!
//! A windoid is the authorization UI opened in a separate browser window instead of an
//! iframe. The coordinator opens it centered on the current screen, reports its lifecycle
//! as synthesized `windoidopened`/`windoidclosed` messages, closes it when the parent page
//! goes away and forwards validated traffic from it. At most one popup registration is
//! live per key; opening again tears the previous one down first.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex};
use std::time::Duration;

use crate::authorize::bus::{BusOptions, MessageBus, MessageHandler, SourceRef};
use crate::authorize::message::{Message, MessagePayload};
use crate::config::DEFAULT_WINDOID_POLL_INTERVAL;
use crate::element::events::HostEventEmitter;
use crate::logger::Logger;
use crate::platform::runtime::{sleep, spawn_detached};
use crate::platform::{PopupWindow, ViewportMetrics, WindoidHost};
use crate::util::subscribe::Subscription;

static LOGGER: LazyLock<Logger> = LazyLock::new(|| Logger::new("@shop-login/windoid"));

pub const WINDOID_KEY: &str = "SignInWithShop";
pub const WINDOID_NAME: &str = "SignInWithShop";
pub const WINDOID_WIDTH: f64 = 365.0;
pub const WINDOID_HEIGHT: f64 = 554.0;

/// Parent page events that close an open windoid.
pub const PAGE_CLOSE_EVENTS: [&str; 3] = ["beforeunload", "unload", "pagehide"];

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PopupGeometry {
    pub width: f64,
    pub height: f64,
    pub top: f64,
    pub left: f64,
}

impl PopupGeometry {
    /// `window.open` feature string.
    pub fn features(&self) -> String {
        format!(
            "popup,width={},height={},top={},left={}",
            self.width, self.height, self.top, self.left
        )
    }
}

fn first_non_zero(candidates: [f64; 3]) -> f64 {
    candidates
        .into_iter()
        .find(|value| *value != 0.0)
        .unwrap_or_default()
}

/// Centers a `width` x `height` popup over the current window, correcting for system zoom
/// and for windows placed on a secondary screen.
pub fn popup_center(metrics: &ViewportMetrics, width: f64, height: f64) -> PopupGeometry {
    let viewport_width = first_non_zero([metrics.inner_width, metrics.client_width, metrics.screen_width]);
    let viewport_height =
        first_non_zero([metrics.inner_height, metrics.client_height, metrics.screen_height]);

    let zoom = if metrics.avail_width > 0.0 {
        (viewport_width / metrics.avail_width).max(1.0)
    } else {
        1.0
    };

    PopupGeometry {
        width: width / zoom,
        height: height / zoom,
        left: (viewport_width - width) / 2.0 / zoom + metrics.screen_left,
        top: (viewport_height - height) / 2.0 / zoom + metrics.screen_top,
    }
}

/// Everything one open windoid keeps alive. Dropping it detaches all of it.
struct Registration {
    id: u64,
    bus: MessageBus,
    _messages: Subscription,
    _page_listeners: Vec<Subscription>,
    polling: Arc<AtomicBool>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.polling.store(false, Ordering::SeqCst);
        self.bus.destroy();
    }
}

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    entries: Mutex<HashMap<String, Registration>>,
}

impl Registry {
    fn remove(&self, key: &str, id: Option<u64>) {
        let removed = {
            let mut entries = self.entries.lock().unwrap();
            let current = entries
                .get(key)
                .is_some_and(|entry| id.map_or(true, |id| entry.id == id));
            if current {
                entries.remove(key)
            } else {
                None
            }
        };
        drop(removed);
    }
}

/// Opens windoids on a [`WindoidHost`]. Clones share the per-key registry.
#[derive(Clone)]
pub struct WindoidCoordinator {
    host: Arc<dyn WindoidHost>,
    allowed_origins: Vec<String>,
    poll_interval: Duration,
    registry: Arc<Registry>,
}

impl WindoidCoordinator {
    /// `allowed_origins` validates traffic posted from the popup.
    pub fn new(host: Arc<dyn WindoidHost>, allowed_origins: Vec<String>) -> Self {
        Self {
            host,
            allowed_origins,
            poll_interval: DEFAULT_WINDOID_POLL_INTERVAL,
            registry: Arc::new(Registry::default()),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Opens `url` in a centered popup and routes its lifecycle and messages to `callback`.
    ///
    /// Any windoid already registered under `key` is cleaned up first. Returns `None` when
    /// the popup was blocked; nothing is registered in that case.
    pub fn open<F>(&self, url: &str, callback: F, key: &str) -> Option<Arc<dyn PopupWindow>>
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        let geometry = popup_center(&self.host.viewport(), WINDOID_WIDTH, WINDOID_HEIGHT);
        self.cleanup(key);

        let Some(popup) = self.host.open_popup(url, WINDOID_NAME, &geometry.features()) else {
            LOGGER.warn("windoid popup was blocked");
            return None;
        };

        let callback: MessageHandler = Arc::new(callback);
        callback(&Message::windoid_opened());

        let page_listeners = PAGE_CLOSE_EVENTS
            .iter()
            .map(|event| {
                let popup = Arc::clone(&popup);
                self.host
                    .add_page_listener(event, Box::new(move || popup.close()))
            })
            .collect();

        let bus = MessageBus::new(
            &*self.host,
            BusOptions::new(
                self.allowed_origins.clone(),
                SourceRef::window(Some(popup.id())),
            ),
        );
        let messages = {
            let callback = Arc::clone(&callback);
            bus.subscribe(move |message| callback(message))
        };

        let id = self.registry.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let polling = Arc::new(AtomicBool::new(true));
        let previous = self.registry.entries.lock().unwrap().insert(
            key.to_owned(),
            Registration {
                id,
                bus,
                _messages: messages,
                _page_listeners: page_listeners,
                polling: Arc::clone(&polling),
            },
        );
        drop(previous);

        self.poll_closed(Arc::clone(&popup), callback, key.to_owned(), id, polling);
        Some(popup)
    }

    /// Removes the listeners and polling registered under `key`. Safe to call repeatedly.
    pub fn cleanup(&self, key: &str) {
        self.registry.remove(key, None);
    }

    pub fn is_open(&self, key: &str) -> bool {
        self.registry.entries.lock().unwrap().contains_key(key)
    }

    fn poll_closed(
        &self,
        popup: Arc<dyn PopupWindow>,
        callback: MessageHandler,
        key: String,
        id: u64,
        polling: Arc<AtomicBool>,
    ) {
        let registry = Arc::downgrade(&self.registry);
        let interval = self.poll_interval;
        spawn_detached(async move {
            loop {
                sleep(interval).await;
                if !polling.load(Ordering::SeqCst) {
                    return;
                }
                if popup.is_closed() {
                    polling.store(false, Ordering::SeqCst);
                    callback(&Message::windoid_closed());
                    if let Some(registry) = registry.upgrade() {
                        registry.remove(&key, Some(id));
                    }
                    return;
                }
            }
        });
    }
}

/// Callbacks for messages arriving through a windoid.
pub trait WindoidEventHandlers: Send + Sync {
    fn on_complete(&self, _message: &Message) {}

    fn on_custom_flow_side_effect(&self, _message: &Message) {}

    fn on_error(&self, _message: &Message) {}

    fn on_open(&self) {}

    fn on_close(&self) {}
}

/// Maps windoid messages to host events and closes the popup once the flow ends.
#[derive(Clone)]
pub struct WindoidMessageHandler {
    handlers: Arc<dyn WindoidEventHandlers>,
    emitter: HostEventEmitter,
    popup: Arc<Mutex<Option<Arc<dyn PopupWindow>>>>,
}

impl WindoidMessageHandler {
    pub fn new(handlers: Arc<dyn WindoidEventHandlers>, emitter: HostEventEmitter) -> Self {
        Self {
            handlers,
            emitter,
            popup: Arc::new(Mutex::new(None)),
        }
    }

    /// Tracks the popup to close. Set once [`WindoidCoordinator::open`] returns.
    pub fn set_popup(&self, popup: Option<Arc<dyn PopupWindow>>) {
        *self.popup.lock().unwrap() = popup;
    }

    fn close_popup(&self) {
        let popup = self.popup.lock().unwrap().clone();
        if let Some(popup) = popup {
            popup.close();
        }
    }

    pub fn handle(&self, message: &Message) {
        match &message.payload {
            MessagePayload::Completed { .. } => {
                self.handlers.on_complete(message);
                self.emitter.emit("completed", Some(message.to_value()), true);
                self.close_popup();
            }
            MessagePayload::CustomFlowSideEffect => {
                self.handlers.on_custom_flow_side_effect(message);
            }
            MessagePayload::Error { .. } => {
                self.handlers.on_error(message);
                self.emitter.emit("error", Some(message.to_value()), false);
                self.close_popup();
            }
            MessagePayload::WindoidOpened => {
                self.emitter.emit("windoidopened", None, false);
                self.handlers.on_open();
            }
            MessagePayload::Close | MessagePayload::WindoidClosed => {
                self.emitter.emit("windoidclosed", None, false);
                self.handlers.on_close();
                self.close_popup();
            }
            MessagePayload::PrequalBuyerUpsertSuccessful => {
                self.close_popup();
                self.emitter.emit("buyerOnboardingSuccess", None, false);
            }
            _ => {}
        }
    }
}
