//! In-memory platform adapters for native hosts and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use serde_json::Value;

use crate::element::events::{EventDispatcher, HostEvent};
use crate::platform::channel::{
    ChannelError, EnvelopeListener, FrameHandle, MessageChannel, MessageEnvelope,
    PageEventCallback, PopupWindow, ViewportMetrics, WindoidHost, WindowId,
};
use crate::util::subscribe::Subscription;

static NEXT_WINDOW_ID: AtomicU64 = AtomicU64::new(1);

/// Allocates a process-unique window id.
pub fn next_window_id() -> WindowId {
    WindowId::new(NEXT_WINDOW_ID.fetch_add(1, Ordering::Relaxed))
}

#[derive(Default)]
struct ListenerSet {
    next_id: u64,
    listeners: Vec<(u64, EnvelopeListener)>,
}

/// Message channel whose events are delivered by calling [`MemoryMessageChannel::deliver`].
#[derive(Clone, Default)]
pub struct MemoryMessageChannel {
    inner: Arc<Mutex<ListenerSet>>,
}

impl MemoryMessageChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers `envelope` to a snapshot of the attached listeners.
    pub fn deliver(&self, envelope: MessageEnvelope) {
        let listeners: Vec<EnvelopeListener> = {
            let set = self.inner.lock().unwrap();
            set.listeners.iter().map(|(_, listener)| listener.clone()).collect()
        };
        for listener in listeners {
            listener(&envelope);
        }
    }

    pub fn post(&self, origin: &str, source: Option<WindowId>, data: Value) {
        self.deliver(MessageEnvelope::new(origin, source, data));
    }

    pub fn listener_count(&self) -> usize {
        self.inner.lock().unwrap().listeners.len()
    }
}

impl MessageChannel for MemoryMessageChannel {
    fn listen(&self, listener: EnvelopeListener) -> Subscription {
        let id = {
            let mut set = self.inner.lock().unwrap();
            set.next_id += 1;
            let id = set.next_id;
            set.listeners.push((id, listener));
            id
        };
        let inner: Weak<Mutex<ListenerSet>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner
                    .lock()
                    .unwrap()
                    .listeners
                    .retain(|(listener_id, _)| *listener_id != id);
            }
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PostedMessage {
    pub data: Value,
    pub target_origin: String,
}

/// Iframe stand-in. Records every message posted to its content window.
#[derive(Default)]
pub struct MemoryFrame {
    content_window: Mutex<Option<WindowId>>,
    posted: Mutex<Vec<PostedMessage>>,
    fail_posts: AtomicBool,
}

impl MemoryFrame {
    /// A frame whose content window is already attached.
    pub fn attached() -> Arc<Self> {
        let frame = Self::default();
        *frame.content_window.lock().unwrap() = Some(next_window_id());
        Arc::new(frame)
    }

    pub fn detached() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_content_window(&self, window: Option<WindowId>) {
        *self.content_window.lock().unwrap() = window;
    }

    pub fn posted(&self) -> Vec<PostedMessage> {
        self.posted.lock().unwrap().clone()
    }

    pub fn fail_posts(&self, fail: bool) {
        self.fail_posts.store(fail, Ordering::SeqCst);
    }
}

impl FrameHandle for MemoryFrame {
    fn content_window(&self) -> Option<WindowId> {
        *self.content_window.lock().unwrap()
    }

    fn post_message(&self, data: &Value, target_origin: &str) -> Result<(), ChannelError> {
        if self.fail_posts.load(Ordering::SeqCst) {
            return Err(ChannelError::new("postMessage failed"));
        }
        if self.content_window().is_none() {
            return Err(ChannelError::new("iframe has no content window"));
        }
        self.posted.lock().unwrap().push(PostedMessage {
            data: data.clone(),
            target_origin: target_origin.to_owned(),
        });
        Ok(())
    }
}

#[derive(Debug)]
pub struct MemoryPopup {
    id: WindowId,
    closed: AtomicBool,
}

impl MemoryPopup {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: next_window_id(),
            closed: AtomicBool::new(false),
        })
    }

    /// Simulates the user closing the popup themselves.
    pub fn close_by_user(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl PopupWindow for MemoryPopup {
    fn id(&self) -> WindowId {
        self.id
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Clone, Debug)]
pub struct OpenedPopup {
    pub url: String,
    pub name: String,
    pub features: String,
    pub popup: Arc<MemoryPopup>,
}

#[derive(Default)]
struct PageListeners {
    next_id: u64,
    by_event: HashMap<String, Vec<(u64, PageEventCallback)>>,
}

/// Parent page stand-in for the windoid coordinator.
#[derive(Default)]
pub struct MemoryWindoidHost {
    channel: MemoryMessageChannel,
    viewport: Mutex<ViewportMetrics>,
    opened: Mutex<Vec<OpenedPopup>>,
    page_listeners: Arc<Mutex<PageListeners>>,
    block_popups: AtomicBool,
}

impl MemoryWindoidHost {
    pub fn new(viewport: ViewportMetrics) -> Arc<Self> {
        let host = Self::default();
        *host.viewport.lock().unwrap() = viewport;
        Arc::new(host)
    }

    pub fn channel(&self) -> &MemoryMessageChannel {
        &self.channel
    }

    pub fn opened(&self) -> Vec<OpenedPopup> {
        self.opened.lock().unwrap().clone()
    }

    pub fn last_popup(&self) -> Option<Arc<MemoryPopup>> {
        self.opened.lock().unwrap().last().map(|opened| opened.popup.clone())
    }

    pub fn block_popups(&self, block: bool) {
        self.block_popups.store(block, Ordering::SeqCst);
    }

    /// Fires `event` on the page. Listeners are `once`, so they are removed before running.
    pub fn fire_page_event(&self, event: &str) {
        let callbacks = self
            .page_listeners
            .lock()
            .unwrap()
            .by_event
            .remove(event)
            .unwrap_or_default();
        for (_, callback) in callbacks {
            callback();
        }
    }

    pub fn page_listener_count(&self) -> usize {
        self.page_listeners
            .lock()
            .unwrap()
            .by_event
            .values()
            .map(Vec::len)
            .sum()
    }
}

impl MessageChannel for MemoryWindoidHost {
    fn listen(&self, listener: EnvelopeListener) -> Subscription {
        self.channel.listen(listener)
    }
}

impl WindoidHost for MemoryWindoidHost {
    fn viewport(&self) -> ViewportMetrics {
        *self.viewport.lock().unwrap()
    }

    fn open_popup(&self, url: &str, name: &str, features: &str) -> Option<Arc<dyn PopupWindow>> {
        if self.block_popups.load(Ordering::SeqCst) {
            return None;
        }
        let popup = MemoryPopup::new();
        self.opened.lock().unwrap().push(OpenedPopup {
            url: url.to_owned(),
            name: name.to_owned(),
            features: features.to_owned(),
            popup: popup.clone(),
        });
        Some(popup)
    }

    fn add_page_listener(&self, event: &str, callback: PageEventCallback) -> Subscription {
        let id = {
            let mut listeners = self.page_listeners.lock().unwrap();
            listeners.next_id += 1;
            let id = listeners.next_id;
            listeners
                .by_event
                .entry(event.to_owned())
                .or_default()
                .push((id, callback));
            id
        };
        let listeners = Arc::downgrade(&self.page_listeners);
        let event = event.to_owned();
        Subscription::new(move || {
            if let Some(listeners) = listeners.upgrade() {
                let mut listeners = listeners.lock().unwrap();
                if let Some(callbacks) = listeners.by_event.get_mut(&event) {
                    callbacks.retain(|(callback_id, _)| *callback_id != id);
                    if callbacks.is_empty() {
                        listeners.by_event.remove(&event);
                    }
                }
            }
        })
    }
}

/// Host element stand-in that records dispatched events.
#[derive(Debug, Default)]
pub struct MemoryElement {
    events: Mutex<Vec<HostEvent>>,
}

impl MemoryElement {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<HostEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn event_names(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|event| event.name.clone())
            .collect()
    }
}

impl EventDispatcher for MemoryElement {
    fn dispatch_event(&self, event: HostEvent) -> bool {
        self.events.lock().unwrap().push(event);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn channel_listener_can_remove_itself_mid_delivery() {
        let channel = MemoryMessageChannel::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let counter = calls.clone();
        let own = slot.clone();
        let subscription = channel.listen(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            own.lock().unwrap().take();
        }));
        *slot.lock().unwrap() = Some(subscription);

        channel.post("https://shop.app", None, json!({"type": "loaded"}));
        channel.post("https://shop.app", None, json!({"type": "loaded"}));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(channel.listener_count(), 0);
    }

    #[test]
    fn page_listeners_fire_once() {
        let host = MemoryWindoidHost::new(ViewportMetrics::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let _subscription = host.add_page_listener(
            "pagehide",
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        host.fire_page_event("pagehide");
        host.fire_page_event("pagehide");

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(host.page_listener_count(), 0);
    }
}
