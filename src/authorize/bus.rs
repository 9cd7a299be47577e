//! Validated fan-out of cross-document messages from one iframe or window.
//!
//! A [`MessageBus`] attaches a single listener to the page's message channel. Each raw
//! envelope must come from the tracked source window and from an allowed origin before it
//! is parsed and handed to every subscriber. Subscribers run synchronously, in
//! registration order, over a snapshot of the set, so any of them may add or remove
//! subscriptions (including its own) while a message is being dispatched.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock, Mutex, Weak};
use std::task::{Context, Poll};

use futures::channel::oneshot;

use crate::analytics::{AnalyticsTracker, MessageDirection};
use crate::authorize::error::{AuthorizeError, AuthorizeResult};
use crate::authorize::message::Message;
use crate::logger::Logger;
use crate::platform::{FrameHandle, MessageChannel, MessageEnvelope, WindowId};
use crate::util::abort::AbortSignal;
use crate::util::subscribe::Subscription;
use crate::util::validators::is_allowed_origin;

static LOGGER: LazyLock<Logger> = LazyLock::new(|| Logger::new("@shop-login/message-bus"));

pub type MessageHandler = Arc<dyn Fn(&Message) + Send + Sync + 'static>;

/// Where trusted messages must come from.
#[derive(Clone)]
pub enum SourceRef {
    /// The frame's current content window.
    Iframe(Arc<dyn FrameHandle>),
    /// A window reference that may be swapped, for example when a popup is reopened.
    Window(Arc<Mutex<Option<WindowId>>>),
}

impl SourceRef {
    pub fn iframe(frame: Arc<dyn FrameHandle>) -> Self {
        SourceRef::Iframe(frame)
    }

    pub fn window(window: Option<WindowId>) -> Self {
        SourceRef::Window(Arc::new(Mutex::new(window)))
    }

    /// Points a window reference at `window`. Has no effect on iframe references.
    pub fn set_window(&self, window: Option<WindowId>) {
        if let SourceRef::Window(current) = self {
            *current.lock().unwrap() = window;
        }
    }

    pub fn current(&self) -> Option<WindowId> {
        match self {
            SourceRef::Iframe(frame) => frame.content_window(),
            SourceRef::Window(window) => *window.lock().unwrap(),
        }
    }
}

impl fmt::Debug for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceRef::Iframe(_) => f.debug_tuple("Iframe").field(&self.current()).finish(),
            SourceRef::Window(_) => f.debug_tuple("Window").field(&self.current()).finish(),
        }
    }
}

pub struct BusOptions {
    pub allowed_origins: Vec<String>,
    pub source: SourceRef,
    /// Receives a transmission event for every trackable inbound message.
    pub tracker: Option<AnalyticsTracker>,
}

impl BusOptions {
    pub fn new(allowed_origins: Vec<String>, source: SourceRef) -> Self {
        Self {
            allowed_origins,
            source,
            tracker: None,
        }
    }

    pub fn with_tracker(mut self, tracker: AnalyticsTracker) -> Self {
        self.tracker = Some(tracker);
        self
    }
}

#[derive(Default)]
struct SubscriberSet {
    next_id: u64,
    handlers: Vec<(u64, MessageHandler)>,
}

struct BusInner {
    allowed_origins: Vec<String>,
    source: SourceRef,
    tracker: Option<AnalyticsTracker>,
    subscribers: Mutex<SubscriberSet>,
    listener: Mutex<Option<Subscription>>,
    destroyed: AtomicBool,
}

/// Message bus for one logical source. Cheap to clone; clones share the subscriber set.
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

impl fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBus")
            .field("allowed_origins", &self.inner.allowed_origins)
            .field("source", &self.inner.source)
            .field("subscribers", &self.subscriber_count())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

impl MessageBus {
    /// Creates the bus and attaches its listener to `channel`.
    pub fn new<C>(channel: &C, options: BusOptions) -> Self
    where
        C: MessageChannel + ?Sized,
    {
        let inner = Arc::new(BusInner {
            allowed_origins: options.allowed_origins,
            source: options.source,
            tracker: options.tracker,
            subscribers: Mutex::new(SubscriberSet::default()),
            listener: Mutex::new(None),
            destroyed: AtomicBool::new(false),
        });

        let weak = Arc::downgrade(&inner);
        let listener = channel.listen(Arc::new(move |envelope: &MessageEnvelope| {
            if let Some(inner) = weak.upgrade() {
                inner.dispatch(envelope);
            }
        }));
        *inner.listener.lock().unwrap() = Some(listener);

        Self { inner }
    }

    pub fn allowed_origins(&self) -> &[String] {
        &self.inner.allowed_origins
    }

    pub fn source(&self) -> &SourceRef {
        &self.inner.source
    }

    /// Registers `handler` for every accepted message until the subscription is dropped.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        subscribe_handler(&self.inner, Arc::new(handler))
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().unwrap().handlers.len()
    }

    /// Detaches the bus from the message channel. Calling it again does nothing.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        let listener = self.inner.listener.lock().unwrap().take();
        drop(listener);
        LOGGER.debug("message bus destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    /// Resolves with the first accepted message whose type is `kind`.
    ///
    /// The waiter registers synchronously, so a message dispatched right after this call
    /// is observed. It settles exactly once: with the message, or with
    /// [`AuthorizeError::Cancelled`] when `signal` is (or becomes) aborted. Settling or
    /// dropping the waiter removes its subscriber.
    pub fn wait_for_message(&self, kind: &str, signal: Option<&AbortSignal>) -> MessageWaiter {
        let (sender, receiver) = oneshot::channel();

        if signal.is_some_and(AbortSignal::is_aborted) {
            let _ = sender.send(Err(AuthorizeError::Cancelled));
            return MessageWaiter::new(receiver, WaiterRegistration::default());
        }

        let registration = WaiterRegistration::default();
        let slot = Arc::new(Mutex::new(Some(sender)));

        let handler: MessageHandler = {
            let slot = Arc::clone(&slot);
            let registration = registration.clone();
            let kind = kind.to_owned();
            Arc::new(move |message: &Message| {
                if !message.is(&kind) {
                    return;
                }
                let sender = slot.lock().unwrap().take();
                if let Some(sender) = sender {
                    registration.release();
                    let _ = sender.send(Ok(message.clone()));
                }
            })
        };
        registration.set_subscriber(subscribe_handler(&self.inner, handler));

        if let Some(signal) = signal {
            let slot = Arc::clone(&slot);
            let on_abort_registration = registration.clone();
            let abort = signal.on_abort(move || {
                let sender = slot.lock().unwrap().take();
                if let Some(sender) = sender {
                    on_abort_registration.release();
                    let _ = sender.send(Err(AuthorizeError::Cancelled));
                }
            });
            registration.set_abort(abort);
        }

        MessageWaiter::new(receiver, registration)
    }
}

fn subscribe_handler(inner: &Arc<BusInner>, handler: MessageHandler) -> Subscription {
    let id = {
        let mut set = inner.subscribers.lock().unwrap();
        set.next_id += 1;
        let id = set.next_id;
        set.handlers.push((id, handler));
        id
    };

    let weak: Weak<BusInner> = Arc::downgrade(inner);
    Subscription::new(move || {
        if let Some(inner) = weak.upgrade() {
            let removed = {
                let mut set = inner.subscribers.lock().unwrap();
                let position = set.handlers.iter().position(|(handler_id, _)| *handler_id == id);
                position.map(|position| set.handlers.remove(position))
            };
            drop(removed);
        }
    })
}

impl BusInner {
    fn dispatch(&self, envelope: &MessageEnvelope) {
        let expected = self.source.current();
        if expected.is_none() || envelope.source != expected {
            return;
        }

        if !is_allowed_origin(&self.allowed_origins, &envelope.origin) {
            LOGGER.error(format!(
                "Origin mismatch for message event: {}",
                envelope.origin
            ));
            return;
        }

        let message = match Message::parse(&envelope.data) {
            Ok(message) => message,
            Err(error) => {
                LOGGER.warn(format!("Dropping message from {}: {error}", envelope.origin));
                return;
            }
        };

        let handlers: Vec<MessageHandler> = {
            let set = self.subscribers.lock().unwrap();
            set.handlers.iter().map(|(_, handler)| Arc::clone(handler)).collect()
        };
        for handler in handlers {
            handler(&message);
        }

        if let (Some(tracker), Some(message_id)) = (&self.tracker, &message.message_id) {
            tracker.track_post_message_transmission(
                MessageDirection::Incoming,
                message.kind(),
                Some(message_id),
                None,
            );
        }
    }
}

/// Subscriptions owned by one pending wait. Released when the wait settles or is dropped.
#[derive(Clone, Default)]
struct WaiterRegistration {
    subscriber: Arc<Mutex<Option<Subscription>>>,
    abort: Arc<Mutex<Option<Subscription>>>,
}

impl WaiterRegistration {
    fn set_subscriber(&self, subscription: Subscription) {
        *self.subscriber.lock().unwrap() = Some(subscription);
    }

    fn set_abort(&self, subscription: Subscription) {
        *self.abort.lock().unwrap() = Some(subscription);
    }

    fn release(&self) {
        let subscriber = self.subscriber.lock().unwrap().take();
        let abort = self.abort.lock().unwrap().take();
        drop(subscriber);
        drop(abort);
    }
}

/// Future returned by [`MessageBus::wait_for_message`].
#[must_use = "a waiter that is not awaited deregisters when dropped"]
pub struct MessageWaiter {
    receiver: oneshot::Receiver<AuthorizeResult<Message>>,
    registration: WaiterRegistration,
}

impl MessageWaiter {
    fn new(
        receiver: oneshot::Receiver<AuthorizeResult<Message>>,
        registration: WaiterRegistration,
    ) -> Self {
        Self {
            receiver,
            registration,
        }
    }
}

impl Future for MessageWaiter {
    type Output = AuthorizeResult<Message>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(AuthorizeError::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for MessageWaiter {
    fn drop(&mut self) {
        self.registration.release();
    }
}
