//! `web-sys` implementations of the platform seams.
//!
//! Listener handles own their `Closure` and remove it from the target on drop. Browser
//! objects are only touched from the main thread, hence the `Send`/`Sync` impls.

use std::cell::RefCell;
use std::sync::{Arc, LazyLock};

use js_sys::Object;
use serde_json::Value;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{
    AddEventListenerOptions, CustomEvent, CustomEventInit, Element, EventTarget, HtmlIFrameElement,
    MessageEvent, Window,
};

use crate::element::events::{EventDispatcher, HostEvent};
use crate::logger::Logger;
use crate::platform::channel::{
    ChannelError, EnvelopeListener, FrameHandle, MessageChannel, MessageEnvelope,
    PageEventCallback, PopupWindow, ViewportMetrics, WindoidHost, WindowId,
};
use crate::util::subscribe::Subscription;

static LOGGER: LazyLock<Logger> = LazyLock::new(|| Logger::new("@shop-login/browser"));

thread_local! {
    static WINDOWS: RefCell<Vec<(WindowId, Object)>> = const { RefCell::new(Vec::new()) };
}

/// Stable id for a window object. `MessageEvent.source` is compared by identity, so the
/// same object always maps to the same id.
pub fn window_id(window: &Object) -> WindowId {
    WINDOWS.with(|windows| {
        let mut windows = windows.borrow_mut();
        if let Some((id, _)) = windows.iter().find(|(_, known)| Object::is(known, window)) {
            return *id;
        }
        let id = WindowId::new(windows.len() as u64 + 1);
        windows.push((id, window.clone()));
        id
    })
}

fn log_js_error(operation: &str, error: JsValue) {
    LOGGER.warn(format!("{operation} failed: {error:?}"));
}

fn to_json(value: &JsValue) -> Value {
    js_sys::JSON::stringify(value)
        .ok()
        .and_then(|text| text.as_string())
        .and_then(|text| serde_json::from_str(&text).ok())
        .unwrap_or(Value::Null)
}

fn to_js(value: &Value) -> Result<JsValue, ChannelError> {
    let text = serde_json::to_string(value).map_err(|error| ChannelError::new(error.to_string()))?;
    js_sys::JSON::parse(&text).map_err(|error| ChannelError::new(format!("{error:?}")))
}

struct ListenerHandle {
    target: EventTarget,
    event: String,
    callback: Closure<dyn FnMut(web_sys::Event)>,
}

impl ListenerHandle {
    fn attach(
        target: EventTarget,
        event: &str,
        callback: Closure<dyn FnMut(web_sys::Event)>,
        once: bool,
    ) -> Result<Self, JsValue> {
        let options = AddEventListenerOptions::new();
        options.set_once(once);
        target.add_event_listener_with_callback_and_add_event_listener_options(
            event,
            callback.as_ref().unchecked_ref(),
            &options,
        )?;
        Ok(Self {
            target,
            event: event.to_owned(),
            callback,
        })
    }

    fn into_subscription(self) -> Subscription {
        Subscription::new(move || drop(self))
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Err(error) = self
            .target
            .remove_event_listener_with_callback(&self.event, self.callback.as_ref().unchecked_ref())
        {
            log_js_error("removeEventListener", error);
        }
    }
}

unsafe impl Send for ListenerHandle {}
unsafe impl Sync for ListenerHandle {}

/// `message` events of a window.
#[derive(Clone)]
pub struct WindowMessageChannel {
    window: Window,
}

impl WindowMessageChannel {
    pub fn new(window: Window) -> Self {
        Self { window }
    }

    pub fn current() -> Option<Self> {
        web_sys::window().map(Self::new)
    }
}

unsafe impl Send for WindowMessageChannel {}
unsafe impl Sync for WindowMessageChannel {}

impl MessageChannel for WindowMessageChannel {
    fn listen(&self, listener: EnvelopeListener) -> Subscription {
        let callback = Closure::wrap(Box::new(move |event: web_sys::Event| {
            let Ok(event) = event.dyn_into::<MessageEvent>() else {
                return;
            };
            let envelope = MessageEnvelope::new(
                event.origin(),
                event.source().map(|source| window_id(&source)),
                to_json(&event.data()),
            );
            listener(&envelope);
        }) as Box<dyn FnMut(web_sys::Event)>);

        let target: EventTarget = self.window.clone().unchecked_into();
        match ListenerHandle::attach(target, "message", callback, false) {
            Ok(handle) => handle.into_subscription(),
            Err(error) => {
                log_js_error("addEventListener(message)", error);
                Subscription::noop()
            }
        }
    }
}

/// The authorization iframe.
#[derive(Clone)]
pub struct IframeHandle {
    iframe: HtmlIFrameElement,
}

impl IframeHandle {
    pub fn new(iframe: HtmlIFrameElement) -> Self {
        Self { iframe }
    }
}

unsafe impl Send for IframeHandle {}
unsafe impl Sync for IframeHandle {}

impl FrameHandle for IframeHandle {
    fn content_window(&self) -> Option<WindowId> {
        self.iframe
            .content_window()
            .map(|window| window_id(window.unchecked_ref()))
    }

    fn post_message(&self, data: &Value, target_origin: &str) -> Result<(), ChannelError> {
        let window = self
            .iframe
            .content_window()
            .ok_or_else(|| ChannelError::new("iframe has no content window"))?;
        window
            .post_message(&to_js(data)?, target_origin)
            .map_err(|error| ChannelError::new(format!("{error:?}")))
    }
}

pub struct BrowserPopup {
    window: Window,
    id: WindowId,
}

unsafe impl Send for BrowserPopup {}
unsafe impl Sync for BrowserPopup {}

impl PopupWindow for BrowserPopup {
    fn id(&self) -> WindowId {
        self.id
    }

    fn is_closed(&self) -> bool {
        self.window.closed().unwrap_or(true)
    }

    fn close(&self) {
        if let Err(error) = self.window.close() {
            log_js_error("window.close", error);
        }
    }
}

/// Parent page for the windoid path.
#[derive(Clone)]
pub struct BrowserWindoidHost {
    window: Window,
    channel: WindowMessageChannel,
}

impl BrowserWindoidHost {
    pub fn new(window: Window) -> Self {
        Self {
            channel: WindowMessageChannel::new(window.clone()),
            window,
        }
    }

    pub fn current() -> Option<Self> {
        web_sys::window().map(Self::new)
    }
}

unsafe impl Send for BrowserWindoidHost {}
unsafe impl Sync for BrowserWindoidHost {}

impl MessageChannel for BrowserWindoidHost {
    fn listen(&self, listener: EnvelopeListener) -> Subscription {
        self.channel.listen(listener)
    }
}

fn js_number(value: Result<JsValue, JsValue>) -> f64 {
    value.ok().and_then(|value| value.as_f64()).unwrap_or_default()
}

impl WindoidHost for BrowserWindoidHost {
    fn viewport(&self) -> ViewportMetrics {
        let window = &self.window;
        let document_element = window.document().and_then(|document| document.document_element());
        let screen = window.screen().ok();

        ViewportMetrics {
            screen_left: window.screen_x().map(f64::from).unwrap_or_default(),
            screen_top: window.screen_y().map(f64::from).unwrap_or_default(),
            inner_width: js_number(window.inner_width()),
            inner_height: js_number(window.inner_height()),
            client_width: document_element
                .as_ref()
                .map(|element| f64::from(element.client_width()))
                .unwrap_or_default(),
            client_height: document_element
                .as_ref()
                .map(|element| f64::from(element.client_height()))
                .unwrap_or_default(),
            screen_width: screen
                .as_ref()
                .and_then(|screen| screen.width().ok())
                .map(f64::from)
                .unwrap_or_default(),
            screen_height: screen
                .as_ref()
                .and_then(|screen| screen.height().ok())
                .map(f64::from)
                .unwrap_or_default(),
            avail_width: screen
                .as_ref()
                .and_then(|screen| screen.avail_width().ok())
                .map(f64::from)
                .unwrap_or_default(),
        }
    }

    fn open_popup(&self, url: &str, name: &str, features: &str) -> Option<Arc<dyn PopupWindow>> {
        match self.window.open_with_url_and_target_and_features(url, name, features) {
            Ok(Some(window)) => {
                let id = window_id(window.unchecked_ref());
                Some(Arc::new(BrowserPopup { window, id }))
            }
            Ok(None) => None,
            Err(error) => {
                log_js_error("window.open", error);
                None
            }
        }
    }

    fn add_page_listener(&self, event: &str, callback: PageEventCallback) -> Subscription {
        let mut callback = Some(callback);
        let closure = Closure::wrap(Box::new(move |_event: web_sys::Event| {
            if let Some(callback) = callback.take() {
                callback();
            }
        }) as Box<dyn FnMut(web_sys::Event)>);

        let target: EventTarget = self.window.clone().unchecked_into();
        match ListenerHandle::attach(target, event, closure, true) {
            Ok(handle) => handle.into_subscription(),
            Err(error) => {
                log_js_error("addEventListener", error);
                Subscription::noop()
            }
        }
    }
}

/// Host custom element receiving `CustomEvent`s.
#[derive(Clone)]
pub struct ElementEventDispatcher {
    element: Element,
}

impl ElementEventDispatcher {
    pub fn new(element: Element) -> Self {
        Self { element }
    }
}

unsafe impl Send for ElementEventDispatcher {}
unsafe impl Sync for ElementEventDispatcher {}

impl EventDispatcher for ElementEventDispatcher {
    fn dispatch_event(&self, event: HostEvent) -> bool {
        let init = CustomEventInit::new();
        init.set_bubbles(event.bubbles);
        init.set_composed(event.composed);
        init.set_cancelable(event.cancelable);
        if let Some(detail) = &event.detail {
            match to_js(detail) {
                Ok(detail) => init.set_detail(&detail),
                Err(error) => LOGGER.warn(format!("dropping detail of {}: {error}", event.name)),
            }
        }

        let custom = match CustomEvent::new_with_event_init_dict(&event.name, &init) {
            Ok(custom) => custom,
            Err(error) => {
                log_js_error("new CustomEvent", error);
                return false;
            }
        };
        self.element.dispatch_event(&custom).unwrap_or_else(|error| {
            log_js_error("dispatchEvent", error);
            false
        })
    }
}
