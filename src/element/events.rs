use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::diagnostics::ErrorReporter;
use crate::util::errors::{ErrorName, ShopJsError};

/// `CustomEvent` fired on the host custom element.
///
/// Host events are always `composed` so they cross the shadow root, and never cancelable.
#[derive(Clone, Debug, PartialEq)]
pub struct HostEvent {
    pub name: String,
    pub detail: Option<Value>,
    pub bubbles: bool,
    pub composed: bool,
    pub cancelable: bool,
}

impl HostEvent {
    pub fn new(name: impl Into<String>, detail: Option<Value>, bubbles: bool) -> Self {
        Self {
            name: name.into(),
            detail,
            bubbles,
            composed: true,
            cancelable: false,
        }
    }
}

/// The host element as seen by the authorize core.
pub trait EventDispatcher: Send + Sync {
    /// Returns `false` when a listener called `preventDefault`.
    fn dispatch_event(&self, event: HostEvent) -> bool;
}

/// Dispatches host events on the element once it is attached, reporting dispatches that
/// happen without one.
#[derive(Clone)]
pub struct HostEventEmitter {
    element: Arc<Mutex<Option<Arc<dyn EventDispatcher>>>>,
    reporter: Arc<dyn ErrorReporter>,
}

impl HostEventEmitter {
    pub fn new(reporter: Arc<dyn ErrorReporter>) -> Self {
        Self {
            element: Arc::new(Mutex::new(None)),
            reporter,
        }
    }

    pub fn with_element(element: Arc<dyn EventDispatcher>, reporter: Arc<dyn ErrorReporter>) -> Self {
        let emitter = Self::new(reporter);
        emitter.attach(element);
        emitter
    }

    pub fn attach(&self, element: Arc<dyn EventDispatcher>) {
        *self.element.lock().unwrap() = Some(element);
    }

    pub fn detach(&self) {
        self.element.lock().unwrap().take();
    }

    pub fn emit(&self, name: &str, detail: Option<Value>, bubbles: bool) {
        let element = self.element.lock().unwrap().clone();
        match element {
            Some(element) => {
                element.dispatch_event(HostEvent::new(name, detail, bubbles));
            }
            None => self.reporter.notify(ShopJsError::new(
                "dispatchEvent called without a reference to the custom element.",
                ErrorName::UnhandledError,
            )),
        }
    }
}
