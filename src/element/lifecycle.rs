//! Custom element lifecycle as an explicit state machine.
//!
//! The DOM side forwards `connectedCallback`, `attributeChangedCallback`, property sets,
//! `disconnectedCallback` and public method calls; the renderer only ever sees complete
//! prop maps.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::diagnostics::ErrorReporter;
use crate::element::events::HostEventEmitter;
use crate::element::props::{PropValue, PropsMap};
use crate::util::errors::{ErrorName, ShopJsError};

pub type Props = BTreeMap<String, PropValue>;

/// UI framework boundary. Implementations re-render from the props they are given.
pub trait ElementRenderer: Send + Sync {
    fn render(&self, props: &Props);

    fn unmount(&self);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    Mounted,
    Unmounted,
}

pub struct ElementLifecycle {
    name: String,
    props_map: PropsMap,
    methods: Vec<String>,
    state: LifecycleState,
    props: Props,
    renderer: Arc<dyn ElementRenderer>,
    emitter: HostEventEmitter,
    reporter: Arc<dyn ErrorReporter>,
    listeners_ready: bool,
    queued_calls: Vec<(String, Option<Value>)>,
}

impl ElementLifecycle {
    pub fn new(
        name: impl Into<String>,
        props_map: PropsMap,
        methods: Vec<String>,
        renderer: Arc<dyn ElementRenderer>,
        emitter: HostEventEmitter,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        Self {
            name: name.into(),
            props_map,
            methods,
            state: LifecycleState::Created,
            props: Props::new(),
            renderer,
            emitter,
            reporter,
            listeners_ready: false,
            queued_calls: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn props(&self) -> &Props {
        &self.props
    }

    /// `connectedCallback`: reads every observed attribute and renders. Values stored by
    /// property sets before mount win over attributes.
    pub fn mount<F>(&mut self, read_attribute: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut props = self.props_map.read_all(read_attribute);
        props.extend(std::mem::take(&mut self.props));
        self.props = props;
        self.state = LifecycleState::Mounted;
        self.renderer.render(&self.props);
    }

    /// `attributeChangedCallback`. Ignored before mount and for unobserved attributes.
    pub fn update(&mut self, attribute: &str, value: Option<&str>) {
        if self.state != LifecycleState::Mounted {
            return;
        }
        let Some(spec) = self.props_map.get(attribute) else {
            return;
        };
        if let Some(parsed) = spec.kind.parse(value) {
            self.props.insert(spec.prop.clone(), parsed);
        }
        self.renderer.render(&self.props);
    }

    /// Property setter. Returns the attribute text to reflect, or `None` for unobserved
    /// properties. Setting a property on an element that is not mounted yet stores the value
    /// and mounts it.
    pub fn set_property(&mut self, attribute: &str, value: &str) -> Option<String> {
        let spec = self.props_map.get(attribute)?.clone();
        if self.state == LifecycleState::Mounted {
            self.update(attribute, Some(value));
        } else {
            if let Some(parsed) = spec.kind.parse(Some(value)) {
                self.props.insert(spec.prop.clone(), parsed);
            }
            self.mount(|_| None);
        }
        let reflected = self
            .props
            .get(&spec.prop)
            .map(|parsed| spec.kind.stringify(parsed))
            .unwrap_or_else(|| value.to_owned());
        Some(reflected)
    }

    /// `disconnectedCallback`.
    pub fn unmount(&mut self) {
        if self.state != LifecycleState::Mounted {
            return;
        }
        self.state = LifecycleState::Unmounted;
        self.listeners_ready = false;
        self.renderer.unmount();
    }

    /// Called once the mounted UI listens for method events; flushes queued calls.
    pub fn mark_listeners_ready(&mut self) {
        self.listeners_ready = true;
        for (method, args) in std::mem::take(&mut self.queued_calls) {
            self.emitter.emit(&method, args, false);
        }
    }

    /// Public element method such as `requestShow()`, forwarded as a host event once the UI
    /// listens for it.
    pub fn call_method(&mut self, method: &str, args: Option<Value>) {
        if !self.methods.iter().any(|known| known == method) {
            self.reporter.notify(ShopJsError::new(
                format!("Custom element {}: Error listening for methods", self.name),
                ErrorName::CustomElementMethodListenerError,
            ));
            return;
        }
        if self.listeners_ready {
            self.emitter.emit(method, args, false);
        } else {
            self.queued_calls.push((method.to_owned(), args));
        }
    }
}
