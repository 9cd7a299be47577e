//! Host custom element plumbing: events fired on the element, attribute parsing and the
//! mount/update/unmount lifecycle.

pub mod events;
pub mod lifecycle;
pub mod props;

pub use events::{EventDispatcher, HostEvent, HostEventEmitter};
pub use lifecycle::{ElementLifecycle, ElementRenderer, LifecycleState, Props};
pub use props::{PropSpec, PropType, PropValue, PropsMap};
