//! Analytics derived from SDK activity: modal state changes, user actions, cross-document
//! message transmissions, page impressions and feature initialization.
//!
//! Event wire formats belong to the host's producer; this module only decides what is sent
//! and when.

pub mod error;
mod events;
mod producer;
mod tracker;
mod trekkie;

pub use events::{
    AnalyticsData, AnalyticsEvent, MessageDirection, ModalState, ModalStateChange, UserAction,
    DEFAULT_FLOW_VERSION, FEATURE_INITIALIZE_SCHEMA, MODAL_STATE_CHANGE_SCHEMA,
    PAGE_IMPRESSION_SCHEMA, POST_MESSAGE_TRANSMISSION_SCHEMA, SDK_VERSION,
    SKIP_MESSAGE_EVENT_TYPES, USER_ACTION_SCHEMA,
};
pub use producer::{
    is_useful_error, AnalyticsProducer, AnalyticsSink, ErrorCallback, MemorySink, ProducerSink,
};
pub use tracker::{AnalyticsTracker, PageImpression};
pub use trekkie::{trekkie_attributes, TrekkieAttributes, TrekkieSource, DEFAULT_TREKKIE_ATTRIBUTES};
