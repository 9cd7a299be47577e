pub mod channel;
pub mod environment;
pub mod memory;
pub mod runtime;

#[cfg(all(feature = "wasm-web", target_arch = "wasm32"))]
pub mod browser;

pub use channel::{
    ChannelError, EnvelopeListener, FrameHandle, MessageChannel, MessageEnvelope,
    PageEventCallback, PopupWindow, ViewportMetrics, WindoidHost, WindowId,
};
