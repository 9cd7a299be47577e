#![doc = include_str!("RUSTDOC.md")]

pub mod analytics;
pub mod authorize;
pub mod config;
pub mod diagnostics;
pub mod element;
pub mod logger;
pub mod platform;
pub mod util;
