// src/config/mod.rs
pub mod feeds;

pub use feeds::{FeedsConfig, HttpConfig, SourceConfig, TargetConfig};
