//! Flowsync Config
//!
//! This crate contains the serializable configuration types for flowsync:
//! where the build server lives, how its endpoints are laid out, banner
//! timings, and the flow definitions the editor exports.
//!
//! Configuration can be loaded from:
//! - JSON files (via CLI with `--config=config.json`)
//! - Defaults (every field has one, so an empty object is a valid config)

mod client;
mod error;
mod flow;

pub use client::{BannerConfig, ClientConfig};
pub use error::ConfigError;
pub use flow::{EdgeDef, FlowData, FlowDef, NodeDef};
