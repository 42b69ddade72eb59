//! Core lifecycle orchestration for dbin
//!
//! This crate provides:
//! - Image provisioning with aggregated pull progress
//! - Topology creation and teardown (single containers or small clusters on a private network)
//! - Readiness probing with bounded retries
//! - Interactive client sessions (exec, sidecar container, or browser UI)
//! - The coordinator that ties them together and guarantees exactly-once cleanup

mod client;
mod error;
mod image;
mod instance;
mod lifecycle;
mod logs;
mod progress;
mod readiness;
mod signal;
mod terminal;
mod topology;

pub use client::*;
pub use error::*;
pub use image::*;
pub use instance::*;
pub use lifecycle::*;
pub use progress::*;
pub use readiness::*;
pub use signal::*;
pub use topology::*;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
