//! Weft Test Harness - Shared fixtures and cross-crate scenarios
//!
//! This crate provides:
//! - An in-memory gossip mesh implementing the broadcaster middleware
//! - Party and feed fixtures producing signed feed blocks
//! - A minimal property model registered as `"test"`
//! - End-to-end pipeline scenarios

pub mod fixtures;
pub mod integration;
pub mod mesh;
pub mod test_model;

pub use fixtures::*;
pub use mesh::*;
pub use test_model::*;

use tracing_subscriber::EnvFilter;

/// Install a test-friendly subscriber once per process.
///
/// Honours `RUST_LOG`, defaulting to `warn`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
