//! cfgdiff-core
//!
//! Core library for CFG-based structural diffing of native binaries.
//!
//! This crate defines the CFG feature model, the multi-level similarity
//! scoring, the rectangular assignment solver, the diff orchestrator, and
//! the analysis-provider contract (with a bundled Capstone provider).
//!
//! The goal is to keep all substantive logic here so it is fully testable
//! and reusable from multiple frontends (CLI, plugin hosts, etc.).

pub mod config;
pub mod diff;
pub mod matching;
pub mod model;
pub mod provider;
pub mod similarity;

/// Returns the library version as encoded at compile time.
///
/// Useful for tests and for frontends to report consistent version info.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
