//! Common test utilities and infrastructure
//!
//! Scripted backends, a builder for a fully wired `BatchOrchestrator` and the
//! keyword/reply fixtures shared by the end-to-end suites.

#![allow(dead_code)]

pub mod fixtures;
pub mod helpers;

// Re-export commonly used items for convenience
pub use fixtures::TestFixtures;
pub use helpers::{EngineBuilder, ScriptedBackend, TestHelpers};
