//! Tests for orchestrator services
//!
//! Both services touch the filesystem, so every test works inside its own
//! temporary directory.
