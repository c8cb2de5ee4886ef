//! Tests for generator services
//!
//! Backends are replaced with mockall doubles or small hand-written fakes;
//! timing-sensitive tests run on tokio's paused clock.

pub mod rate_limiter;
