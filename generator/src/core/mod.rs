//! Generator core logic: pure functions shared by the services

pub mod fingerprint;
pub mod utils;

pub use fingerprint::fingerprint;
pub use utils::{estimate_content_units, retry_delay};
