//! Generator services implementations

pub mod content_service;
pub mod cost_tracker;
pub mod generation_client;
pub mod http;
pub mod image_service;
pub mod rate_limiter;
pub mod response_cache;
pub mod usage_tracker;

#[cfg(test)]
pub mod tests;

pub use content_service::ContentService;
pub use cost_tracker::CostTracker;
pub use generation_client::{ClientContext, GenerationClient};
pub use image_service::ImageService;
pub use rate_limiter::RateLimiter;
pub use response_cache::ResponseCache;
pub use usage_tracker::UsageTracker;
