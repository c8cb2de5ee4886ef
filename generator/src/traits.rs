//! Generator trait definitions for dependency injection

use async_trait::async_trait;
use shared::{ApiFailure, GenerationRequest, GenerationResult, ServiceKind};

use crate::error::ServiceResult;
use crate::types::BackendResponse;

/// One remote generation service, seen as a black-box RPC endpoint
#[mockall::automock]
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Which service this backend talks to
    fn service(&self) -> ServiceKind;

    /// Perform exactly one remote call, no retries
    async fn invoke(&self, request: &GenerationRequest) -> Result<BackendResponse, ApiFailure>;
}

/// Anything that turns a request into a result with the full client policy
/// (cache, budget, rate limit, retries) applied
#[mockall::automock]
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> ServiceResult<GenerationResult>;
}
