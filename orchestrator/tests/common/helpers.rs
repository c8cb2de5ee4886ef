//! Test helpers and builder patterns for orchestrator tests
//!
//! `ScriptedBackend` stands in for a remote service: it answers from a
//! closure, can be slowed down per request and counts what it saw.
//! `EngineBuilder` wires two of them into a `BatchOrchestrator` writing to a
//! temporary directory.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use generator::{BackendResponse, ClientContext, GenerationBackend};
use orchestrator::services::JsonFileWriter;
use orchestrator::{BatchOrchestrator, PipelineOutcome, PipelineSettings};
use shared::{ApiFailure, EngineConfig, GenerationRequest, ServiceKind};

use super::fixtures::TestFixtures;

type Script = dyn Fn(&GenerationRequest, usize) -> Result<BackendResponse, ApiFailure> + Send + Sync;
type Delay = dyn Fn(&GenerationRequest) -> Duration + Send + Sync;

pub struct ScriptedBackend {
    service: ServiceKind,
    script: Box<Script>,
    delay: Box<Delay>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    payloads: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new<F>(service: ServiceKind, script: F) -> Self
    where
        F: Fn(&GenerationRequest, usize) -> Result<BackendResponse, ApiFailure> + Send + Sync + 'static,
    {
        Self {
            service,
            script: Box::new(script),
            delay: Box::new(|_| Duration::ZERO),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            payloads: Mutex::new(Vec::new()),
        }
    }

    /// Content service answering every prompt with a two-image article
    pub fn content() -> Self {
        Self::new(ServiceKind::Content, |request, _| {
            let keyword = TestFixtures::primary_keyword(&request.payload).unwrap_or_default();
            Ok(TestHelpers::response(
                TestFixtures::content_reply(&keyword),
                TestFixtures::CONTENT_UNITS,
            ))
        })
    }

    /// Image service returning a path built from the slot placeholder
    pub fn images() -> Self {
        Self::new(ServiceKind::Image, |request, _| {
            let placeholder = request.params["placeholder"].as_str().unwrap_or("image");
            Ok(TestHelpers::response(format!("images/{placeholder}.png"), 1))
        })
    }

    pub fn with_delay<F>(mut self, delay: F) -> Self
    where
        F: Fn(&GenerationRequest) -> Duration + Send + Sync + 'static,
    {
        self.delay = Box::new(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn payloads(&self) -> Vec<String> {
        self.payloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    fn service(&self) -> ServiceKind {
        self.service
    }

    async fn invoke(&self, request: &GenerationRequest) -> Result<BackendResponse, ApiFailure> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.payloads.lock().unwrap().push(request.payload.clone());

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        let delay = (self.delay)(request);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        (self.script)(request, call)
    }
}

/// Builder for a fully wired orchestrator over scripted backends
pub struct EngineBuilder {
    config: EngineConfig,
    content: Arc<ScriptedBackend>,
    images: Arc<ScriptedBackend>,
    output: PathBuf,
}

impl EngineBuilder {
    /// Defaults: cache off, no budget, fast retries
    pub fn new(output: &Path) -> Self {
        let mut config = EngineConfig::default();
        config.cache.enabled = false;
        config.retry.backoff_base = Duration::from_millis(1);
        config.retry.backoff_max = Duration::from_millis(5);

        Self {
            config,
            content: Arc::new(ScriptedBackend::content()),
            images: Arc::new(ScriptedBackend::images()),
            output: output.to_path_buf(),
        }
    }

    pub fn with_cache(mut self) -> Self {
        self.config.cache.enabled = true;
        self
    }

    pub fn with_token_budget(mut self, max_tokens: u64) -> Self {
        self.config.budget.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.config.retry.max_attempts = attempts;
        self
    }

    pub fn with_content(mut self, backend: ScriptedBackend) -> Self {
        self.content = Arc::new(backend);
        self
    }

    pub fn with_images(mut self, backend: ScriptedBackend) -> Self {
        self.images = Arc::new(backend);
        self
    }

    pub fn content(&self) -> Arc<ScriptedBackend> {
        self.content.clone()
    }

    pub fn images(&self) -> Arc<ScriptedBackend> {
        self.images.clone()
    }

    pub fn build(&self) -> BatchOrchestrator {
        BatchOrchestrator::with_backends(
            self.content.clone(),
            self.images.clone(),
            ClientContext::from_config(&self.config),
            Arc::new(JsonFileWriter::new(&self.output)),
        )
        .with_settings(PipelineSettings::from_config(&self.config))
    }
}

/// Helper functions for common test operations
pub struct TestHelpers;

impl TestHelpers {
    pub fn response(output: impl Into<String>, units: u64) -> BackendResponse {
        BackendResponse {
            output: output.into(),
            units,
            model_used: "scripted".to_string(),
            response_time: Duration::from_millis(1),
        }
    }

    pub fn keywords(outcomes: &[PipelineOutcome]) -> Vec<&str> {
        outcomes.iter().map(|o| o.keyword()).collect()
    }

    /// Parsed JSON document written for the record at `position`
    pub fn written(output: &Path, position: usize, keyword: &str) -> serde_json::Value {
        let path = JsonFileWriter::new(output).record_path(position, keyword);
        let raw = std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("{}: {e}", path.display()));
        serde_json::from_str(&raw).unwrap()
    }
}
