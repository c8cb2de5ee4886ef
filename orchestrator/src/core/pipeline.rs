//! Per-record pipeline driven as an explicit state machine
//!
//! `Pending → ContentGenerated → ImagesGenerated → Assembled → Done`, with
//! `Failed` reachable from every step. Each step returns the next state and
//! the driver loops until a terminal state is reached; nothing is raised past
//! the pipeline boundary.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use futures_util::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use generator::core::estimate_content_units;
use generator::{Generator, ServiceError};
use shared::{EngineConfig, GenerationRequest, GenerationResult, ServiceErrorKind};

use crate::core::article::{random_publication_date, slugify, ArticleParser};
use crate::core::prompt::{PromptHandler, PromptStage};
use crate::traits::OutputWriter;
use crate::types::{
    Article, ArticleDraft, FailedRecord, FailureReason, ImageOutcome, ImageSlot, KeywordRecord, PipelineOutcome, Stage,
};

/// Model parameters attached to every request of a run
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub content_params: serde_json::Value,
    pub max_tokens: u32,
    pub image_params: serde_json::Value,
    /// Image slots generated concurrently within one record
    pub image_concurrency: usize,
}

impl PipelineSettings {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            content_params: serde_json::json!({
                "model": config.api.default_model,
                "temperature": config.api.temperature,
                "max_tokens": config.api.max_tokens,
            }),
            max_tokens: config.api.max_tokens,
            image_params: serde_json::json!({
                "model": config.api.image_model,
                "width": 1024,
                "height": 768,
            }),
            image_concurrency: config.batch.image_concurrency.max(1),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

/// Collaborators shared by every pipeline of a run
#[derive(Clone)]
pub struct PipelineServices {
    pub content: Arc<dyn Generator>,
    pub images: Arc<dyn Generator>,
    pub writer: Arc<dyn OutputWriter>,
    pub prompts: Arc<PromptHandler>,
    pub parser: Arc<ArticleParser>,
    pub settings: Arc<PipelineSettings>,
}

impl PipelineServices {
    pub fn new(content: Arc<dyn Generator>, images: Arc<dyn Generator>, writer: Arc<dyn OutputWriter>) -> Self {
        Self {
            content,
            images,
            writer,
            prompts: Arc::new(PromptHandler::new()),
            parser: Arc::new(ArticleParser::new()),
            settings: Arc::new(PipelineSettings::default()),
        }
    }

    pub fn with_prompts(mut self, prompts: PromptHandler) -> Self {
        self.prompts = Arc::new(prompts);
        self
    }

    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = Arc::new(settings);
        self
    }
}

/// Where a record's pipeline currently is
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineState {
    Pending,
    ContentGenerated {
        content: GenerationResult,
    },
    ImagesGenerated {
        content: GenerationResult,
        draft: ArticleDraft,
        images: Vec<ImageOutcome>,
    },
    Assembled(Article),
    Done(Article),
    Failed(FailedRecord),
}

pub struct KeywordPipeline {
    position: usize,
    record: KeywordRecord,
    services: PipelineServices,
    today: NaiveDate,
}

impl KeywordPipeline {
    /// Pipeline for the record at `position` in the run's input
    pub fn new(position: usize, record: KeywordRecord, services: PipelineServices) -> Self {
        Self {
            position,
            record,
            services,
            today: Utc::now().date_naive(),
        }
    }

    pub fn keyword(&self) -> &str {
        &self.record.keyword
    }

    /// Drive the record to a terminal state and persist the outcome
    pub async fn run(self) -> PipelineOutcome {
        let mut state = PipelineState::Pending;
        loop {
            state = match state {
                PipelineState::Pending => self.generate_content().await,
                PipelineState::ContentGenerated { content } => self.generate_images(content).await,
                PipelineState::ImagesGenerated { content, draft, images } => self.assemble(content, draft, images),
                PipelineState::Assembled(article) => self.write(article).await,
                PipelineState::Done(article) => {
                    info!(
                        keyword = %self.record.keyword,
                        images = article.images.len(),
                        partial = article.is_partial(),
                        "✅ Article complete"
                    );
                    return PipelineOutcome::Done(article);
                }
                PipelineState::Failed(failed) => {
                    let outcome = PipelineOutcome::Failed(failed);
                    if let Err(e) = self.services.writer.write(self.position, &outcome).await {
                        error!(keyword = %self.record.keyword, error = %e, "❌ Could not write failure record");
                    }
                    return outcome;
                }
            };
        }
    }

    fn fail(&self, stage: Stage, reason: FailureReason, message: impl Into<String>) -> PipelineState {
        let message = message.into();
        warn!(keyword = %self.record.keyword, stage = %stage, reason = %reason, "⚠️ {}", message);
        PipelineState::Failed(FailedRecord {
            keyword: self.record.keyword.clone(),
            stage,
            reason,
            message,
        })
    }

    fn content_request(&self) -> GenerationRequest {
        let prompts = &self.services.prompts;
        let settings = &self.services.settings;

        let prompt = prompts.render(&self.record, PromptStage::Content);
        let system = prompts.render_system(self.today);
        let estimate = estimate_content_units(&format!("{system}\n{prompt}"), settings.max_tokens);

        // The undated template keys the cache; the dated text goes out on the wire
        let mut params = settings.content_params.clone();
        if let Some(map) = params.as_object_mut() {
            map.insert(
                "system".to_string(),
                serde_json::Value::String(prompts.system_template().to_string()),
            );
        }
        GenerationRequest::content(prompt, params, estimate).with_system(system)
    }

    async fn generate_content(&self) -> PipelineState {
        debug!(keyword = %self.record.keyword, "📝 Generating content");
        match self.services.content.generate(self.content_request()).await {
            Ok(content) => PipelineState::ContentGenerated { content },
            Err(error) => {
                // Nothing was dispatched for this record when the call was refused up front
                let stage = match error.kind() {
                    ServiceErrorKind::BudgetExhausted | ServiceErrorKind::Cancelled => Stage::NotStarted,
                    ServiceErrorKind::Transient | ServiceErrorKind::Permanent => Stage::Content,
                };
                self.fail(stage, error.kind().into(), error.to_string())
            }
        }
    }

    async fn generate_images(&self, content: GenerationResult) -> PipelineState {
        let parser = &self.services.parser;
        let draft = parser.parse(&content.output, &self.record.keyword);
        if draft.content_html.trim().is_empty() {
            return self.fail(Stage::Content, FailureReason::Permanent, "content reply has no article body");
        }

        let slots = parser.image_slots(&draft.content_html);
        debug!(keyword = %self.record.keyword, slots = slots.len(), "🖼️ Generating images");

        let images: Vec<ImageOutcome> = stream::iter(slots)
            .map(|slot| self.generate_image(slot))
            .buffered(self.services.settings.image_concurrency.max(1))
            .collect()
            .await;

        let gaps = images.iter().filter(|i| !i.is_generated()).count();
        if gaps > 0 {
            warn!(keyword = %self.record.keyword, gaps, total = images.len(), "⚠️ Article has missing images");
        }

        PipelineState::ImagesGenerated { content, draft, images }
    }

    async fn generate_image(&self, slot: ImageSlot) -> ImageOutcome {
        let placeholder = slot.placeholder.clone().unwrap_or_else(|| slugify(&slot.alt_text));
        let mut params = self.services.settings.image_params.clone();
        if let Some(map) = params.as_object_mut() {
            map.insert("placeholder".to_string(), serde_json::Value::String(placeholder));
        }
        let payload = self
            .services
            .prompts
            .render(&self.record, PromptStage::Image { alt_text: &slot.alt_text });

        match self.services.images.generate(GenerationRequest::image(payload, params)).await {
            Ok(result) => ImageOutcome {
                alt_text: slot.alt_text,
                placeholder: slot.placeholder,
                reference: Some(result.output),
                error: None,
                cache_hit: result.cache_hit,
            },
            Err(error) => ImageOutcome {
                alt_text: slot.alt_text,
                placeholder: slot.placeholder,
                reference: None,
                error: Some(gap_message(&error)),
                cache_hit: false,
            },
        }
    }

    fn assemble(&self, content: GenerationResult, draft: ArticleDraft, images: Vec<ImageOutcome>) -> PipelineState {
        let date = random_publication_date(self.today);
        let article = self
            .services
            .parser
            .assemble(&self.record, draft, images, &content, date);
        PipelineState::Assembled(article)
    }

    async fn write(&self, article: Article) -> PipelineState {
        let outcome = PipelineOutcome::Done(article);
        match self.services.writer.write(self.position, &outcome).await {
            Ok(()) => match outcome {
                PipelineOutcome::Done(article) => PipelineState::Done(article),
                PipelineOutcome::Failed(failed) => PipelineState::Failed(failed),
            },
            Err(e) => self.fail(Stage::Write, FailureReason::Output, e.to_string()),
        }
    }
}

fn gap_message(error: &ServiceError) -> String {
    format!("{}: {}", error.kind(), error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OrchestratorError;
    use crate::traits::MockOutputWriter;
    use generator::MockGenerator;
    use shared::ServiceKind;

    const POSITION: usize = 4;
    const REPLY: &str = r#"{"Titre": "Dressage du chien", "Contenu article": "<p>Intro</p><img src=\"{{chien}}\" alt=\"Un chien\"><p>Suite</p><img alt=\"Un parc\">"}"#;

    fn content_ok(reply: &'static str) -> MockGenerator {
        let mut content = MockGenerator::new();
        content
            .expect_generate()
            .times(1)
            .returning(move |_| Ok(GenerationResult::new(ServiceKind::Content, reply, 900)));
        content
    }

    fn accepting_writer(times: usize) -> MockOutputWriter {
        let mut writer = MockOutputWriter::new();
        writer.expect_write().times(times).returning(|_, _| Ok(()));
        writer
    }

    fn pipeline(content: MockGenerator, images: MockGenerator, writer: MockOutputWriter) -> KeywordPipeline {
        let services = PipelineServices::new(Arc::new(content), Arc::new(images), Arc::new(writer));
        KeywordPipeline::new(POSITION, KeywordRecord::new("dressage chien"), services)
    }

    #[tokio::test]
    async fn test_content_then_images_then_done() {
        let mut images = MockGenerator::new();
        images.expect_generate().times(2).returning(|request| {
            let placeholder = request.params["placeholder"].as_str().unwrap_or_default().to_string();
            Ok(GenerationResult::new(ServiceKind::Image, format!("images/{placeholder}.png"), 1))
        });

        let outcome = pipeline(content_ok(REPLY), images, accepting_writer(1)).run().await;

        let PipelineOutcome::Done(article) = outcome else {
            panic!("expected done, got {outcome:?}");
        };
        assert_eq!(article.title, "Dressage du chien");
        assert_eq!(article.slug, "dressage-du-chien");
        assert_eq!(article.content_units, 900);
        assert!(!article.is_partial());
        assert_eq!(article.images[0].reference.as_deref(), Some("images/chien.png"));
        assert_eq!(article.images[1].reference.as_deref(), Some("images/un-parc.png"));
    }

    #[tokio::test]
    async fn test_image_failure_leaves_gap() {
        let mut images = MockGenerator::new();
        images.expect_generate().times(2).returning(|request| {
            if request.payload.contains("Un parc") {
                Err(ServiceError::Permanent {
                    service: ServiceKind::Image,
                    message: "content policy".to_string(),
                })
            } else {
                Ok(GenerationResult::new(ServiceKind::Image, "images/chien.png", 1))
            }
        });

        let outcome = pipeline(content_ok(REPLY), images, accepting_writer(1)).run().await;

        let PipelineOutcome::Done(article) = outcome else {
            panic!("expected done, got {outcome:?}");
        };
        assert!(article.is_partial());
        assert!(article.images[0].is_generated());
        let gap = &article.images[1];
        assert!(gap.reference.is_none());
        assert!(gap.error.as_deref().unwrap_or_default().starts_with("permanent:"));
    }

    #[tokio::test]
    async fn test_budget_denial_on_content_is_not_started() {
        let mut content = MockGenerator::new();
        content
            .expect_generate()
            .times(1)
            .returning(|_| Err(ServiceError::BudgetExhausted { service: ServiceKind::Content }));
        let mut images = MockGenerator::new();
        images.expect_generate().times(0);

        let mut writer = MockOutputWriter::new();
        writer
            .expect_write()
            .withf(|position, outcome| {
                *position == POSITION
                    && matches!(outcome, PipelineOutcome::Failed(f) if f.stage == Stage::NotStarted)
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let outcome = pipeline(content, images, writer).run().await;
        let failed = outcome.failure().expect("failed outcome");
        assert_eq!(failed.stage, Stage::NotStarted);
        assert_eq!(failed.reason, FailureReason::BudgetExhausted);
    }

    #[tokio::test]
    async fn test_transient_content_failure() {
        let mut content = MockGenerator::new();
        content.expect_generate().times(1).returning(|_| {
            Err(ServiceError::Transient {
                service: ServiceKind::Content,
                attempts: 3,
                message: "service unavailable".to_string(),
            })
        });
        let mut images = MockGenerator::new();
        images.expect_generate().times(0);

        let outcome = pipeline(content, images, accepting_writer(1)).run().await;
        let failed = outcome.failure().expect("failed outcome");
        assert_eq!(failed.stage, Stage::Content);
        assert_eq!(failed.reason, FailureReason::Transient);
        assert!(failed.message.contains("3 attempt"));
    }

    #[tokio::test]
    async fn test_empty_article_body_fails_content_stage() {
        let mut images = MockGenerator::new();
        images.expect_generate().times(0);

        let outcome = pipeline(content_ok(r#"{"Titre": "Vide", "Contenu article": ""}"#), images, accepting_writer(1))
            .run()
            .await;
        let failed = outcome.failure().expect("failed outcome");
        assert_eq!(failed.stage, Stage::Content);
        assert_eq!(failed.reason, FailureReason::Permanent);
    }

    #[tokio::test]
    async fn test_write_failure_is_reported() {
        let mut images = MockGenerator::new();
        images
            .expect_generate()
            .returning(|_| Ok(GenerationResult::new(ServiceKind::Image, "images/x.png", 1)));

        let mut writer = MockOutputWriter::new();
        writer.expect_write().times(2).returning(|_, _| {
            Err(OrchestratorError::output(std::path::Path::new("/ro/kw.json"), "read-only"))
        });

        let outcome = pipeline(content_ok(REPLY), images, writer).run().await;
        let failed = outcome.failure().expect("failed outcome");
        assert_eq!(failed.stage, Stage::Write);
        assert_eq!(failed.reason, FailureReason::Output);
    }

    #[tokio::test]
    async fn test_plain_text_reply_uses_keyword_as_title() {
        let mut images = MockGenerator::new();
        images.expect_generate().times(0);

        let outcome = pipeline(content_ok("<h1>Bonjour</h1><p>Texte libre</p>"), images, accepting_writer(1))
            .run()
            .await;
        let PipelineOutcome::Done(article) = outcome else {
            panic!("expected done, got {outcome:?}");
        };
        assert_eq!(article.title, "dressage chien");
        assert!(article.images.is_empty());
    }

    #[test]
    fn test_content_request_key_does_not_depend_on_date() {
        let mut first = pipeline(MockGenerator::new(), MockGenerator::new(), MockOutputWriter::new());
        first.today = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        let mut second = pipeline(MockGenerator::new(), MockGenerator::new(), MockOutputWriter::new());
        second.today = NaiveDate::from_ymd_opt(2025, 3, 15).unwrap();

        let a = first.content_request();
        let b = second.content_request();
        assert_eq!(a.canonical_form(), b.canonical_form());
        assert!(a.params["system"].as_str().unwrap().contains("{current_date}"));
        assert!(a.system.as_deref().unwrap().contains("2025-03-14"));
        assert!(b.system.as_deref().unwrap().contains("2025-03-15"));
    }
}
