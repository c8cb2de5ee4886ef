//! Batch orchestrator
//!
//! Runs one `KeywordPipeline` per record on a bounded pool. All pipelines of a
//! run share the rate limiter, response cache and cost tracker held in the
//! `ClientContext`. Outcomes come back in input order whatever order the
//! pipelines finish in.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use generator::{ClientContext, ContentService, GenerationBackend, GenerationClient, Generator, ImageService};
use shared::{logging, EngineConfig};

use crate::core::{KeywordPipeline, PipelineServices, PipelineSettings, PromptHandler};
use crate::traits::OutputWriter;
use crate::types::{BatchReport, FailureReason, KeywordRecord, PipelineOutcome, Stage};

const COMPONENT: &str = "orchestrator";

/// Outcomes of one run plus its summary
#[derive(Debug, Clone)]
pub struct BatchRun {
    pub outcomes: Vec<PipelineOutcome>,
    pub report: BatchReport,
}

#[derive(Clone)]
pub struct BatchOrchestrator {
    services: PipelineServices,
    ctx: ClientContext,
}

impl BatchOrchestrator {
    pub fn new(services: PipelineServices, ctx: ClientContext) -> Self {
        Self { services, ctx }
    }

    /// Wrap two raw backends in generation clients sharing `ctx`
    pub fn with_backends(
        content: Arc<dyn GenerationBackend>,
        images: Arc<dyn GenerationBackend>,
        ctx: ClientContext,
        writer: Arc<dyn OutputWriter>,
    ) -> Self {
        let content: Arc<dyn Generator> = Arc::new(GenerationClient::new(content, ctx.clone()));
        let images: Arc<dyn Generator> = Arc::new(GenerationClient::new(images, ctx.clone()));
        Self::new(PipelineServices::new(content, images, writer), ctx)
    }

    /// Orchestrator talking to the real HTTP services
    pub fn from_config(config: &EngineConfig, writer: Arc<dyn OutputWriter>, prompts: PromptHandler) -> Self {
        let ctx = ClientContext::from_config(config);
        Self::with_backends(
            Arc::new(ContentService::new(&config.api)),
            Arc::new(ImageService::new(&config.api)),
            ctx,
            writer,
        )
        .with_prompts(prompts)
        .with_settings(PipelineSettings::from_config(config))
    }

    pub fn with_prompts(mut self, prompts: PromptHandler) -> Self {
        self.services = self.services.with_prompts(prompts);
        self
    }

    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.services = self.services.with_settings(settings);
        self
    }

    /// Same clients and shared state, different output destination
    pub fn with_writer(&self, writer: Arc<dyn OutputWriter>) -> Self {
        let mut services = self.services.clone();
        services.writer = writer;
        Self::new(services, self.ctx.clone())
    }

    pub fn context(&self) -> &ClientContext {
        &self.ctx
    }

    /// Stop starting records and issuing calls; running calls finish
    pub fn request_stop(&self) {
        self.ctx.request_stop();
    }

    fn halt_reason(&self) -> Option<FailureReason> {
        if self.ctx.is_stopping() {
            Some(FailureReason::Cancelled)
        } else if self.ctx.cost_tracker.is_exhausted() {
            Some(FailureReason::BudgetExhausted)
        } else {
            None
        }
    }

    async fn skip(&self, position: usize, record: &KeywordRecord, reason: FailureReason) -> PipelineOutcome {
        let message = match reason {
            FailureReason::Cancelled => "run interrupted before this record started",
            _ => "budget exhausted before this record started",
        };
        let outcome = PipelineOutcome::failed(record.keyword.clone(), Stage::NotStarted, reason, message);
        if let Err(e) = self.services.writer.write(position, &outcome).await {
            error!(keyword = %record.keyword, error = %e, "❌ Could not write skipped record");
        }
        outcome
    }

    /// Process every record with at most `max_concurrent` pipelines running.
    ///
    /// Budget totals start from zero on every call. Once the budget is
    /// exhausted or a stop is requested, records not yet started are
    /// reported as `not_started`.
    pub async fn run(&self, records: Vec<KeywordRecord>, max_concurrent: usize) -> Vec<PipelineOutcome> {
        self.ctx.cost_tracker.reset();

        let total = records.len();
        let max_concurrent = max_concurrent.max(1);
        logging::log_progress(
            COMPONENT,
            "Batch started",
            &format!("{total} records, {max_concurrent} concurrent"),
        );

        let semaphore = Arc::new(Semaphore::new(max_concurrent));
        let mut outcomes: Vec<Option<PipelineOutcome>> = vec![None; total];
        let mut running: Vec<(usize, String, JoinHandle<PipelineOutcome>)> = Vec::with_capacity(total);
        let mut pending = records.into_iter().enumerate();

        while let Some((index, record)) = pending.next() {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    outcomes[index] = Some(PipelineOutcome::failed(
                        record.keyword,
                        Stage::NotStarted,
                        FailureReason::Internal,
                        e.to_string(),
                    ));
                    continue;
                }
            };

            if let Some(reason) = self.halt_reason() {
                drop(permit);
                warn!(reason = %reason, remaining = total - index, "🛑 Not starting remaining records");
                outcomes[index] = Some(self.skip(index, &record, reason).await);
                for (index, record) in pending.by_ref() {
                    outcomes[index] = Some(self.skip(index, &record, reason).await);
                }
                break;
            }

            debug!(keyword = %record.keyword, position = index + 1, total, "▶️ Starting record");
            let pipeline = KeywordPipeline::new(index, record, self.services.clone());
            let keyword = pipeline.keyword().to_string();
            let handle = tokio::spawn(async move {
                let outcome = pipeline.run().await;
                drop(permit);
                outcome
            });
            running.push((index, keyword, handle));
        }

        for (index, keyword, handle) in running {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(keyword = %keyword, error = %e, "❌ Pipeline task failed");
                    PipelineOutcome::failed(keyword, Stage::Content, FailureReason::Internal, e.to_string())
                }
            };
            outcomes[index] = Some(outcome);
        }

        outcomes.into_iter().flatten().collect()
    }

    /// `run` plus a summary, which is also handed to the writer
    pub async fn run_batch(&self, records: Vec<KeywordRecord>, max_concurrent: usize) -> BatchRun {
        let started_at = Utc::now();
        self.ctx.usage.reset().await;

        let outcomes = self.run(records, max_concurrent).await;
        let report = self.report(&outcomes, started_at).await;

        if let Err(e) = self.services.writer.write_summary(&report).await {
            logging::log_error(COMPONENT, "Writing batch summary", &e);
        }
        info!(
            total = report.total,
            done = report.done,
            partial = report.partial,
            failed = report.failed,
            skipped = report.skipped,
            tokens = report.budget.tokens_consumed,
            images = report.budget.images_consumed,
            cost_usd = report.budget.cost_usd,
            "📊 Batch finished"
        );

        BatchRun { outcomes, report }
    }

    async fn report(&self, outcomes: &[PipelineOutcome], started_at: chrono::DateTime<Utc>) -> BatchReport {
        let failures: Vec<_> = outcomes.iter().filter_map(|o| o.failure().cloned()).collect();
        let done = outcomes.iter().filter(|o| o.is_done()).count();
        let partial = outcomes
            .iter()
            .filter(|o| matches!(o, PipelineOutcome::Done(article) if article.is_partial()))
            .count();

        BatchReport {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at,
            finished_at: Utc::now(),
            total: outcomes.len(),
            done,
            partial,
            failed: failures.len(),
            skipped: failures.iter().filter(|f| f.stage == Stage::NotStarted).count(),
            interrupted: self.ctx.is_stopping(),
            budget: self.ctx.cost_tracker.snapshot(),
            usage: self.ctx.usage.get_stats().await.into_iter().collect::<BTreeMap<_, _>>(),
            failures,
        }
    }
}
