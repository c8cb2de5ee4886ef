//! Orchestrator data types: input records, pipeline outcomes and batch reports

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use generator::{BudgetState, ServiceStats};
use serde::{Deserialize, Serialize};
use shared::{ServiceErrorKind, ServiceKind};

/// One validated keyword row. Never mutated once read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeywordRecord {
    pub keyword: String,
    pub database: Option<String>,
    pub seed_keyword: Option<String>,
    pub page: Option<String>,
    pub topic: Option<String>,
    pub page_type: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub volume: Option<u64>,
    pub keyword_difficulty: Option<f64>,
    pub cpc_usd: Option<f64>,
    pub competitive_density: Option<f64>,
    pub number_of_results: Option<u64>,
    pub intent: Option<String>,
    #[serde(default)]
    pub serp_features: Vec<String>,
    pub trend: Option<String>,
    pub click_potential: Option<String>,
    pub locale: Option<String>,
}

impl KeywordRecord {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            ..Self::default()
        }
    }

    /// Keyword data as handed to the content prompt
    pub fn prompt_context(&self) -> serde_json::Value {
        let mut context = serde_json::json!({
            "primary_keyword": self.keyword,
            "secondary_keywords": self.seed_keyword.iter().collect::<Vec<_>>(),
            "related_keywords": self.tags,
            "topic": self.topic.as_deref().unwrap_or(&self.keyword),
            "intent": self.intent.as_deref().unwrap_or("informational"),
            "volume": self.volume.unwrap_or(0),
            "competition": self.competitive_density.unwrap_or(0.0),
        });
        if let Some(locale) = &self.locale {
            context["locale"] = serde_json::Value::String(locale.clone());
        }
        context
    }
}

/// Where a record's pipeline stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    NotStarted,
    Content,
    Images,
    Assembly,
    Write,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::NotStarted => "not_started",
            Stage::Content => "content",
            Stage::Images => "images",
            Stage::Assembly => "assembly",
            Stage::Write => "write",
        };
        f.write_str(name)
    }
}

/// Why a record failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Transient,
    Permanent,
    BudgetExhausted,
    Cancelled,
    Output,
    Internal,
}

impl From<ServiceErrorKind> for FailureReason {
    fn from(kind: ServiceErrorKind) -> Self {
        match kind {
            ServiceErrorKind::Transient => FailureReason::Transient,
            ServiceErrorKind::Permanent => FailureReason::Permanent,
            ServiceErrorKind::BudgetExhausted => FailureReason::BudgetExhausted,
            ServiceErrorKind::Cancelled => FailureReason::Cancelled,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureReason::Transient => "transient",
            FailureReason::Permanent => "permanent",
            FailureReason::BudgetExhausted => "budget_exhausted",
            FailureReason::Cancelled => "cancelled",
            FailureReason::Output => "output",
            FailureReason::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// An `<img>` slot found in generated content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSlot {
    pub alt_text: String,
    /// Name taken from the `src` attribute, if the writer left one
    pub placeholder: Option<String>,
}

/// Result for one image slot; a failed slot keeps its error instead of a reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageOutcome {
    pub alt_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub cache_hit: bool,
}

impl ImageOutcome {
    pub fn is_generated(&self) -> bool {
        self.reference.is_some()
    }
}

/// Fields recovered from the content service's reply
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArticleDraft {
    pub title: String,
    pub content_html: String,
    pub table_of_contents: String,
    pub article_type: String,
    pub article_types_secondary: Vec<String>,
    pub summary: String,
    pub title_tag: String,
    pub meta_description: String,
}

/// A fully assembled article, the payload of a `done` outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub keyword: String,
    pub title: String,
    pub slug: String,
    pub publication_date: String,
    pub reading_time: String,
    pub table_of_contents: String,
    pub content: String,
    pub article_type: String,
    pub article_types_secondary: Vec<String>,
    pub summary: String,
    pub title_tag: String,
    pub meta_description: String,
    pub images: Vec<ImageOutcome>,
    pub content_units: u64,
    pub content_cache_hit: bool,
    pub record: KeywordRecord,
}

impl Article {
    /// At least one image slot has a gap
    pub fn is_partial(&self) -> bool {
        self.images.iter().any(|image| !image.is_generated())
    }
}

/// Failure descriptor carried by a `failed` outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedRecord {
    pub keyword: String,
    pub stage: Stage,
    pub reason: FailureReason,
    pub message: String,
}

/// Terminal result for one input record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PipelineOutcome {
    Done(Article),
    Failed(FailedRecord),
}

impl PipelineOutcome {
    pub fn failed(keyword: impl Into<String>, stage: Stage, reason: FailureReason, message: impl Into<String>) -> Self {
        PipelineOutcome::Failed(FailedRecord {
            keyword: keyword.into(),
            stage,
            reason,
            message: message.into(),
        })
    }

    pub fn keyword(&self) -> &str {
        match self {
            PipelineOutcome::Done(article) => &article.keyword,
            PipelineOutcome::Failed(failed) => &failed.keyword,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, PipelineOutcome::Done(_))
    }

    pub fn failure(&self) -> Option<&FailedRecord> {
        match self {
            PipelineOutcome::Failed(failed) => Some(failed),
            PipelineOutcome::Done(_) => None,
        }
    }
}

/// How the process should exit after a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    AllFailed,
    BudgetExhausted,
    Interrupted,
}

impl ExitStatus {
    pub fn code(&self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::AllFailed => 1,
            ExitStatus::BudgetExhausted => 2,
            ExitStatus::Interrupted => 130,
        }
    }

    /// Worst of two statuses, used across several input files
    pub fn combine(self, other: ExitStatus) -> ExitStatus {
        fn rank(status: ExitStatus) -> u8 {
            match status {
                ExitStatus::Success => 0,
                ExitStatus::AllFailed => 1,
                ExitStatus::BudgetExhausted => 2,
                ExitStatus::Interrupted => 3,
            }
        }
        if rank(other) > rank(self) { other } else { self }
    }
}

/// Summary of one batch run, written as `summary.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total: usize,
    pub done: usize,
    /// Done records with at least one missing image
    pub partial: usize,
    pub failed: usize,
    /// Failed records that were never started
    pub skipped: usize,
    pub interrupted: bool,
    pub budget: BudgetState,
    pub usage: BTreeMap<ServiceKind, ServiceStats>,
    pub failures: Vec<FailedRecord>,
}

impl BatchReport {
    pub fn exit_status(&self) -> ExitStatus {
        if self.interrupted {
            ExitStatus::Interrupted
        } else if self.total > 0 && self.done == 0 && self.budget.exhausted {
            ExitStatus::BudgetExhausted
        } else if self.total > 0 && self.done == 0 {
            ExitStatus::AllFailed
        } else {
            ExitStatus::Success
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(total: usize, done: usize, exhausted: bool, interrupted: bool) -> BatchReport {
        BatchReport {
            run_id: "run".to_string(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            total,
            done,
            partial: 0,
            failed: total - done,
            skipped: 0,
            interrupted,
            budget: BudgetState {
                exhausted,
                ..BudgetState::default()
            },
            usage: BTreeMap::new(),
            failures: Vec::new(),
        }
    }

    #[test]
    fn test_exit_status() {
        assert_eq!(report(3, 1, false, false).exit_status(), ExitStatus::Success);
        assert_eq!(report(3, 1, true, false).exit_status(), ExitStatus::Success);
        assert_eq!(report(3, 0, false, false).exit_status(), ExitStatus::AllFailed);
        assert_eq!(report(3, 0, true, false).exit_status(), ExitStatus::BudgetExhausted);
        assert_eq!(report(3, 3, false, true).exit_status(), ExitStatus::Interrupted);
        assert_eq!(report(0, 0, false, false).exit_status(), ExitStatus::Success);
    }

    #[test]
    fn test_exit_status_combine_keeps_worst() {
        assert_eq!(ExitStatus::Success.combine(ExitStatus::AllFailed), ExitStatus::AllFailed);
        assert_eq!(ExitStatus::Interrupted.combine(ExitStatus::AllFailed), ExitStatus::Interrupted);
        assert_eq!(ExitStatus::Interrupted.code(), 130);
    }

    #[test]
    fn test_failed_outcome_json_shape() {
        let outcome = PipelineOutcome::failed("dog training", Stage::NotStarted, FailureReason::BudgetExhausted, "budget");
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["keyword"], "dog training");
        assert_eq!(json["stage"], "not_started");
        assert_eq!(json["reason"], "budget_exhausted");
    }

    #[test]
    fn test_prompt_context_defaults() {
        let record = KeywordRecord {
            seed_keyword: Some("dogs".to_string()),
            tags: vec!["puppy".to_string()],
            ..KeywordRecord::new("dog training")
        };
        let context = record.prompt_context();
        assert_eq!(context["primary_keyword"], "dog training");
        assert_eq!(context["secondary_keywords"][0], "dogs");
        assert_eq!(context["related_keywords"][0], "puppy");
        assert_eq!(context["topic"], "dog training");
        assert_eq!(context["intent"], "informational");
        assert_eq!(context["volume"], 0);
        assert!(context.get("locale").is_none());
    }
}
