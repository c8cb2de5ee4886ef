//! Trait definitions with mockall annotations for testing

use std::path::Path;

use crate::error::OrchestratorResult;
use crate::types::{BatchReport, KeywordRecord, PipelineOutcome};

/// Input collaborator: yields validated keyword records.
///
/// Rows that fail validation are reported through the returned rejections
/// and never reach a pipeline.
#[mockall::automock]
pub trait KeywordSource: Send + Sync {
    fn read_records(&self, path: &Path) -> OrchestratorResult<KeywordBatch>;
}

/// Records accepted from one input plus the rows that were turned away
#[derive(Debug, Default)]
pub struct KeywordBatch {
    pub records: Vec<KeywordRecord>,
    pub rejected: Vec<crate::error::OrchestratorError>,
}

/// Output collaborator: persists one terminal outcome at a time
#[mockall::automock]
#[async_trait::async_trait]
pub trait OutputWriter: Send + Sync {
    /// Persist the outcome of the record at `position` (0-based input index)
    async fn write(&self, position: usize, outcome: &PipelineOutcome) -> OrchestratorResult<()>;

    /// Persist the batch summary once every record is finished
    async fn write_summary(&self, report: &BatchReport) -> OrchestratorResult<()>;
}
