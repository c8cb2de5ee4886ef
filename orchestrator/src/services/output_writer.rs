//! JSON file output writer
//!
//! One `<position>-<slug(keyword)>.json` per record plus `summary.json` per
//! run. The 1-based, zero-padded input position keeps names distinct when
//! keywords repeat or slug to the same text, and keeps a directory listing in
//! input order. Every file is written to a uniquely named temporary file
//! first and renamed into place, so a reader never sees a half-written record.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use crate::core::slugify;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::traits::OutputWriter;
use crate::types::{BatchReport, PipelineOutcome};

pub const SUMMARY_FILE: &str = "summary.json";

pub struct JsonFileWriter {
    output_dir: PathBuf,
}

impl JsonFileWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// File the outcome of the record at `position` is written to
    pub fn record_path(&self, position: usize, keyword: &str) -> PathBuf {
        self.output_dir
            .join(format!("{:04}-{}.json", position + 1, slugify(keyword)))
    }

    pub fn summary_path(&self) -> PathBuf {
        self.output_dir.join(SUMMARY_FILE)
    }

    async fn write_json<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> OrchestratorResult<()> {
        fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| OrchestratorError::output(&self.output_dir, e))?;

        let json = serde_json::to_string_pretty(value)?;
        let tmp = path.with_extension(format!("json.{}.tmp", Uuid::new_v4().simple()));
        fs::write(&tmp, json)
            .await
            .map_err(|e| OrchestratorError::output(&tmp, e))?;
        if let Err(e) = fs::rename(&tmp, path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(OrchestratorError::output(path, e));
        }

        debug!(path = %path.display(), "💾 Wrote output file");
        Ok(())
    }
}

#[async_trait]
impl OutputWriter for JsonFileWriter {
    async fn write(&self, position: usize, outcome: &PipelineOutcome) -> OrchestratorResult<()> {
        let path = self.record_path(position, outcome.keyword());
        self.write_json(&path, outcome).await
    }

    async fn write_summary(&self, report: &BatchReport) -> OrchestratorResult<()> {
        self.write_json(&self.summary_path(), report).await
    }
}
