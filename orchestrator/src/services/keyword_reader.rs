//! CSV keyword reader
//!
//! Headers are normalised (lowercase, spaces to underscores, parentheses
//! dropped) so `CPC (USD)` and `cpc_usd` name the same column. Unknown
//! columns are ignored.

use std::path::Path;

use csv::StringRecord;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::traits::{KeywordBatch, KeywordSource};
use crate::types::KeywordRecord;

/// One CSV row before validation, every column optional text
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawKeywordRow {
    keyword: Option<String>,
    database: Option<String>,
    seed_keyword: Option<String>,
    page: Option<String>,
    topic: Option<String>,
    page_type: Option<String>,
    tags: Option<String>,
    volume: Option<String>,
    keyword_difficulty: Option<String>,
    cpc_usd: Option<String>,
    competitive_density: Option<String>,
    number_of_results: Option<String>,
    intent: Option<String>,
    serp_features: Option<String>,
    trend: Option<String>,
    click_potential: Option<String>,
    locale: Option<String>,
}

impl RawKeywordRow {
    fn validate(self, row: usize) -> OrchestratorResult<KeywordRecord> {
        let keyword = non_empty(self.keyword).ok_or_else(|| OrchestratorError::ValidationError {
            row,
            message: "keyword is empty".to_string(),
        })?;

        Ok(KeywordRecord {
            keyword,
            database: non_empty(self.database),
            seed_keyword: non_empty(self.seed_keyword),
            page: non_empty(self.page),
            topic: non_empty(self.topic),
            page_type: non_empty(self.page_type),
            tags: split_list(self.tags),
            volume: parse_count(self.volume),
            keyword_difficulty: parse_number(self.keyword_difficulty),
            cpc_usd: parse_number(self.cpc_usd),
            competitive_density: parse_number(self.competitive_density),
            number_of_results: parse_count(self.number_of_results),
            intent: non_empty(self.intent),
            serp_features: split_list(self.serp_features),
            trend: non_empty(self.trend),
            click_potential: non_empty(self.click_potential),
            locale: non_empty(self.locale),
        })
    }
}

/// Reads keyword records from CSV files
#[derive(Debug, Clone, Default)]
pub struct CsvKeywordReader;

impl CsvKeywordReader {
    pub fn new() -> Self {
        Self
    }

    /// Parse CSV text; `source` only labels errors
    pub fn read_from<R: std::io::Read>(&self, reader: R, source: &Path) -> OrchestratorResult<KeywordBatch> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = csv_reader
            .headers()
            .map_err(|e| OrchestratorError::input(source, e))?
            .iter()
            .map(normalize_header)
            .collect::<StringRecord>();
        if !headers.iter().any(|h| h == "keyword") {
            return Err(OrchestratorError::input(source, "missing Keyword column"));
        }
        csv_reader.set_headers(headers);

        let mut batch = KeywordBatch::default();
        for (index, row) in csv_reader.deserialize::<RawKeywordRow>().enumerate() {
            // Line 1 is the header
            let line = index + 2;
            let parsed = row
                .map_err(|e| OrchestratorError::ValidationError {
                    row: line,
                    message: e.to_string(),
                })
                .and_then(|raw| raw.validate(line));

            match parsed {
                Ok(record) => batch.records.push(record),
                Err(e) => {
                    warn!(source = %source.display(), error = %e, "⚠️ Rejected keyword row");
                    batch.rejected.push(e);
                }
            }
        }

        info!(
            source = %source.display(),
            accepted = batch.records.len(),
            rejected = batch.rejected.len(),
            "📋 Keyword input read"
        );
        Ok(batch)
    }
}

impl KeywordSource for CsvKeywordReader {
    fn read_records(&self, path: &Path) -> OrchestratorResult<KeywordBatch> {
        let file = std::fs::File::open(path).map_err(|e| OrchestratorError::input(path, e))?;
        self.read_from(std::io::BufReader::new(file), path)
    }
}

/// `CPC (USD)` → `cpc_usd`
pub fn normalize_header(header: &str) -> String {
    header
        .trim()
        .trim_start_matches('\u{feff}')
        .to_lowercase()
        .replace(['(', ')'], "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn split_list(value: Option<String>) -> Vec<String> {
    non_empty(value)
        .map(|v| {
            v.split(',')
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn parse_number(value: Option<String>) -> Option<f64> {
    let cleaned = non_empty(value)?.replace(' ', "");
    cleaned
        .parse::<f64>()
        .ok()
        .or_else(|| cleaned.replace(',', ".").parse::<f64>().ok())
        .filter(|n| n.is_finite())
}

fn parse_count(value: Option<String>) -> Option<u64> {
    let cleaned = non_empty(value)?.replace([' ', ','], "");
    cleaned
        .parse::<u64>()
        .ok()
        .or_else(|| cleaned.parse::<f64>().ok().filter(|n| n.is_finite() && *n >= 0.0).map(|n| n as u64))
}
