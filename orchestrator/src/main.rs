//! Command-line entry point: keyword CSV in, article JSON out

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::signal;
use tracing::warn;

use orchestrator::services::{CsvKeywordReader, JsonFileWriter};
use orchestrator::{BatchOrchestrator, ExitStatus, KeywordSource, PromptHandler};
use shared::{logging, EngineConfig, LogFormat};

const COMPONENT: &str = "orchestrator";

/// Generate SEO blog articles with images from keyword CSV files
#[derive(Parser)]
#[command(name = "orchestrator")]
#[command(about = "Generates SEO articles and images from keyword CSV files")]
pub struct Args {
    /// Keyword CSV file, or a directory of CSV files with --batch
    #[arg(long)]
    pub input: PathBuf,

    /// Directory receiving one JSON file per keyword
    #[arg(long)]
    pub output: PathBuf,

    /// Process every *.csv in the input directory, one run per file
    #[arg(long)]
    pub batch: bool,

    /// Records processed concurrently (overrides MAX_CONCURRENT)
    #[arg(long)]
    pub max_concurrent: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (pretty, json)
    #[arg(long)]
    pub log_format: Option<LogFormat>,

    /// Disable the response cache for this run
    #[arg(long)]
    pub no_cache: bool,

    /// Location substituted for {NearMe} in the content prompt
    #[arg(long)]
    pub near_me: Option<String>,

    /// File replacing the built-in content prompt template
    #[arg(long)]
    pub prompt_template: Option<PathBuf>,
}

impl Args {
    fn apply(&self, config: &mut EngineConfig) {
        if let Some(max_concurrent) = self.max_concurrent {
            config.batch.max_concurrent = max_concurrent;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }
        if self.no_cache {
            config.cache.enabled = false;
        }
    }
}

/// CSV files of a batch directory, sorted by name
fn batch_inputs(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        let is_csv = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        if path.is_file() && is_csv {
            files.push(path);
        }
    }
    files.sort();
    if files.is_empty() {
        bail!("no CSV files in {}", dir.display());
    }
    Ok(files)
}

async fn run_file(
    engine: &BatchOrchestrator,
    input: &Path,
    output: PathBuf,
    max_concurrent: usize,
) -> anyhow::Result<ExitStatus> {
    let batch = CsvKeywordReader::new()
        .read_records(input)
        .with_context(|| format!("loading keywords from {}", input.display()))?;

    for rejected in &batch.rejected {
        warn!(file = %input.display(), "⚠️ Skipping row: {}", rejected);
    }
    logging::log_progress(
        COMPONENT,
        "Keywords loaded",
        &format!("{}: {} valid, {} rejected", input.display(), batch.records.len(), batch.rejected.len()),
    );

    let engine = engine.with_writer(Arc::new(JsonFileWriter::new(output)));
    let run = engine.run_batch(batch.records, max_concurrent).await;
    Ok(run.report.exit_status())
}

async fn run(args: Args) -> anyhow::Result<ExitStatus> {
    let mut config = EngineConfig::from_env().context("loading configuration")?;
    args.apply(&mut config);
    config.validate().context("validating configuration")?;

    logging::init_tracing(Some(&config.logging.level), config.logging.format);
    logging::log_startup(COMPONENT, &format!("input {}", args.input.display()));

    config.require_credentials().context("checking API credentials")?;

    let mut prompts = PromptHandler::new().with_near_me(args.near_me.clone());
    if let Some(template) = &args.prompt_template {
        prompts = prompts.with_template_file(template)?;
    }

    let engine = BatchOrchestrator::from_config(&config, Arc::new(JsonFileWriter::new(&args.output)), prompts);
    let snapshot = config
        .cache
        .path
        .as_deref()
        .filter(|_| engine.context().cache.is_enabled());

    if let Some(path) = snapshot {
        if let Err(e) = engine.context().cache.load(path).await {
            logging::log_error(COMPONENT, "Loading cache snapshot", &e);
        }
    }

    let stopper = engine.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                logging::log_shutdown(COMPONENT, "Received Ctrl+C signal");
                stopper.request_stop();
            }
            Err(err) => logging::log_error(COMPONENT, "Signal handling", &err),
        }
    });

    let max_concurrent = config.batch.max_concurrent;
    let mut status = ExitStatus::Success;
    if args.batch {
        for input in batch_inputs(&args.input)? {
            let stem = input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "batch".to_string());
            let file_status = run_file(&engine, &input, args.output.join(stem), max_concurrent).await?;
            status = status.combine(file_status);
        }
    } else {
        status = run_file(&engine, &args.input, args.output.clone(), max_concurrent).await?;
    }

    if let Some(path) = snapshot {
        if let Err(e) = engine.context().cache.save(path).await {
            logging::log_error(COMPONENT, "Saving cache snapshot", &e);
        }
    }

    logging::log_success(COMPONENT, &format!("Finished with exit code {}", status.code()));
    Ok(status)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let status = run(args).await?;
    std::process::exit(status.code());
}
