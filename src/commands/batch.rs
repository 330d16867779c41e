use anyhow::{Context, Result};
use pageharvest::{
    config::Config,
    scraping::{coordinator::FailurePolicy, ProcessOutcome, ScrapingConfig, ScrapingCoordinator},
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use super::Outputs;

pub struct BatchOptions {
    pub urls: Vec<String>,
    pub input: Option<PathBuf>,
    pub workers: Option<usize>,
    pub on_error: FailurePolicy,
    pub output: Option<PathBuf>,
    pub skip_log: Option<PathBuf>,
}

pub async fn run_batch(config: Config, options: BatchOptions) -> Result<()> {
    let mut urls = options.urls;
    if let Some(path) = &options.input {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read URL list '{}'", path.display()))?;
        urls.extend(
            content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(String::from),
        );
    }
    if urls.is_empty() {
        anyhow::bail!("No URLs provided");
    }

    let workers = options.workers.unwrap_or(config.crawl.workers);
    info!("Processing {} URLs with {} workers", urls.len(), workers);

    let outputs = Outputs {
        jsonl: options.output,
        dir: None,
        skip_log: options.skip_log,
    };
    let coordinator = ScrapingCoordinator::new(ScrapingConfig::from_config(&config))
        .context("Failed to initialize fetcher")?;
    let coordinator = Arc::new(outputs.attach(coordinator)?);

    let results = coordinator
        .process_batch(urls, workers, options.on_error)
        .await?;

    for result in &results {
        let line = match &result.outcome {
            ProcessOutcome::Accepted(record) => json!({
                "url": result.url,
                "status": "accepted",
                "record": record,
            }),
            ProcessOutcome::Rejected(reason) => json!({
                "url": result.url,
                "status": "rejected",
                "reason": reason.to_string(),
            }),
            ProcessOutcome::Failed(error) => json!({
                "url": result.url,
                "status": "failed",
                "reason": error.skip_reason(),
            }),
        };
        println!("{}", line);
    }

    let stats = coordinator.stats();
    info!(
        "Batch complete: {} accepted, {} rejected ({} duplicates), {} failed",
        stats.accepted, stats.rejected, stats.duplicates, stats.failed
    );

    Ok(())
}
