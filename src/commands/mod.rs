//! CLI subcommands

pub mod batch;
pub mod classify;
pub mod crawl;
pub mod fetch;
pub mod init;

use anyhow::{Context, Result};
use pageharvest::scraping::{
    plugins::ExtensionRegistry,
    sink::{ArticleSink, JsonDirSink, JsonlArticleSink, JsonlSkipLog, SkipSink, TracingSkipSink},
    ScrapingCoordinator,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Where accepted records and skips go
#[derive(Debug, Default)]
pub struct Outputs {
    pub jsonl: Option<PathBuf>,
    pub dir: Option<PathBuf>,
    pub skip_log: Option<PathBuf>,
}

impl Outputs {
    /// Attach the configured sinks to `coordinator`
    pub fn attach(&self, mut coordinator: ScrapingCoordinator) -> Result<ScrapingCoordinator> {
        let article_sink: Option<Arc<dyn ArticleSink>> = match (&self.jsonl, &self.dir) {
            (Some(path), _) => Some(Arc::new(
                JsonlArticleSink::open(path)
                    .with_context(|| format!("Failed to open output file '{}'", path.display()))?,
            )),
            (None, Some(dir)) => {
                let formatters = ExtensionRegistry::global().read().formatters().to_vec();
                Some(Arc::new(
                    JsonDirSink::create(dir)
                        .with_context(|| format!("Failed to create output directory '{}'", dir.display()))?
                        .with_formatters(formatters),
                ))
            }
            (None, None) => None,
        };
        if let Some(sink) = article_sink {
            coordinator = coordinator.with_article_sink(sink);
        }

        let skip_sink: Arc<dyn SkipSink> = match &self.skip_log {
            Some(path) => Arc::new(
                JsonlSkipLog::open(path)
                    .with_context(|| format!("Failed to open skip log '{}'", path.display()))?,
            ),
            None => Arc::new(TracingSkipSink),
        };
        Ok(coordinator.with_skip_sink(skip_sink))
    }
}
