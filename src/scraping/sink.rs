//! Output sinks
//!
//! Accepted pages go to an `ArticleSink` as complete, scored and
//! deduplicated `ArticleRecord`s; rejected and failed URLs go to a
//! `SkipSink`. Both are synchronous and internally locked so workers can
//! share one instance.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use url::Url;

use super::classifier::{FetchStrategy, PageType};
use super::dedup::Fingerprint;
use super::extractor::{ExtractionResult, PageMetadata};
use super::plugins::{self, OutputFormatterPlugin};
use super::scorer::ArticleScore;
use super::urlnorm::SlugAllocator;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("record has an invalid URL: {0}")]
    InvalidUrl(String),
}

/// An accepted page, ready for persistence
#[derive(Debug, Clone, Serialize)]
pub struct ArticleRecord {
    /// Normalized URL the page was requested under
    pub url: String,
    pub final_url: String,
    pub metadata: PageMetadata,
    pub extraction: ExtractionResult,
    pub score: ArticleScore,
    pub fingerprint: Option<Fingerprint>,
    pub page_type: PageType,
    pub strategy: FetchStrategy,
    /// The fetch gave up early on some stage
    pub degraded: bool,
    pub fetched_at: DateTime<Utc>,
}

/// A rejected or failed URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipRecord {
    pub url: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

impl SkipRecord {
    pub fn now(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }
}

pub trait ArticleSink: Send + Sync {
    fn write(&self, record: &ArticleRecord) -> Result<(), SinkError>;

    fn flush(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

pub trait SkipSink: Send + Sync {
    fn skip(&self, record: &SkipRecord) -> Result<(), SinkError>;

    fn flush(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

fn open_append(path: &Path) -> Result<BufWriter<File>, SinkError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(BufWriter::new(file))
}

/// One JSON record per line, appended
pub struct JsonlArticleSink {
    writer: Mutex<BufWriter<File>>,
}

impl JsonlArticleSink {
    pub fn open(path: &Path) -> Result<Self, SinkError> {
        Ok(Self {
            writer: Mutex::new(open_append(path)?),
        })
    }
}

impl ArticleSink for JsonlArticleSink {
    fn write(&self, record: &ArticleRecord) -> Result<(), SinkError> {
        let line = serde_json::to_string(record)?;
        let mut writer = self.writer.lock();
        writeln!(writer, "{}", line)?;
        Ok(())
    }

    fn flush(&self) -> Result<(), SinkError> {
        self.writer.lock().flush()?;
        Ok(())
    }
}

/// `<slug>.json` per record, plus one `<slug>.<ext>` per formatter plugin
pub struct JsonDirSink {
    dir: PathBuf,
    slugs: Mutex<SlugAllocator>,
    formatters: Vec<Arc<dyn OutputFormatterPlugin>>,
}

impl JsonDirSink {
    pub fn create(dir: &Path) -> Result<Self, SinkError> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            slugs: Mutex::new(SlugAllocator::new()),
            formatters: Vec::new(),
        })
    }

    pub fn with_formatters(mut self, formatters: Vec<Arc<dyn OutputFormatterPlugin>>) -> Self {
        self.formatters = formatters;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ArticleSink for JsonDirSink {
    fn write(&self, record: &ArticleRecord) -> Result<(), SinkError> {
        let url = Url::parse(&record.url).map_err(|_| SinkError::InvalidUrl(record.url.clone()))?;
        let slug = self.slugs.lock().allocate(&url);

        let path = self.dir.join(format!("{}.json", slug));
        std::fs::write(&path, serde_json::to_string_pretty(record)?)?;

        for (extension, body) in plugins::run_formatters(&self.formatters, record) {
            std::fs::write(self.dir.join(format!("{}.{}", slug, extension)), body)?;
        }
        debug!("Wrote {}", path.display());
        Ok(())
    }
}

/// Appends skip records as JSON lines
pub struct JsonlSkipLog {
    writer: Mutex<BufWriter<File>>,
}

impl JsonlSkipLog {
    pub fn open(path: &Path) -> Result<Self, SinkError> {
        Ok(Self {
            writer: Mutex::new(open_append(path)?),
        })
    }
}

impl SkipSink for JsonlSkipLog {
    fn skip(&self, record: &SkipRecord) -> Result<(), SinkError> {
        let line = serde_json::to_string(record)?;
        let mut writer = self.writer.lock();
        writeln!(writer, "{}", line)?;
        Ok(())
    }

    fn flush(&self) -> Result<(), SinkError> {
        self.writer.lock().flush()?;
        Ok(())
    }
}

/// Skip sink that only logs
#[derive(Debug, Default)]
pub struct TracingSkipSink;

impl SkipSink for TracingSkipSink {
    fn skip(&self, record: &SkipRecord) -> Result<(), SinkError> {
        tracing::info!("Skipped {}: {}", record.url, record.reason);
        Ok(())
    }
}

/// Sinks that keep everything in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    articles: Mutex<Vec<ArticleRecord>>,
    skips: Mutex<Vec<SkipRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn articles(&self) -> Vec<ArticleRecord> {
        self.articles.lock().clone()
    }

    pub fn skips(&self) -> Vec<SkipRecord> {
        self.skips.lock().clone()
    }
}

impl ArticleSink for MemorySink {
    fn write(&self, record: &ArticleRecord) -> Result<(), SinkError> {
        self.articles.lock().push(record.clone());
        Ok(())
    }
}

impl SkipSink for MemorySink {
    fn skip(&self, record: &SkipRecord) -> Result<(), SinkError> {
        self.skips.lock().push(record.clone());
        Ok(())
    }
}
