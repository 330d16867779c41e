//! Coordinator types: configuration, outcomes, and statistics

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;

use crate::config::Config;
use crate::scraping::{
    classifier::ClassifierConfig,
    dedup::{DedupConfig, Fingerprint},
    extractor::CascadeConfig,
    fetcher::{FetchConfig, FetchError},
    frontier::FrontierConfig,
    scorer::ScoringConfig,
    sink::ArticleRecord,
    trap_detection::TrapDetectorConfig,
    urlnorm::UrlError,
};

use super::url_filter::DiscoveredLink;

/// Runtime configuration for the coordinator
#[derive(Debug, Clone)]
pub struct ScrapingConfig {
    /// Pages processed concurrently by `crawl`
    pub workers: usize,
    /// Follow only links on the seed hosts
    pub stay_on_domain: bool,
    /// URL regexes a discovered link must match (any)
    pub include_patterns: Vec<String>,
    /// URL regexes that reject a discovered link
    pub exclude_patterns: Vec<String>,
    /// Seed the frontier from sitemaps
    pub use_sitemaps: bool,
    /// Wall-clock budget for one crawl
    pub time_budget: Option<Duration>,
    /// Seen-URL file read before and written after a crawl
    pub resume_file: Option<PathBuf>,
    /// A mobile-UA refetch must beat static by this factor
    pub mobile_improvement_ratio: f64,
    /// Static pages thinner than this get a render attempt when the
    /// recommended strategy did not help
    pub thin_static_words: usize,
    pub frontier: FrontierConfig,
    pub fetch: FetchConfig,
    pub classifier: ClassifierConfig,
    pub cascade: CascadeConfig,
    pub scoring: ScoringConfig,
    pub dedup: DedupConfig,
    pub trap_detector: TrapDetectorConfig,
}

impl ScrapingConfig {
    /// Assemble the runtime configuration from the TOML sections
    pub fn from_config(config: &Config) -> Self {
        let crawl = &config.crawl;
        Self {
            workers: crawl.workers,
            stay_on_domain: crawl.stay_on_domain,
            include_patterns: crawl.include_patterns.clone(),
            exclude_patterns: crawl.exclude_patterns.clone(),
            use_sitemaps: crawl.use_sitemaps,
            time_budget: crawl.time_budget_secs.map(Duration::from_secs),
            resume_file: crawl.resume_file.clone(),
            mobile_improvement_ratio: crawl.mobile_improvement_ratio,
            thin_static_words: crawl.thin_static_words,
            frontier: FrontierConfig {
                max_depth: crawl.max_depth,
                max_pages: crawl.max_pages,
            },
            fetch: config.fetch.clone(),
            classifier: config.classifier.clone(),
            cascade: config.extraction.clone(),
            scoring: config.scoring.clone(),
            dedup: crawl.dedup.clone(),
            trap_detector: crawl.traps.clone(),
        }
    }
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Why a fetched page was not accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    LowScore(i32),
    Duplicate {
        fingerprint: Fingerprint,
        first_url: String,
    },
    EmptyExtraction,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LowScore(score) => write!(f, "low_article_score ({})", score),
            Self::Duplicate { fingerprint, .. } => write!(f, "duplicate_content ({})", fingerprint),
            Self::EmptyExtraction => f.write_str("extraction_returned_empty"),
        }
    }
}

/// Why a URL could not be processed
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Url(#[from] UrlError),
    #[error("processing task failed: {0}")]
    Task(String),
}

impl ProcessError {
    pub fn skip_reason(&self) -> String {
        match self {
            Self::Fetch(e) => e.skip_reason(),
            Self::Url(e) => format!("invalid_url: {}", e),
            Self::Task(e) => format!("processing_failed: {}", e),
        }
    }
}

/// Outcome of the per-URL pipeline
#[derive(Debug)]
pub enum ProcessOutcome {
    Accepted(Box<ArticleRecord>),
    Rejected(SkipReason),
    Failed(ProcessError),
}

impl ProcessOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Skip-log reason, `None` when accepted
    pub fn reason(&self) -> Option<String> {
        match self {
            Self::Accepted(_) => None,
            Self::Rejected(reason) => Some(reason.to_string()),
            Self::Failed(error) => Some(error.skip_reason()),
        }
    }
}

/// Result of processing a single URL
#[derive(Debug)]
pub struct ProcessResult {
    /// URL as given by the caller
    pub url: String,
    pub outcome: ProcessOutcome,
    /// Links found on the page, empty when the fetch failed
    pub discovered: Vec<DiscoveredLink>,
    pub elapsed: Duration,
}

/// What `process_batch` does when one URL fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum FailurePolicy {
    /// Keep going; the failure is reported in its slot
    #[default]
    Skip,
    /// Stop starting new URLs and report the first failure
    Abort,
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("batch aborted at {url}: {reason}")]
    Aborted { url: String, reason: String },
}

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("no valid seed URLs")]
    NoSeeds,
    #[error("failed to write resume file: {0}")]
    Resume(#[from] std::io::Error),
}

/// Crawl counters, shared by all workers
#[derive(Debug, Default)]
pub(super) struct StatsCounters {
    pub processed: AtomicU64,
    pub accepted: AtomicU64,
    pub rejected: AtomicU64,
    pub failed: AtomicU64,
    pub duplicates: AtomicU64,
    pub discovered: AtomicU64,
}

impl StatsCounters {
    pub fn record(&self, outcome: &ProcessOutcome) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            ProcessOutcome::Accepted(_) => &self.accepted,
            ProcessOutcome::Rejected(reason) => {
                if matches!(reason, SkipReason::Duplicate { .. }) {
                    self.duplicates.fetch_add(1, Ordering::Relaxed);
                }
                &self.rejected
            }
            ProcessOutcome::Failed(_) => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CrawlStats {
        CrawlStats {
            processed: self.processed.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            discovered: self.discovered.load(Ordering::Relaxed),
        }
    }
}

/// Statistics from the scraping coordinator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CrawlStats {
    pub processed: u64,
    pub accepted: u64,
    /// Rejected for score, duplication or empty extraction
    pub rejected: u64,
    pub failed: u64,
    /// Subset of `rejected`
    pub duplicates: u64,
    /// Links admitted to the frontier
    pub discovered: u64,
}
