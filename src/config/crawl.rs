//! Crawl orchestration configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::scraping::dedup::DedupConfig;
use crate::scraping::trap_detection::TrapDetectorConfig;

/// `[crawl]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Pages processed concurrently
    pub workers: usize,
    /// Maximum pages admitted per crawl
    pub max_pages: usize,
    /// Maximum link depth from a seed
    pub max_depth: u32,
    /// Follow only links on the seed hosts
    pub stay_on_domain: bool,
    /// URL regexes a discovered link must match (any)
    pub include_patterns: Vec<String>,
    /// URL regexes that reject a discovered link
    pub exclude_patterns: Vec<String>,
    /// Seed the frontier from robots.txt and well-known sitemaps
    pub use_sitemaps: bool,
    /// Stop admitting new pages after this many seconds
    pub time_budget_secs: Option<u64>,
    /// Seen-URL file for resuming an interrupted crawl
    pub resume_file: Option<PathBuf>,
    /// Mobile-UA HTML must have this many times the static word count
    pub mobile_improvement_ratio: f64,
    /// Static HTML below this word count gets a render attempt
    pub thin_static_words: usize,
    pub dedup: DedupConfig,
    pub traps: TrapDetectorConfig,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_pages: 100,
            max_depth: 3,
            stay_on_domain: true,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            use_sitemaps: true,
            time_budget_secs: None,
            resume_file: None,
            mobile_improvement_ratio: 1.3,
            thin_static_words: 150,
            dedup: DedupConfig::default(),
            traps: TrapDetectorConfig::default(),
        }
    }
}
