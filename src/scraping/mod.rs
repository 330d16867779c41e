//! Adaptive page harvesting
//!
//! Every URL goes through the same pipeline: robots.txt check, a static
//! fetch, classification of the HTML, at most one upgraded fetch (AMP,
//! mobile user agent or headless render), the extraction cascade, article
//! scoring and content deduplication. The coordinator runs that pipeline
//! for single URLs, ordered batches and frontier-driven crawls.
//!
//! Key components:
//! - `PageClassifier`: decides how a page must be fetched
//! - `Fetcher`: static, mobile-UA, AMP and rendered retrieval with retries
//! - `ContentExtractor`: readability / text-block / DOM cascade
//! - `ArticleScorer`: URL and structure heuristics for "is this an article"
//! - `ContentDeduplicator`: session-scoped text fingerprints
//! - `Frontier`: prioritized, bounded crawl queue with resume support
//! - `ScrapingCoordinator`: orchestrates the entire pipeline

pub mod classifier;
pub mod coordinator;
pub mod dedup;
pub mod dom;
pub mod extractor;
pub mod fetcher;
pub mod frontier;
pub mod plugins;
pub mod politeness;
pub mod scorer;
pub mod sink;
pub mod sitemap;
pub mod trap_detection;
pub mod urlnorm;

pub use classifier::{ClassificationResult, FetchStrategy, PageClassifier, PageType};
pub use coordinator::{ProcessOutcome, ProcessResult, ScrapingConfig, ScrapingCoordinator};
pub use dedup::{ContentDeduplicator, Fingerprint};
pub use extractor::{ContentExtractor, ExtractionResult, PageMetadata};
pub use fetcher::{FetchConfig, FetchError, Fetcher};
pub use frontier::Frontier;
pub use plugins::ExtensionRegistry;
pub use politeness::{FetchDecision, RobotsCache};
pub use scorer::{ArticleScore, ArticleScorer};
pub use sink::{ArticleRecord, ArticleSink, SkipRecord, SkipSink};
pub use urlnorm::NormalizedUrl;
