//! pageharvest: adaptive fetch, classification and content extraction
//!
//! Given arbitrary web pages, decides how each one must be retrieved
//! (plain HTTP, AMP variant, mobile user agent or a headless render),
//! extracts the main content and metadata, scores how article-like the
//! page is and drops duplicate content. A crawl orchestrator drives the
//! pipeline from seed URLs with robots.txt compliance, per-host rate
//! limiting, sitemap seeding and crawl-trap detection.

pub mod config;
pub mod scraping;

pub use config::Config;
