//! Configuration for pageharvest
//!
//! One TOML file with a section per subsystem. Every section and field is
//! optional; anything left out keeps its default.

mod crawl;
mod logging;

pub use crawl::CrawlConfig;
pub use logging::{LogFormat, LogLevel, LoggingConfig};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::scraping::{
    classifier::ClassifierConfig, extractor::CascadeConfig, fetcher::FetchConfig,
    scorer::ScoringConfig,
};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Crawl orchestration, deduplication and trap limits
    pub crawl: CrawlConfig,
    /// HTTP, politeness, retry and render settings
    pub fetch: FetchConfig,
    pub classifier: ClassifierConfig,
    /// Extraction cascade thresholds
    pub extraction: CascadeConfig,
    pub scoring: ScoringConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load and validate configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file '{}'", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, else use defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) if path.exists() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    /// Validate all configuration fields, reporting every problem at once
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        // Crawl
        if self.crawl.workers == 0 {
            errors.push("crawl.workers must be positive".to_string());
        }
        if self.crawl.max_pages == 0 {
            errors.push("crawl.max_pages must be positive".to_string());
        }
        if !(self.crawl.mobile_improvement_ratio >= 1.0) {
            errors.push("crawl.mobile_improvement_ratio must be at least 1.0".to_string());
        }
        if self.crawl.dedup.prefix_chars == 0 {
            errors.push("crawl.dedup.prefix_chars must be positive".to_string());
        }
        for pattern in self
            .crawl
            .include_patterns
            .iter()
            .chain(&self.crawl.exclude_patterns)
        {
            if let Err(e) = regex::Regex::new(pattern) {
                errors.push(format!("invalid URL pattern '{}': {}", pattern, e));
            }
        }

        // Fetch
        let fetch = &self.fetch;
        if fetch.request_timeout_secs == 0 {
            errors.push("fetch.request_timeout_secs must be positive".to_string());
        }
        if fetch.request_concurrency == 0 {
            errors.push("fetch.request_concurrency must be positive".to_string());
        }
        if fetch.render_concurrency == 0 {
            errors.push("fetch.render_concurrency must be positive".to_string());
        }
        if fetch.render_concurrency > fetch.request_concurrency {
            errors.push(format!(
                "fetch.render_concurrency ({}) must not exceed request_concurrency ({})",
                fetch.render_concurrency, fetch.request_concurrency
            ));
        }
        if fetch.requests_per_second.is_nan() || fetch.requests_per_second < 0.0 {
            errors.push("fetch.requests_per_second must be >= 0 (0 disables limiting)".to_string());
        }
        if fetch.retry.max_attempts == 0 {
            errors.push("fetch.retry.max_attempts must be positive".to_string());
        }
        if fetch.retry.backoff_base_secs < 0.0 || fetch.retry.max_jitter_secs < 0.0 {
            errors.push("fetch.retry delays must not be negative".to_string());
        }
        if fetch.render.hydration_poll_ms == 0 {
            errors.push("fetch.render.hydration_poll_ms must be positive".to_string());
        }

        // Extraction
        let extraction = &self.extraction;
        if !(extraction.dominance_ratio > 0.0 && extraction.dominance_ratio <= 1.0) {
            errors.push("extraction.dominance_ratio must be between 0.0 (exclusive) and 1.0".to_string());
        }
        if !(0.0..=1.0).contains(&extraction.block_max_link_density) {
            errors.push("extraction.block_max_link_density must be between 0.0 and 1.0".to_string());
        }
        if extraction.blocks_over_readability_ratio < 1.0 {
            errors.push("extraction.blocks_over_readability_ratio must be at least 1.0".to_string());
        }

        // Classifier
        if self.classifier.mobile_min_words > self.classifier.static_min_words {
            errors.push("classifier.mobile_min_words must not exceed static_min_words".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid_config() -> Config {
        Config::default()
    }

    #[test]
    fn default_config_passes_validation() {
        assert!(valid_config().validate().is_ok(), "default config should be valid");
    }

    #[test]
    fn validate_rejects_zero_workers() {
        let mut cfg = valid_config();
        cfg.crawl.workers = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("crawl.workers must be positive"));
    }

    #[test]
    fn validate_rejects_bad_pattern() {
        let mut cfg = valid_config();
        cfg.crawl.exclude_patterns = vec!["(unclosed".to_string()];
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("invalid URL pattern '(unclosed'"));
    }

    #[test]
    fn validate_allows_zero_rate_but_not_negative() {
        let mut cfg = valid_config();
        cfg.fetch.requests_per_second = 0.0;
        assert!(cfg.validate().is_ok());
        cfg.fetch.requests_per_second = -1.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_mobile_ratio_below_one() {
        let mut cfg = valid_config();
        cfg.crawl.mobile_improvement_ratio = 0.9;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("mobile_improvement_ratio"));
    }

    #[test]
    fn validate_collects_multiple_errors() {
        let mut cfg = valid_config();
        cfg.crawl.max_pages = 0;
        cfg.fetch.retry.max_attempts = 0;
        cfg.extraction.dominance_ratio = 0.0;
        let msg = cfg.validate().unwrap_err().to_string();
        assert!(msg.contains("crawl.max_pages must be positive"));
        assert!(msg.contains("fetch.retry.max_attempts must be positive"));
        assert!(msg.contains("extraction.dominance_ratio"));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[crawl]
workers = 8
exclude_patterns = ["/archive/"]

[fetch]
render_mode = "never"

[fetch.retry]
max_attempts = 5

[scoring]
threshold = 40

[logging]
format = "json"
"#
        )
        .unwrap();

        let cfg = Config::load(file.path()).unwrap();
        assert_eq!(cfg.crawl.workers, 8);
        assert_eq!(cfg.crawl.max_pages, 100);
        assert_eq!(cfg.crawl.exclude_patterns, vec!["/archive/"]);
        assert_eq!(cfg.fetch.render_mode, crate::scraping::fetcher::RenderMode::Never);
        assert_eq!(cfg.fetch.retry.max_attempts, 5);
        assert!((cfg.fetch.retry.backoff_base_secs - 1.0).abs() < f64::EPSILON);
        assert_eq!(cfg.scoring.threshold, 40);
        assert_eq!(cfg.scoring.article_segment, 15);
        assert_eq!(cfg.logging.format, LogFormat::Json);
        assert_eq!(cfg.logging.level, LogLevel::Info);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Config::load(Path::new("/nonexistent/pageharvest.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn load_or_default_without_file() {
        let cfg = Config::load_or_default(None).unwrap();
        assert_eq!(cfg.crawl.max_depth, 3);
        assert!(cfg.fetch.respect_robots);

        let missing = Config::load_or_default(Some(Path::new("/nonexistent/pageharvest.toml"))).unwrap();
        assert_eq!(missing.crawl.workers, cfg.crawl.workers);
    }

    #[test]
    fn validate_rejects_render_pool_larger_than_request_pool() {
        let mut cfg = valid_config();
        cfg.fetch.render_concurrency = 16;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("must not exceed request_concurrency"));
    }

    #[test]
    fn invalid_toml_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[crawl]\nworkers = \"many\"\n").unwrap();
        let err = Config::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
