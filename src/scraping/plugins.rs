//! Extension points
//!
//! Four capability traits let callers extend the pipeline without touching
//! it: fetch strategies tried when the built-in upgrade does not help,
//! extractors tried when the cascade falls back to the DOM heuristic,
//! scorers that adjust the built-in score, and output formatters used by
//! the directory sink. Every plugin call is isolated: an error or panic is
//! logged and the pipeline carries on as if the plugin had declined.

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::RwLock;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;
use url::Url;

use super::classifier::PageSignals;
use super::dom;
use super::extractor::Candidate;
use super::sink::ArticleRecord;

/// Error reported by a plugin
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("plugin '{plugin}' failed: {message}")]
    Failed { plugin: String, message: String },
    #[error("plugin '{0}' panicked")]
    Panicked(String),
    #[error("plugin '{0}' timed out")]
    Timeout(String),
}

impl PluginError {
    pub fn failed(plugin: &str, message: impl Into<String>) -> Self {
        Self::Failed {
            plugin: plugin.to_string(),
            message: message.into(),
        }
    }
}

/// Custom fetch strategy, tried after the built-in strategies fail to improve
#[async_trait]
pub trait FetchStrategyPlugin: Send + Sync {
    fn name(&self) -> &str;
    fn can_handle(&self, url: &Url, signals: &PageSignals) -> bool;
    async fn fetch(&self, url: &Url, timeout: Duration) -> Result<String, PluginError>;
}

/// Custom main-content extractor
pub trait ExtractorPlugin: Send + Sync {
    fn name(&self) -> &str;
    /// Higher runs first
    fn priority(&self) -> i32 {
        0
    }
    fn can_extract(&self, url: &Url, html: &str) -> bool;
    /// Content HTML fragment, or `None` to decline
    fn extract(&self, url: &Url, html: &str) -> Result<Option<String>, PluginError>;
}

/// Adjusts the built-in article score
pub trait ScorerPlugin: Send + Sync {
    fn name(&self) -> &str;
    /// Return the new score given the running score
    fn score(&self, url: &Url, html: &str, current: i32) -> Result<i32, PluginError>;
}

/// Writes an extra `<slug>.<extension>` file next to each JSON record
pub trait OutputFormatterPlugin: Send + Sync {
    fn name(&self) -> &str;
    /// File extension without the leading dot
    fn extension(&self) -> &str;
    fn format(&self, record: &ArticleRecord) -> Result<String, PluginError>;
}

/// Ordered collection of registered plugins
#[derive(Clone, Default)]
pub struct ExtensionRegistry {
    strategies: Vec<Arc<dyn FetchStrategyPlugin>>,
    extractors: Vec<Arc<dyn ExtractorPlugin>>,
    scorers: Vec<Arc<dyn ScorerPlugin>>,
    formatters: Vec<Arc<dyn OutputFormatterPlugin>>,
}

static GLOBAL: OnceLock<RwLock<ExtensionRegistry>> = OnceLock::new();

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry, snapshotted by coordinators at construction
    pub fn global() -> &'static RwLock<ExtensionRegistry> {
        GLOBAL.get_or_init(|| RwLock::new(ExtensionRegistry::default()))
    }

    pub fn register_strategy(&mut self, plugin: Arc<dyn FetchStrategyPlugin>) {
        self.strategies.push(plugin);
    }

    pub fn register_extractor(&mut self, plugin: Arc<dyn ExtractorPlugin>) {
        self.extractors.push(plugin);
    }

    pub fn register_scorer(&mut self, plugin: Arc<dyn ScorerPlugin>) {
        self.scorers.push(plugin);
    }

    pub fn register_formatter(&mut self, plugin: Arc<dyn OutputFormatterPlugin>) {
        self.formatters.push(plugin);
    }

    pub fn strategies(&self) -> &[Arc<dyn FetchStrategyPlugin>] {
        &self.strategies
    }

    pub fn extractors(&self) -> &[Arc<dyn ExtractorPlugin>] {
        &self.extractors
    }

    pub fn scorers(&self) -> &[Arc<dyn ScorerPlugin>] {
        &self.scorers
    }

    pub fn formatters(&self) -> &[Arc<dyn OutputFormatterPlugin>] {
        &self.formatters
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
            && self.extractors.is_empty()
            && self.scorers.is_empty()
            && self.formatters.is_empty()
    }
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("strategies", &self.strategies.len())
            .field("extractors", &self.extractors.len())
            .field("scorers", &self.scorers.len())
            .field("formatters", &self.formatters.len())
            .finish()
    }
}

/// Run a synchronous plugin call, turning panics into `PluginError::Panicked`
fn guarded<T>(name: &str, f: impl FnOnce() -> Result<T, PluginError>) -> Result<T, PluginError> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(_) => Err(PluginError::Panicked(name.to_string())),
    }
}

/// First extractor (by descending priority) that accepts the page and
/// yields at least `min_words`
pub(crate) fn run_extractors(
    plugins: &[Arc<dyn ExtractorPlugin>],
    url: &Url,
    html: &str,
    min_words: usize,
) -> Option<(String, Candidate)> {
    for plugin in plugins {
        let name = plugin.name();
        let outcome = guarded(name, || {
            if !plugin.can_extract(url, html) {
                return Ok(None);
            }
            plugin.extract(url, html)
        });

        match outcome {
            Ok(Some(content)) => {
                let word_count = dom::html_word_count(&content);
                if word_count >= min_words {
                    return Some((
                        name.to_string(),
                        Candidate {
                            html: content,
                            word_count,
                        },
                    ));
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Extractor plugin error on {}: {}", url, e),
        }
    }
    None
}

/// Apply scorers in order, returning each plugin's delta
pub(crate) fn run_scorers(
    plugins: &[Arc<dyn ScorerPlugin>],
    url: &Url,
    html: &str,
    base: i32,
) -> Vec<(String, i32)> {
    let mut running = base;
    let mut deltas = Vec::new();
    for plugin in plugins {
        let name = plugin.name();
        match guarded(name, || plugin.score(url, html, running)) {
            Ok(new_score) => {
                deltas.push((name.to_string(), new_score - running));
                running = new_score;
            }
            Err(e) => warn!("Scorer plugin error on {}: {}", url, e),
        }
    }
    deltas
}

/// Run one fetch-strategy plugin with error, panic and timeout isolation
pub(crate) async fn run_strategy(
    plugin: &Arc<dyn FetchStrategyPlugin>,
    url: &Url,
    signals: &PageSignals,
    timeout: Duration,
) -> Option<String> {
    let name = plugin.name();
    let applies = guarded(name, || Ok(plugin.can_handle(url, signals))).unwrap_or(false);
    if !applies {
        return None;
    }

    let call = AssertUnwindSafe(plugin.fetch(url, timeout)).catch_unwind();
    let outcome = match tokio::time::timeout(timeout, call).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(PluginError::Panicked(name.to_string())),
        Err(_) => Err(PluginError::Timeout(name.to_string())),
    };

    match outcome {
        Ok(html) => Some(html),
        Err(e) => {
            warn!("Fetch strategy plugin error on {}: {}", url, e);
            None
        }
    }
}

/// Apply formatters to one record, skipping any that fail
pub(crate) fn run_formatters(
    plugins: &[Arc<dyn OutputFormatterPlugin>],
    record: &ArticleRecord,
) -> Vec<(String, String)> {
    plugins
        .iter()
        .filter_map(|plugin| match guarded(plugin.name(), || plugin.format(record)) {
            Ok(body) => Some((plugin.extension().to_string(), body)),
            Err(e) => {
                warn!("Formatter plugin error for {}: {}", record.url, e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        name: &'static str,
        priority: i32,
        body: Option<&'static str>,
    }

    impl ExtractorPlugin for Fixed {
        fn name(&self) -> &str {
            self.name
        }
        fn priority(&self) -> i32 {
            self.priority
        }
        fn can_extract(&self, _url: &Url, _html: &str) -> bool {
            true
        }
        fn extract(&self, _url: &Url, _html: &str) -> Result<Option<String>, PluginError> {
            Ok(self.body.map(str::to_string))
        }
    }

    struct Panicky;

    impl ExtractorPlugin for Panicky {
        fn name(&self) -> &str {
            "panicky"
        }
        fn priority(&self) -> i32 {
            100
        }
        fn can_extract(&self, _url: &Url, _html: &str) -> bool {
            panic!("boom")
        }
        fn extract(&self, _url: &Url, _html: &str) -> Result<Option<String>, PluginError> {
            Ok(None)
        }
    }

    struct Boost(i32);

    impl ScorerPlugin for Boost {
        fn name(&self) -> &str {
            "boost"
        }
        fn score(&self, _url: &Url, _html: &str, current: i32) -> Result<i32, PluginError> {
            Ok(current + self.0)
        }
    }

    struct Failing;

    impl ScorerPlugin for Failing {
        fn name(&self) -> &str {
            "failing"
        }
        fn score(&self, _url: &Url, _html: &str, _current: i32) -> Result<i32, PluginError> {
            Err(PluginError::failed("failing", "no model"))
        }
    }

    fn url() -> Url {
        Url::parse("https://example.com/a").unwrap()
    }

    #[test]
    fn test_extractor_panic_isolated_and_min_words() {
        let long = Box::leak(format!("<p>{}</p>", vec!["word"; 40].join(" ")).into_boxed_str());
        let plugins: Vec<Arc<dyn ExtractorPlugin>> = vec![
            Arc::new(Panicky),
            Arc::new(Fixed {
                name: "short",
                priority: 50,
                body: Some("<p>too short</p>"),
            }),
            Arc::new(Fixed {
                name: "long",
                priority: 10,
                body: Some(long),
            }),
        ];
        let (name, candidate) = run_extractors(&plugins, &url(), "<html></html>", 30).unwrap();
        assert_eq!(name, "long");
        assert_eq!(candidate.word_count, 40);
    }

    #[test]
    fn test_scorer_deltas_skip_failures() {
        let plugins: Vec<Arc<dyn ScorerPlugin>> =
            vec![Arc::new(Boost(7)), Arc::new(Failing), Arc::new(Boost(-2))];
        let deltas = run_scorers(&plugins, &url(), "", 30);
        assert_eq!(
            deltas,
            vec![("boost".to_string(), 7), ("boost".to_string(), -2)]
        );
    }

    #[test]
    fn test_registry_preserves_order() {
        let mut registry = ExtensionRegistry::new();
        assert!(registry.is_empty());
        registry.register_scorer(Arc::new(Boost(1)));
        registry.register_scorer(Arc::new(Failing));
        let names: Vec<_> = registry.scorers().iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, vec!["boost", "failing"]);
    }
}
