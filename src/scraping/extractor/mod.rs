//! Content extraction cascade
//!
//! Two structural extractors run over the same cleaned document:
//! - readability (article-focused, precise)
//! - text blocks (paragraph-level, recall-oriented)
//!
//! A word-count rule picks between them. When neither clears its minimum,
//! the DOM density heuristic runs, then any registered extractor plugins.
//! Extraction never fails: the last resort is the stripped body, or the
//! original markup when the page has no body text at all.

mod blocks;
mod density;
mod metadata;
mod readable;
mod text;
mod types;

pub use density::{dominates, CONTENT_SELECTORS};
pub use metadata::{json_ld_types, parse_date};
pub use text::{html_to_text, normalize_whitespace};
pub use types::*;

use scraper::Selector;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use url::Url;

use super::dom;
use super::plugins::{self, ExtractorPlugin};

/// Intermediate output of one extraction strategy
#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    pub html: String,
    pub word_count: usize,
}

/// Which primary extractor won the word-count rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    Readability,
    TextBlocks,
}

/// Pick between readability (`a_words`) and text blocks (`b_words`).
///
/// Text blocks win a contest when they reach `blocks_over_readability_ratio`
/// times the readability count, inclusive. `None` means neither cleared its
/// minimum and the density heuristic should run.
pub fn select_winner(a_words: usize, b_words: usize, config: &CascadeConfig) -> Option<Winner> {
    let a_ok = a_words >= config.readability_min_words;
    let b_ok = b_words >= config.blocks_min_words;

    match (a_ok, b_ok) {
        (true, true) => {
            let threshold = a_words as f64 * config.blocks_over_readability_ratio;
            if b_words as f64 >= threshold - 1e-9 {
                Some(Winner::TextBlocks)
            } else {
                Some(Winner::Readability)
            }
        }
        (true, false) => Some(Winner::Readability),
        (false, true) => Some(Winner::TextBlocks),
        (false, false) => None,
    }
}

/// Content extractor
pub struct ContentExtractor {
    pub(crate) config: CascadeConfig,
    content_selectors: Vec<Selector>,
    /// Pre-compiled meta selectors: meta name -> (name selector, property selector)
    pub(crate) meta_selectors: HashMap<String, (Option<Selector>, Option<Selector>)>,
    plugins: Vec<Arc<dyn ExtractorPlugin>>,
}

impl ContentExtractor {
    pub fn new(config: CascadeConfig) -> Self {
        let content_selectors = dom::compile_selectors(CONTENT_SELECTORS);

        let meta_names = [
            "og:title",
            "og:description",
            "og:type",
            "og:url",
            "og:site_name",
            "og:locale",
            "title",
            "description",
            "author",
            "date",
            "language",
            "article:published_time",
            "article:modified_time",
        ];

        let mut meta_selectors = HashMap::with_capacity(meta_names.len());
        for name in &meta_names {
            let name_sel = Selector::parse(&format!("meta[name='{}']", name)).ok();
            let prop_sel = Selector::parse(&format!("meta[property='{}']", name)).ok();
            meta_selectors.insert(name.to_string(), (name_sel, prop_sel));
        }

        Self {
            config,
            content_selectors,
            meta_selectors,
            plugins: Vec::new(),
        }
    }

    /// Attach extractor plugins, consulted highest priority first
    pub fn with_plugins(mut self, mut plugins: Vec<Arc<dyn ExtractorPlugin>>) -> Self {
        plugins.sort_by_key(|p| std::cmp::Reverse(p.priority()));
        self.plugins = plugins;
        self
    }

    pub fn config(&self) -> &CascadeConfig {
        &self.config
    }

    /// Run the cascade over raw page HTML
    pub fn extract(&self, html: &str, url: &Url) -> ExtractionResult {
        let clean = dom::parse_clean(html);
        let readable_input = clean.root_element().html();

        let a = readable::extract(&readable_input, url);
        let b = blocks::extract(&clean, &self.config);
        let candidates = CandidateCounts {
            readability: a.as_ref().map_or(0, |c| c.word_count),
            text_blocks: b.word_count,
        };

        let (candidate, method) = match (
            select_winner(candidates.readability, candidates.text_blocks, &self.config),
            a,
        ) {
            (Some(Winner::Readability), Some(a)) => (a, ExtractionMethod::Readability),
            (Some(Winner::TextBlocks), _) => (b, ExtractionMethod::TextBlocks),
            _ => {
                let fallback = density::extract(html, &self.content_selectors, &self.config);
                match plugins::run_extractors(
                    &self.plugins,
                    url,
                    html,
                    self.config.plugin_min_words,
                ) {
                    Some((name, candidate)) => (candidate, ExtractionMethod::Plugin(name)),
                    None => fallback,
                }
            }
        };

        debug!(
            "extracted {} via {} ({} words; readability={}, text_blocks={})",
            url, method, candidate.word_count, candidates.readability, candidates.text_blocks
        );

        ExtractionResult {
            text: html_to_text(&candidate.html),
            html: candidate.html,
            method,
            word_count: candidate.word_count,
            candidates,
        }
    }
}

impl Default for ContentExtractor {
    fn default() -> Self {
        Self::new(CascadeConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("word{}", i)).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_ratio_boundary_139_vs_140() {
        let config = CascadeConfig::default();
        assert_eq!(select_winner(100, 139, &config), Some(Winner::Readability));
        assert_eq!(select_winner(100, 140, &config), Some(Winner::TextBlocks));
    }

    #[test]
    fn test_minimums() {
        let config = CascadeConfig::default();
        assert_eq!(select_winner(49, 29, &config), None);
        assert_eq!(select_winner(50, 29, &config), Some(Winner::Readability));
        assert_eq!(select_winner(49, 30, &config), Some(Winner::TextBlocks));
        // B below its own minimum never contests A, whatever the ratio
        assert_eq!(select_winner(10, 29, &config), None);
    }

    #[test]
    fn test_overridable_ratio() {
        let config = CascadeConfig {
            blocks_over_readability_ratio: 2.0,
            ..Default::default()
        };
        assert_eq!(select_winner(100, 199, &config), Some(Winner::Readability));
        assert_eq!(select_winner(100, 200, &config), Some(Winner::TextBlocks));
    }

    #[test]
    fn test_article_page_extracts_body() {
        let html = format!(
            r#"<html><head><title>Post</title></head><body>
            <nav><a href="/">Home</a> <a href="/about">About</a></nav>
            <article><h1>Post</h1><p>{}</p><p>{}</p></article>
            <footer>Copyright 2024</footer></body></html>"#,
            words(120),
            words(90)
        );
        let url = Url::parse("https://example.com/blog/post").unwrap();
        let result = ContentExtractor::default().extract(&html, &url);

        assert!(matches!(
            result.method,
            ExtractionMethod::Readability | ExtractionMethod::TextBlocks
        ));
        assert!(result.word_count >= 200);
        assert!(!result.text.contains("Copyright"));
        assert!(!result.is_empty());
    }

    #[test]
    fn test_template_content_never_extracted() {
        let html = format!(
            "<html><body><p>{}</p><template><p>secret modal body</p></template></body></html>",
            words(60)
        );
        let url = Url::parse("https://example.com/a").unwrap();
        let result = ContentExtractor::default().extract(&html, &url);
        assert!(!result.text.contains("secret"));
    }

    #[test]
    fn test_thin_page_never_empty() {
        let html = "<html><body><div>Just a few words</div></body></html>";
        let url = Url::parse("https://example.com/thin").unwrap();
        let result = ContentExtractor::default().extract(html, &url);
        assert_eq!(result.method, ExtractionMethod::FullBody);
        assert_eq!(result.text, "Just a few words");
    }
}
