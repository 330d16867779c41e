//! Article scoring
//!
//! An additive model over independent URL-shape and content-shape terms.
//! Every term that fires is recorded with its weight, so the final score is
//! always the plain sum of `signals`. Scoring holds no mutable state: the
//! same `(url, html)` always produces the same score.

use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

use super::dom;
use super::extractor::json_ld_types;
use super::plugins::{self, ScorerPlugin};

/// Path segments that usually lead to single articles
pub const ARTICLE_PATH_SEGMENTS: &[&str] = &[
    "blog", "blogs", "post", "posts", "article", "articles", "news", "story", "stories", "essay",
    "essays", "journal", "write", "writing", "p", "entry", "entries", "publication",
    "publications", "insight", "insights", "tutorial", "tutorials", "guide", "guides", "learn",
    "thought", "thoughts",
];

/// Listing and utility pages
pub const LISTING_PATTERNS: &[&str] = &[
    r"/tag/",
    r"/tags/",
    r"/category/",
    r"/categories/",
    r"/search(\?|$|/)",
    r"/login(\?|$|/)",
    r"/signin(\?|$|/)",
    r"/signup(\?|$|/)",
    r"/register(\?|$|/)",
    r"/logout(\?|$|/)",
    r"/privacy(\?|$|/)",
    r"/terms(\?|$|/)",
    r"/feed(\?|$|/)",
    r"/rss(\?|$|/)",
    r"/sitemap",
    r"/archives?(\?|$|/)",
];

/// Lowercased schema.org types treated as articles
const ARTICLE_SCHEMA_TYPES: &[&str] = &[
    "article",
    "blogposting",
    "newsarticle",
    "techarticle",
    "technicalarticle",
    "scholarlyarticle",
    "liveblogposting",
    "reportage",
    "reportagenewsarticle",
    "satiricalarticle",
    "socialmediaposting",
];

/// Weights and tiers of the scoring model
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Accept as article from this score
    pub threshold: i32,

    pub article_segment: i32,
    pub date_path: i32,
    /// Applied at `deep_path_segments` or more segments
    pub deep_path: i32,
    pub deep_path_segments: usize,
    /// Applied at exactly two segments
    pub two_segments: i32,
    /// Applied at one segment or fewer
    pub shallow_path: i32,
    pub listing_path: i32,
    pub paginated: i32,
    pub author_listing: i32,

    pub long_text_words: usize,
    pub long_text: i32,
    pub medium_text_words: usize,
    pub medium_text: i32,
    pub short_text_words: usize,
    pub short_text: i32,

    pub single_h1: i32,
    /// Applied above `max_h1` headings (listing pages)
    pub max_h1: usize,
    pub many_h1: i32,
    pub min_paragraphs: usize,
    pub paragraph_min_words: usize,
    pub paragraphs: i32,

    pub author_meta: i32,
    pub date_meta: i32,
    pub article_schema: i32,
    pub og_article: i32,

    pub max_links: usize,
    pub many_links: i32,
    pub pagination_links: i32,

    pub article_segments: Vec<String>,
    pub listing_patterns: Vec<String>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            threshold: 35,
            article_segment: 15,
            date_path: 10,
            deep_path: 5,
            deep_path_segments: 4,
            two_segments: 3,
            shallow_path: -20,
            listing_path: -30,
            paginated: -15,
            author_listing: -10,
            long_text_words: 300,
            long_text: 15,
            medium_text_words: 150,
            medium_text: 8,
            short_text_words: 50,
            short_text: -20,
            single_h1: 10,
            max_h1: 3,
            many_h1: -5,
            min_paragraphs: 3,
            paragraph_min_words: 20,
            paragraphs: 5,
            author_meta: 5,
            date_meta: 5,
            article_schema: 10,
            og_article: 5,
            max_links: 30,
            many_links: -10,
            pagination_links: -15,
            article_segments: ARTICLE_PATH_SEGMENTS.iter().map(|s| s.to_string()).collect(),
            listing_patterns: LISTING_PATTERNS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// One term that contributed to a score
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoreSignal {
    pub name: String,
    pub weight: i32,
}

/// Outcome of scoring one page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArticleScore {
    pub score: i32,
    pub accepted: bool,
    pub signals: Vec<ScoreSignal>,
}

impl ArticleScore {
    pub fn signal_names(&self) -> Vec<&str> {
        self.signals.iter().map(|s| s.name.as_str()).collect()
    }
}

struct Selectors {
    h1: Selector,
    paragraph: Selector,
    link: Selector,
    rel_link: Selector,
    meta: Selector,
    time: Selector,
}

impl Selectors {
    fn compile() -> Option<Self> {
        Some(Self {
            h1: Selector::parse("h1").ok()?,
            paragraph: Selector::parse("p").ok()?,
            link: Selector::parse("a[href]").ok()?,
            rel_link: Selector::parse("link[rel]").ok()?,
            meta: Selector::parse("meta[content]").ok()?,
            time: Selector::parse("time[datetime]").ok()?,
        })
    }
}

/// Scores pages for "is this a single article"
pub struct ArticleScorer {
    config: ScoringConfig,
    listing: Vec<Regex>,
    date_path: Option<Regex>,
    page_path: Option<Regex>,
    selectors: Option<Selectors>,
    plugins: Vec<Arc<dyn ScorerPlugin>>,
}

impl ArticleScorer {
    pub fn new(config: ScoringConfig) -> Self {
        let listing = config
            .listing_patterns
            .iter()
            .filter_map(|pattern| match Regex::new(&format!("(?i){}", pattern)) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::warn!("Invalid listing pattern '{}': {}", pattern, e);
                    None
                }
            })
            .collect();

        Self {
            config,
            listing,
            date_path: Regex::new(r"/\d{4}/\d{2}(/\d{2})?").ok(),
            page_path: Regex::new(r"/page/\d+").ok(),
            selectors: Selectors::compile(),
            plugins: Vec::new(),
        }
    }

    /// Attach scorer plugins, applied in registration order
    pub fn with_plugins(mut self, plugins: Vec<Arc<dyn ScorerPlugin>>) -> Self {
        self.plugins = plugins;
        self
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn threshold(&self) -> i32 {
        self.config.threshold
    }

    pub fn score(&self, url: &Url, html: &str) -> ArticleScore {
        let mut signals = Vec::new();
        self.url_terms(url, &mut signals);
        self.content_terms(html, &mut signals);

        let base: i32 = signals.iter().map(|s| s.weight).sum();
        for (name, delta) in plugins::run_scorers(&self.plugins, url, html, base) {
            signals.push(ScoreSignal {
                name: format!("plugin:{}", name),
                weight: delta,
            });
        }

        let score = signals.iter().map(|s| s.weight).sum();
        ArticleScore {
            score,
            accepted: score >= self.config.threshold,
            signals,
        }
    }

    fn url_terms(&self, url: &Url, signals: &mut Vec<ScoreSignal>) {
        let cfg = &self.config;
        let path = url.path().to_lowercase();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut add = |name: &str, weight: i32| push(signals, name, weight);

        if segments
            .iter()
            .any(|seg| cfg.article_segments.iter().any(|a| a == seg))
        {
            add("article_path_segment", cfg.article_segment);
        }

        if self.date_path.as_ref().is_some_and(|re| re.is_match(&path)) {
            add("date_in_path", cfg.date_path);
        }

        match segments.len() {
            n if n >= cfg.deep_path_segments => add("deep_path", cfg.deep_path),
            2 => add("two_segment_path", cfg.two_segments),
            n if n <= 1 => add("shallow_path", cfg.shallow_path),
            _ => {}
        }

        if self.listing.iter().any(|re| re.is_match(&path)) {
            add("listing_path", cfg.listing_path);
        }

        let page_param = url.query_pairs().any(|(k, _)| k == "page");
        if page_param || self.page_path.as_ref().is_some_and(|re| re.is_match(&path)) {
            add("paginated", cfg.paginated);
        }

        if path.contains("/author/") && segments.len() <= 2 {
            add("author_listing", cfg.author_listing);
        }
    }

    fn content_terms(&self, html: &str, signals: &mut Vec<ScoreSignal>) {
        let cfg = &self.config;
        let Some(sel) = self.selectors.as_ref() else {
            return;
        };

        let raw = Html::parse_document(html);
        let stripped = dom::parse_stripped(html);
        let words = dom::element_word_count(dom::body_or_root(&stripped));

        if words > cfg.long_text_words {
            push(signals, "long_text", cfg.long_text);
        } else if words >= cfg.medium_text_words {
            push(signals, "medium_text", cfg.medium_text);
        } else if words < cfg.short_text_words {
            push(signals, "short_text", cfg.short_text);
        }

        match stripped.select(&sel.h1).count() {
            1 => push(signals, "single_h1", cfg.single_h1),
            n if n > cfg.max_h1 => push(signals, "many_h1", cfg.many_h1),
            _ => {}
        }

        let substantial = stripped
            .select(&sel.paragraph)
            .filter(|p| dom::element_word_count(*p) >= cfg.paragraph_min_words)
            .count();
        if substantial >= cfg.min_paragraphs {
            push(signals, "paragraphs", cfg.paragraphs);
        }

        let meta = MetaFlags::scan(&raw, sel);
        if meta.author {
            push(signals, "author_meta", cfg.author_meta);
        }
        if meta.date {
            push(signals, "date_meta", cfg.date_meta);
        }
        if meta.article_schema {
            push(signals, "article_schema", cfg.article_schema);
        }
        if meta.og_article {
            push(signals, "og_article", cfg.og_article);
        }

        if raw.select(&sel.link).count() > cfg.max_links {
            push(signals, "many_links", cfg.many_links);
        }

        let has_pagination = raw.select(&sel.rel_link).any(|link| {
            link.value()
                .attr("rel")
                .unwrap_or_default()
                .split_whitespace()
                .any(|rel| rel.eq_ignore_ascii_case("next") || rel.eq_ignore_ascii_case("prev"))
        });
        if has_pagination {
            push(signals, "pagination_links", cfg.pagination_links);
        }
    }
}

impl Default for ArticleScorer {
    fn default() -> Self {
        Self::new(ScoringConfig::default())
    }
}

fn push(signals: &mut Vec<ScoreSignal>, name: &str, weight: i32) {
    signals.push(ScoreSignal {
        name: name.to_string(),
        weight,
    });
}

#[derive(Debug, Default)]
struct MetaFlags {
    author: bool,
    date: bool,
    article_schema: bool,
    og_article: bool,
}

impl MetaFlags {
    fn scan(doc: &Html, sel: &Selectors) -> Self {
        let mut flags = MetaFlags::default();

        for value in json_ld_values(doc) {
            flags.author |= value.get("author").is_some_and(|a| !a.is_null());
            flags.date |= value.get("datePublished").is_some_and(|d| !d.is_null());
        }
        flags.article_schema = json_ld_types(doc)
            .iter()
            .any(|t| ARTICLE_SCHEMA_TYPES.contains(&t.to_lowercase().as_str()));

        for meta in doc.select(&sel.meta) {
            let el = meta.value();
            let key = el
                .attr("property")
                .or_else(|| el.attr("name"))
                .unwrap_or_default()
                .to_lowercase();
            let content = el.attr("content").unwrap_or_default().trim();
            if content.is_empty() {
                continue;
            }
            match key.as_str() {
                "og:type" if content.eq_ignore_ascii_case("article") => flags.og_article = true,
                "author" | "article:author" | "og:article:author" => flags.author = true,
                "article:published_time" | "date" | "dc.date" => flags.date = true,
                _ => {}
            }
        }

        flags.date |= doc.select(&sel.time).next().is_some();
        flags
    }
}

fn json_ld_values(doc: &Html) -> Vec<serde_json::Value> {
    let Ok(selector) = Selector::parse("script[type='application/ld+json']") else {
        return Vec::new();
    };
    doc.select(&selector)
        .filter_map(|script| {
            serde_json::from_str::<serde_json::Value>(&script.text().collect::<String>()).ok()
        })
        .flat_map(|value| match value {
            serde_json::Value::Array(items) => items,
            other => match other.get("@graph").and_then(|g| g.as_array()).cloned() {
                Some(mut graph) => {
                    graph.push(other);
                    graph
                }
                None => vec![other],
            },
        })
        .collect()
}
