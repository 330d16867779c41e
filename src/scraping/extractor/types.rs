//! Extraction cascade types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Which stage of the cascade produced the content
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExtractionMethod {
    /// Readability-style article extraction
    Readability,
    /// Paragraph/heading/list block collection
    TextBlocks,
    /// Content selector or paragraph-density candidate
    DomHeuristic,
    /// Stripped `<body>`
    FullBody,
    /// Original markup, used when the body has no words
    RawHtml,
    /// A registered extractor plugin
    Plugin(String),
}

impl ExtractionMethod {
    pub fn is_plugin(&self) -> bool {
        matches!(self, Self::Plugin(_))
    }
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Readability => f.write_str("readability"),
            Self::TextBlocks => f.write_str("text_blocks"),
            Self::DomHeuristic => f.write_str("dom_heuristic"),
            Self::FullBody => f.write_str("full_body"),
            Self::RawHtml => f.write_str("raw_html"),
            Self::Plugin(name) => write!(f, "plugin:{}", name),
        }
    }
}

impl Serialize for ExtractionMethod {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Word counts of the two primary extractors, kept for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CandidateCounts {
    pub readability: usize,
    pub text_blocks: usize,
}

/// Output of the extraction cascade
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    /// Content HTML of the winning candidate
    pub html: String,
    /// Markdown-flavoured plain text rendered from `html`
    pub text: String,
    pub method: ExtractionMethod,
    pub word_count: usize,
    pub candidates: CandidateCounts,
}

impl ExtractionResult {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Thresholds of the extraction cascade
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeConfig {
    /// Readability output is usable from this many words
    pub readability_min_words: usize,
    /// Text-block output is usable from this many words
    pub blocks_min_words: usize,
    /// Text blocks beat readability when they reach this multiple of its count
    pub blocks_over_readability_ratio: f64,
    /// Blocks with a higher share of link text are dropped
    pub block_max_link_density: f64,
    /// Minimum words for a content-selector or density candidate
    pub dom_min_words: usize,
    /// Density winner must hold this share of body words, else full body wins
    pub dominance_ratio: f64,
    /// A plugin's output is used from this many words
    pub plugin_min_words: usize,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            readability_min_words: 50,
            blocks_min_words: 30,
            blocks_over_readability_ratio: 1.4,
            block_max_link_density: 0.5,
            dom_min_words: 10,
            dominance_ratio: 0.55,
            plugin_min_words: 30,
        }
    }
}

/// Page metadata gathered alongside content
#[derive(Debug, Clone, Serialize)]
pub struct PageMetadata {
    pub url: String,
    pub canonical_url: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub author: Option<String>,
    pub published_date: Option<DateTime<Utc>>,
    pub modified_date: Option<DateTime<Utc>>,
    pub language: Option<String>,
    pub site_name: Option<String>,
    pub content_type: ContentType,
    pub domain: String,
}

/// Schema.org-derived type of the page
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Article,
    Product,
    Recipe,
    Video,
    Profile,
    Event,
    #[default]
    Unknown,
    Other(String),
}

impl ContentType {
    pub(crate) fn from_schema_type(schema_type: &str) -> Self {
        match schema_type.to_lowercase().as_str() {
            "article" | "newsarticle" | "blogposting" | "technicalarticle" | "reportagenewsarticle"
            | "scholarlyarticle" => ContentType::Article,
            "product" => ContentType::Product,
            "recipe" => ContentType::Recipe,
            "video" | "videoobject" => ContentType::Video,
            "person" | "profilepage" => ContentType::Profile,
            "event" => ContentType::Event,
            other => ContentType::Other(other.to_string()),
        }
    }

    pub fn is_article(&self) -> bool {
        matches!(self, ContentType::Article)
    }
}
