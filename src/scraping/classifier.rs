//! Page classification: decide how a page must be fetched
//!
//! A fetched HTML snapshot is reduced to [`PageSignals`], then run through
//! an ordered rule table ([`RULES`]). The first matching rule decides the page
//! type, the fetch strategy and a confidence value. Rules are not summed.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use url::Url;

use super::dom;

/// Category of a page, driving fetch strategy selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageType {
    Static,
    JsSpa,
    CookieWalled,
    Paywalled,
    Unknown,
}

impl PageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::JsSpa => "js_spa",
            Self::CookieWalled => "cookie_walled",
            Self::Paywalled => "paywalled",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a page should be retrieved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStrategy {
    Static,
    Amp,
    MobileUa,
    HeadlessRender,
    StaticBestEffort,
}

impl FetchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Amp => "amp",
            Self::MobileUa => "mobile_ua",
            Self::HeadlessRender => "headless_render",
            Self::StaticBestEffort => "static_best_effort",
        }
    }

    /// Strategies served by a plain HTTP GET (and therefore retried)
    pub fn is_http(&self) -> bool {
        !matches!(self, Self::HeadlessRender)
    }
}

impl fmt::Display for FetchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tunable thresholds for signal detection and the rule table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// A framework root marker only signals an SPA below this body word count
    pub spa_max_words: usize,
    /// "Ultra-thin" body: fewer words than this plus an external script
    pub thin_body_words: usize,
    /// Body words for a page to count as good static HTML
    pub static_min_words: usize,
    /// Body words below which a mobile-UA retry is not worth it
    pub mobile_min_words: usize,
    /// Cookie phrase hits that mark a wall regardless of body size
    pub cookie_min_hits: usize,
    /// A single cookie phrase hit marks a wall below this body word count
    pub cookie_thin_words: usize,
    /// Paywall signals only apply below this body word count
    pub paywall_max_words: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            spa_max_words: 200,
            thin_body_words: 10,
            static_min_words: 150,
            mobile_min_words: 50,
            cookie_min_hits: 2,
            cookie_thin_words: 150,
            paywall_max_words: 500,
        }
    }
}

/// Structural facts about one HTML snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PageSignals {
    /// Visible words after noise, template and consent stripping
    pub body_word_count: usize,
    /// Framework names from root markers and script fingerprints
    pub frameworks: Vec<&'static str>,
    /// A framework root element is present in the markup
    pub framework_root: bool,
    pub cookie_walled: bool,
    pub paywalled: bool,
    pub amp_url: Option<Url>,
    pub feed_url: Option<Url>,
    pub script_count: usize,
    pub external_script_count: usize,
    pub noscript_text_len: usize,
    pub has_meta_title: bool,
    pub has_article_schema: bool,
}

impl PageSignals {
    /// Framework root marker on a page with little visible text
    pub fn spa_by_framework(&self, config: &ClassifierConfig) -> bool {
        self.framework_root && self.body_word_count < config.spa_max_words
    }

    /// Almost no visible text but external scripts present, framework or not
    pub fn spa_by_thin_body(&self, config: &ClassifierConfig) -> bool {
        self.body_word_count < config.thin_body_words && self.external_script_count > 0
    }

    pub fn is_js_spa(&self, config: &ClassifierConfig) -> bool {
        self.spa_by_framework(config) || self.spa_by_thin_body(config)
    }
}

/// Strategy decision for one snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub page_type: PageType,
    pub strategy: FetchStrategy,
    pub confidence: f64,
    pub reason: String,
    /// Name of the rule that matched
    pub rule: &'static str,
    pub signals: PageSignals,
}

/// One row of the decision table
pub struct Rule {
    pub name: &'static str,
    pub page_type: PageType,
    pub strategy: FetchStrategy,
    pub confidence: f64,
    matches: fn(&PageSignals, &ClassifierConfig) -> bool,
}

impl Rule {
    pub fn matches(&self, signals: &PageSignals, config: &ClassifierConfig) -> bool {
        (self.matches)(signals, config)
    }
}

/// Ordered decision table; first match wins, the last row always matches
pub const RULES: &[Rule] = &[
    Rule {
        name: "cookie_wall",
        page_type: PageType::CookieWalled,
        strategy: FetchStrategy::HeadlessRender,
        confidence: 0.85,
        matches: |s, _| s.cookie_walled,
    },
    Rule {
        name: "paywall",
        page_type: PageType::Paywalled,
        strategy: FetchStrategy::HeadlessRender,
        confidence: 0.75,
        matches: |s, c| s.paywalled && s.body_word_count < c.paywall_max_words,
    },
    Rule {
        name: "spa_with_amp",
        page_type: PageType::JsSpa,
        strategy: FetchStrategy::Amp,
        confidence: 0.90,
        matches: |s, c| s.is_js_spa(c) && s.amp_url.is_some(),
    },
    Rule {
        name: "spa_framework",
        page_type: PageType::JsSpa,
        strategy: FetchStrategy::HeadlessRender,
        confidence: 0.90,
        matches: |s, c| s.spa_by_framework(c),
    },
    Rule {
        name: "spa_thin_body",
        page_type: PageType::JsSpa,
        strategy: FetchStrategy::HeadlessRender,
        confidence: 0.80,
        matches: |s, c| s.spa_by_thin_body(c),
    },
    Rule {
        name: "static",
        page_type: PageType::Static,
        strategy: FetchStrategy::Static,
        confidence: 0.90,
        matches: |s, c| s.body_word_count >= c.static_min_words,
    },
    Rule {
        name: "thin_static",
        page_type: PageType::Static,
        strategy: FetchStrategy::MobileUa,
        confidence: 0.70,
        matches: |s, c| s.body_word_count >= c.mobile_min_words,
    },
    Rule {
        name: "fallback",
        page_type: PageType::Unknown,
        strategy: FetchStrategy::StaticBestEffort,
        confidence: 0.50,
        matches: |_, _| true,
    },
];

/// Evaluate the rule table against precomputed signals
pub fn classify(signals: PageSignals, config: &ClassifierConfig) -> ClassificationResult {
    let rule = RULES
        .iter()
        .find(|rule| rule.matches(&signals, config))
        .unwrap_or(&RULES[RULES.len() - 1]);

    let reason = describe(rule, &signals);
    ClassificationResult {
        page_type: rule.page_type,
        strategy: rule.strategy,
        confidence: rule.confidence,
        reason,
        rule: rule.name,
        signals,
    }
}

fn describe(rule: &Rule, signals: &PageSignals) -> String {
    let words = signals.body_word_count;
    match rule.name {
        "cookie_wall" => format!("cookie-consent wall; visible body={} words", words),
        "paywall" => format!("paywall markers on a thin body ({} words)", words),
        "spa_with_amp" | "spa_framework" => {
            let names = if signals.frameworks.is_empty() {
                "framework root".to_string()
            } else {
                signals.frameworks.join(", ")
            };
            format!("JS SPA ({}); visible body={} words -> {}", names, words, rule.strategy)
        }
        "spa_thin_body" => format!(
            "ultra-thin body ({} words) with {} external scripts",
            words, signals.external_script_count
        ),
        "static" => format!("static HTML; {} body words", words),
        "thin_static" => format!("thin static body ({} words) -> {}", words, rule.strategy),
        _ => format!("unclassified ({} body words)", words),
    }
}

const FRAMEWORK_PATTERNS: &[(&str, &str)] = &[
    ("Next.js", r"(?i)/_next/static/|window\.__NEXT_DATA__"),
    ("Nuxt.js", r"(?i)/__nuxt/|window\.__NUXT__"),
    ("React", r"(?i)/static/js/main\.[a-f0-9]+\.js"),
    ("Webpack", r"(?i)chunk\.[a-f0-9]+\.js"),
    ("Angular", r"(?i)angular(?:\.min)?\.js|ng-app"),
    ("Vue", r"(?i)vue(?:\.min)?\.js|data-v-app"),
    ("Ember", r"(?i)ember(?:\.min)?\.js"),
    ("Gatsby", r"(?i)gatsby-focus-wrapper|window\.__gatsby"),
    ("Svelte", r"(?i)svelte(?:kit)?|__svelte"),
    ("Remix", r"(?i)__remixContext"),
    ("Astro", r"(?i)astro-island|astro:page-load"),
];

/// Element ids of framework mount points
const ROOT_IDS: &[(&str, &str)] = &[
    ("root", "React"),
    ("app", "Vue"),
    ("__next", "Next.js"),
    ("__nuxt", "Nuxt.js"),
    ("app-root", "Angular"),
    ("gatsby-focus-wrapper", "Gatsby"),
    ("ember-application", "Ember"),
];

/// Attribute markers of server- or client-rendered framework roots
const ROOT_ATTRIBUTES: &[(&str, &str)] = &[
    ("data-reactroot", "React"),
    ("data-server-rendered", "Vue"),
    ("ng-app", "Angular"),
];

const PAYWALL_SELECTORS: &[&str] = &[
    ".paywall",
    ".paid-content",
    ".premium-content",
    "#piano-paywall",
    ".tp-modal",
    ".tp-iframe-wrapper",
    ".subscriber-only",
    ".metered-paywall",
    "[class*='paywall']",
    "[id*='paywall']",
    ".subscription-required",
    ".access-denied",
    ".piano-container",
    ".reg-wall",
];

const PAYWALL_PHRASES: &[&str] = &[
    "subscribe to continue",
    "subscribe to read",
    "sign in to read",
    "this article is for subscribers",
    "become a member to",
    "unlock this article",
    "member-only content",
    "you've reached your free article limit",
    "you have read your free articles",
    "subscribe for unlimited",
    "create a free account to continue",
];

const COOKIE_WALL_PHRASES: &[&str] = &[
    "cookie preferences",
    "essential cookies enable",
    "cookie consent",
    "manage your cookie",
    "accept all cookies",
    "reject all cookies",
    "cookieyes",
    "cookiebot",
];

static FRAMEWORK_REGEXES: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();

fn framework_regexes() -> &'static [(&'static str, Regex)] {
    FRAMEWORK_REGEXES.get_or_init(|| {
        FRAMEWORK_PATTERNS
            .iter()
            .filter_map(|(name, pattern)| match Regex::new(pattern) {
                Ok(re) => Some((*name, re)),
                Err(e) => {
                    tracing::warn!("Invalid framework pattern for {}: {}", name, e);
                    None
                }
            })
            .collect()
    })
}

/// Signal detector and rule evaluator with precompiled selectors
pub struct PageClassifier {
    config: ClassifierConfig,
    script: Option<Selector>,
    noscript: Option<Selector>,
    json_ld: Option<Selector>,
    meta_title: Vec<Selector>,
    links: Option<Selector>,
    paywall: Vec<Selector>,
}

impl PageClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            script: Selector::parse("script").ok(),
            noscript: Selector::parse("noscript").ok(),
            json_ld: Selector::parse("script[type='application/ld+json']").ok(),
            meta_title: dom::compile_selectors(&["meta[property='og:title']", "title"]),
            links: Selector::parse("link[rel][href]").ok(),
            paywall: dom::compile_selectors(PAYWALL_SELECTORS),
        }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Detect signals and evaluate the rule table in one call
    pub fn classify_html(&self, html: &str, page_url: Option<&Url>) -> ClassificationResult {
        classify(self.detect_signals(html, page_url), &self.config)
    }

    pub fn classify(&self, signals: PageSignals) -> ClassificationResult {
        classify(signals, &self.config)
    }

    /// Compute all signals for one snapshot
    ///
    /// Structural signals (scripts, links, markers) come from the full
    /// document; the body word count comes from the stripped document.
    pub fn detect_signals(&self, html: &str, page_url: Option<&Url>) -> PageSignals {
        let full = Html::parse_document(html);
        let stripped = dom::parse_stripped(html);

        let mut signals = PageSignals {
            body_word_count: dom::element_word_count(dom::body_or_root(&stripped)),
            ..PageSignals::default()
        };

        self.detect_scripts(&full, &mut signals);
        self.detect_links(&full, page_url, &mut signals);
        self.detect_framework_roots(&full, &mut signals);

        signals.has_meta_title = self
            .meta_title
            .iter()
            .any(|sel| full.select(sel).next().is_some());

        if let Some(sel) = &self.json_ld {
            signals.has_article_schema = full.select(sel).any(|el| {
                let text: String = el.text().collect();
                ["Article", "BlogPosting", "NewsArticle"]
                    .iter()
                    .any(|t| text.contains(t))
            });
        }

        let body_lower = dom::visible_text(dom::body_or_root(&full)).to_lowercase();
        let cookie_hits = COOKIE_WALL_PHRASES
            .iter()
            .filter(|p| body_lower.contains(*p))
            .count();
        signals.cookie_walled = cookie_hits >= self.config.cookie_min_hits
            || (cookie_hits >= 1 && signals.body_word_count < self.config.cookie_thin_words);

        signals.paywalled = PAYWALL_PHRASES.iter().any(|p| body_lower.contains(p))
            || self.paywall.iter().any(|sel| full.select(sel).next().is_some());

        signals
    }

    fn detect_scripts(&self, full: &Html, signals: &mut PageSignals) {
        let mut script_text = String::new();
        if let Some(sel) = &self.script {
            for script in full.select(sel) {
                signals.script_count += 1;
                if let Some(src) = script.value().attr("src") {
                    let src = src.trim();
                    if !src.is_empty() {
                        signals.external_script_count += 1;
                        script_text.push_str(src);
                        script_text.push(' ');
                    }
                }
                script_text.extend(script.text());
                script_text.push(' ');
            }
        }

        for (name, re) in framework_regexes() {
            if re.is_match(&script_text) {
                push_unique(&mut signals.frameworks, *name);
            }
        }

        if let Some(sel) = &self.noscript {
            signals.noscript_text_len = full
                .select(sel)
                .map(|el| el.text().map(|t| t.trim().len()).sum::<usize>())
                .sum();
        }
    }

    fn detect_links(&self, full: &Html, page_url: Option<&Url>, signals: &mut PageSignals) {
        let Some(sel) = &self.links else { return };
        for link in full.select(sel) {
            let value = link.value();
            let rels: Vec<String> = value
                .attr("rel")
                .unwrap_or_default()
                .split_whitespace()
                .map(str::to_ascii_lowercase)
                .collect();
            let href = value.attr("href").unwrap_or_default().trim();
            if href.is_empty() {
                continue;
            }

            if signals.amp_url.is_none() && rels.iter().any(|r| r == "amphtml") {
                signals.amp_url = resolve(page_url, href);
            }

            if signals.feed_url.is_none() && rels.iter().any(|r| r == "alternate") {
                let kind = value.attr("type").unwrap_or_default().to_ascii_lowercase();
                if kind.contains("rss") || kind.contains("atom") {
                    signals.feed_url = resolve(page_url, href);
                }
            }
        }
    }

    fn detect_framework_roots(&self, full: &Html, signals: &mut PageSignals) {
        for node in full.root_element().descendants() {
            let Some(el) = ElementRef::wrap(node) else { continue };
            let value = el.value();

            if value.name() == "astro-island" {
                signals.framework_root = true;
                push_unique(&mut signals.frameworks, "Astro");
                continue;
            }

            if let Some(id) = value.id() {
                let id = id.to_ascii_lowercase();
                if let Some((_, name)) = ROOT_IDS.iter().find(|(root, _)| *root == id) {
                    signals.framework_root = true;
                    push_unique(&mut signals.frameworks, *name);
                }
            }

            for (attr, name) in ROOT_ATTRIBUTES {
                if value.attr(attr).is_some() {
                    signals.framework_root = true;
                    push_unique(&mut signals.frameworks, *name);
                }
            }
        }
    }
}

impl Default for PageClassifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}

fn push_unique(names: &mut Vec<&'static str>, name: &'static str) {
    if !names.contains(&name) {
        names.push(name);
    }
}

fn resolve(base: Option<&Url>, href: &str) -> Option<Url> {
    match base {
        Some(base) => base.join(href).ok(),
        None => Url::parse(href).ok(),
    }
}
