//! Shared DOM preprocessing
//!
//! Every word count used by classification, extraction and scoring comes from
//! a document that went through the same pass: `<template>` blocks removed at
//! the source-text level (html5ever re-parents template children into the
//! visible tree, so detaching the element afterwards is not enough), then
//! cookie-consent widgets and noise tags detached from the parsed tree.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::borrow::Cow;
use std::sync::OnceLock;

static TEMPLATE_RE: OnceLock<Regex> = OnceLock::new();
static CONSENT_SELECTORS: OnceLock<Vec<Selector>> = OnceLock::new();
static BODY_SELECTOR: OnceLock<Option<Selector>> = OnceLock::new();

/// Elements removed before any word count
pub const NOISE_TAGS: &[&str] = &[
    "script", "style", "template", "noscript", "nav", "header", "footer", "aside",
];

/// Named cookie/GDPR overlay containers of common consent platforms
pub const COOKIE_CONSENT_SELECTORS: &[&str] = &[
    ".cky-consent-container",
    ".cookieyes-modal",
    "#cookie-law-info-bar",
    ".cli-modal",
    ".cli-settings-overlay",
    "#CybotCookiebotDialog",
    "#CybotCookiebotDialogBodyContent",
    "#onetrust-consent-sdk",
    "#onetrust-banner-sdk",
    "#onetrust-pc-sdk",
    "#cmplz-cookiebanner-container",
    ".cmplz-cookiebanner",
    "#BorlabsCookieBox",
    "#cookie_notice",
    "#gdpr-cookie-notice",
    ".cookie-banner",
    ".cookie-notice",
    ".cookie-popup",
    ".cookie-modal",
    ".cookie-overlay",
    ".cookie-consent",
    "#cookie-notice",
    "#cookie-banner",
    "#cookie-popup",
    ".gdpr-overlay",
    "#gdpr_overlay",
    ".gdpr-banner",
    "[aria-label='cookieconsent']",
];

/// Class/id substrings of dynamically named consent widgets
const CONSENT_KEYWORDS: &[&str] = &[
    "cookieyes",
    "cookiebot",
    "cookiehub",
    "onetrust",
    "borlabs",
    "complianz",
    "cookielawinfo",
    "cky-",
    "wpconsent",
    "cookie-consent",
    "gdpr-consent",
];

/// Compile a list of CSS selectors, dropping (and logging) any that fail to parse
pub fn compile_selectors(patterns: &[&str]) -> Vec<Selector> {
    patterns
        .iter()
        .filter_map(|pattern| match Selector::parse(pattern) {
            Ok(selector) => Some(selector),
            Err(e) => {
                tracing::warn!("Invalid selector '{}': {:?}", pattern, e);
                None
            }
        })
        .collect()
}

/// Remove `<template>...</template>` blocks from raw markup
pub fn strip_templates(html: &str) -> Cow<'_, str> {
    let re = TEMPLATE_RE.get_or_init(|| {
        Regex::new(r"(?is)<template\b[^>]*>.*?</template>").expect("template pattern is valid")
    });
    re.replace_all(html, "")
}

/// Parse with templates and consent overlays removed
pub fn parse_clean(html: &str) -> Html {
    let mut doc = Html::parse_document(&strip_templates(html));
    strip_cookie_consent(&mut doc);
    doc
}

/// Parse with templates, consent overlays and noise tags removed
pub fn parse_stripped(html: &str) -> Html {
    let mut doc = parse_clean(html);
    detach_where(&mut doc, |el| NOISE_TAGS.contains(&el.value().name()));
    doc
}

/// Detach cookie-consent widgets by named selector and by class/id keyword
pub fn strip_cookie_consent(doc: &mut Html) -> usize {
    let selectors = CONSENT_SELECTORS.get_or_init(|| compile_selectors(COOKIE_CONSENT_SELECTORS));
    let named = remove_matching(doc, selectors);

    let swept = detach_where(doc, |el| {
        if is_document_skeleton(&el) {
            return false;
        }
        let value = el.value();
        let mut combined = value.classes().collect::<Vec<_>>().join(" ");
        combined.push(' ');
        combined.push_str(value.id().unwrap_or_default());
        let combined = combined.to_lowercase();
        CONSENT_KEYWORDS.iter().any(|kw| combined.contains(kw))
    });

    named + swept
}

/// Detach every element matched by any of `selectors`
pub fn remove_matching(doc: &mut Html, selectors: &[Selector]) -> usize {
    if selectors.is_empty() {
        return 0;
    }
    detach_where(doc, |el| selectors.iter().any(|s| s.matches(&el)))
}

/// Detach every element for which `pred` holds, returning how many were removed
pub fn detach_where<F>(doc: &mut Html, pred: F) -> usize
where
    F: Fn(ElementRef<'_>) -> bool,
{
    let ids: Vec<_> = doc
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|el| pred(*el))
        .map(|el| el.id())
        .collect();

    let mut removed = 0;
    for id in ids {
        if let Some(mut node) = doc.tree.get_mut(id) {
            node.detach();
            removed += 1;
        }
    }
    removed
}

fn is_document_skeleton(el: &ElementRef<'_>) -> bool {
    matches!(el.value().name(), "html" | "head" | "body")
}

/// The `<body>` element, or the document root when there is none
pub fn body_or_root(doc: &Html) -> ElementRef<'_> {
    body(doc).unwrap_or_else(|| doc.root_element())
}

pub fn body(doc: &Html) -> Option<ElementRef<'_>> {
    BODY_SELECTOR
        .get_or_init(|| Selector::parse("body").ok())
        .as_ref()
        .and_then(|sel| doc.select(sel).next())
}

/// Text of an element, skipping script-like subtrees, separated by spaces
pub fn visible_text(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    collect_text(el, &mut out);
    out
}

fn collect_text(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
            out.push(' ');
        } else if let Some(child_el) = ElementRef::wrap(child) {
            if !matches!(
                child_el.value().name(),
                "script" | "style" | "noscript" | "template"
            ) {
                collect_text(child_el, out);
            }
        }
    }
}

/// Whitespace-delimited word count
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Word count of an element's visible text
pub fn element_word_count(el: ElementRef<'_>) -> usize {
    word_count(&visible_text(el))
}

/// Word count of an HTML string or fragment
pub fn html_word_count(html: &str) -> usize {
    let doc = Html::parse_document(html);
    element_word_count(doc.root_element())
}

/// Tag-stripping word count over raw markup, no DOM parse
pub fn raw_word_count(html: &str) -> usize {
    let mut in_tag = false;
    let mut text = String::with_capacity(html.len() / 2);
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                text.push(' ');
            }
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }
    word_count(&text)
}
