//! DOM density heuristic, the cascade's last structural resort

use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;

use super::{Candidate, CascadeConfig, ExtractionMethod};
use crate::scraping::dom;

static PARAGRAPH: OnceLock<Option<Selector>> = OnceLock::new();

/// Ordered generic content containers
pub const CONTENT_SELECTORS: &[&str] = &[
    "article",
    "main",
    "[role=\"main\"]",
    "[itemprop=\"articleBody\"]",
    ".post-content",
    ".article-content",
    ".entry-content",
    ".post-body",
    ".article-body",
    "#article-content",
    "#post-content",
    "#entry-content",
    "#content",
    "#main-content",
    ".content-body",
    ".story-body",
    ".blog-post",
    ".post",
    ".single-content",
];

const NOISE_TAGS: &[&str] = &[
    "nav", "header", "footer", "aside", "script", "style", "noscript", "form", "button", "input",
    "select", "textarea", "template",
];

const NOISE_KEYWORDS: &[&str] = &[
    "sidebar",
    "comment",
    "advertisement",
    "banner",
    "promo",
    "related",
    "share",
    "social",
    "newsletter",
    "cookie",
    "popup",
    "modal",
    "widget",
];

const CONTAINER_TAGS: &[&str] = &["div", "section", "article", "main", "td"];

struct Scored<'a> {
    el: ElementRef<'a>,
    score: f64,
    words: usize,
}

/// True when `container` words hold at least `ratio` of `body` words
pub fn dominates(container: usize, body: usize, ratio: f64) -> bool {
    body == 0 || container as f64 >= body as f64 * ratio - 1e-9
}

pub(super) fn extract(
    original: &str,
    content_selectors: &[Selector],
    config: &CascadeConfig,
) -> (Candidate, ExtractionMethod) {
    let mut doc = dom::parse_clean(original);
    strip_noise(&mut doc);

    let body = match dom::body(&doc) {
        Some(body) => body,
        None => return raw(original),
    };
    let body_words = dom::element_word_count(body);
    if body_words == 0 {
        return raw(original);
    }

    for selector in content_selectors {
        for el in doc.select(selector) {
            let words = dom::element_word_count(el);
            if words >= config.dom_min_words {
                return (
                    Candidate {
                        html: el.html(),
                        word_count: words,
                    },
                    ExtractionMethod::DomHeuristic,
                );
            }
        }
    }

    let scored = score_containers(body, config.dom_min_words);
    if let Some(best) = best_container(&scored) {
        if dominates(best.words, body_words, config.dominance_ratio) {
            return (
                Candidate {
                    html: best.el.html(),
                    word_count: best.words,
                },
                ExtractionMethod::DomHeuristic,
            );
        }
        tracing::debug!(
            "density winner holds {}/{} body words, using full body",
            best.words,
            body_words
        );
    }

    (
        Candidate {
            html: body.html(),
            word_count: body_words,
        },
        ExtractionMethod::FullBody,
    )
}

fn raw(original: &str) -> (Candidate, ExtractionMethod) {
    (
        Candidate {
            html: original.to_string(),
            word_count: dom::raw_word_count(original),
        },
        ExtractionMethod::RawHtml,
    )
}

fn strip_noise(doc: &mut Html) {
    dom::detach_where(doc, |el| {
        let value = el.value();
        let name = value.name();
        if NOISE_TAGS.contains(&name) {
            return true;
        }
        if !matches!(name, "div" | "section" | "aside") {
            return false;
        }
        let mut marker = value.classes().collect::<Vec<_>>().join(" ");
        marker.push(' ');
        marker.push_str(value.id().unwrap_or_default());
        marker.push(' ');
        marker.push_str(value.attr("role").unwrap_or_default());
        let marker = marker.to_lowercase();
        NOISE_KEYWORDS.iter().any(|kw| marker.contains(kw))
    });
}

fn score_containers(body: ElementRef<'_>, min_words: usize) -> Vec<Scored<'_>> {
    let paragraph = PARAGRAPH.get_or_init(|| Selector::parse("p").ok());
    let Some(paragraph) = paragraph.as_ref() else {
        return Vec::new();
    };

    body.descendants()
        .filter_map(ElementRef::wrap)
        .filter(|el| CONTAINER_TAGS.contains(&el.value().name()))
        .filter_map(|el| {
            let para_words: usize = el.select(paragraph).map(dom::element_word_count).sum();
            if para_words < min_words {
                return None;
            }
            let words = dom::element_word_count(el).max(1);
            let score = para_words as f64 * (para_words as f64 / words as f64);
            Some(Scored { el, score, words })
        })
        .collect()
}

/// Highest-scoring container that has no descendant scoring at least as well
fn best_container<'a, 'b>(scored: &'b [Scored<'a>]) -> Option<&'b Scored<'a>> {
    let mut ranked: Vec<&Scored<'a>> = scored.iter().collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

    ranked.into_iter().find(|candidate| {
        !scored.iter().any(|other| {
            other.el.id() != candidate.el.id()
                && other.score >= candidate.score
                && other.el.ancestors().any(|a| a.id() == candidate.el.id())
        })
    })
}
