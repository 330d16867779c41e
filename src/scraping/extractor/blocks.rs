//! Extractor B: text-block collection
//!
//! Walks the body in document order and keeps every paragraph-level block
//! whose link text stays under the configured density. Chrome containers
//! (navigation, headers, footers, asides, forms) are never entered.

use scraper::{ElementRef, Html};

use super::{Candidate, CascadeConfig};
use crate::scraping::dom;

const BLOCK_TAGS: &[&str] = &[
    "p", "h1", "h2", "h3", "h4", "h5", "h6", "li", "blockquote", "pre", "td", "dd",
];

const SKIP_TAGS: &[&str] = &[
    "nav", "header", "footer", "aside", "form", "script", "style", "noscript", "template",
    "button", "select",
];

pub(super) fn extract(doc: &Html, config: &CascadeConfig) -> Candidate {
    let mut blocks = Vec::new();
    collect_blocks(dom::body_or_root(doc), config.block_max_link_density, &mut blocks);

    let mut html = String::from("<div>");
    let mut word_count = 0;
    for (block_html, words) in &blocks {
        html.push_str(block_html);
        html.push('\n');
        word_count += words;
    }
    html.push_str("</div>");

    Candidate { html, word_count }
}

fn collect_blocks(el: ElementRef<'_>, max_link_density: f64, out: &mut Vec<(String, usize)>) {
    for child in el.children().filter_map(ElementRef::wrap) {
        let name = child.value().name();
        if SKIP_TAGS.contains(&name) {
            continue;
        }
        if BLOCK_TAGS.contains(&name) {
            let text = dom::visible_text(child);
            let words = dom::word_count(&text);
            if words > 0 && link_density(child, &text) < max_link_density {
                out.push((child.html(), words));
            }
            continue;
        }
        collect_blocks(child, max_link_density, out);
    }
}

/// Share of an element's text characters that sit inside `<a>` elements
pub(crate) fn link_density(el: ElementRef<'_>, text: &str) -> f64 {
    let total: usize = text.split_whitespace().map(str::len).sum();
    if total == 0 {
        return 0.0;
    }
    let linked: usize = el
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|e| e.value().name() == "a")
        .map(|a| dom::visible_text(a).split_whitespace().map(str::len).sum::<usize>())
        .sum();
    linked as f64 / total as f64
}
