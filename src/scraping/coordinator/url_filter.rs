//! Link discovery and filtering

use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::warn;
use url::Url;

use crate::scraping::{
    dom,
    trap_detection::{self, TrapDetectorConfig},
    urlnorm::{self, NormalizedUrl},
};

/// Path fragments that never lead to content
pub const HARD_EXCLUDE_PATTERNS: &[&str] = &[
    "/_next/static/",
    "/cdn-cgi/",
    "/wp-content/uploads/",
    "/__webpack",
    "/wp-json/",
    "/wp-admin/",
    "/xmlrpc.php",
];

/// A link found on a fetched page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredLink {
    pub url: NormalizedUrl,
    /// Marked `rel="next"`
    pub pagination: bool,
}

struct LinkSelectors {
    anchors: Vec<Selector>,
    next: Vec<Selector>,
}

fn selectors() -> &'static LinkSelectors {
    static SELECTORS: OnceLock<LinkSelectors> = OnceLock::new();
    SELECTORS.get_or_init(|| LinkSelectors {
        anchors: dom::compile_selectors(&["a[href]"]),
        next: dom::compile_selectors(&[r#"a[rel~="next"][href], link[rel~="next"][href]"#]),
    })
}

fn hrefs<'a>(doc: &'a Html, selectors: &'a [Selector]) -> impl Iterator<Item = &'a str> + 'a {
    selectors
        .iter()
        .flat_map(move |s| doc.select(s))
        .filter_map(|el| el.value().attr("href"))
}

/// Compile regex patterns, dropping invalid ones with a warning
pub(super) fn compile_patterns(patterns: &[String], kind: &str) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| match Regex::new(p) {
            Ok(r) => Some(r),
            Err(e) => {
                warn!("Invalid {} pattern '{}': {}", kind, p, e);
                None
            }
        })
        .collect()
}

pub fn is_hard_excluded(url: &Url) -> bool {
    let path = url.path();
    path.ends_with(".amp") || HARD_EXCLUDE_PATTERNS.iter().any(|p| path.contains(p))
}

/// Content-independent link filter shared by every page of a crawl
pub struct LinkFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
    traps: TrapDetectorConfig,
}

impl LinkFilter {
    pub fn new(include: &[String], exclude: &[String], traps: TrapDetectorConfig) -> Self {
        Self {
            include: compile_patterns(include, "include"),
            exclude: compile_patterns(exclude, "exclude"),
            traps,
        }
    }

    pub fn allows(&self, url: &Url) -> bool {
        if urlnorm::is_non_content_url(url) || is_hard_excluded(url) {
            return false;
        }
        if trap_detection::is_crawl_trap(url, &self.traps) {
            return false;
        }
        let s = url.as_str();
        if self.exclude.iter().any(|p| p.is_match(s)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|p| p.is_match(s))
    }

    /// Every allowed, normalized link on the page, in document order and
    /// without repeats. `rel="next"` links are flagged as pagination.
    pub fn discover(&self, html: &str, base: &Url) -> Vec<DiscoveredLink> {
        let doc = Html::parse_document(html);
        let sel = selectors();

        let resolve = |href: &str| -> Option<NormalizedUrl> {
            let href = href.trim();
            if href.is_empty() || href.starts_with('#') {
                return None;
            }
            let url = base.join(href).ok()?;
            let normalized = urlnorm::normalize_url(&url).ok()?;
            self.allows(normalized.as_url()).then_some(normalized)
        };

        let pagination: HashSet<NormalizedUrl> =
            hrefs(&doc, &sel.next).filter_map(|href| resolve(href)).collect();

        let mut seen = HashSet::new();
        let mut links = Vec::new();
        for href in hrefs(&doc, &sel.next).chain(hrefs(&doc, &sel.anchors)) {
            if let Some(url) = resolve(href) {
                if seen.insert(url.clone()) {
                    links.push(DiscoveredLink {
                        pagination: pagination.contains(&url),
                        url,
                    });
                }
            }
        }
        links
    }
}

/// Hosts a crawl may leave to when it stays on the seed domains
pub fn host_allowed(url: &Url, allowed: Option<&HashSet<String>>) -> bool {
    match (allowed, url.host_str()) {
        (None, _) => true,
        (Some(hosts), Some(host)) => {
            let host = host.strip_prefix("www.").unwrap_or(host);
            hosts.contains(host)
        }
        (Some(_), None) => false,
    }
}

/// Seed host key used by `host_allowed`
pub fn host_key(url: &Url) -> Option<String> {
    url.host_str()
        .map(|h| h.strip_prefix("www.").unwrap_or(h).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> LinkFilter {
        LinkFilter::new(&[], &["/private/".to_string()], TrapDetectorConfig::default())
    }

    #[test]
    fn test_discover_filters_and_flags_pagination() {
        let html = r##"<html><head><link rel="next" href="/page/2"></head><body>
            <a href="/blog/post-a?utm_source=x">A</a>
            <a href="/blog/post-a">A again</a>
            <a href="#top">top</a>
            <a href="/files/report.pdf">pdf</a>
            <a href="/wp-json/wp/v2/posts">api</a>
            <a href="/private/x">private</a>
            <a href="mailto:x@example.com">mail</a>
            <a href="https://other.com/story">external</a>
            <a rel="next" href="/page/2">Older</a>
        </body></html>"##;
        let base = Url::parse("https://example.com/blog/").unwrap();
        let links = filter().discover(html, &base);
        let urls: Vec<(&str, bool)> = links.iter().map(|l| (l.url.as_str(), l.pagination)).collect();
        assert_eq!(
            urls,
            vec![
                ("https://example.com/page/2", true),
                ("https://example.com/blog/post-a", false),
                ("https://other.com/story", false),
            ]
        );
    }

    #[test]
    fn test_hard_excludes() {
        for raw in [
            "https://example.com/_next/static/chunk.js",
            "https://example.com/cdn-cgi/l/email-protection",
            "https://example.com/post.amp",
            "https://example.com/xmlrpc.php",
        ] {
            assert!(is_hard_excluded(&Url::parse(raw).unwrap()), "{}", raw);
        }
        assert!(!is_hard_excluded(&Url::parse("https://example.com/amp-guide").unwrap()));
    }

    #[test]
    fn test_include_patterns_restrict() {
        let filter = LinkFilter::new(&["/blog/".to_string()], &[], TrapDetectorConfig::default());
        assert!(filter.allows(&Url::parse("https://example.com/blog/x").unwrap()));
        assert!(!filter.allows(&Url::parse("https://example.com/shop/x").unwrap()));
    }

    #[test]
    fn test_host_allowed_ignores_www() {
        let hosts: HashSet<String> = ["example.com".to_string()].into_iter().collect();
        assert!(host_allowed(&Url::parse("https://www.example.com/a").unwrap(), Some(&hosts)));
        assert!(!host_allowed(&Url::parse("https://other.com/a").unwrap(), Some(&hosts)));
        assert!(host_allowed(&Url::parse("https://other.com/a").unwrap(), None));
    }
}
