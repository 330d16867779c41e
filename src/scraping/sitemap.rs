//! Sitemap seeding
//!
//! Parses `<urlset>` and `<sitemapindex>` documents with quick-xml and
//! walks index files breadth-first up to a fixed depth.

use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::{HashSet, VecDeque};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use super::fetcher::HttpClient;

/// Well-known sitemap locations probed on every seed host
pub const SITEMAP_PATHS: &[&str] = &["/sitemap.xml", "/sitemap_index.xml", "/sitemap-index.xml"];

/// Index files nest at most this deep
pub const MAX_SITEMAP_DEPTH: usize = 3;

#[derive(Debug, Error)]
pub enum SitemapError {
    #[error("malformed sitemap XML: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("not a sitemap (root element <{0}>)")]
    UnknownRoot(String),
    #[error("empty document")]
    Empty,
}

/// A parsed sitemap document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sitemap {
    /// Page URLs
    UrlSet(Vec<String>),
    /// Child sitemap URLs
    Index(Vec<String>),
}

/// Parse sitemap XML, collecting every `<loc>` under `<url>` or `<sitemap>`
pub fn parse_sitemap(xml: &str) -> Result<Sitemap, SitemapError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut root: Option<Vec<u8>> = None;
    let mut in_entry = false;
    let mut in_loc = false;
    let mut locs = Vec::new();
    let mut current = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = e.local_name().as_ref().to_vec();
                if root.is_none() {
                    root = Some(name);
                    continue;
                }
                match name.as_slice() {
                    b"url" | b"sitemap" => in_entry = true,
                    b"loc" if in_entry => {
                        in_loc = true;
                        current.clear();
                    }
                    _ => {}
                }
            }
            Event::Empty(e) if root.is_none() => root = Some(e.local_name().as_ref().to_vec()),
            Event::Text(e) if in_loc => current.push_str(&e.unescape()?),
            Event::CData(e) if in_loc => {
                current.push_str(&String::from_utf8_lossy(&e.into_inner()))
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"loc" if in_loc => {
                    in_loc = false;
                    let loc = current.trim();
                    if !loc.is_empty() {
                        locs.push(loc.to_string());
                    }
                }
                b"url" | b"sitemap" => in_entry = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    match root.as_deref() {
        Some(b"urlset") => Ok(Sitemap::UrlSet(locs)),
        Some(b"sitemapindex") => Ok(Sitemap::Index(locs)),
        Some(other) => Err(SitemapError::UnknownRoot(
            String::from_utf8_lossy(other).into_owned(),
        )),
        None => Err(SitemapError::Empty),
    }
}

/// Sitemap locations for `seed`: robots.txt declarations first, then the
/// well-known paths
pub fn candidate_urls(seed: &Url, declared: &[String]) -> Vec<Url> {
    let mut seen = HashSet::new();
    declared
        .iter()
        .filter_map(|s| Url::parse(s).ok())
        .chain(SITEMAP_PATHS.iter().filter_map(|p| seed.join(p).ok()))
        .filter(|u| seen.insert(u.to_string()))
        .collect()
}

/// Fetch and expand sitemaps breadth-first, returning at most `limit` page URLs
pub async fn discover(
    http: &dyn HttpClient,
    user_agent: &str,
    roots: Vec<Url>,
    limit: usize,
) -> Vec<Url> {
    let headers = vec![("User-Agent".to_string(), user_agent.to_string())];
    let mut queue: VecDeque<(Url, usize)> = roots.into_iter().map(|u| (u, 0)).collect();
    let mut visited = HashSet::new();
    let mut pages = Vec::new();
    let mut page_set = HashSet::new();

    while let Some((sitemap_url, depth)) = queue.pop_front() {
        if pages.len() >= limit {
            break;
        }
        if !visited.insert(sitemap_url.to_string()) {
            continue;
        }

        let body = match http.get(&sitemap_url, &headers).await {
            Ok(resp) if resp.is_success() => resp.body,
            Ok(resp) => {
                debug!("Sitemap {} returned {}", sitemap_url, resp.status);
                continue;
            }
            Err(e) => {
                debug!("Sitemap {} unreachable: {}", sitemap_url, e);
                continue;
            }
        };

        match parse_sitemap(&body) {
            Ok(Sitemap::UrlSet(locs)) => {
                for loc in locs {
                    if pages.len() >= limit {
                        break;
                    }
                    if let Ok(url) = sitemap_url.join(&loc) {
                        if page_set.insert(url.to_string()) {
                            pages.push(url);
                        }
                    }
                }
            }
            Ok(Sitemap::Index(children)) if depth < MAX_SITEMAP_DEPTH => {
                for child in children {
                    if let Ok(url) = sitemap_url.join(&child) {
                        queue.push_back((url, depth + 1));
                    }
                }
            }
            Ok(Sitemap::Index(_)) => {
                debug!("Sitemap index {} nested too deep, skipping", sitemap_url)
            }
            Err(e) => debug!("Skipping sitemap {}: {}", sitemap_url, e),
        }
    }

    if !pages.is_empty() {
        info!("Discovered {} URLs from sitemaps", pages.len());
    }
    pages
}
