//! URL canonicalization for deduplication and slug generation
//!
//! Normalization is a pure function of the input string:
//! - scheme and host are lowercased (handled by `url::Url` parsing)
//! - default ports (80/443) are dropped (also handled by `url::Url`)
//! - the fragment is removed
//! - tracking query parameters are stripped
//! - surviving query parameters are sorted by key, then value

use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use url::Url;

/// Errors produced while normalizing a URL
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UrlError {
    #[error("failed to parse URL '{input}': {reason}")]
    Parse { input: String, reason: String },
    #[error("unsupported URL scheme '{0}'")]
    UnsupportedScheme(String),
    #[error("URL has no host: {0}")]
    MissingHost(String),
}

/// Query parameters that carry no meaning for content identity
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "utm_id",
    "utm_reader",
    "fbclid",
    "gclid",
    "gclsrc",
    "dclid",
    "msclkid",
    "ref",
    "source",
    "via",
    "_ga",
    "_gac",
    "mc_cid",
    "mc_eid",
    "igshid",
    "s_kwcid",
    "ef_id",
    "affiliate_id",
    "clickid",
];

/// File extensions that never point at an HTML document
const NON_CONTENT_EXTENSIONS: &[&str] = &[
    "pdf", "jpg", "jpeg", "png", "gif", "svg", "webp", "bmp", "tiff", "ico", "css", "js", "json",
    "xml", "txt", "csv", "zip", "tar", "gz", "rar", "7z", "woff", "woff2", "ttf", "eot", "mp3",
    "mp4", "avi", "mov", "wmv", "flv", "webm", "rss", "atom", "exe", "dmg",
];

/// Maximum slug length in characters
pub const MAX_SLUG_LEN: usize = 100;

/// Canonical identity of a page
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(transparent)]
pub struct NormalizedUrl(Url);

impl NormalizedUrl {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn as_url(&self) -> &Url {
        &self.0
    }

    pub fn into_url(self) -> Url {
        self.0
    }

    /// Lowercased host, always present for normalized URLs
    pub fn host(&self) -> &str {
        self.0.host_str().unwrap_or_default()
    }

    /// Non-empty path segments
    pub fn segments(&self) -> Vec<&str> {
        self.0
            .path_segments()
            .map(|segs| segs.filter(|s| !s.is_empty()).collect())
            .unwrap_or_default()
    }

    pub fn slug(&self) -> String {
        slug(&self.0)
    }
}

impl fmt::Display for NormalizedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl AsRef<str> for NormalizedUrl {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

/// Normalize a raw URL string
pub fn normalize(input: &str) -> Result<NormalizedUrl, UrlError> {
    let parsed = Url::parse(input.trim()).map_err(|e| UrlError::Parse {
        input: input.to_string(),
        reason: e.to_string(),
    })?;
    normalize_url(&parsed)
}

/// Normalize an already-parsed URL
pub fn normalize_url(url: &Url) -> Result<NormalizedUrl, UrlError> {
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(UrlError::UnsupportedScheme(other.to_string())),
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::MissingHost(url.to_string()));
    }

    let mut normalized = url.clone();
    normalized.set_fragment(None);

    if normalized.query().is_some() {
        let mut params: Vec<(String, String)> = normalized
            .query_pairs()
            .filter(|(k, _)| !is_tracking_param(k))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        if params.is_empty() {
            normalized.set_query(None);
        } else {
            params.sort();
            normalized.query_pairs_mut().clear().extend_pairs(params);
        }
    }

    Ok(NormalizedUrl(normalized))
}

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    TRACKING_PARAMS.contains(&key.as_str())
}

/// Derive a filesystem-safe identifier from a URL path
///
/// Falls back to the dashed host for root URLs, and to `index` when
/// nothing usable remains.
pub fn slug(url: &Url) -> String {
    let path = url.path().trim_matches('/');
    let source = if path.is_empty() {
        url.host_str().unwrap_or_default().replace('.', "-")
    } else {
        path.to_string()
    };

    let mut slug = String::with_capacity(source.len());
    for c in source.chars() {
        let c = if c.is_alphanumeric() || c == '_' || c == '-' { c } else { '-' };
        if c == '-' && slug.ends_with('-') {
            continue;
        }
        slug.push(c);
    }

    let trimmed: String = slug.trim_matches('-').chars().take(MAX_SLUG_LEN).collect();
    let trimmed = trimmed.trim_matches('-');

    if trimmed.is_empty() {
        "index".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Hands out unique slugs, suffixing `-2`, `-3`, ... on collision
#[derive(Debug, Default)]
pub struct SlugAllocator {
    used: HashMap<String, u32>,
}

impl SlugAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, url: &Url) -> String {
        let base = slug(url);
        let count = self.used.entry(base.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            base
        } else {
            let candidate = format!("{}-{}", base, count);
            // A suffixed slug may itself collide with a literal path like "post-2"
            if self.used.contains_key(&candidate) {
                self.allocate_suffixed(&base)
            } else {
                self.used.insert(candidate.clone(), 1);
                candidate
            }
        }
    }

    fn allocate_suffixed(&mut self, base: &str) -> String {
        let mut n = 2;
        loop {
            let candidate = format!("{}-{}", base, n);
            if !self.used.contains_key(&candidate) {
                self.used.insert(candidate.clone(), 1);
                return candidate;
            }
            n += 1;
        }
    }
}

/// True if the URL path ends in an extension that is never an HTML page
pub fn is_non_content_url(url: &Url) -> bool {
    let path = url.path().to_ascii_lowercase();
    let last = path.rsplit('/').next().unwrap_or_default();
    match last.rsplit_once('.') {
        Some((_, ext)) => NON_CONTENT_EXTENSIONS.contains(&ext),
        None => false,
    }
}
