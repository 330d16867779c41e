//! Politeness: robots.txt compliance and per-host rate limiting
//!
//! robots.txt files are fetched through the same `HttpClient` as pages and
//! cached per origin in an LRU. Rate limiting uses one governor token
//! bucket per host, so a throttled host never delays any other.

use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::{NonZeroU32, NonZeroUsize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

use super::fetcher::{FetchConfig, HttpClient};

/// Outcome of a robots.txt check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchDecision {
    Allowed,
    Disallowed,
}

/// Parsed robots.txt rules for one origin
#[derive(Debug, Clone)]
pub struct CachedRobots {
    disallow_patterns: Vec<String>,
    allow_patterns: Vec<String>,
    crawl_delay: Option<Duration>,
    sitemaps: Vec<String>,
    fetched_at: Instant,
    ttl: Duration,
}

impl CachedRobots {
    pub fn new(content: &str, user_agent: &str, ttl: Duration) -> Self {
        let mut robots = Self::allow_all(ttl);
        robots.parse(content, user_agent);
        robots
    }

    /// Allow-all rules, used when robots.txt is missing or unreachable
    pub fn allow_all(ttl: Duration) -> Self {
        Self {
            disallow_patterns: Vec::new(),
            allow_patterns: Vec::new(),
            crawl_delay: None,
            sitemaps: Vec::new(),
            fetched_at: Instant::now(),
            ttl,
        }
    }

    /// Longest matching rule wins; allow wins ties
    pub fn is_allowed(&self, path: &str) -> bool {
        let longest = |patterns: &[String]| {
            patterns
                .iter()
                .filter(|p| path_matches(path, p))
                .map(String::len)
                .max()
                .unwrap_or(0)
        };
        longest(&self.allow_patterns) >= longest(&self.disallow_patterns)
    }

    pub fn is_valid(&self) -> bool {
        self.fetched_at.elapsed() < self.ttl
    }

    pub fn crawl_delay(&self) -> Option<Duration> {
        self.crawl_delay
    }

    /// `Sitemap:` URLs, which apply regardless of user-agent group
    pub fn sitemaps(&self) -> &[String] {
        &self.sitemaps
    }

    fn parse(&mut self, content: &str, user_agent: &str) {
        let ua_lower = user_agent.to_lowercase();
        let mut current_agent_applies = false;
        let mut found_specific_agent = false;

        for line in content.lines() {
            let line = line.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }

            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            let directive = directive.trim().to_lowercase();
            let value = value.trim();

            match directive.as_str() {
                "user-agent" => {
                    let agent = value.to_lowercase();
                    if agent == "*" {
                        current_agent_applies = !found_specific_agent;
                    } else if ua_lower.contains(&agent) || agent.contains(&ua_lower) {
                        current_agent_applies = true;
                        if !found_specific_agent {
                            // A specific group replaces the wildcard group
                            self.disallow_patterns.clear();
                            self.allow_patterns.clear();
                            self.crawl_delay = None;
                        }
                        found_specific_agent = true;
                    } else {
                        current_agent_applies = false;
                    }
                }
                "disallow" if current_agent_applies && !value.is_empty() => {
                    self.disallow_patterns.push(value.to_string());
                }
                "allow" if current_agent_applies && !value.is_empty() => {
                    self.allow_patterns.push(value.to_string());
                }
                "crawl-delay" if current_agent_applies => {
                    if let Ok(delay) = value.parse::<f64>() {
                        self.crawl_delay = Some(Duration::from_secs_f64(delay.max(0.0)));
                    }
                }
                "sitemap" if !value.is_empty() => {
                    // split_once(':') cut the URL scheme; rebuild from the raw line
                    let raw = line[line.find(':').map_or(0, |i| i + 1)..].trim();
                    self.sitemaps.push(raw.to_string());
                }
                _ => {}
            }
        }
    }
}

/// robots.txt pattern match with `*` wildcards and `$` end anchors
fn path_matches(path: &str, pattern: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }

    let (pattern, must_end_match) = match pattern.strip_suffix('$') {
        Some(p) => (p, true),
        None => (pattern, false),
    };

    if !pattern.contains('*') {
        return if must_end_match {
            path == pattern
        } else {
            path.starts_with(pattern)
        };
    }

    let mut pos = 0;
    for (i, part) in pattern.split('*').enumerate() {
        if part.is_empty() {
            continue;
        }
        match path[pos..].find(part) {
            Some(found) if i == 0 && found != 0 => return false,
            Some(found) => pos += found + part.len(),
            None => return false,
        }
    }

    !must_end_match || pos == path.len() || pattern.ends_with('*')
}

/// Politeness settings derived from `[fetch]`
#[derive(Debug, Clone)]
pub struct PolitenessConfig {
    /// Product token matched against robots.txt user-agent groups
    pub robots_user_agent: String,
    pub respect_robots: bool,
    pub robots_cache_size: usize,
    pub robots_ttl: Duration,
}

impl PolitenessConfig {
    pub fn from_fetch(config: &FetchConfig) -> Self {
        Self {
            robots_user_agent: config.robots_user_agent.clone(),
            respect_robots: config.respect_robots,
            robots_cache_size: config.robots_cache_size,
            robots_ttl: Duration::from_secs(config.robots_ttl_secs),
        }
    }
}

impl Default for PolitenessConfig {
    fn default() -> Self {
        Self::from_fetch(&FetchConfig::default())
    }
}

/// robots.txt cache keyed by origin
pub struct RobotsCache {
    config: PolitenessConfig,
    http: Arc<dyn HttpClient>,
    headers: Vec<(String, String)>,
    cache: Mutex<LruCache<String, CachedRobots>>,
}

impl RobotsCache {
    pub fn new(config: PolitenessConfig, http: Arc<dyn HttpClient>, user_agent: &str) -> Self {
        let capacity = NonZeroUsize::new(config.robots_cache_size.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            config,
            http,
            headers: vec![("User-Agent".to_string(), user_agent.to_string())],
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Check `url` against its origin's robots.txt
    pub async fn check(&self, url: &Url) -> FetchDecision {
        if !self.config.respect_robots {
            return FetchDecision::Allowed;
        }
        let robots = self.get_or_fetch(url).await;
        let mut target = url.path().to_string();
        if let Some(query) = url.query() {
            target.push('?');
            target.push_str(query);
        }
        if robots.is_allowed(&target) {
            FetchDecision::Allowed
        } else {
            FetchDecision::Disallowed
        }
    }

    /// Sitemap URLs advertised by the origin's robots.txt
    pub async fn sitemaps(&self, url: &Url) -> Vec<String> {
        self.get_or_fetch(url).await.sitemaps().to_vec()
    }

    async fn get_or_fetch(&self, url: &Url) -> CachedRobots {
        let origin = url.origin().ascii_serialization();

        if let Some(robots) = self.cache.lock().get(&origin) {
            if robots.is_valid() {
                return robots.clone();
            }
        }

        let robots = match url.join("/robots.txt") {
            Ok(robots_url) => self.fetch(&robots_url).await,
            Err(_) => CachedRobots::allow_all(self.config.robots_ttl),
        };
        self.cache.lock().put(origin, robots.clone());
        robots
    }

    async fn fetch(&self, robots_url: &Url) -> CachedRobots {
        match self.http.get(robots_url, &self.headers).await {
            Ok(resp) if (200..300).contains(&resp.status) => CachedRobots::new(
                &resp.body,
                &self.config.robots_user_agent,
                self.config.robots_ttl,
            ),
            Ok(resp) => {
                debug!("robots.txt at {} returned {}, allowing all", robots_url, resp.status);
                CachedRobots::allow_all(self.config.robots_ttl)
            }
            Err(e) => {
                debug!("robots.txt at {} unreachable ({}), allowing all", robots_url, e);
                CachedRobots::allow_all(self.config.robots_ttl)
            }
        }
    }

    pub fn cached_origins(&self) -> usize {
        self.cache.lock().len()
    }
}

/// Per-host token buckets
pub struct HostRateLimiter {
    limiter: DefaultKeyedRateLimiter<String>,
}

impl HostRateLimiter {
    /// `None` when the rate is not positive
    pub fn new(requests_per_second: f64, burst: u32) -> Option<Self> {
        if !(requests_per_second > 0.0) || !requests_per_second.is_finite() {
            return None;
        }
        let quota = Quota::with_period(Duration::from_secs_f64(1.0 / requests_per_second))?
            .allow_burst(NonZeroU32::new(burst.max(1))?);
        Some(Self {
            limiter: RateLimiter::keyed(quota),
        })
    }

    /// Wait until `host` may be requested again
    pub async fn until_ready(&self, host: &str) {
        self.limiter.until_key_ready(&host.to_string()).await;
    }

    /// Take a token for `host` without waiting
    pub fn try_acquire(&self, host: &str) -> bool {
        self.limiter.check_key(&host.to_string()).is_ok()
    }
}
