//! Strategy-dispatched page retrieval
//!
//! Static, mobile-UA and AMP fetches are plain GETs through `HttpClient`,
//! retried per `RetryPolicy`. Headless renders go through a `RenderBackend`.
//! The two kinds draw from separate semaphores so render load and static
//! throughput never starve each other. Every request first waits on the
//! per-host token bucket.

mod http;
mod render;
mod retry;

pub use http::{HttpClient, HttpResponse, ReqwestClient, TransportError};
pub use render::{
    render_page, RenderBackend, RenderConfig, RenderError, RenderReport, RenderSession,
    StageOutcome,
};
pub use retry::{parse_retry_after, with_retry, AttemptError, RetryPolicy};

#[cfg(test)]
pub(crate) use render::tests::ScriptedBackend;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use url::Url;

use super::classifier::{FetchStrategy, PageSignals};
use super::politeness::HostRateLimiter;

pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";
pub const MOBILE_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";

const ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";
const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// Errors that can occur during fetching
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transient network error: {0}")]
    Transient(String),
    #[error("network error: {0}")]
    Fatal(String),
    #[error("HTTP status {0}")]
    HttpStatus(u16),
    #[error("URL not allowed by robots.txt")]
    Disallowed,
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<FetchError> },
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("page advertises no AMP URL")]
    NoAmpUrl,
    #[error("render failed: {0}")]
    Render(#[from] RenderError),
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transient(_) => true,
            Self::HttpStatus(status) => RetryPolicy::is_retryable_status(*status),
            _ => false,
        }
    }

    /// HTTP status behind the error, looking through exhausted retries
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus(status) => Some(*status),
            Self::RetriesExhausted { last, .. } => last.status(),
            _ => None,
        }
    }

    /// Skip-log reason for a URL that failed with this error
    pub fn skip_reason(&self) -> String {
        match self {
            Self::HttpStatus(status) => format!("http_status_{}", status),
            Self::Disallowed => "disallowed_by_robots".to_string(),
            other => format!("fetch_failed: {}", other),
        }
    }
}

impl From<TransportError> for FetchError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Transient(m) => Self::Transient(m),
            TransportError::Fatal(m) => Self::Fatal(m),
        }
    }
}

/// When to use the headless renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// Render only when classification asks for it
    #[default]
    Auto,
    /// Skip classification and render every page
    Always,
    /// Never render; render recommendations become best-effort static
    Never,
}

/// Configuration for the fetcher
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub user_agent: String,
    pub mobile_user_agent: String,
    /// Token matched against robots.txt user-agent groups
    pub robots_user_agent: String,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Maximum response size (bytes)
    pub max_content_size: usize,
    pub max_redirects: usize,
    /// Concurrent static, mobile-UA and AMP requests
    pub request_concurrency: usize,
    /// Concurrent headless render sessions
    pub render_concurrency: usize,
    /// Per-host token bucket refill rate
    pub requests_per_second: f64,
    pub rate_burst: u32,
    pub respect_robots: bool,
    pub robots_cache_size: usize,
    pub robots_ttl_secs: u64,
    pub render_mode: RenderMode,
    /// Upper bound on a fetch-strategy plugin call
    pub plugin_timeout_secs: u64,
    pub retry: RetryPolicy,
    pub render: RenderConfig,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: DESKTOP_USER_AGENT.to_string(),
            mobile_user_agent: MOBILE_USER_AGENT.to_string(),
            robots_user_agent: "pageharvest".to_string(),
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
            max_content_size: 10 * 1024 * 1024, // 10 MB
            max_redirects: 10,
            request_concurrency: 8,
            render_concurrency: 2,
            requests_per_second: 2.0,
            rate_burst: 1,
            respect_robots: true,
            robots_cache_size: 1000,
            robots_ttl_secs: 24 * 60 * 60,
            render_mode: RenderMode::Auto,
            plugin_timeout_secs: 30,
            retry: RetryPolicy::default(),
            render: RenderConfig::default(),
        }
    }
}

/// Result of a successful fetch
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// URL that was requested
    pub url: Url,
    /// URL after redirects
    pub final_url: Url,
    pub html: String,
    /// Strategy actually used
    pub strategy: FetchStrategy,
    /// HTTP status; renders do not report one
    pub status: Option<u16>,
    pub elapsed: Duration,
    /// The HTML may be incomplete (render stage gave up, or best-effort static)
    pub degraded: bool,
    pub render_report: Option<RenderReport>,
    /// Fetch-strategy plugin that produced the HTML, if any
    pub plugin: Option<String>,
}

/// Strategy-dispatched fetcher with independent static and render pools
pub struct Fetcher {
    config: FetchConfig,
    http: Arc<dyn HttpClient>,
    renderer: Option<Arc<dyn RenderBackend>>,
    static_permits: Semaphore,
    render_permits: Semaphore,
    rate_limiter: Option<Arc<HostRateLimiter>>,
}

impl Fetcher {
    /// Build a fetcher over a reqwest client
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let http: Arc<dyn HttpClient> = Arc::new(ReqwestClient::new(&config)?);
        let rate_limiter =
            HostRateLimiter::new(config.requests_per_second, config.rate_burst).map(Arc::new);
        Ok(Self::with_client(config, http).with_rate_limiter(rate_limiter))
    }

    /// Build a fetcher over any HTTP client, without rate limiting
    pub fn with_client(config: FetchConfig, http: Arc<dyn HttpClient>) -> Self {
        Self {
            static_permits: Semaphore::new(config.request_concurrency.max(1)),
            render_permits: Semaphore::new(config.render_concurrency.max(1)),
            config,
            http,
            renderer: None,
            rate_limiter: None,
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn RenderBackend>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn with_rate_limiter(mut self, limiter: Option<Arc<HostRateLimiter>>) -> Self {
        self.rate_limiter = limiter;
        self
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Shared HTTP client, for robots.txt and sitemap requests
    pub fn http(&self) -> Arc<dyn HttpClient> {
        Arc::clone(&self.http)
    }

    pub fn has_renderer(&self) -> bool {
        self.renderer.is_some()
    }

    /// Fetch `url` with `strategy`. For `Amp`, `url` is the AMP URL itself.
    pub async fn fetch(&self, url: &Url, strategy: FetchStrategy) -> Result<FetchResult, FetchError> {
        match strategy {
            FetchStrategy::HeadlessRender => self.fetch_rendered(url).await,
            FetchStrategy::MobileUa => {
                self.fetch_http(url, &self.config.mobile_user_agent, strategy).await
            }
            FetchStrategy::Static | FetchStrategy::Amp | FetchStrategy::StaticBestEffort => {
                self.fetch_http(url, &self.config.user_agent, strategy).await
            }
        }
    }

    /// Fetch the AMP mirror advertised by `signals`
    pub async fn fetch_amp(&self, signals: &PageSignals) -> Result<FetchResult, FetchError> {
        let amp_url = signals.amp_url.as_ref().ok_or(FetchError::NoAmpUrl)?;
        self.fetch(amp_url, FetchStrategy::Amp).await
    }

    async fn fetch_http(
        &self,
        url: &Url,
        user_agent: &str,
        strategy: FetchStrategy,
    ) -> Result<FetchResult, FetchError> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl(url.to_string()));
        }

        let headers = vec![
            ("User-Agent".to_string(), user_agent.to_string()),
            ("Accept".to_string(), ACCEPT.to_string()),
            ("Accept-Language".to_string(), ACCEPT_LANGUAGE.to_string()),
        ];

        let start = Instant::now();
        let response =
            with_retry(&self.config.retry, url, |_| self.attempt(url, &headers)).await?;

        let content_type = response.content_type().to_lowercase();
        if !content_type.contains("text/html")
            && !content_type.contains("application/xhtml")
            && !content_type.contains("text/plain")
        {
            return Err(FetchError::UnsupportedContentType(content_type));
        }

        let degraded = strategy == FetchStrategy::StaticBestEffort;
        if degraded {
            warn!("Fetching {} best-effort; content may be partial", url);
        }
        debug!(
            "Fetched {} via {} ({}, {} bytes)",
            url,
            strategy,
            response.status,
            response.body.len()
        );

        Ok(FetchResult {
            url: url.clone(),
            final_url: response.final_url,
            html: response.body,
            strategy,
            status: Some(response.status),
            elapsed: start.elapsed(),
            degraded,
            render_report: None,
            plugin: None,
        })
    }

    async fn attempt(
        &self,
        url: &Url,
        headers: &[(String, String)],
    ) -> Result<HttpResponse, AttemptError> {
        // Throttled hosts wait outside the pool
        self.wait_for_host(url).await;
        let _permit = self
            .static_permits
            .acquire()
            .await
            .map_err(|_| AttemptError::Fatal(FetchError::Fatal("fetcher closed".to_string())))?;

        match self.http.get(url, headers).await {
            Ok(resp) if resp.is_success() => Ok(resp),
            Ok(resp) if RetryPolicy::is_retryable_status(resp.status) => Err(AttemptError::Retry {
                server_delay: resp.retry_after(),
                error: FetchError::HttpStatus(resp.status),
            }),
            Ok(resp) => Err(AttemptError::Fatal(FetchError::HttpStatus(resp.status))),
            Err(TransportError::Transient(m)) => Err(AttemptError::Retry {
                error: FetchError::Transient(m),
                server_delay: None,
            }),
            Err(e @ TransportError::Fatal(_)) => Err(AttemptError::Fatal(e.into())),
        }
    }

    async fn fetch_rendered(&self, url: &Url) -> Result<FetchResult, FetchError> {
        let renderer = self.renderer.as_ref().ok_or(RenderError::Unavailable)?;
        self.wait_for_host(url).await;
        let _permit = self
            .render_permits
            .acquire()
            .await
            .map_err(|_| FetchError::Fatal("fetcher closed".to_string()))?;

        let start = Instant::now();
        let (html, report) =
            render_page(renderer.as_ref(), url, &self.config.user_agent, &self.config.render)
                .await?;

        Ok(FetchResult {
            url: url.clone(),
            final_url: url.clone(),
            html,
            strategy: FetchStrategy::HeadlessRender,
            status: None,
            elapsed: start.elapsed(),
            degraded: report.degraded(),
            render_report: Some(report),
            plugin: None,
        })
    }

    async fn wait_for_host(&self, url: &Url) {
        if let (Some(limiter), Some(host)) = (&self.rate_limiter, url.host_str()) {
            limiter.until_ready(host).await;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::{HashMap, VecDeque};

    /// Scripted HTTP client: per-URL queues of responses; the last one repeats
    #[derive(Default)]
    pub(crate) struct ScriptedHttp {
        routes: Mutex<HashMap<String, VecDeque<Result<HttpResponse, TransportError>>>>,
        pub requests: Mutex<Vec<(String, Vec<(String, String)>)>>,
    }

    pub(crate) fn html_response(url: &str, status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            final_url: Url::parse(url).unwrap(),
            headers: vec![("Content-Type".into(), "text/html; charset=utf-8".into())],
            body: body.to_string(),
        }
    }

    impl ScriptedHttp {
        pub(crate) fn route(&self, url: &str, responses: Vec<Result<HttpResponse, TransportError>>) {
            self.routes.lock().insert(url.to_string(), responses.into());
        }

        pub(crate) fn page(&self, url: &str, body: &str) {
            self.route(url, vec![Ok(html_response(url, 200, body))]);
        }

        pub(crate) fn calls_to(&self, url: &str) -> usize {
            self.requests.lock().iter().filter(|(u, _)| u == url).count()
        }
    }

    #[async_trait]
    impl HttpClient for ScriptedHttp {
        async fn get(
            &self,
            url: &Url,
            headers: &[(String, String)],
        ) -> Result<HttpResponse, TransportError> {
            self.requests
                .lock()
                .push((url.to_string(), headers.to_vec()));
            let mut routes = self.routes.lock();
            match routes.get_mut(url.as_str()) {
                Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
                Some(queue) => queue.front().cloned().unwrap(),
                None => Ok(html_response(url.as_str(), 404, "")),
            }
        }
    }

    fn fetcher(http: &Arc<ScriptedHttp>) -> Fetcher {
        Fetcher::with_client(FetchConfig::default(), Arc::clone(http) as Arc<dyn HttpClient>)
    }

    const URL: &str = "https://example.com/post";

    #[tokio::test(start_paused = true)]
    async fn test_retries_503_honouring_retry_after() {
        let http = Arc::new(ScriptedHttp::default());
        let mut busy = html_response(URL, 503, "");
        busy.headers.push(("Retry-After".into(), "5".into()));
        http.route(URL, vec![Ok(busy), Ok(html_response(URL, 200, "<p>ok</p>"))]);

        let start = tokio::time::Instant::now();
        let result = fetcher(&http)
            .fetch(&Url::parse(URL).unwrap(), FetchStrategy::Static)
            .await
            .unwrap();

        assert_eq!(result.html, "<p>ok</p>");
        assert_eq!(result.status, Some(200));
        assert_eq!(http.calls_to(URL), 2);
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(5) && waited < Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_is_fatal() {
        let http = Arc::new(ScriptedHttp::default());
        http.route(URL, vec![Ok(html_response(URL, 404, ""))]);
        let err = fetcher(&http)
            .fetch(&Url::parse(URL).unwrap(), FetchStrategy::Static)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::HttpStatus(404)));
        assert_eq!(err.skip_reason(), "http_status_404");
        assert_eq!(http.calls_to(URL), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_exhaust_retries() {
        let http = Arc::new(ScriptedHttp::default());
        http.route(URL, vec![Err(TransportError::Transient("connection reset".into()))]);
        let err = fetcher(&http)
            .fetch(&Url::parse(URL).unwrap(), FetchStrategy::Static)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(http.calls_to(URL), 3);
        assert!(err.skip_reason().starts_with("fetch_failed: "));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dns_failure_not_retried() {
        let http = Arc::new(ScriptedHttp::default());
        http.route(URL, vec![Err(TransportError::Fatal("dns error".into()))]);
        let err = fetcher(&http)
            .fetch(&Url::parse(URL).unwrap(), FetchStrategy::Static)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Fatal(_)));
        assert!(!err.is_transient());
        assert_eq!(http.calls_to(URL), 1);
    }

    #[tokio::test]
    async fn test_mobile_identity_header() {
        let http = Arc::new(ScriptedHttp::default());
        http.page(URL, "<p>m</p>");
        fetcher(&http)
            .fetch(&Url::parse(URL).unwrap(), FetchStrategy::MobileUa)
            .await
            .unwrap();
        let requests = http.requests.lock();
        let (_, headers) = &requests[0];
        assert!(headers
            .iter()
            .any(|(k, v)| k == "User-Agent" && v == MOBILE_USER_AGENT));
        assert!(headers.iter().any(|(k, v)| k == "Accept-Language" && v == ACCEPT_LANGUAGE));
    }

    #[tokio::test]
    async fn test_unsupported_content_type() {
        let http = Arc::new(ScriptedHttp::default());
        let mut pdf = html_response(URL, 200, "%PDF");
        pdf.headers = vec![("Content-Type".into(), "application/pdf".into())];
        http.route(URL, vec![Ok(pdf)]);
        let err = fetcher(&http)
            .fetch(&Url::parse(URL).unwrap(), FetchStrategy::Static)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::UnsupportedContentType(_)));
    }

    #[tokio::test]
    async fn test_amp_requires_url() {
        let http = Arc::new(ScriptedHttp::default());
        let err = fetcher(&http)
            .fetch_amp(&PageSignals::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::NoAmpUrl));

        let amp = "https://example.com/post/amp";
        http.page(amp, "<p>amp</p>");
        let signals = PageSignals {
            amp_url: Some(Url::parse(amp).unwrap()),
            ..Default::default()
        };
        let result = fetcher(&http).fetch_amp(&signals).await.unwrap();
        assert_eq!(result.strategy, FetchStrategy::Amp);
        assert_eq!(result.url.as_str(), amp);
    }

    #[tokio::test]
    async fn test_render_without_backend() {
        let http = Arc::new(ScriptedHttp::default());
        let err = fetcher(&http)
            .fetch(&Url::parse(URL).unwrap(), FetchStrategy::HeadlessRender)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Render(RenderError::Unavailable)));
    }

    #[tokio::test]
    async fn test_throttled_host_does_not_hold_request_slot() {
        let http = Arc::new(ScriptedHttp::default());
        for page in ["https://a.example.com/1", "https://a.example.com/2", "https://b.example.com/1"] {
            http.page(page, "<p>ok</p>");
        }
        let config = FetchConfig {
            request_concurrency: 1,
            ..FetchConfig::default()
        };
        let limiter = HostRateLimiter::new(1.0, 1).map(Arc::new);
        let fetcher = Arc::new(
            Fetcher::with_client(config, Arc::clone(&http) as Arc<dyn HttpClient>)
                .with_rate_limiter(limiter),
        );

        let start = Instant::now();
        let spawn = |raw: &'static str| {
            let fetcher = Arc::clone(&fetcher);
            tokio::spawn(async move {
                fetcher
                    .fetch(&Url::parse(raw).unwrap(), FetchStrategy::Static)
                    .await
                    .unwrap();
                start.elapsed()
            })
        };
        let a1 = spawn("https://a.example.com/1");
        let a2 = spawn("https://a.example.com/2");
        let b1 = spawn("https://b.example.com/1");

        assert!(a1.await.unwrap() < Duration::from_millis(300));
        assert!(b1.await.unwrap() < Duration::from_millis(300));
        assert!(a2.await.unwrap() >= Duration::from_millis(800));
    }

    #[tokio::test(start_paused = true)]
    async fn test_render_pool_capped_while_static_fetches_proceed() {
        let http = Arc::new(ScriptedHttp::default());
        http.page(URL, "<p>static</p>");
        let mut backend = ScriptedBackend::new("<html><body>rendered</body></html>");
        backend.idle_hangs = true;
        let live = Arc::clone(&backend.live);
        let peak = Arc::clone(&backend.peak);
        let config = FetchConfig {
            request_concurrency: 4,
            render_concurrency: 2,
            ..FetchConfig::default()
        };
        let fetcher = Arc::new(
            Fetcher::with_client(config, Arc::clone(&http) as Arc<dyn HttpClient>)
                .with_renderer(Arc::new(backend)),
        );

        let renders: Vec<_> = (0..5)
            .map(|i| {
                let fetcher = Arc::clone(&fetcher);
                tokio::spawn(async move {
                    let url = Url::parse(&format!("https://spa.example.com/{}", i)).unwrap();
                    fetcher.fetch(&url, FetchStrategy::HeadlessRender).await
                })
            })
            .collect();
        while live.load(std::sync::atomic::Ordering::SeqCst) < 2 {
            tokio::task::yield_now().await;
        }

        // Both render slots are stuck waiting for network idle
        let before = tokio::time::Instant::now();
        for _ in 0..3 {
            let result = fetcher
                .fetch(&Url::parse(URL).unwrap(), FetchStrategy::Static)
                .await
                .unwrap();
            assert_eq!(result.html, "<p>static</p>");
        }
        assert!(before.elapsed() < Duration::from_secs(1));
        assert_eq!(live.load(std::sync::atomic::Ordering::SeqCst), 2);

        for render in renders {
            assert!(render.await.unwrap().unwrap().degraded);
        }
        assert_eq!(peak.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(live.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_degraded_render_still_returns_html() {
        let http = Arc::new(ScriptedHttp::default());
        let mut backend = ScriptedBackend::new("<html><body>hydrated</body></html>");
        backend.idle_hangs = true;
        let fetcher = fetcher(&http).with_renderer(Arc::new(backend));

        let result = fetcher
            .fetch(&Url::parse(URL).unwrap(), FetchStrategy::HeadlessRender)
            .await
            .unwrap();
        assert_eq!(result.strategy, FetchStrategy::HeadlessRender);
        assert!(result.degraded);
        assert_eq!(result.status, None);
        let report = result.render_report.unwrap();
        assert_eq!(report.network_idle, StageOutcome::TimedOut);
        assert_eq!(report.hydration, StageOutcome::Completed);
        assert_eq!(http.requests.lock().len(), 0);
    }
}
