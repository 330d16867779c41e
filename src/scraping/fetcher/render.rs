//! Headless render protocol
//!
//! Rendering itself is delegated to a `RenderBackend` (a browser driver
//! living outside this crate). This module owns the wait protocol:
//!
//! 1. navigate and wait for the initial load
//! 2. wait for network idle
//! 3. poll the visible word count until hydration crosses a threshold
//! 4. expand collapsed disclosure widgets and let the page settle
//!
//! Every stage has its own timeout. A stage that times out or errors is
//! recorded in the `RenderReport` and the protocol moves on with whatever
//! has rendered so far. Only a failed navigation or snapshot aborts.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Clone, Error)]
pub enum RenderError {
    #[error("no render backend configured")]
    Unavailable,
    #[error("render session failed to open: {0}")]
    Launch(String),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("render backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub navigation_timeout_secs: u64,
    pub network_idle_timeout_secs: u64,
    pub hydration_timeout_secs: u64,
    /// Hydration is complete once the visible text exceeds this
    pub hydration_min_words: usize,
    pub hydration_poll_ms: u64,
    pub expand_timeout_secs: u64,
    pub settle_timeout_secs: u64,
    /// Fixed pause used when the settle wait times out
    pub settle_fallback_ms: u64,
    pub expand_selectors: Vec<String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            navigation_timeout_secs: 30,
            network_idle_timeout_secs: 12,
            hydration_timeout_secs: 12,
            hydration_min_words: 50,
            hydration_poll_ms: 250,
            expand_timeout_secs: 10,
            settle_timeout_secs: 6,
            settle_fallback_ms: 1500,
            expand_selectors: [
                r#"[aria-expanded="false"]"#,
                "details:not([open])",
                "mat-expansion-panel-header",
                ".collapse:not(.show)",
                r#"[data-bs-toggle="collapse"]"#,
                r#"[data-toggle="collapse"]"#,
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Opens browser-page-equivalent sessions
#[async_trait]
pub trait RenderBackend: Send + Sync {
    async fn open(&self, user_agent: &str) -> Result<Box<dyn RenderSession>, RenderError>;
}

/// One page context. Methods may block indefinitely; the protocol bounds them.
#[async_trait]
pub trait RenderSession: Send {
    /// Navigate and wait for the load event
    async fn goto(&mut self, url: &Url) -> Result<(), RenderError>;
    async fn wait_for_network_idle(&mut self) -> Result<(), RenderError>;
    async fn visible_word_count(&mut self) -> Result<usize, RenderError>;
    /// Click or toggle every element matching the selectors; returns how many
    async fn expand(&mut self, selectors: &[String]) -> Result<usize, RenderError>;
    /// Serialized DOM
    async fn content(&mut self) -> Result<String, RenderError>;
    async fn close(&mut self);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Completed,
    TimedOut,
    Failed(String),
    Skipped,
}

impl StageOutcome {
    fn is_degraded(&self) -> bool {
        matches!(self, StageOutcome::TimedOut | StageOutcome::Failed(_))
    }
}

/// Per-stage results of one render
#[derive(Debug, Clone, Serialize)]
pub struct RenderReport {
    pub load: StageOutcome,
    pub network_idle: StageOutcome,
    pub hydration: StageOutcome,
    pub expansion: StageOutcome,
    pub expanded: usize,
    pub word_count: usize,
}

impl RenderReport {
    fn new() -> Self {
        Self {
            load: StageOutcome::Skipped,
            network_idle: StageOutcome::Skipped,
            hydration: StageOutcome::Skipped,
            expansion: StageOutcome::Skipped,
            expanded: 0,
            word_count: 0,
        }
    }

    /// True if any stage gave up early
    pub fn degraded(&self) -> bool {
        [&self.load, &self.network_idle, &self.hydration, &self.expansion]
            .iter()
            .any(|s| s.is_degraded())
    }
}

async fn bounded<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T, RenderError>>,
) -> (StageOutcome, Option<T>) {
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => (StageOutcome::Completed, Some(value)),
        Ok(Err(e)) => (StageOutcome::Failed(e.to_string()), None),
        Err(_) => (StageOutcome::TimedOut, None),
    }
}

/// Render `url` through `backend`, returning the final HTML and stage report.
/// The session is closed on every path.
pub async fn render_page(
    backend: &dyn RenderBackend,
    url: &Url,
    user_agent: &str,
    config: &RenderConfig,
) -> Result<(String, RenderReport), RenderError> {
    let mut session = backend.open(user_agent).await?;
    let result = run_protocol(session.as_mut(), url, config).await;
    session.close().await;
    result
}

async fn run_protocol(
    session: &mut dyn RenderSession,
    url: &Url,
    config: &RenderConfig,
) -> Result<(String, RenderReport), RenderError> {
    let mut report = RenderReport::new();

    let (load, _) = bounded(
        Duration::from_secs(config.navigation_timeout_secs),
        session.goto(url),
    )
    .await;
    if let StageOutcome::Failed(message) = load {
        return Err(RenderError::Navigation(message));
    }
    report.load = load;

    let (idle, _) = bounded(
        Duration::from_secs(config.network_idle_timeout_secs),
        session.wait_for_network_idle(),
    )
    .await;
    report.network_idle = idle;

    let (hydration, words) = bounded(
        Duration::from_secs(config.hydration_timeout_secs),
        poll_hydration(session, config),
    )
    .await;
    report.hydration = hydration;
    if let Some(words) = words {
        report.word_count = words;
    }

    let (expansion, expanded) = bounded(
        Duration::from_secs(config.expand_timeout_secs),
        session.expand(&config.expand_selectors),
    )
    .await;
    report.expansion = expansion;
    report.expanded = expanded.unwrap_or(0);
    if report.expanded > 0 {
        let (settle, _) = bounded(
            Duration::from_secs(config.settle_timeout_secs),
            session.wait_for_network_idle(),
        )
        .await;
        if settle != StageOutcome::Completed {
            tokio::time::sleep(Duration::from_millis(config.settle_fallback_ms)).await;
        }
    }

    let html = session.content().await?;

    if report.degraded() {
        warn!(
            "Render of {} degraded (load: {:?}, idle: {:?}, hydration: {:?}, expansion: {:?})",
            url, report.load, report.network_idle, report.hydration, report.expansion
        );
    } else {
        debug!("Rendered {} ({} words, {} expanded)", url, report.word_count, report.expanded);
    }

    Ok((html, report))
}

async fn poll_hydration(
    session: &mut dyn RenderSession,
    config: &RenderConfig,
) -> Result<usize, RenderError> {
    let interval = Duration::from_millis(config.hydration_poll_ms.max(1));
    loop {
        let words = session.visible_word_count().await?;
        if words > config.hydration_min_words {
            return Ok(words);
        }
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Scripted session: word count grows by `words_per_poll` per poll
    pub(crate) struct ScriptedBackend {
        pub idle_hangs: bool,
        pub goto_fails: bool,
        pub words_per_poll: usize,
        pub html: String,
        pub closed: Arc<AtomicBool>,
        pub opened: Arc<AtomicUsize>,
        /// Sessions currently open, and the most ever open at once
        pub live: Arc<AtomicUsize>,
        pub peak: Arc<AtomicUsize>,
        pub user_agents: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedBackend {
        pub(crate) fn new(html: &str) -> Self {
            Self {
                idle_hangs: false,
                goto_fails: false,
                words_per_poll: 100,
                html: html.to_string(),
                closed: Arc::new(AtomicBool::new(false)),
                opened: Arc::new(AtomicUsize::new(0)),
                live: Arc::new(AtomicUsize::new(0)),
                peak: Arc::new(AtomicUsize::new(0)),
                user_agents: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    struct ScriptedSession {
        idle_hangs: bool,
        goto_fails: bool,
        words_per_poll: usize,
        words: usize,
        html: String,
        closed: Arc<AtomicBool>,
        live: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RenderBackend for ScriptedBackend {
        async fn open(&self, user_agent: &str) -> Result<Box<dyn RenderSession>, RenderError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(live, Ordering::SeqCst);
            self.user_agents.lock().push(user_agent.to_string());
            Ok(Box::new(ScriptedSession {
                idle_hangs: self.idle_hangs,
                goto_fails: self.goto_fails,
                words_per_poll: self.words_per_poll,
                words: 0,
                html: self.html.clone(),
                closed: Arc::clone(&self.closed),
                live: Arc::clone(&self.live),
            }))
        }
    }

    #[async_trait]
    impl RenderSession for ScriptedSession {
        async fn goto(&mut self, _url: &Url) -> Result<(), RenderError> {
            if self.goto_fails {
                return Err(RenderError::Navigation("net::ERR_NAME_NOT_RESOLVED".into()));
            }
            Ok(())
        }

        async fn wait_for_network_idle(&mut self) -> Result<(), RenderError> {
            if self.idle_hangs {
                std::future::pending::<()>().await;
            }
            Ok(())
        }

        async fn visible_word_count(&mut self) -> Result<usize, RenderError> {
            self.words += self.words_per_poll;
            Ok(self.words)
        }

        async fn expand(&mut self, _selectors: &[String]) -> Result<usize, RenderError> {
            Ok(2)
        }

        async fn content(&mut self) -> Result<String, RenderError> {
            Ok(self.html.clone())
        }

        async fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn url() -> Url {
        Url::parse("https://spa.example.com/post").unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_idle_timeout_degrades_but_returns_hydrated_html() {
        let mut backend = ScriptedBackend::new("<html><body>hydrated</body></html>");
        backend.idle_hangs = true;
        backend.words_per_poll = 20;
        let config = RenderConfig::default();

        let (html, report) = render_page(&backend, &url(), "ua", &config).await.unwrap();

        assert_eq!(html, "<html><body>hydrated</body></html>");
        assert_eq!(report.load, StageOutcome::Completed);
        assert_eq!(report.network_idle, StageOutcome::TimedOut);
        assert_eq!(report.hydration, StageOutcome::Completed);
        assert_eq!(report.word_count, 60);
        assert_eq!(report.expanded, 2);
        assert!(report.degraded());
        assert!(backend.closed.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hydration_timeout_still_returns_html() {
        let mut backend = ScriptedBackend::new("<html></html>");
        backend.words_per_poll = 0;
        let (html, report) = render_page(&backend, &url(), "ua", &RenderConfig::default())
            .await
            .unwrap();
        assert_eq!(html, "<html></html>");
        assert_eq!(report.network_idle, StageOutcome::Completed);
        assert_eq!(report.hydration, StageOutcome::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigation_failure_closes_session() {
        let mut backend = ScriptedBackend::new("");
        backend.goto_fails = true;
        let result = render_page(&backend, &url(), "ua", &RenderConfig::default()).await;
        assert!(matches!(result, Err(RenderError::Navigation(_))));
        assert!(backend.closed.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_render_is_not_degraded() {
        let backend = ScriptedBackend::new("<html></html>");
        let (_, report) = render_page(&backend, &url(), "ua", &RenderConfig::default())
            .await
            .unwrap();
        assert!(!report.degraded());
        assert_eq!(report.word_count, 100);
    }
}
