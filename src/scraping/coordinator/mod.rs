//! Scraping coordinator orchestrating the per-URL pipeline
//!
//! `process` runs one URL through robots check, adaptive fetch, extraction,
//! scoring and deduplication. `process_batch` runs a list with a worker cap
//! and returns results in input order. `crawl` drives a frontier from seed
//! URLs; the frontier is owned by the crawl loop, so only one task ever
//! mutates it.

mod pipeline;
mod types;
mod url_filter;

pub use types::*;
pub use url_filter::{host_allowed, host_key, is_hard_excluded, DiscoveredLink, LinkFilter, HARD_EXCLUDE_PATTERNS};

use chrono::Utc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::{
    classifier::PageClassifier,
    dedup::{ContentDeduplicator, DedupOutcome},
    extractor::ContentExtractor,
    fetcher::{FetchError, Fetcher},
    frontier::{Frontier, Priority},
    plugins::{ExtensionRegistry, FetchStrategyPlugin},
    politeness::{FetchDecision, PolitenessConfig, RobotsCache},
    scorer::ArticleScorer,
    sink::{ArticleRecord, ArticleSink, SkipRecord, SkipSink, TracingSkipSink},
    sitemap,
    urlnorm::{self, NormalizedUrl},
};

/// Scraping coordinator managing the entire scraping pipeline
pub struct ScrapingCoordinator {
    config: ScrapingConfig,
    fetcher: Arc<Fetcher>,
    robots: RobotsCache,
    classifier: PageClassifier,
    /// Shared with blocking analysis tasks
    extractor: Arc<ContentExtractor>,
    scorer: Arc<ArticleScorer>,
    filter: Arc<LinkFilter>,
    dedup: ContentDeduplicator,
    strategies: Vec<Arc<dyn FetchStrategyPlugin>>,
    article_sink: Option<Arc<dyn ArticleSink>>,
    skip_sink: Arc<dyn SkipSink>,
    stats: StatsCounters,
    running: AtomicBool,
}

impl ScrapingCoordinator {
    /// Coordinator over a reqwest fetcher and the global extension registry
    pub fn new(config: ScrapingConfig) -> Result<Self, FetchError> {
        let fetcher = Fetcher::new(config.fetch.clone())?;
        let registry = ExtensionRegistry::global().read().clone();
        Ok(Self::with_fetcher(config, fetcher, registry))
    }

    /// Coordinator over a caller-built fetcher (custom HTTP client or render backend)
    pub fn with_fetcher(config: ScrapingConfig, fetcher: Fetcher, registry: ExtensionRegistry) -> Self {
        let robots = RobotsCache::new(
            PolitenessConfig::from_fetch(&config.fetch),
            fetcher.http(),
            &config.fetch.user_agent,
        );
        let extractor = ContentExtractor::new(config.cascade.clone())
            .with_plugins(registry.extractors().to_vec());
        let scorer =
            ArticleScorer::new(config.scoring.clone()).with_plugins(registry.scorers().to_vec());
        let filter = LinkFilter::new(
            &config.include_patterns,
            &config.exclude_patterns,
            config.trap_detector.clone(),
        );

        Self {
            classifier: PageClassifier::new(config.classifier.clone()),
            dedup: ContentDeduplicator::new(config.dedup.clone()),
            fetcher: Arc::new(fetcher),
            robots,
            extractor: Arc::new(extractor),
            scorer: Arc::new(scorer),
            filter: Arc::new(filter),
            strategies: registry.strategies().to_vec(),
            article_sink: None,
            skip_sink: Arc::new(TracingSkipSink),
            stats: StatsCounters::default(),
            running: AtomicBool::new(false),
            config,
        }
    }

    pub fn with_article_sink(mut self, sink: Arc<dyn ArticleSink>) -> Self {
        self.article_sink = Some(sink);
        self
    }

    pub fn with_skip_sink(mut self, sink: Arc<dyn SkipSink>) -> Self {
        self.skip_sink = sink;
        self
    }

    pub fn config(&self) -> &ScrapingConfig {
        &self.config
    }

    pub fn classifier(&self) -> &PageClassifier {
        &self.classifier
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    /// Run one URL through the whole pipeline
    pub async fn process(&self, raw_url: &str) -> ProcessResult {
        let start = Instant::now();
        let (outcome, discovered) = match self.run_pipeline(raw_url).await {
            Ok(pair) => pair,
            Err(error) => (ProcessOutcome::Failed(error), Vec::new()),
        };

        self.stats.record(&outcome);
        self.report(raw_url, &outcome);

        ProcessResult {
            url: raw_url.to_string(),
            outcome,
            discovered,
            elapsed: start.elapsed(),
        }
    }

    async fn run_pipeline(
        &self,
        raw_url: &str,
    ) -> Result<(ProcessOutcome, Vec<DiscoveredLink>), ProcessError> {
        let normalized = urlnorm::normalize(raw_url)?;
        let url = normalized.as_url();

        if self.robots.check(url).await == FetchDecision::Disallowed {
            return Err(FetchError::Disallowed.into());
        }

        let (fetched, classification) = self.fetch_adaptive(url).await?;

        // Extraction, scoring and link discovery are CPU-bound
        let extractor = Arc::clone(&self.extractor);
        let scorer = Arc::clone(&self.scorer);
        let filter = Arc::clone(&self.filter);
        let html = fetched.html;
        let page_url = fetched.final_url.clone();
        let score_url = url.clone();
        let analysis = tokio::task::spawn_blocking(move || {
            pipeline::analyze(&extractor, &scorer, &filter, &html, &page_url, &score_url)
        })
        .await
        .map_err(|e| ProcessError::Task(e.to_string()))?;
        let links = analysis.links;

        if analysis.extraction.is_empty() {
            return Ok((ProcessOutcome::Rejected(SkipReason::EmptyExtraction), links));
        }
        if !analysis.score.accepted {
            return Ok((
                ProcessOutcome::Rejected(SkipReason::LowScore(analysis.score.score)),
                links,
            ));
        }

        let fingerprint = match self
            .dedup
            .check_and_record(&analysis.extraction.text, normalized.as_str())
        {
            DedupOutcome::Duplicate {
                fingerprint,
                first_url,
            } => {
                return Ok((
                    ProcessOutcome::Rejected(SkipReason::Duplicate {
                        fingerprint,
                        first_url,
                    }),
                    links,
                ))
            }
            DedupOutcome::Unique(fp) => Some(fp),
            DedupOutcome::Skipped => None,
        };

        let record = ArticleRecord {
            url: normalized.as_str().to_string(),
            final_url: fetched.final_url.to_string(),
            metadata: analysis.metadata,
            extraction: analysis.extraction,
            score: analysis.score,
            fingerprint,
            page_type: classification.page_type,
            strategy: fetched.strategy,
            degraded: fetched.degraded,
            fetched_at: Utc::now(),
        };

        if let Some(sink) = &self.article_sink {
            if let Err(e) = sink.write(&record) {
                error!("Failed to write record for {}: {}", record.url, e);
            }
        }

        Ok((ProcessOutcome::Accepted(Box::new(record)), links))
    }

    fn report(&self, url: &str, outcome: &ProcessOutcome) {
        match outcome {
            ProcessOutcome::Accepted(record) => info!(
                "Accepted {} (score {}, {} words via {}, {})",
                url,
                record.score.score,
                record.extraction.word_count,
                record.extraction.method,
                record.strategy
            ),
            other => {
                let reason = other.reason().unwrap_or_default();
                debug!("Skipping {}: {}", url, reason);
                if let Err(e) = self.skip_sink.skip(&SkipRecord::now(url, reason)) {
                    error!("Failed to log skip for {}: {}", url, e);
                }
            }
        }
    }

    /// Process `urls` with at most `workers` in flight, returning results
    /// in input order. Under `FailurePolicy::Abort` the first failure stops
    /// new URLs from starting; in-flight ones finish before the error returns.
    pub async fn process_batch(
        self: &Arc<Self>,
        urls: Vec<String>,
        workers: usize,
        policy: FailurePolicy,
    ) -> Result<Vec<ProcessResult>, BatchError> {
        let workers = workers.max(1);
        let mut slots: Vec<Option<ProcessResult>> = urls.iter().map(|_| None).collect();
        let mut pending = urls.iter().cloned().enumerate();
        let mut tasks = JoinSet::new();
        let mut aborted: Option<BatchError> = None;

        loop {
            while aborted.is_none() && tasks.len() < workers {
                let Some((index, url)) = pending.next() else {
                    break;
                };
                let this = Arc::clone(self);
                tasks.spawn(async move { (index, this.process(&url).await) });
            }

            let Some(joined) = tasks.join_next().await else {
                break;
            };
            match joined {
                Ok((index, result)) => {
                    if policy == FailurePolicy::Abort && aborted.is_none() && result.outcome.is_failed() {
                        aborted = Some(BatchError::Aborted {
                            url: result.url.clone(),
                            reason: result.outcome.reason().unwrap_or_default(),
                        });
                    }
                    slots[index] = Some(result);
                }
                Err(e) => warn!("Batch task failed: {}", e),
            }
        }

        self.flush_sinks();
        if let Some(error) = aborted {
            return Err(error);
        }

        Ok(slots
            .into_iter()
            .zip(urls)
            .map(|(slot, url)| {
                slot.unwrap_or_else(|| ProcessResult {
                    outcome: ProcessOutcome::Failed(ProcessError::Task("task panicked".into())),
                    url,
                    discovered: Vec::new(),
                    elapsed: Default::default(),
                })
            })
            .collect())
    }

    /// Crawl from `seeds` until the frontier drains, the page cap is spent,
    /// the time budget runs out or `stop` is called
    pub async fn crawl(self: &Arc<Self>, seeds: &[String]) -> Result<CrawlStats, CrawlError> {
        let mut frontier = Frontier::new(self.config.frontier.clone());
        if let Some(path) = self.config.resume_file.as_deref().filter(|p| p.exists()) {
            match frontier.load_seen(path) {
                Ok(n) => info!("Resumed {} seen URLs from {}", n, path.display()),
                Err(e) => warn!("Could not read resume file {}: {}", path.display(), e),
            }
        }

        let seed_urls: Vec<NormalizedUrl> = seeds
            .iter()
            .filter_map(|s| match urlnorm::normalize(s) {
                Ok(url) => Some(url),
                Err(e) => {
                    warn!("Ignoring seed '{}': {}", s, e);
                    None
                }
            })
            .collect();
        if seed_urls.is_empty() {
            return Err(CrawlError::NoSeeds);
        }

        let allowed_hosts: Option<HashSet<String>> = self
            .config
            .stay_on_domain
            .then(|| seed_urls.iter().filter_map(|u| host_key(u.as_url())).collect());

        self.running.store(true, Ordering::SeqCst);
        for seed in &seed_urls {
            frontier.enqueue(seed.clone(), 0, Priority::Seed);
        }
        if self.config.use_sitemaps {
            self.seed_from_sitemaps(&mut frontier, &seed_urls, allowed_hosts.as_ref())
                .await;
        }
        if !self.is_running() {
            info!("Crawl stopped during seeding");
        }

        let deadline = self.config.time_budget.map(|budget| Instant::now() + budget);
        let workers = self.config.workers.max(1);
        let mut tasks = JoinSet::new();

        info!(
            "Starting crawl of {} seed(s) (workers={}, max_pages={}, max_depth={})",
            seed_urls.len(),
            workers,
            self.config.frontier.max_pages,
            self.config.frontier.max_depth
        );

        loop {
            while tasks.len() < workers && self.admitting(deadline) {
                let Some(entry) = frontier.dequeue() else {
                    break;
                };
                let this = Arc::clone(self);
                tasks.spawn(async move {
                    let result = this.process(entry.url.as_str()).await;
                    (entry.depth, result)
                });
            }

            let Some(joined) = tasks.join_next().await else {
                break;
            };
            match joined {
                Ok((depth, result)) => {
                    self.admit_links(&mut frontier, allowed_hosts.as_ref(), depth, &result)
                }
                Err(e) => warn!("Crawl task failed: {}", e),
            }
        }

        self.running.store(false, Ordering::SeqCst);
        if !frontier.is_empty() {
            info!("Crawl stopped with {} URLs still queued", frontier.len());
        }

        if let Some(path) = &self.config.resume_file {
            frontier.save_seen(path)?;
        }
        self.flush_sinks();

        let stats = self.stats();
        info!(
            "Crawl finished: {} processed, {} accepted, {} rejected ({} duplicates), {} failed",
            stats.processed, stats.accepted, stats.rejected, stats.duplicates, stats.failed
        );
        Ok(stats)
    }

    fn admitting(&self, deadline: Option<Instant>) -> bool {
        self.running.load(Ordering::SeqCst) && deadline.map_or(true, |d| Instant::now() < d)
    }

    fn admit_links(
        &self,
        frontier: &mut Frontier,
        allowed_hosts: Option<&HashSet<String>>,
        depth: u32,
        result: &ProcessResult,
    ) {
        if let ProcessOutcome::Accepted(record) = &result.outcome {
            let canonical = record
                .metadata
                .canonical_url
                .as_deref()
                .and_then(|c| urlnorm::normalize(c).ok());
            if let Some(canonical) = canonical {
                frontier.mark_seen(&canonical);
            }
        }

        for link in &result.discovered {
            if !host_allowed(link.url.as_url(), allowed_hosts) {
                continue;
            }
            // Pagination stays at the parent's depth so archives are walked to the end
            let (depth, priority) = if link.pagination {
                (depth, Priority::Pagination)
            } else {
                (depth + 1, Priority::Normal)
            };
            if frontier.enqueue(link.url.clone(), depth, priority) {
                self.stats.discovered.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    async fn seed_from_sitemaps(
        &self,
        frontier: &mut Frontier,
        seeds: &[NormalizedUrl],
        allowed_hosts: Option<&HashSet<String>>,
    ) {
        let http = self.fetcher.http();
        for seed in seeds {
            let declared = self.robots.sitemaps(seed.as_url()).await;
            let roots = sitemap::candidate_urls(seed.as_url(), &declared);
            let found = sitemap::discover(
                http.as_ref(),
                &self.config.fetch.user_agent,
                roots,
                self.config.frontier.max_pages,
            )
            .await;

            for url in found {
                let Ok(url) = urlnorm::normalize_url(&url) else {
                    continue;
                };
                if self.filter.allows(url.as_url())
                    && host_allowed(url.as_url(), allowed_hosts)
                    && frontier.enqueue_sitemap(url)
                {
                    self.stats.discovered.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    fn flush_sinks(&self) {
        if let Some(sink) = &self.article_sink {
            if let Err(e) = sink.flush() {
                error!("Failed to flush article sink: {}", e);
            }
        }
        if let Err(e) = self.skip_sink.flush() {
            error!("Failed to flush skip sink: {}", e);
        }
    }

    /// Stop admitting new URLs; in-flight pages finish normally
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> CrawlStats {
        self.stats.snapshot()
    }

    /// Number of distinct content fingerprints seen this session
    pub fn fingerprints_seen(&self) -> usize {
        self.dedup.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraping::classifier::{FetchStrategy, PageType};
    use crate::scraping::fetcher::tests::{html_response, ScriptedHttp};
    use crate::scraping::fetcher::{HttpClient, ScriptedBackend};
    use crate::scraping::sink::MemorySink;

    fn paragraphs(seed: &str) -> String {
        (0..8)
            .map(|p| {
                let words: Vec<String> = (0..50).map(|i| format!("{}{}w{}", seed, p, i % 9)).collect();
                format!("<p>{}.</p>", words.join(" "))
            })
            .collect()
    }

    fn article_html(seed: &str) -> String {
        format!(
            r#"<html><head><title>Post {seed}</title>
            <meta name="author" content="Jane Roe">
            <meta property="article:published_time" content="2024-03-12T09:00:00Z">
            <script type="application/ld+json">{{"@type":"BlogPosting","headline":"Post"}}</script>
            </head><body><nav><a href="/">Home</a></nav>
            <article><h1>Post {seed}</h1>{body}</article></body></html>"#,
            seed = seed,
            body = paragraphs(seed)
        )
    }

    struct Harness {
        http: Arc<ScriptedHttp>,
        sink: Arc<MemorySink>,
        coordinator: Arc<ScrapingCoordinator>,
    }

    fn harness_with(config: ScrapingConfig, http: Arc<ScriptedHttp>, renderer: Option<ScriptedBackend>) -> Harness {
        let mut fetcher = Fetcher::with_client(config.fetch.clone(), Arc::clone(&http) as Arc<dyn HttpClient>);
        if let Some(renderer) = renderer {
            fetcher = fetcher.with_renderer(Arc::new(renderer));
        }
        let sink = Arc::new(MemorySink::new());
        let coordinator = ScrapingCoordinator::with_fetcher(config, fetcher, ExtensionRegistry::new())
            .with_article_sink(sink.clone())
            .with_skip_sink(sink.clone());
        Harness {
            http,
            sink,
            coordinator: Arc::new(coordinator),
        }
    }

    fn test_config() -> ScrapingConfig {
        ScrapingConfig {
            use_sitemaps: false,
            workers: 2,
            ..ScrapingConfig::default()
        }
    }

    fn harness(http: Arc<ScriptedHttp>) -> Harness {
        harness_with(test_config(), http, None)
    }

    const POST: &str = "https://example.com/blog/2024/03/my-post";

    #[tokio::test]
    async fn test_process_accepts_article() {
        let http = Arc::new(ScriptedHttp::default());
        http.page(POST, &article_html("a"));
        let h = harness(http);

        let result = h.coordinator.process(POST).await;
        let ProcessOutcome::Accepted(record) = &result.outcome else {
            panic!("expected accepted, got {:?}", result.outcome);
        };
        assert!(record.score.score >= 35);
        assert_eq!(record.strategy, FetchStrategy::Static);
        assert_eq!(record.page_type, PageType::Static);
        assert!(record.extraction.word_count >= 300);
        assert!(record.fingerprint.is_some());
        assert_eq!(h.sink.articles().len(), 1);
        assert!(h.sink.skips().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_content_second_rejected() {
        let http = Arc::new(ScriptedHttp::default());
        let copy = "https://example.com/blog/2024/03/my-post-syndicated";
        http.page(POST, &article_html("same"));
        http.page(copy, &article_html("same"));
        let h = harness(http);

        assert!(h.coordinator.process(POST).await.outcome.is_accepted());
        let second = h.coordinator.process(copy).await;
        match &second.outcome {
            ProcessOutcome::Rejected(SkipReason::Duplicate { first_url, .. }) => {
                assert_eq!(first_url, POST)
            }
            other => panic!("expected duplicate, got {:?}", other),
        }
        assert!(second.outcome.reason().unwrap().starts_with("duplicate_content ("));

        let stats = h.coordinator.stats();
        assert_eq!((stats.accepted, stats.rejected, stats.duplicates), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_listing_page_rejected_with_score() {
        let http = Arc::new(ScriptedHttp::default());
        let tag = "https://example.com/tag/python";
        http.page(
            tag,
            &format!("<html><body><p>{}</p></body></html>", vec!["python"; 20].join(" ")),
        );
        let h = harness(http);

        let result = h.coordinator.process(tag).await;
        let ProcessOutcome::Rejected(SkipReason::LowScore(score)) = result.outcome else {
            panic!("expected low score, got {:?}", result.outcome);
        };
        assert!(score < 35);
        let skips = h.sink.skips();
        assert_eq!(skips.len(), 1);
        assert_eq!(skips[0].reason, format!("low_article_score ({})", score));
    }

    #[tokio::test]
    async fn test_robots_disallow_is_fatal_without_fetch() {
        let http = Arc::new(ScriptedHttp::default());
        let private = "https://example.com/private/post";
        http.page("https://example.com/robots.txt", "User-agent: *\nDisallow: /private/\n");
        http.page(private, &article_html("p"));
        let h = harness(http);

        let result = h.coordinator.process(private).await;
        assert!(result.outcome.is_failed());
        assert_eq!(result.outcome.reason().unwrap(), "disallowed_by_robots");
        assert_eq!(h.http.calls_to(private), 0);
    }

    #[tokio::test]
    async fn test_http_error_logged_as_skip() {
        let http = Arc::new(ScriptedHttp::default());
        let gone = "https://example.com/blog/gone";
        http.route(gone, vec![Ok(html_response(gone, 410, ""))]);
        let h = harness(http);

        let result = h.coordinator.process(gone).await;
        assert_eq!(result.outcome.reason().unwrap(), "http_status_410");
        assert_eq!(h.sink.skips()[0].url, gone);
        assert_eq!(h.coordinator.stats().failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spa_shell_upgraded_by_render() {
        let http = Arc::new(ScriptedHttp::default());
        let spa = "https://example.com/blog/2024/03/spa-post";
        let visible: Vec<String> = (0..40).map(|i| format!("shell{}", i)).collect();
        http.page(
            spa,
            &format!(
                r#"<html><body><div id="root"><p>{}</p></div><script src="/static/app.js"></script></body></html>"#,
                visible.join(" ")
            ),
        );
        let h = harness_with(test_config(), http, Some(ScriptedBackend::new(&article_html("spa"))));

        let result = h.coordinator.process(spa).await;
        let ProcessOutcome::Accepted(record) = &result.outcome else {
            panic!("expected accepted, got {:?}", result.outcome);
        };
        assert_eq!(record.page_type, PageType::JsSpa);
        assert_eq!(record.strategy, FetchStrategy::HeadlessRender);
    }

    #[tokio::test]
    async fn test_inline_hydration_data_does_not_block_amp_upgrade() {
        let http = Arc::new(ScriptedHttp::default());
        let shell = "https://example.com/blog/2024/03/next-post";
        let amp = "https://example.com/blog/2024/03/next-post/amp";
        let visible: Vec<String> = (0..20).map(|i| format!("teaser{}", i)).collect();
        let entries: Vec<String> = (0..1500)
            .map(|i| format!(r#"{{"id": {}, "title": "entry number {}"}}"#, i, i))
            .collect();
        http.page(
            shell,
            &format!(
                r#"<html><head><link rel="amphtml" href="/blog/2024/03/next-post/amp"></head>
                <body><div id="__next"><p>{}</p></div>
                <script id="__NEXT_DATA__" type="application/json">{{"items": [{}]}}</script>
                </body></html>"#,
                visible.join(" "),
                entries.join(", ")
            ),
        );
        http.page(amp, &article_html("amp"));
        let h = harness(http);

        let (fetched, classification) = h
            .coordinator
            .fetch_adaptive(&url::Url::parse(shell).unwrap())
            .await
            .unwrap();
        assert_eq!(classification.page_type, PageType::JsSpa);
        assert_eq!(classification.strategy, FetchStrategy::Amp);
        assert_eq!(classification.signals.body_word_count, 20);
        assert_eq!(fetched.strategy, FetchStrategy::Amp);
        assert_eq!(fetched.url.as_str(), amp);
        assert_eq!(h.http.calls_to(amp), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_thin_static_render_fallback_ignores_script_text() {
        let http = Arc::new(ScriptedHttp::default());
        let thin = "https://example.com/blog/2024/03/thin-with-data";
        let payload = vec!["token"; 2000].join(" ");
        http.page(
            thin,
            &format!(
                r#"<html><body><p>{}</p><script>window.__STATE__ = "{}";</script></body></html>"#,
                vec!["word"; 30].join(" "),
                payload
            ),
        );
        let h = harness_with(test_config(), http, Some(ScriptedBackend::new(&article_html("thin"))));

        let (fetched, classification) = h
            .coordinator
            .fetch_adaptive(&url::Url::parse(thin).unwrap())
            .await
            .unwrap();
        assert_eq!(classification.strategy, FetchStrategy::StaticBestEffort);
        assert_eq!(classification.signals.body_word_count, 30);
        assert_eq!(fetched.strategy, FetchStrategy::HeadlessRender);
    }

    #[tokio::test]
    async fn test_thin_page_without_renderer_is_best_effort() {
        let http = Arc::new(ScriptedHttp::default());
        let thin = "https://example.com/blog/2024/03/thin";
        http.page(thin, "<html><body><p>Only a few words here.</p></body></html>");
        let h = harness(http);

        let (fetched, classification) = h
            .coordinator
            .fetch_adaptive(&url::Url::parse(thin).unwrap())
            .await
            .unwrap();
        assert_eq!(classification.page_type, PageType::Unknown);
        assert_eq!(fetched.strategy, FetchStrategy::StaticBestEffort);
        assert!(fetched.degraded);
    }

    #[tokio::test]
    async fn test_batch_keeps_input_order() {
        let http = Arc::new(ScriptedHttp::default());
        let a = "https://example.com/blog/2024/03/a";
        let b = "https://example.com/blog/2024/03/b";
        let missing = "https://example.com/blog/2024/03/missing";
        http.page(a, &article_html("a"));
        http.page(b, &article_html("b"));
        let h = harness(http);

        let urls = vec![a.to_string(), missing.to_string(), b.to_string()];
        let results = h
            .coordinator
            .process_batch(urls, 3, FailurePolicy::Skip)
            .await
            .unwrap();
        let order: Vec<&str> = results.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(order, vec![a, missing, b]);
        assert!(results[0].outcome.is_accepted());
        assert!(results[1].outcome.is_failed());
        assert!(results[2].outcome.is_accepted());
    }

    #[tokio::test]
    async fn test_batch_abort_policy() {
        let http = Arc::new(ScriptedHttp::default());
        let a = "https://example.com/blog/2024/03/a";
        let missing = "https://example.com/blog/2024/03/missing";
        let b = "https://example.com/blog/2024/03/b";
        http.page(a, &article_html("a"));
        http.page(b, &article_html("b"));
        let h = harness(http);

        let urls = vec![a.to_string(), missing.to_string(), b.to_string()];
        let err = h
            .coordinator
            .process_batch(urls, 1, FailurePolicy::Abort)
            .await
            .unwrap_err();
        let BatchError::Aborted { url, reason } = err;
        assert_eq!(url, missing);
        assert_eq!(reason, "http_status_404");
        assert_eq!(h.http.calls_to(b), 0);
    }

    fn site(http: &ScriptedHttp) {
        http.page(
            "https://example.com/",
            r#"<html><head><link rel="next" href="/page/2"></head><body>
            <a href="/blog/2024/03/post-a">A</a>
            <a href="/blog/2024/03/post-b">B</a>
            <a href="https://elsewhere.com/story">elsewhere</a>
            </body></html>"#,
        );
        http.page(
            "https://example.com/page/2",
            r#"<html><body><a href="/blog/2024/03/post-c">C</a></body></html>"#,
        );
        for post in ["a", "b", "c"] {
            http.page(
                &format!("https://example.com/blog/2024/03/post-{}", post),
                &article_html(post),
            );
        }
    }

    #[tokio::test]
    async fn test_crawl_follows_links_and_pagination() {
        let http = Arc::new(ScriptedHttp::default());
        site(&http);
        let config = ScrapingConfig {
            stay_on_domain: true,
            ..test_config()
        };
        let h = harness_with(config, http, None);

        let stats = h
            .coordinator
            .crawl(&["https://example.com/".to_string()])
            .await
            .unwrap();
        assert_eq!(stats.processed, 5);
        assert_eq!(stats.accepted, 3);
        assert_eq!(stats.discovered, 4);
        assert_eq!(h.http.calls_to("https://elsewhere.com/story"), 0);
        assert!(!h.coordinator.is_running());
    }

    #[tokio::test]
    async fn test_crawl_page_cap_and_resume() {
        let dir = tempfile::tempdir().unwrap();
        let resume = dir.path().join("seen.txt");
        let http = Arc::new(ScriptedHttp::default());
        site(&http);

        let mut config = test_config();
        config.frontier.max_pages = 2;
        config.resume_file = Some(resume.clone());
        let h = harness_with(config.clone(), Arc::clone(&http), None);
        let stats = h
            .coordinator
            .crawl(&["https://example.com/".to_string()])
            .await
            .unwrap();
        assert_eq!(stats.processed, 2);

        let again = harness_with(config, http, None);
        let stats = again
            .coordinator
            .crawl(&["https://example.com/".to_string()])
            .await
            .unwrap();
        assert_eq!(stats.processed, 0);
    }

    #[tokio::test]
    async fn test_zero_time_budget_admits_nothing() {
        let http = Arc::new(ScriptedHttp::default());
        site(&http);
        let config = ScrapingConfig {
            time_budget: Some(std::time::Duration::ZERO),
            ..test_config()
        };
        let h = harness_with(config, http, None);
        let stats = h
            .coordinator
            .crawl(&["https://example.com/".to_string()])
            .await
            .unwrap();
        assert_eq!(stats.processed, 0);
    }

    /// Calls `stop()` on the coordinator the first time a sitemap is requested
    struct StopOnSitemap {
        inner: ScriptedHttp,
        coordinator: std::sync::OnceLock<std::sync::Weak<ScrapingCoordinator>>,
    }

    #[async_trait::async_trait]
    impl HttpClient for StopOnSitemap {
        async fn get(
            &self,
            url: &url::Url,
            headers: &[(String, String)],
        ) -> Result<crate::scraping::fetcher::HttpResponse, crate::scraping::fetcher::TransportError>
        {
            if url.path().ends_with(".xml") {
                if let Some(coordinator) = self.coordinator.get().and_then(|w| w.upgrade()) {
                    coordinator.stop();
                }
            }
            self.inner.get(url, headers).await
        }
    }

    #[tokio::test]
    async fn test_stop_during_sitemap_seeding_is_honoured() {
        let http = Arc::new(StopOnSitemap {
            inner: ScriptedHttp::default(),
            coordinator: std::sync::OnceLock::new(),
        });
        site(&http.inner);
        let config = ScrapingConfig {
            use_sitemaps: true,
            ..test_config()
        };
        let fetcher = Fetcher::with_client(config.fetch.clone(), Arc::clone(&http) as Arc<dyn HttpClient>);
        let coordinator = Arc::new(ScrapingCoordinator::with_fetcher(
            config,
            fetcher,
            ExtensionRegistry::new(),
        ));
        let _ = http.coordinator.set(Arc::downgrade(&coordinator));

        let stats = coordinator
            .crawl(&["https://example.com/".to_string()])
            .await
            .unwrap();
        assert_eq!(stats.processed, 0);
        assert!(!coordinator.is_running());
        assert_eq!(http.inner.calls_to("https://example.com/"), 0);
    }

    #[tokio::test]
    async fn test_crawl_rejects_unusable_seeds() {
        let h = harness(Arc::new(ScriptedHttp::default()));
        let err = h
            .coordinator
            .crawl(&["ftp://example.com/".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlError::NoSeeds));
    }
}
