//! Per-URL pipeline stages: the adaptive fetch chain and the synchronous
//! analysis pass

use url::Url;

use tracing::{debug, warn};

use crate::scraping::{
    classifier::{ClassificationResult, FetchStrategy},
    dom,
    extractor::{ContentExtractor, ExtractionResult, PageMetadata},
    fetcher::{FetchError, FetchResult, RenderMode},
    plugins,
    scorer::{ArticleScore, ArticleScorer},
};

use super::url_filter::{DiscoveredLink, LinkFilter};
use super::ScrapingCoordinator;

/// Output of the CPU-bound stage
pub(super) struct Analysis {
    pub extraction: ExtractionResult,
    pub metadata: PageMetadata,
    pub score: ArticleScore,
    pub links: Vec<DiscoveredLink>,
}

/// Extract, score and collect links from fetched HTML. `page_url` is where
/// the HTML came from; `score_url` is the normalized URL being judged.
pub(super) fn analyze(
    extractor: &ContentExtractor,
    scorer: &ArticleScorer,
    filter: &LinkFilter,
    html: &str,
    page_url: &Url,
    score_url: &Url,
) -> Analysis {
    Analysis {
        extraction: extractor.extract(html, page_url),
        metadata: extractor.extract_metadata(html, page_url),
        score: scorer.score(score_url, html),
        links: filter.discover(html, page_url),
    }
}

impl ScrapingCoordinator {
    /// Static fetch, classification, then at most one upgrade.
    ///
    /// An upgrade is kept only when its raw word count beats the visible
    /// word count the classifier measured on the static page (mobile needs
    /// `mobile_improvement_ratio` times as many). When nothing improves the
    /// static HTML is returned as best effort.
    pub(super) async fn fetch_adaptive(
        &self,
        url: &Url,
    ) -> Result<(FetchResult, ClassificationResult), FetchError> {
        let mode = self.fetcher.config().render_mode;
        let can_render = mode != RenderMode::Never && self.fetcher.has_renderer();

        if mode == RenderMode::Always {
            if can_render {
                let rendered = self.fetcher.fetch(url, FetchStrategy::HeadlessRender).await?;
                let classification = self
                    .classifier
                    .classify_html(&rendered.html, Some(&rendered.final_url));
                return Ok((rendered, classification));
            }
            warn!("Render mode is 'always' but no render backend is configured; fetching statically");
        }

        let static_result = self.fetcher.fetch(url, FetchStrategy::Static).await?;
        let classification = self
            .classifier
            .classify_html(&static_result.html, Some(&static_result.final_url));
        let static_words = classification.signals.body_word_count;

        let mut strategy = classification.strategy;
        if strategy == FetchStrategy::HeadlessRender && !can_render {
            debug!("{} wants rendering but rendering is unavailable", url);
            strategy = FetchStrategy::StaticBestEffort;
        }

        debug!(
            "Classified {} as {} ({}, confidence {:.2}): {}",
            url, classification.page_type, strategy, classification.confidence, classification.reason
        );

        let upgraded = match strategy {
            FetchStrategy::Static => return Ok((static_result, classification)),
            FetchStrategy::Amp => self
                .try_upgrade(self.fetcher.fetch_amp(&classification.signals).await, static_words as f64),
            FetchStrategy::MobileUa => {
                let threshold = static_words as f64 * self.config.mobile_improvement_ratio;
                self.try_upgrade(self.fetcher.fetch(url, FetchStrategy::MobileUa).await, threshold)
            }
            FetchStrategy::HeadlessRender => {
                self.try_upgrade(
                    self.fetcher.fetch(url, FetchStrategy::HeadlessRender).await,
                    static_words as f64,
                )
            }
            FetchStrategy::StaticBestEffort => None,
        };
        if let Some(result) = upgraded {
            return Ok((result, classification));
        }

        // Thin static page: a render may still recover content the
        // recommended strategy missed
        if strategy != FetchStrategy::HeadlessRender
            && can_render
            && static_words < self.config.thin_static_words
        {
            let rendered = self.fetcher.fetch(url, FetchStrategy::HeadlessRender).await;
            if let Some(result) = self.try_upgrade(rendered, static_words as f64) {
                return Ok((result, classification));
            }
        }

        let timeout = std::time::Duration::from_secs(self.fetcher.config().plugin_timeout_secs);
        for plugin in &self.strategies {
            if let Some(html) =
                plugins::run_strategy(plugin, url, &classification.signals, timeout).await
            {
                if dom::raw_word_count(&html) > static_words {
                    debug!("Fetch strategy plugin '{}' improved {}", plugin.name(), url);
                    let result = FetchResult {
                        html,
                        plugin: Some(plugin.name().to_string()),
                        render_report: None,
                        degraded: false,
                        ..static_result
                    };
                    return Ok((result, classification));
                }
            }
        }

        warn!(
            "No strategy improved {} ({} words static); keeping best-effort static HTML",
            url, static_words
        );
        let result = FetchResult {
            strategy: FetchStrategy::StaticBestEffort,
            degraded: true,
            ..static_result
        };
        Ok((result, classification))
    }

    /// Keep an upgraded fetch only if it beats `threshold` raw words
    fn try_upgrade(
        &self,
        attempt: Result<FetchResult, FetchError>,
        threshold: f64,
    ) -> Option<FetchResult> {
        match attempt {
            Ok(result) => {
                let words = dom::raw_word_count(&result.html);
                if words as f64 > threshold {
                    debug!("{} via {} improved to {} words", result.url, result.strategy, words);
                    Some(result)
                } else {
                    debug!(
                        "{} via {} did not improve ({} words, needed > {:.0})",
                        result.url, result.strategy, words, threshold
                    );
                    None
                }
            }
            Err(e) => {
                debug!("Upgrade fetch failed: {}", e);
                None
            }
        }
    }
}
