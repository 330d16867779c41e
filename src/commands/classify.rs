use anyhow::{Context, Result};
use pageharvest::{
    config::Config,
    scraping::{urlnorm, FetchStrategy, Fetcher, PageClassifier},
};

pub async fn classify_url(config: Config, url: String) -> Result<()> {
    let url = urlnorm::normalize(&url)?;
    let fetcher = Fetcher::new(config.fetch.clone()).context("Failed to initialize fetcher")?;
    let classifier = PageClassifier::new(config.classifier.clone());

    let fetched = fetcher
        .fetch(url.as_url(), FetchStrategy::Static)
        .await
        .with_context(|| format!("Failed to fetch {}", url))?;
    let classification = classifier.classify_html(&fetched.html, Some(&fetched.final_url));

    println!("\nClassification for {}:", url);
    println!("==================");
    println!("Page type: {}", classification.page_type);
    println!("Strategy: {}", classification.strategy);
    println!("Confidence: {:.2}", classification.confidence);
    println!("Rule: {}", classification.rule);
    println!("Reason: {}", classification.reason);
    println!();
    println!("{}", serde_json::to_string_pretty(&classification.signals)?);

    Ok(())
}
