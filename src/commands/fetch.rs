use anyhow::{Context, Result};
use pageharvest::{
    config::Config,
    scraping::{ProcessOutcome, ScrapingConfig, ScrapingCoordinator},
};

pub async fn fetch_url(config: Config, url: String, force: bool) -> Result<()> {
    let mut scraping_config = ScrapingConfig::from_config(&config);
    if force {
        scraping_config.scoring.threshold = i32::MIN;
    }
    let coordinator = ScrapingCoordinator::new(scraping_config)
        .context("Failed to initialize fetcher")?;

    let result = coordinator.process(&url).await;
    match result.outcome {
        ProcessOutcome::Accepted(record) => {
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        ProcessOutcome::Rejected(reason) => {
            anyhow::bail!("{} rejected: {} (use --force to keep it)", url, reason)
        }
        ProcessOutcome::Failed(error) => Err(error).with_context(|| format!("Failed to fetch {}", url)),
    }
}
