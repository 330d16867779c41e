use anyhow::{Context, Result};
use pageharvest::{
    config::Config,
    scraping::{ScrapingConfig, ScrapingCoordinator},
};
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use super::Outputs;

pub async fn run_crawl(config: Config, seeds: Vec<String>, outputs: Outputs) -> Result<()> {
    let scraping_config = ScrapingConfig::from_config(&config);

    println!("\nCrawl Configuration:");
    println!("  Seeds: {} URLs", seeds.len());
    println!("  Max depth: {}", scraping_config.frontier.max_depth);
    println!("  Max pages: {}", scraping_config.frontier.max_pages);
    println!("  Workers: {}", scraping_config.workers);
    println!("  Render mode: {:?}", scraping_config.fetch.render_mode);
    println!();

    let coordinator = ScrapingCoordinator::new(scraping_config)
        .context("Failed to initialize fetcher")?;
    let coordinator = Arc::new(outputs.attach(coordinator)?);

    // First Ctrl-C drains in-flight pages; the resume file is still written
    let stopper = Arc::clone(&coordinator);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing in-flight pages");
            stopper.stop();
        }
    });

    let run_id = Uuid::new_v4();
    let stats = coordinator
        .crawl(&seeds)
        .instrument(info_span!("crawl", %run_id))
        .await?;
    info!("Crawl {} done", run_id);

    println!("\nCrawl complete!");
    println!("==================");
    println!("Pages processed: {}", stats.processed);
    println!("Articles accepted: {}", stats.accepted);
    println!("Rejected: {} ({} duplicates)", stats.rejected, stats.duplicates);
    println!("Failed: {}", stats.failed);
    println!("URLs discovered: {}", stats.discovered);
    println!("Unique fingerprints: {}", coordinator.fingerprints_seen());

    Ok(())
}
