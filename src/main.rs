//! pageharvest: adaptive fetch, classification and content extraction

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use pageharvest::{
    config::{Config, LogFormat},
    scraping::{coordinator::FailurePolicy, fetcher::RenderMode},
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pageharvest")]
#[command(about = "Adaptive fetch, classification and content extraction for web pages")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log format (overrides the config file)
    #[arg(long, value_enum, global = true)]
    log_format: Option<LogFormat>,

    /// When to use the headless renderer (overrides the config file)
    #[arg(long, alias = "render", value_enum, global = true)]
    render_mode: Option<RenderMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, extract and score a single URL, printing the record as JSON
    Fetch {
        url: String,

        /// Print the record even when the page is rejected
        #[arg(long)]
        force: bool,
    },

    /// Process a list of URLs, printing one JSON line per URL in input order
    Batch {
        /// URLs to process
        urls: Vec<String>,

        /// File with one URL per line
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Concurrent URLs
        #[arg(short, long)]
        workers: Option<usize>,

        /// What to do when a URL fails
        #[arg(long, value_enum, default_value = "skip")]
        on_error: FailurePolicy,

        /// JSONL file for accepted records
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// JSONL file for skipped URLs
        #[arg(long)]
        skip_log: Option<PathBuf>,
    },

    /// Crawl from seed URLs
    Crawl {
        /// Seed URLs
        #[arg(required = true)]
        seeds: Vec<String>,

        /// Maximum link depth
        #[arg(short = 'd', long)]
        max_depth: Option<u32>,

        /// Maximum pages to process
        #[arg(short = 'm', long)]
        max_pages: Option<usize>,

        /// Concurrent pages
        #[arg(short, long)]
        workers: Option<usize>,

        /// Follow links to other hosts
        #[arg(long)]
        allow_offsite: bool,

        /// Skip sitemap discovery
        #[arg(long)]
        no_sitemaps: bool,

        /// Stop admitting pages after this many seconds
        #[arg(long)]
        time_budget: Option<u64>,

        /// Seen-URL file to resume from and update
        #[arg(long)]
        resume: Option<PathBuf>,

        /// JSONL file for accepted records
        #[arg(short, long, conflicts_with = "output_dir")]
        output: Option<PathBuf>,

        /// Directory for one JSON file per accepted page
        #[arg(long, alias = "out")]
        output_dir: Option<PathBuf>,

        /// JSONL file for skipped URLs
        #[arg(long)]
        skip_log: Option<PathBuf>,
    },

    /// Fetch a URL statically and show how it would be classified
    Classify { url: String },

    /// Write a configuration file with every default spelled out
    Init {
        /// Output path
        #[arg(default_value = "pageharvest.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn init_logging(config: &Config, verbose: u8, format: Option<LogFormat>) {
    let level = config.logging.level.raised_by(verbose);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("pageharvest={},warn", level)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    match format.unwrap_or(config.logging.format) {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_or_default(cli.config.as_deref())?;
    init_logging(&config, cli.verbose, cli.log_format);

    if let Some(mode) = cli.render_mode {
        config.fetch.render_mode = mode;
    }

    match cli.command {
        Commands::Fetch { url, force } => commands::fetch::fetch_url(config, url, force).await,
        Commands::Batch {
            urls,
            input,
            workers,
            on_error,
            output,
            skip_log,
        } => {
            let options = commands::batch::BatchOptions {
                urls,
                input,
                workers,
                on_error,
                output,
                skip_log,
            };
            commands::batch::run_batch(config, options).await
        }
        Commands::Crawl {
            seeds,
            max_depth,
            max_pages,
            workers,
            allow_offsite,
            no_sitemaps,
            time_budget,
            resume,
            output,
            output_dir,
            skip_log,
        } => {
            if let Some(depth) = max_depth {
                config.crawl.max_depth = depth;
            }
            if let Some(pages) = max_pages {
                config.crawl.max_pages = pages;
            }
            if let Some(workers) = workers {
                config.crawl.workers = workers;
            }
            if allow_offsite {
                config.crawl.stay_on_domain = false;
            }
            if no_sitemaps {
                config.crawl.use_sitemaps = false;
            }
            if time_budget.is_some() {
                config.crawl.time_budget_secs = time_budget;
            }
            if resume.is_some() {
                config.crawl.resume_file = resume;
            }
            config.validate()?;
            let outputs = commands::Outputs {
                jsonl: output,
                dir: output_dir,
                skip_log,
            };
            commands::crawl::run_crawl(config, seeds, outputs).await
        }
        Commands::Classify { url } => commands::classify::classify_url(config, url).await,
        Commands::Init { path, force } => commands::init::init_config(path, force),
    }
}
