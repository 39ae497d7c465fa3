use clap::Parser;
use nd_core::logging::{init_logging, short};
use nd_core::{ArticleFilter, ArticleStorage, Error, Result, Settings};
use nd_scheduler::Scheduler;
use nd_scrapers::Pipeline;
use nd_web::AppState;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};

#[derive(Debug, Clone)]
struct HumanDuration(Duration);

impl HumanDuration {
    /// Whole minutes, rejecting leftover seconds.
    fn as_minutes(&self) -> std::result::Result<u64, String> {
        let secs = self.0.as_secs();
        if secs % 60 != 0 {
            return Err(format!("Interval must be a whole number of minutes, got {}s", secs));
        }
        Ok(secs / 60)
    }
}

impl FromStr for HumanDuration {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut total_seconds = 0u64;
        let mut current_number = String::new();
        let mut has_unit = false;

        let add = |total: u64, digits: &str, unit_seconds: u64| -> std::result::Result<u64, String> {
            digits
                .parse::<u64>()
                .ok()
                .and_then(|num| num.checked_mul(unit_seconds))
                .and_then(|secs| total.checked_add(secs))
                .ok_or_else(|| format!("Duration is too large: {}", s))
        };

        for c in s.chars() {
            if c.is_ascii_digit() {
                current_number.push(c);
            } else if !current_number.is_empty() {
                let unit_seconds = match c {
                    's' => 1,
                    'm' => 60,
                    'h' => 3600,
                    'd' => 86400,
                    _ => return Err(format!("Invalid duration unit: {}", c)),
                };
                total_seconds = add(total_seconds, &current_number, unit_seconds)?;
                current_number.clear();
                has_unit = true;
            } else if !c.is_whitespace() {
                return Err(format!("Invalid character in duration: {}", c));
            }
        }

        // A bare number means minutes, the scheduler's native unit
        if !current_number.is_empty() {
            total_seconds = add(total_seconds, &current_number, 60)?;
            has_unit = true;
        }

        if !has_unit {
            return Err("Duration must include a number".to_string());
        }

        Ok(HumanDuration(Duration::from_secs(total_seconds)))
    }
}

#[derive(Parser)]
#[command(author, version, about = "VnExpress news digest: scrape, summarize, store", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8000")]
        addr: SocketAddr,
        /// Start the recurring scrape job with SCHEDULER_INTERVAL_MINUTES
        #[arg(long)]
        start_scheduler: bool,
    },
    /// Run one scrape-summarize-store batch and exit
    Scrape {
        /// Pause for BATCH_DELAY_SECOND after this many stored articles
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Run the recurring scrape job until Ctrl-C (e.g. 30m, 1h, 1h30m)
    Schedule {
        #[arg(long)]
        interval: Option<HumanDuration>,
    },
    Articles {
        #[command(subcommand)]
        command: ArticleCommands,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ArticleCommands {
    /// List stored articles, newest first
    List {
        #[arg(long)]
        category: Option<String>,
        /// Case-insensitive pattern matched against title and content
        #[arg(long)]
        q: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// List distinct categories
    Categories,
}

async fn build_pipeline(settings: &Settings) -> Result<Arc<Pipeline>> {
    let storage = nd_storage::create_storage(settings).await?;
    let pipeline = Pipeline::from_settings(settings, storage)?;
    info!(
        "🦗 Pipeline ready: {} (batch size {}, batch delay {}s)",
        settings.base_url, settings.max_articles_per_batch, settings.batch_delay_seconds
    );
    Ok(Arc::new(pipeline))
}

async fn print_articles(
    storage: &Arc<dyn ArticleStorage>,
    category: Option<String>,
    q: Option<String>,
    limit: usize,
) -> Result<()> {
    let articles = storage.list_articles(&ArticleFilter::new(category, q)).await?;
    println!("{} articles", articles.len());
    for stored in articles.iter().take(limit) {
        let article = &stored.article;
        println!(
            "- [{}] {} ({})",
            article.category.as_deref().unwrap_or("-"),
            article.title,
            article.link_url
        );
        if let Some(summary) = &article.summary {
            println!("    {}", short(summary, 160));
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.log_level);
    let settings = cli.settings;
    settings.validate()?;

    match cli.command {
        Commands::Serve { addr, start_scheduler } => {
            let pipeline = build_pipeline(&settings).await?;
            let scheduler = Arc::new(Scheduler::new(
                pipeline.clone(),
                settings.max_articles_per_batch,
                settings.scheduler_interval_minutes,
            ));
            if start_scheduler {
                scheduler.start(settings.scheduler_interval_minutes).await?;
            }
            let state = AppState::new(pipeline, scheduler, settings.scheduler_interval_minutes);
            nd_web::serve(addr, state).await?;
        }
        Commands::Scrape { batch_size } => {
            let pipeline = build_pipeline(&settings).await?;
            let result = pipeline
                .run(batch_size.unwrap_or(settings.max_articles_per_batch))
                .await?;
            println!(
                "Stored {} of {} articles ({} skipped)",
                result.stored_count, result.candidates, result.skipped_count
            );
        }
        Commands::Schedule { interval } => {
            let minutes = match interval {
                Some(interval) => interval.as_minutes().map_err(Error::Config)?,
                None => settings.scheduler_interval_minutes,
            };
            let pipeline = build_pipeline(&settings).await?;
            let scheduler = Scheduler::new(pipeline, settings.max_articles_per_batch, minutes);
            scheduler.start(minutes).await?;

            tokio::signal::ctrl_c().await?;
            info!("Received Ctrl-C, waiting for the current run to finish");
            scheduler.stop().await?;
            let status = scheduler.status().await;
            println!("Stored {} articles while scheduled", status.total_articles_scraped);
        }
        Commands::Articles { command } => {
            let storage = nd_storage::create_storage(&settings).await?;
            match command {
                ArticleCommands::List { category, q, limit } => {
                    print_articles(&storage, category, q, limit).await?;
                }
                ArticleCommands::Categories => {
                    for category in storage.list_categories().await? {
                        println!("{}", category);
                    }
                }
            }
        }
    }

    Ok(())
}
