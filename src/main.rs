mod catalog;
mod config;
mod db;
mod dedup;
mod error;
mod fetcher;
mod flight;
mod ingest;
mod parser;
mod progress;
mod queries;
mod refresh;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use catalog::Category;
use config::Config;
use db::{CatalogStore, SqliteStore};
use fetcher::HttpFetcher;
use ingest::{Ingestor, RunState, StartOutcome};
use progress::Level;
use refresh::PriceRefresher;

#[derive(Parser)]
#[command(name = "printcatalog", about = "3D printing catalog ingestion from marketplace search pages")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the catalog database
    Init,
    /// Run one ingestion over the search query catalog
    Scrape {
        /// Only run queries for these categories (repeatable)
        #[arg(short, long = "category")]
        categories: Vec<Category>,
    },
    /// Re-check prices of existing listings
    Refresh {
        /// Max listings to check (default: REFRESH_BATCH_SIZE)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Recent ingestion runs
    Runs {
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Recorded price changes of one listing
    History {
        /// Listing identifier (ASIN)
        asin: String,
    },
    /// Catalog statistics
    Stats,
    /// List the search query catalog
    Queries,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let cfg = Config::from_env().context("loading configuration")?;

    let result = match cli.command {
        Commands::Init => {
            open_store(&cfg)?;
            println!("Catalog ready at {}", cfg.db_path);
            Ok(())
        }
        Commands::Scrape { categories } => {
            let selected = queries::select(&categories);
            if selected.is_empty() {
                println!("No queries match the given categories.");
                return Ok(());
            }
            let store = Arc::new(open_store(&cfg)?);
            let fetcher = Arc::new(HttpFetcher::new(&cfg)?);
            if fetcher.is_relayed() {
                println!("Fetching through spider.cloud relay");
            }
            println!("Running {} queries...", selected.len());

            let ingestor = Arc::new(Ingestor::new(cfg.clone(), fetcher, store).with_progress_bar(true));
            let handle = match ingestor.trigger(selected, cancel_on_ctrl_c()) {
                StartOutcome::Accepted(handle) => handle,
                StartOutcome::AlreadyRunning => anyhow::bail!("an ingestion run is already in progress"),
            };

            // Surface warnings from the live feed while the run is in flight.
            let feed = ingestor.progress();
            let mut seen = None;
            let mut problems = 0;
            loop {
                let running = ingestor.state() == RunState::Running;
                let fresh = match seen {
                    None => feed.snapshot(),
                    Some(after) => feed.since(after),
                };
                for e in &fresh {
                    seen = Some(e.seq);
                    if e.level != Level::Info {
                        problems += 1;
                        println!("  {} {}", e.at.format("%H:%M:%S"), truncate(&e.message, 100));
                    }
                }
                if !running {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(250)).await;
            }
            let run = handle.await.context("ingestion task panicked")??;
            println!("State: {:?}, {} problems logged", ingestor.state(), problems);

            let c = &run.counters;
            println!(
                "Run {} ({}): {} found, {} saved, {} errors ({} blocked), {}/{} queries failed.",
                run.id.map(|id| format!("#{}", id)).unwrap_or_else(|| "unrecorded".into()),
                run.status,
                c.items_found,
                c.items_saved,
                c.errors,
                c.blocked,
                c.queries_failed,
                c.queries_total,
            );
            Ok(())
        }
        Commands::Refresh { limit } => {
            let store = Arc::new(open_store(&cfg)?);
            let fetcher = Arc::new(HttpFetcher::new(&cfg)?);
            let cancel = cancel_on_ctrl_c();
            let refresher = PriceRefresher::new(cfg.clone(), fetcher, store).with_progress_bar(true);
            let s = refresher.run(limit, &cancel).await?;
            println!(
                "Checked {}: {} updated, {} unchanged, {} unavailable, {} blocked, {} without price, {} errors.",
                s.checked, s.updated, s.unchanged, s.marked_unavailable, s.blocked, s.missing_price, s.errors,
            );
            Ok(())
        }
        Commands::Runs { limit, json } => {
            let store = open_store(&cfg)?;
            let runs = store.recent_runs(limit)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&runs)?);
                return Ok(());
            }
            if runs.is_empty() {
                println!("No runs yet. Run 'scrape' first.");
                return Ok(());
            }
            println!(
                "{:>4} | {:<8} | {:<19} | {:>8} | {:>5} | {:>5} | {:>6} | {:>7}",
                "#", "Status", "Started", "Duration", "Found", "Saved", "Errors", "Queries"
            );
            println!("{}", "-".repeat(84));
            for r in &runs {
                let c = &r.counters;
                let took = (r.finished_at - r.started_at).to_std().unwrap_or_default();
                println!(
                    "{:>4} | {:<8} | {:<19} | {:>8} | {:>5} | {:>5} | {:>6} | {:>7}",
                    r.id.unwrap_or_default(),
                    r.status.as_str(),
                    r.started_at.format("%Y-%m-%d %H:%M:%S"),
                    format_duration(took),
                    c.items_found,
                    c.items_saved,
                    c.errors,
                    format!("{}/{}", c.queries_total - c.queries_failed, c.queries_total),
                );
            }
            Ok(())
        }
        Commands::History { asin } => {
            let store = open_store(&cfg)?;
            let history = store.price_history(&asin, &cfg.locale)?;
            if history.is_empty() {
                println!("No price changes recorded for {} ({}).", asin, cfg.locale);
                return Ok(());
            }
            println!("{:<25} | {:>10}", "Recorded", "Price");
            println!("{}", "-".repeat(38));
            for (price, recorded_at) in &history {
                println!("{:<25} | {:>10.2}", truncate(recorded_at, 25), price);
            }
            Ok(())
        }
        Commands::Stats => {
            let store = open_store(&cfg)?;
            let s = store.stats(&cfg.locale)?;
            println!("Items:       {}", s.total);
            println!("Unavailable: {}", s.unavailable);
            for (category, count) in &s.by_category {
                println!("  {:<10} {}", category, count);
            }
            println!("Runs:        {}", s.runs);
            println!("Last run:    {}", s.last_run.as_deref().unwrap_or("-"));
            Ok(())
        }
        Commands::Queries => {
            println!("{:<10} | {:<16} | {:<22} | Query", "Category", "Sub-type", "Label");
            println!("{}", "-".repeat(80));
            for q in queries::SEARCH_QUERIES {
                println!(
                    "{:<10} | {:<16} | {:<22} | {}",
                    q.category.as_str(),
                    q.sub_type.as_str(),
                    truncate(q.label, 22),
                    q.query
                );
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn open_store(cfg: &Config) -> anyhow::Result<SqliteStore> {
    SqliteStore::open(&cfg.db_path).with_context(|| format!("opening {}", cfg.db_path))
}

/// Token cancelled on the first Ctrl-C. The active run stops before its next
/// query and is still recorded.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, finishing current step");
            token.cancel();
        }
    });
    cancel
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
