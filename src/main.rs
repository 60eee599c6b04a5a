//! Veilleur command-line entry point

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use veilleur::config::load_config_with_hash;
use veilleur::discovery::DiscoveryEngine;
use veilleur::extract::MetaExtractor;
use veilleur::fetch::{build_http_client, FetchOptions};
use veilleur::limiter::RateLimiter;
use veilleur::orchestrator::{sync_config, Orchestrator};
use veilleur::quality::{rank_articles, RankEntry, TopicMatcher};
use veilleur::robots::RobotsService;
use veilleur::store::{SqliteStore, Store};

/// Veilleur: a polite topical news crawler
///
/// Crawls configured sources for articles matching configured topics,
/// deduplicates and ranks them, and discovers new candidate sources.
#[derive(Parser, Debug)]
#[command(name = "veilleur")]
#[command(version = "1.0.0")]
#[command(about = "A polite topical news crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a crawl for one topic, or all enabled topics
    Crawl {
        /// Topic slug; omit to crawl every enabled topic
        #[arg(long)]
        topic: Option<String>,
    },

    /// Run one discovery pass over candidate domains
    Discover,

    /// Print the ranked feed for a topic
    Feed {
        /// Topic slug
        topic: String,
    },

    /// Print store counts and recent crawl runs
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) =
        load_config_with_hash(&cli.config).context("failed to load configuration")?;
    tracing::info!("Configuration loaded (hash: {})", config_hash);

    let store = SqliteStore::new(std::path::Path::new(&config.storage.database_path))
        .context("failed to open database")?;
    let store = Arc::new(Mutex::new(store));

    {
        let mut guard = store.lock().unwrap_or_else(|e| e.into_inner());
        sync_config(&mut *guard, &config).context("failed to sync config into store")?;
    }

    let client = build_http_client(&config.user_agent).context("failed to build HTTP client")?;
    let user_agent = format!(
        "{}/{} (+{}; {})",
        config.user_agent.crawler_name,
        config.user_agent.crawler_version,
        config.user_agent.contact_url,
        config.user_agent.contact_email
    );

    match cli.command {
        Command::Crawl { topic } => {
            let robots = Arc::new(RobotsService::new(
                client.clone(),
                user_agent,
                Duration::from_millis(config.crawler.probe_timeout_ms),
            ));
            let limiter = Arc::new(RateLimiter::new(Duration::from_secs(
                config.crawler.cooldown_secs,
            )));

            let orchestrator = Orchestrator::new(
                store,
                client,
                robots,
                limiter,
                Arc::new(MetaExtractor),
                config.crawler.clone(),
            );

            let stats = orchestrator.run_topic(topic.as_deref()).await?;
            println!(
                "kept: {}  duplicates: {}  quality-skipped: {}  errors: {}",
                stats.kept, stats.skipped_duplicates, stats.skipped_quality, stats.errors
            );
            if let Some(crawl_id) = stats.crawl_id {
                println!("crawl id: {}", crawl_id);
            }
        }

        Command::Discover => {
            let probe_opts = FetchOptions::new(
                Duration::from_millis(config.crawler.probe_timeout_ms),
                1,
            );
            let engine = DiscoveryEngine::new(store, client, config.discovery.clone(), probe_opts);

            let stats = engine.run().await?;
            println!(
                "found: {}  probed: {}  promoted: {}  errors: {}",
                stats.candidates_found,
                stats.candidates_probed,
                stats.auto_promoted,
                stats.errors
            );
        }

        Command::Feed { topic } => {
            print_feed(&store, &topic)?;
        }

        Command::Stats => {
            print_stats(&store)?;
        }
    }

    Ok(())
}

/// Sets up the tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("veilleur=info,warn"),
            1 => EnvFilter::new("veilleur=debug,info"),
            2 => EnvFilter::new("veilleur=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Prints the ranked feed for one topic
fn print_feed(store: &Arc<Mutex<SqliteStore>>, slug: &str) -> anyhow::Result<()> {
    let guard = store.lock().unwrap_or_else(|e| e.into_inner());

    let topic = guard
        .get_topic_by_slug(slug)?
        .with_context(|| format!("unknown topic '{}'", slug))?;

    let items = guard.feed(topic.id, topic.freshness_hours, topic.max_items)?;
    let points_range = guard.source_points_range()?;
    drop(guard);

    let matcher = TopicMatcher::new(&topic);
    let entries: Vec<RankEntry> = items
        .into_iter()
        .map(|item| {
            let topic_score = matcher.score(&item.article.title, &item.article.summary);
            RankEntry {
                topic_score,
                source_points: item.source_points,
                article: item.article,
            }
        })
        .collect();

    let ranked = rank_articles(entries, points_range, chrono::Utc::now());

    println!("=== {} ({} items) ===\n", topic.name, ranked.len());
    for entry in &ranked {
        let marker = if entry.article.paywalled { " [paywalled]" } else { "" };
        println!("{}{}", entry.article.title, marker);
        println!("  {}", entry.article.canonical_url);
        println!(
            "  published: {}  score: {}",
            entry.article.published_at.to_rfc3339(),
            entry.topic_score
        );
        println!();
    }

    Ok(())
}

/// Prints store counts and the most recent crawl runs
fn print_stats(store: &Arc<Mutex<SqliteStore>>) -> anyhow::Result<()> {
    let guard = store.lock().unwrap_or_else(|e| e.into_inner());

    println!("articles:   {}", guard.count_articles()?);
    println!("sources:    {}", guard.count_sources()?);
    println!("candidates: {}", guard.count_candidates()?);

    let crawls = guard.recent_crawls(10)?;
    if !crawls.is_empty() {
        println!("\nRecent crawls:");
        for crawl in &crawls {
            let status = match crawl.ok {
                Some(true) => "ok",
                Some(false) => "failed",
                None => "running",
            };
            println!(
                "  #{} topic {} started {} [{}] {}",
                crawl.id,
                crawl.topic_id,
                crawl.started_at.to_rfc3339(),
                status,
                crawl.stats_json.as_deref().unwrap_or("")
            );
        }
    }

    Ok(())
}
