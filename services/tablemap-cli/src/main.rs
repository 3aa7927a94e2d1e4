//! Table-backed map data loader.
//!
//! Loads a YAML source catalog and runs the fetch pipeline against the
//! remote table API:
//! - Versioned, compressed response cache (in memory or SQLite)
//! - Paginated row fetching with retry
//! - Feature decoding and filter selection
//!
//! Failures while loading a source are printed as notices on stderr and
//! leave that source empty; the process still exits successfully.

mod catalog;
mod commands;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use storage::CacheConfig;
use table_client::{ClientConfig, RowFetcher, TableApi};
use tablemap_common::CollectingNotifier;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use vector_pipeline::SourcePipeline;

use commands::FilterArg;

#[derive(Parser, Debug)]
#[command(name = "tablemap")]
#[command(about = "Fetch map features and rasters from remote tables")]
struct Args {
    /// Source catalog (YAML)
    #[arg(long, env = "TABLEMAP_CONFIG", default_value = "sources.yaml")]
    config: PathBuf,

    /// SQLite database for the response cache (default: in memory)
    #[arg(long, env = "TABLEMAP_CACHE_PATH")]
    cache_db: Option<PathBuf>,

    /// Cache-format token; entries under other tokens are discarded
    #[arg(long, env = "TABLEMAP_CACHE_TOKEN")]
    cache_token: Option<String>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print features of the selected sources as a GeoJSON FeatureCollection
    Fetch {
        /// Vector source to load (repeatable; default: the catalog defaults)
        #[arg(short, long = "source")]
        sources: Vec<String>,

        /// Keep only features whose PROP is one of the given values (repeatable)
        #[arg(short, long = "filter")]
        filters: Vec<FilterArg>,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print every observed filter value per source and property
    Filters {
        #[arg(short, long = "source")]
        sources: Vec<String>,
    },
    /// Print every raster source as JSON lines
    Rasters,
    /// List configured sources
    Sources,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(&args.log_level, args.json_logs)?;

    let catalog = catalog::load_catalog(&args.config)?;
    info!(
        config = %args.config.display(),
        vectors = catalog.vectors.len(),
        rasters = catalog.rasters.len(),
        "Loaded source catalog"
    );

    if let Command::Sources = args.command {
        println!("{}", commands::sources(&catalog)?);
        return Ok(());
    }

    let mut cache_config = CacheConfig::from_env();
    if let Some(path) = &args.cache_db {
        cache_config.path = Some(path.clone());
    }
    if let Some(token) = &args.cache_token {
        cache_config.token = token.clone();
    }
    let cache = cache_config
        .open()
        .await
        .context("Failed to open response cache")?;

    let client_config = ClientConfig::from_env()?;
    let api = Arc::new(TableApi::new(&client_config)?);
    let notifier = Arc::new(CollectingNotifier::new());
    let fetcher = RowFetcher::new(api, cache.clone(), notifier.clone());
    let pipeline = SourcePipeline::new(fetcher);

    match &args.command {
        Command::Fetch {
            sources,
            filters,
            output,
        } => {
            let out = commands::fetch(&pipeline, &catalog, sources, filters).await?;
            match output {
                Some(path) => tokio::fs::write(path, out)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?,
                None => println!("{}", out),
            }
        }
        Command::Filters { sources } => {
            println!("{}", commands::filters(&pipeline, &catalog, sources).await?);
        }
        Command::Rasters => {
            print!("{}", commands::rasters(&pipeline, &catalog).await?);
        }
        Command::Sources => {}
    }

    for notice in notifier.notices() {
        eprintln!("{}", notice.text());
    }

    let stats = cache.stats();
    info!(
        hits = stats.hits,
        misses = stats.misses,
        evictions = stats.evictions,
        writes = stats.writes,
        write_failures = stats.write_failures,
        hit_rate = stats.hit_rate(),
        notices = notifier.len(),
        "Done"
    );

    Ok(())
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing(log_level: &str, json: bool) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}
