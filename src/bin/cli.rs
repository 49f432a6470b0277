//! dag-crawler CLI
//!
//! Local execution entry point: replays captured Bitswap batches or crawls
//! explicit CIDs against an IPFS node's RPC API.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use cid::Cid;
use dag_crawler::{
    error::{AppError, Result},
    models::Config,
    pipeline::{self, CrawlSummary, FileSource},
    services::KuboResolver,
    storage::{BlobStore, MemoryGraph},
    utils::{http, timestamped_path},
};

const LOG_DIR: &str = "logs";

/// dag-crawler - IPFS Bitswap DAG crawler
#[derive(Parser, Debug)]
#[command(
    name = "dag-crawler",
    version,
    about = "Crawls merkle-DAGs requested on the Bitswap network"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "dag-crawler.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Maximum concurrent leaf downloads
    #[arg(long)]
    climit: Option<usize>,

    /// Timeout in seconds for each block request
    #[arg(long)]
    timeout: Option<u64>,

    /// Write logs to a file instead of stderr
    #[arg(long)]
    log_output: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay gzip event batches from files or directories
    Ingest {
        /// Batch files, or directories of batch files
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Append every decoded batch to an events file
        #[arg(long)]
        log_events: bool,
    },

    /// Crawl the DAGs of the given CIDs
    Fetch {
        #[arg(required = true)]
        cids: Vec<String>,
    },

    /// Validate the configuration
    Validate,

    /// Show graph snapshot and blob store info
    Info,
}

/// Initialize logging based on verbosity flag and optional log file.
fn init_logging(verbose: bool, level: &str, log_file: Option<&Path>) -> Result<()> {
    let level = if verbose { "debug" } else { level };
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level));
    builder.format_timestamp_secs();

    if let Some(path) = log_file {
        let file = open_log_file(path)?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.init();
    Ok(())
}

/// Open a log file for appending, creating it and its directory if needed.
fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(file)
}

/// Resolve a log path: the configured one, or a timestamped file under `logs/`.
fn log_path(configured: Option<&PathBuf>, prefix: &str, extension: &str) -> PathBuf {
    configured
        .cloned()
        .unwrap_or_else(|| timestamped_path(Path::new(LOG_DIR), prefix, extension))
}

fn build_resolver(config: &Config) -> Result<Arc<KuboResolver>> {
    let client = http::create_client(&config.resolver, &config.crawler)?;
    let resolver = KuboResolver::new(client, &config.resolver.api_url)?;
    log::info!("Using IPFS RPC API at {}", config.resolver.api_url);
    Ok(Arc::new(resolver))
}

fn parse_cids(values: &[String]) -> Result<Vec<Cid>> {
    values
        .iter()
        .map(|value| Cid::try_from(value.as_str()).map_err(AppError::from))
        .collect()
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => log::warn!("Interrupt received, draining outstanding downloads..."),
        Err(e) => {
            log::error!("Failed to listen for interrupt: {e}");
            std::future::pending::<()>().await;
        }
    }
}

fn report(summary: &CrawlSummary) {
    log::info!(
        "{} nodes added, {} leaf files written or already present",
        summary.walk.nodes_created,
        summary.jobs_completed
    );
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = Config::load(&cli.config);
    let mut config = loaded.as_ref().cloned().unwrap_or_default();

    let log_file = cli
        .log_output
        .then(|| log_path(config.logging.log_file.as_ref(), "execution", "log"));
    init_logging(cli.verbose, &config.logging.level, log_file.as_deref())?;

    log::info!("dag-crawler starting...");
    match &loaded {
        Ok(_) => log::info!("Loaded configuration from {}", cli.config.display()),
        Err(e) => log::warn!(
            "Config load failed from {}: {}. Using defaults.",
            cli.config.display(),
            e
        ),
    }

    config.apply_env();
    if let Some(limit) = cli.climit {
        config.crawler.max_concurrent = limit;
    }
    if let Some(secs) = cli.timeout {
        config.crawler.timeout_secs = secs;
    }

    match cli.command {
        Command::Ingest { paths, log_events } => {
            config.validate()?;

            let events_log =
                log_events.then(|| log_path(config.logging.events_file.as_ref(), "events", "json"));
            let mut source = FileSource::open(&paths).await?;
            log::info!("{} batches queued", source.remaining());

            let resolver = build_resolver(&config)?;
            let (outcome, summary) = pipeline::run_ingest(
                &config,
                resolver,
                &mut source,
                events_log.as_deref(),
                shutdown_signal(),
            )
            .await?;

            if outcome.failures > 0 {
                log::warn!("{} roots or jobs failed and were skipped", outcome.failures);
            }
            report(&summary);
            log::info!("Ingest complete!");
        }

        Command::Fetch { cids } => {
            config.validate()?;

            let roots = parse_cids(&cids)?;
            let resolver = build_resolver(&config)?;
            let summary = pipeline::run_fetch(&config, resolver, &roots).await?;

            report(&summary);
            log::info!("Fetch complete!");
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("✓ Config OK");
            log::info!("  max_concurrent = {}", config.crawler.max_concurrent);
            log::info!("  timeout_secs   = {}", config.crawler.timeout_secs);
            log::info!("  error_policy   = {:?}", config.crawler.error_policy);
            log::info!("  api_url        = {}", config.resolver.api_url);

            log::info!("All validations passed!");
        }

        Command::Info => {
            let graph_file = &config.storage.graph_file;
            log::info!("Graph snapshot: {}", graph_file.display());

            if graph_file.exists() {
                let graph = MemoryGraph::load(graph_file).await?;
                log::info!("Nodes: {}", graph.node_count());
                log::info!("Edges: {}", graph.edge_count());
                for (kind, count) in graph.count_by_type() {
                    log::info!("  {kind}: {count}");
                }
            } else {
                log::info!("No graph snapshot found yet.");
            }

            let data_dir = &config.storage.data_dir;
            if data_dir.exists() {
                let blobs = BlobStore::open(data_dir).await?;
                log::info!(
                    "Blob directory: {} ({} files)",
                    data_dir.display(),
                    blobs.count().await?
                );
            } else {
                log::info!("Blob directory {} not found.", data_dir.display());
            }
        }
    }

    log::info!("Done!");

    Ok(())
}
