// src/pipeline/crawl.rs

//! Crawl runs: wire the stores and walker together, drive them, and persist.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use cid::Cid;

use crate::error::Result;
use crate::models::{Config, ErrorPolicy};
use crate::pipeline::ingest::{EventIngester, IngestOutcome};
use crate::pipeline::source::BatchSource;
use crate::services::{ContentResolver, CrawlContext, DagWalker, JobScheduler, WalkStats};
use crate::storage::{BlobStore, MemoryGraph};

/// Statistics of a finished crawl run.
#[derive(Debug, Clone)]
pub struct CrawlSummary {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub walk: WalkStats,
    pub jobs_completed: usize,
    pub jobs_failed: usize,
    pub node_count: usize,
    pub edge_count: usize,
}

/// Stores and walker shared by one run.
pub struct CrawlSession {
    graph: Arc<MemoryGraph>,
    graph_file: PathBuf,
    walker: Arc<DagWalker>,
    policy: ErrorPolicy,
    start_time: DateTime<Utc>,
}

impl CrawlSession {
    /// Load the graph snapshot, open the blob store and build the walker.
    pub async fn open(config: &Config, resolver: Arc<dyn ContentResolver>) -> Result<Self> {
        let graph = Arc::new(MemoryGraph::load(&config.storage.graph_file).await?);
        let blobs = Arc::new(BlobStore::open(&config.storage.data_dir).await?);
        let jobs = Arc::new(JobScheduler::new(config.crawler.max_concurrent));

        log::info!(
            "Blob directory: {}, max concurrent downloads: {}",
            blobs.root().display(),
            jobs.limit()
        );

        let ctx = CrawlContext {
            graph: graph.clone(),
            resolver,
            blobs,
            jobs,
        };
        let walker = Arc::new(DagWalker::new(
            ctx,
            config.crawler.timeout(),
            config.crawler.error_policy,
        ));

        Ok(Self {
            graph,
            graph_file: config.storage.graph_file.clone(),
            walker,
            policy: config.crawler.error_policy,
            start_time: Utc::now(),
        })
    }

    pub fn walker(&self) -> Arc<DagWalker> {
        Arc::clone(&self.walker)
    }

    /// Drain outstanding leaf jobs and save the graph snapshot.
    ///
    /// Under [`ErrorPolicy::Abort`] the first failed job is returned as an
    /// error, after the snapshot has been written.
    pub async fn finish(self) -> Result<CrawlSummary> {
        let report = self.walker.jobs().drain().await;
        self.graph.save(&self.graph_file).await?;

        let summary = CrawlSummary {
            start_time: self.start_time,
            end_time: Utc::now(),
            walk: self.walker.stats(),
            jobs_completed: report.completed,
            jobs_failed: report.failures.len(),
            node_count: self.graph.node_count(),
            edge_count: self.graph.edge_count(),
        };
        log_summary(&summary);

        match (self.policy, report.failures.into_iter().next()) {
            (ErrorPolicy::Abort, Some(error)) => Err(error),
            _ => Ok(summary),
        }
    }
}

fn log_summary(summary: &CrawlSummary) {
    let elapsed = summary.end_time - summary.start_time;
    log::info!(
        "Crawl finished in {}s: {} nodes added ({} already known), {} edges merged",
        elapsed.num_seconds(),
        summary.walk.nodes_created,
        summary.walk.nodes_existing,
        summary.walk.edges_merged
    );
    log::info!(
        "Leaf jobs: {} completed, {} failed, {} timeouts, {} branches skipped",
        summary.jobs_completed,
        summary.jobs_failed,
        summary.walk.timeouts,
        summary.walk.skipped_branches
    );
    log::info!(
        "Graph now holds {} nodes and {} edges",
        summary.node_count,
        summary.edge_count
    );
}

/// Finish the session even when the run failed, keeping the run's error first.
async fn finish_after<T>(session: CrawlSession, run: Result<T>) -> Result<(T, CrawlSummary)> {
    let finished = session.finish().await;
    match (run, finished) {
        (Ok(value), Ok(summary)) => Ok((value, summary)),
        (Err(e), finished) => {
            if let Err(finish_error) = finished {
                log::error!("Shutdown after failed run also failed: {finish_error}");
            }
            Err(e)
        }
        (Ok(_), Err(e)) => Err(e),
    }
}

/// Ingest batches from `source` until it is exhausted or `shutdown` resolves.
pub async fn run_ingest<S>(
    config: &Config,
    resolver: Arc<dyn ContentResolver>,
    source: &mut dyn BatchSource,
    events_log: Option<&Path>,
    shutdown: S,
) -> Result<(IngestOutcome, CrawlSummary)>
where
    S: Future<Output = ()>,
{
    let session = CrawlSession::open(config, resolver).await?;
    let mut ingester = EventIngester::new(session.walker());
    if let Some(path) = events_log {
        ingester = ingester.with_events_log(path).await?;
    }

    let run = ingester.run_until(source, shutdown).await;
    log::info!(
        "Ingested {} batches, {} events, {} roots",
        ingester.outcome().batches,
        ingester.outcome().events,
        ingester.outcome().roots
    );
    finish_after(session, run).await
}

/// Crawl the given root CIDs.
pub async fn run_fetch(
    config: &Config,
    resolver: Arc<dyn ContentResolver>,
    roots: &[Cid],
) -> Result<CrawlSummary> {
    let session = CrawlSession::open(config, resolver).await?;
    let mut ingester = EventIngester::new(session.walker());

    let run = ingester.crawl_roots(roots).await;
    finish_after(session, run).await.map(|(_, summary)| summary)
}
