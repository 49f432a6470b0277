// src/pipeline/ingest.rs

//! Event ingestion: turn wantlist batches into root traversals.

use std::future::Future;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use cid::Cid;
use flate2::read::GzDecoder;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{ErrorPolicy, Event};
use crate::pipeline::source::BatchSource;
use crate::services::DagWalker;

/// Decompress a gzip batch into its JSON payload.
pub fn decompress_batch(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut json = Vec::new();
    GzDecoder::new(bytes)
        .read_to_end(&mut json)
        .map_err(|e| AppError::malformed(format!("gzip: {e}")))?;
    Ok(json)
}

/// Parse the JSON payload of a batch.
pub fn parse_events(json: &[u8]) -> Result<Vec<Event>> {
    serde_json::from_slice(json).map_err(|e| AppError::malformed(format!("json: {e}")))
}

/// Decode a gzip-compressed JSON array of events.
pub fn decode_batch(bytes: &[u8]) -> Result<Vec<Event>> {
    parse_events(&decompress_batch(bytes)?)
}

/// Counters of an ingestion run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestOutcome {
    pub batches: usize,
    pub events: usize,
    pub roots: usize,
    /// Root traversals or leaf jobs that failed and were skipped
    pub failures: usize,
}

/// Sequential driver feeding wanted CIDs to the walker.
pub struct EventIngester {
    walker: Arc<DagWalker>,
    events_log: Option<File>,
    outcome: IngestOutcome,
}

impl EventIngester {
    pub fn new(walker: Arc<DagWalker>) -> Self {
        Self {
            walker,
            events_log: None,
            outcome: IngestOutcome::default(),
        }
    }

    /// Append every decompressed batch, one per line, to `path`.
    pub async fn with_events_log(mut self, path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        log::info!("Logging events to {}", path.display());
        self.events_log = Some(file);
        Ok(self)
    }

    pub fn outcome(&self) -> IngestOutcome {
        self.outcome
    }

    /// Consume batches until the source is exhausted.
    pub async fn run(&mut self, source: &mut dyn BatchSource) -> Result<IngestOutcome> {
        self.run_until(source, std::future::pending::<()>()).await
    }

    /// Consume batches until the source is exhausted or `shutdown` resolves.
    ///
    /// A batch already being processed is finished before returning.
    pub async fn run_until<S>(
        &mut self,
        source: &mut dyn BatchSource,
        shutdown: S,
    ) -> Result<IngestOutcome>
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let batch = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    log::warn!("Shutdown requested, no more batches will be read");
                    break;
                }
                batch = source.next_batch() => batch?,
            };

            match batch {
                Some(bytes) => self.process_batch(&bytes).await?,
                None => break,
            }
        }

        Ok(self.outcome)
    }

    /// Decode one batch and crawl every wanted CID in it, in order.
    pub async fn process_batch(&mut self, bytes: &[u8]) -> Result<()> {
        let json = decompress_batch(bytes)?;
        let events = parse_events(&json)?;

        if let Some(file) = self.events_log.as_mut() {
            file.write_all(&json).await?;
            file.write_all(b"\n").await?;
            file.flush().await?;
        }

        self.outcome.batches += 1;
        log::debug!("Batch with {} events", events.len());
        self.ingest_events(&events).await
    }

    pub async fn ingest_events(&mut self, events: &[Event]) -> Result<()> {
        for event in events {
            self.outcome.events += 1;
            for cid in event.wanted() {
                self.crawl_root(*cid).await?;
            }
        }
        Ok(())
    }

    /// Crawl explicit roots, applying the error policy to each.
    pub async fn crawl_roots(&mut self, roots: &[Cid]) -> Result<()> {
        for cid in roots {
            self.crawl_root(*cid).await?;
        }
        Ok(())
    }

    async fn crawl_root(&mut self, cid: Cid) -> Result<()> {
        self.outcome.roots += 1;

        if let Err(e) = self.walker.download(cid, 0, None).await {
            self.handle_failure(&format!("root {cid}"), e)?;
        }
        while let Some(e) = self.walker.jobs().take_failure() {
            self.handle_failure("leaf job", e)?;
        }
        Ok(())
    }

    fn handle_failure(&mut self, context: &str, error: AppError) -> Result<()> {
        match self.walker.policy() {
            ErrorPolicy::Abort => {
                log::error!("Crawl of {context} failed: {error}");
                Err(error)
            }
            ErrorPolicy::Skip => {
                self.outcome.failures += 1;
                log::error!("Skipping {context}: {error}");
                Ok(())
            }
        }
    }
}
