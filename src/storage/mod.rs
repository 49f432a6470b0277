//! Storage abstractions for the crawl results.
//!
//! Two kinds of output are produced:
//! - the block graph (nodes and "has" edges), behind [`GraphStore`]
//! - leaf payloads, written once per CID by [`BlobStore`]
//!
//! ## Directory Structure
//!
//! ```text
//! {workdir}/
//! ├── graph.json            # Block graph snapshot
//! └── data/                 # One file per leaf CID
//!     ├── bafkrei...
//!     └── QmXyz...
//! ```

pub mod blob;
pub mod graph;

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use cid::Cid;
use tokio::io::AsyncWriteExt;

use crate::error::Result;
use crate::models::BlockNode;

// Re-export for convenience
pub use blob::{BlobOutcome, BlobStore};
pub use graph::{GraphSnapshot, MemoryGraph};

/// Trait for block graph backends.
///
/// Every operation is an idempotent upsert and must be atomic per identifier:
/// concurrent callers merging the same node see `created = true` at most once.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Merge a node keyed by its identifier, reporting whether it was created.
    async fn merge_node(&self, node: &BlockNode) -> Result<bool>;

    /// Merge a "has" edge. An existing edge for the pair keeps its index.
    async fn merge_edge(&self, parent: &Cid, child: &Cid, index: usize) -> Result<()>;

    /// Set the semantic type of a node unless one is already recorded.
    async fn set_node_type(&self, cid: &Cid, kind: &str) -> Result<()>;
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Write bytes atomically (write to temp, then rename).
///
/// Readers never observe a partially written file at `path`.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(
        ".{}.{}.{}.tmp",
        file_name,
        std::process::id(),
        TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    let result = write_then_rename(&tmp, path, bytes).await;
    if result.is_err() {
        if let Err(e) = tokio::fs::remove_file(&tmp).await {
            log::debug!("Could not remove {}: {e}", tmp.display());
        }
    }
    result
}

async fn write_then_rename(tmp: &Path, path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = tokio::fs::File::create(tmp).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    drop(file);

    tokio::fs::rename(tmp, path).await?;
    Ok(())
}
