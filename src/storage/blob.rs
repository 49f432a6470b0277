//! Write-once blob files keyed by CID.
//!
//! Content addressing guarantees the bytes behind a CID never change, so an
//! existing file is proof that the leaf was already exported. Files are
//! written through a temporary file and renamed into place; two jobs racing on
//! the same CID both write identical bytes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use cid::Cid;

use crate::error::Result;
use crate::services::ContentResolver;
use crate::storage::write_atomic;

/// Result of a blob persistence call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobOutcome {
    /// A file for the CID was already present
    Exists,
    /// The blob was written with the given size in bytes
    Written(usize),
    /// The fetch timed out and the leaf was abandoned
    TimedOut,
}

/// Local filesystem blob store.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root_dir: PathBuf,
}

impl BlobStore {
    /// Open a blob store rooted at the given directory, creating it if needed.
    pub async fn open(root_dir: impl Into<PathBuf>) -> Result<Self> {
        let root_dir = root_dir.into();
        tokio::fs::create_dir_all(&root_dir).await?;
        Ok(Self { root_dir })
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// File path for a CID.
    pub fn path(&self, cid: &Cid) -> PathBuf {
        self.root_dir.join(cid.to_string())
    }

    pub async fn exists(&self, cid: &Cid) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.path(cid)).await?)
    }

    /// Read a stored blob, returning None if absent.
    pub async fn read(&self, cid: &Cid) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path(cid)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Number of blobs currently stored.
    pub async fn count(&self) -> Result<usize> {
        let mut entries = tokio::fs::read_dir(&self.root_dir).await?;
        let mut count = 0;
        while let Some(entry) = entries.next_entry().await? {
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            if !hidden && entry.file_type().await?.is_file() {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Download the CID's bytes and persist them, unless already present.
    ///
    /// A timed out fetch is logged and reported as [`BlobOutcome::TimedOut`];
    /// any other resolver or file error is returned.
    pub async fn fetch_and_store(
        &self,
        resolver: &dyn ContentResolver,
        cid: &Cid,
        timeout: Duration,
    ) -> Result<BlobOutcome> {
        if self.exists(cid).await? {
            return Ok(BlobOutcome::Exists);
        }

        let fetched = match tokio::time::timeout(timeout, resolver.fetch_bytes(cid)).await {
            Ok(result) => result,
            Err(_) => {
                log::warn!("Timeout for CID {cid}. Skip!");
                return Ok(BlobOutcome::TimedOut);
            }
        };

        let bytes = match fetched {
            Ok(bytes) => bytes,
            Err(e) if e.is_timeout() => {
                log::warn!("Timeout for CID {cid}. Skip!");
                return Ok(BlobOutcome::TimedOut);
            }
            Err(e) => return Err(e),
        };

        self.write(cid, &bytes).await
    }

    /// Persist bytes already obtained during resolution, unless present.
    pub async fn store_inline(&self, cid: &Cid, bytes: &[u8]) -> Result<BlobOutcome> {
        if self.exists(cid).await? {
            return Ok(BlobOutcome::Exists);
        }
        self.write(cid, bytes).await
    }

    async fn write(&self, cid: &Cid, bytes: &[u8]) -> Result<BlobOutcome> {
        write_atomic(&self.path(cid), bytes).await?;
        log::info!("New file downloaded (CID: {}, Size: {}).", cid, bytes.len());
        Ok(BlobOutcome::Written(bytes.len()))
    }
}
