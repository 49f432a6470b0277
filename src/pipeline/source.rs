// src/pipeline/source.rs

//! Sources of compressed event batches.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::Result;

/// An ordered stream of gzip-compressed event batches.
#[async_trait]
pub trait BatchSource: Send {
    /// Next batch, or None once the source is exhausted.
    async fn next_batch(&mut self) -> Result<Option<Vec<u8>>>;
}

/// Replays captured batches from disk, one batch per file.
#[derive(Debug, Default)]
pub struct FileSource {
    pending: VecDeque<PathBuf>,
}

impl FileSource {
    /// Collect batch files from the given paths.
    ///
    /// Directories contribute their regular, non-hidden files in name order;
    /// they are not searched recursively.
    pub async fn open(paths: &[PathBuf]) -> Result<Self> {
        let mut pending = VecDeque::new();

        for path in paths {
            if tokio::fs::metadata(path).await?.is_dir() {
                pending.extend(list_batch_files(path).await?);
            } else {
                pending.push_back(path.clone());
            }
        }

        log::debug!("{} batch files queued", pending.len());
        Ok(Self { pending })
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

async fn list_batch_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if !hidden && entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }

    files.sort();
    Ok(files)
}

#[async_trait]
impl BatchSource for FileSource {
    async fn next_batch(&mut self) -> Result<Option<Vec<u8>>> {
        let Some(path) = self.pending.pop_front() else {
            return Ok(None);
        };

        log::info!("Reading batch {}", path.display());
        Ok(Some(tokio::fs::read(&path).await?))
    }
}
