//! Content resolution interface.

use async_trait::async_trait;
use cid::Cid;

use crate::error::Result;
use crate::models::Link;

/// Decoded description of a structured block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    /// Semantic type label, e.g. "file" or "directory"
    pub kind: String,

    /// Payload bytes carried inline by the block
    pub data: Option<Vec<u8>>,
}

impl Descriptor {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Inline payload, if present and non-empty.
    pub fn inline_data(&self) -> Option<&[u8]> {
        self.data.as_deref().filter(|d| !d.is_empty())
    }
}

/// A resolved structured block: optional descriptor plus ordered child links.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedNode {
    pub descriptor: Option<Descriptor>,
    pub links: Vec<Link>,
}

/// Trait for fetching blocks from the content network.
///
/// Errors for which [`AppError::is_timeout`](crate::error::AppError::is_timeout)
/// holds are treated as transient by callers.
#[async_trait]
pub trait ContentResolver: Send + Sync {
    /// Resolve a structured block into its descriptor and links.
    async fn resolve(&self, cid: &Cid) -> Result<ResolvedNode>;

    /// Fetch the raw bytes behind a CID.
    async fn fetch_bytes(&self, cid: &Cid) -> Result<Vec<u8>>;
}
