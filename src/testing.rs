//! Shared test fixtures: known CIDs and an in-memory resolver.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use cid::Cid;
use cid::multihash::Multihash;

use crate::error::{AppError, Result};
use crate::models::Link;
use crate::models::block::{DAG_PB, RAW};
use crate::services::{ContentResolver, Descriptor, ResolvedNode};

/// Raw block holding 0x00FF00FF
pub const RAW_CID: &str = "bafkreictqudr3cfhwkobq4jqmlzvkhr6nnopgv47hr3l3dy4cg5es4o7d4";
/// Raw block holding 0xFFFFFFFF
pub const OTHER_RAW_CID: &str = "bafkreifypznnfdih7jirykt32aleub7q3pommoypvqo6ovk3upelzmgq7u";
/// Raw block holding 0xFF00FF00
pub const YET_ANOTHER_RAW_CID: &str =
    "bafk2bzaceatgshdb7uzpl26uxsxen3lduhr635j6qhxbntilygtvraucju26a";
/// File linking [RAW_CID, RAW_CID, OTHER_RAW_CID]
pub const FILE_CID: &str = "bafybeihis42cbqzrlacahelswxbxhs62jn45gisz72beo7i6lhu2nmbezq";
/// Directory linking [FILE_CID, YET_ANOTHER_RAW_CID]
pub const DIRECTORY_CID: &str = "QmSnuWmxptJZdLJpKRarxBMS2Ju2oANVrgbr2xWbie9b2D";

pub fn parse(s: &str) -> Cid {
    Cid::try_from(s).unwrap()
}

fn digest(n: u8) -> Multihash<64> {
    Multihash::wrap(0x12, &[n; 32]).unwrap()
}

/// Synthetic raw-codec CID.
pub fn raw_cid(n: u8) -> Cid {
    Cid::new_v1(RAW, digest(n))
}

/// Synthetic dag-pb CID.
pub fn dag_cid(n: u8) -> Cid {
    Cid::new_v1(DAG_PB, digest(n))
}

pub fn structured(links: &[Cid]) -> ResolvedNode {
    ResolvedNode {
        descriptor: Some(Descriptor::new("structured")),
        links: links.iter().copied().map(Link::new).collect(),
    }
}

/// Resolver answering from fixed tables, counting calls.
#[derive(Debug, Default)]
pub struct MockResolver {
    nodes: HashMap<Cid, ResolvedNode>,
    bytes: HashMap<Cid, Vec<u8>>,
    resolve_timeouts: HashSet<Cid>,
    fetch_timeouts: HashSet<Cid>,
    delay: Option<Duration>,
    resolve_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
}

impl MockResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// The file/directory DAG used across the crawl tests.
    pub fn fixtures() -> Self {
        Self::new()
            .with_bytes(parse(RAW_CID), vec![0x00, 0xFF, 0x00, 0xFF])
            .with_bytes(parse(OTHER_RAW_CID), vec![0xFF, 0xFF, 0xFF, 0xFF])
            .with_bytes(parse(YET_ANOTHER_RAW_CID), vec![0xFF, 0x00, 0xFF, 0x00])
            .with_node(
                parse(FILE_CID),
                structured(&[parse(RAW_CID), parse(RAW_CID), parse(OTHER_RAW_CID)]),
            )
            .with_node(
                parse(DIRECTORY_CID),
                structured(&[parse(FILE_CID), parse(YET_ANOTHER_RAW_CID)]),
            )
    }

    pub fn with_node(mut self, cid: Cid, node: ResolvedNode) -> Self {
        self.nodes.insert(cid, node);
        self
    }

    pub fn with_bytes(mut self, cid: Cid, bytes: Vec<u8>) -> Self {
        self.bytes.insert(cid, bytes);
        self
    }

    pub fn with_resolve_timeout(mut self, cid: Cid) -> Self {
        self.resolve_timeouts.insert(cid);
        self
    }

    pub fn with_fetch_timeout(mut self, cid: Cid) -> Self {
        self.fetch_timeouts.insert(cid);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentResolver for MockResolver {
    async fn resolve(&self, cid: &Cid) -> Result<ResolvedNode> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.resolve_timeouts.contains(cid) {
            return Err(AppError::timeout(format!("resolving {cid}")));
        }
        self.nodes
            .get(cid)
            .cloned()
            .ok_or_else(|| AppError::resolve(cid, "invalid cid"))
    }

    async fn fetch_bytes(&self, cid: &Cid) -> Result<Vec<u8>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fetch_timeouts.contains(cid) {
            return Err(AppError::timeout(format!("fetching {cid}")));
        }
        self.bytes
            .get(cid)
            .cloned()
            .ok_or_else(|| AppError::resolve(cid, "invalid cid"))
    }
}
