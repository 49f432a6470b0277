//! Child links of structured blocks.

use std::collections::HashSet;

use cid::Cid;

/// A reference from a structured block to a child block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub cid: Cid,

    /// Link name (dag-pb directory entry name)
    pub name: Option<String>,

    /// Cumulative size of the linked sub-DAG, if known
    pub size: Option<u64>,
}

impl Link {
    pub fn new(cid: Cid) -> Self {
        Self {
            cid,
            name: None,
            size: None,
        }
    }
}

impl From<Cid> for Link {
    fn from(cid: Cid) -> Self {
        Self::new(cid)
    }
}

/// Collapse links into unique child CIDs, keeping the first occurrence.
///
/// A node citing the same child several times is expanded only once, so it
/// produces one edge and one network fetch.
pub fn unique_children(links: &[Link]) -> Vec<Cid> {
    let mut seen = HashSet::with_capacity(links.len());
    links
        .iter()
        .map(|link| link.cid)
        .filter(|cid| seen.insert(*cid))
        .collect()
}
