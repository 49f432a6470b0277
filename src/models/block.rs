//! Block graph data structures.

use cid::Cid;
use serde::{Deserialize, Serialize};

/// Multicodec code for raw binary blocks.
pub const RAW: u64 = 0x55;

/// Multicodec code for MerkleDAG protobuf blocks.
pub const DAG_PB: u64 = 0x70;

/// Semantic type recorded for raw leaves.
pub const TYPE_RAW: &str = "raw";

/// Whether the CID's codec marks it as an unstructured leaf.
///
/// In CIDv0 everything is dag-pb and needs decoding; only CIDv1 can carry
/// raw contents directly.
pub fn is_raw(cid: &Cid) -> bool {
    cid.codec() == RAW
}

/// Human readable multicodec name for a CID's codec tag.
pub fn codec_name(cid: &Cid) -> String {
    let name = match cid.codec() {
        RAW => "raw",
        DAG_PB => "dag-pb",
        0x71 => "dag-cbor",
        0x72 => "libp2p-key",
        0x78 => "git-raw",
        0x85 => "dag-jose",
        0x0129 => "dag-json",
        0x0200 => "json",
        0x51 => "cbor",
        code => return format!("0x{code:x}"),
    };
    name.to_string()
}

/// A vertex of kind "Block" in the graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockNode {
    /// Canonical string form of the CID
    pub identifier: String,

    /// Codec name derived from the CID at creation
    pub codec: String,

    /// Semantic type, set once resolution succeeds
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl BlockNode {
    pub fn new(cid: &Cid) -> Self {
        Self {
            identifier: cid.to_string(),
            codec: codec_name(cid),
            kind: None,
        }
    }
}

/// A directed "has" edge from a parent block to one of its children.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockEdge {
    pub parent: String,
    pub child: String,
    /// Position among the parent's unique children at creation time
    pub index: usize,
}
