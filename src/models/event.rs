//! Bitswap monitoring events.
//!
//! Each batch published by the monitor decompresses to a JSON array of
//! [`Event`]s. Only the wantlist identifiers drive the crawl; the remaining
//! fields are decoded so captured batches can be inspected and re-logged.

use chrono::{DateTime, Utc};
use cid::Cid;
use serde::{Deserialize, Deserializer, Serialize};

/// A single observed Bitswap message.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Event {
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,

    /// Peer ID of the sender
    #[serde(default)]
    pub peer: String,

    #[serde(default)]
    pub bitswap_message: BitswapMessage,
}

impl Event {
    /// CIDs requested by this event, in wantlist order.
    pub fn wanted(&self) -> impl Iterator<Item = &Cid> {
        self.bitswap_message
            .wantlist_entries
            .iter()
            .map(|entry| &entry.identifier)
    }
}

/// Bitswap message payload of an [`Event`].
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BitswapMessage {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub wantlist_entries: Vec<WantlistEntry>,

    #[serde(default)]
    pub full_wantlist: bool,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub blocks: Vec<LinkRef>,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub block_presences: Vec<serde_json::Value>,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub connected_addresses: Vec<String>,
}

/// A content identifier announced as wanted by a peer.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WantlistEntry {
    #[serde(
        alias = "cid",
        alias = "Cid",
        deserialize_with = "deserialize_cid",
        serialize_with = "serialize_cid"
    )]
    pub identifier: Cid,

    #[serde(default, alias = "Priority")]
    pub priority: i32,

    #[serde(default, alias = "WantType")]
    pub want_type: i32,

    #[serde(default, alias = "Cancel")]
    pub cancel: bool,

    #[serde(default, alias = "SendDontHave")]
    pub send_dont_have: bool,
}

/// A CID as it appears on the wire: a plain string or an IPLD link object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum LinkRef {
    Plain(String),
    Link {
        #[serde(rename = "/")]
        target: String,
    },
}

impl LinkRef {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Plain(s) => s,
            Self::Link { target } => target,
        }
    }
}

/// Empty slices are published as `null`.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<Vec<T>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

fn deserialize_cid<'de, D>(deserializer: D) -> Result<Cid, D::Error>
where
    D: Deserializer<'de>,
{
    let link = LinkRef::deserialize(deserializer)?;
    Cid::try_from(link.as_str()).map_err(serde::de::Error::custom)
}

fn serialize_cid<S>(cid: &Cid, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    LinkRef::Link {
        target: cid.to_string(),
    }
    .serialize(serializer)
}
