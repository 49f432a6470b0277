// src/services/kubo.rs

//! Content resolver backed by an IPFS (Kubo) node's HTTP RPC API.
//!
//! - `resolve`: `POST /api/v0/dag/get?arg=<cid>&output-codec=dag-json`
//! - `fetch_bytes`: `POST /api/v0/block/get?arg=<cid>`
//!
//! The node takes care of peer discovery and block exchange; this adapter only
//! interprets the returned documents.

use async_trait::async_trait;
use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use cid::Cid;
use reqwest::Client;
use serde_json::Value;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::Link;
use crate::models::block::DAG_PB;
use crate::services::resolver::{ContentResolver, Descriptor, ResolvedNode};
use crate::services::unixfs;

/// dag-json encodes bytes as unpadded base64, but be lenient about padding.
const BYTES_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Resolver talking to a Kubo RPC endpoint.
#[derive(Debug, Clone)]
pub struct KuboResolver {
    client: Client,
    api_url: Url,
}

impl KuboResolver {
    /// Create a resolver for the RPC API at `api_url` (e.g. `http://127.0.0.1:5001`).
    pub fn new(client: Client, api_url: &str) -> Result<Self> {
        let mut api_url = Url::parse(api_url)?;
        if !api_url.path().ends_with('/') {
            let path = format!("{}/", api_url.path());
            api_url.set_path(&path);
        }
        Ok(Self { client, api_url })
    }

    fn endpoint(&self, command: &str) -> Result<Url> {
        Ok(self.api_url.join(&format!("api/v0/{command}"))?)
    }

    async fn call(&self, command: &str, params: &[(&str, String)]) -> Result<Vec<u8>> {
        let response = self
            .client
            .post(self.endpoint(command)?)
            .query(params)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl ContentResolver for KuboResolver {
    async fn resolve(&self, cid: &Cid) -> Result<ResolvedNode> {
        log::debug!("Get DAG for {cid}");
        let body = self
            .call(
                "dag/get",
                &[
                    ("arg", cid.to_string()),
                    ("output-codec", "dag-json".to_string()),
                ],
            )
            .await?;
        let doc: Value = serde_json::from_slice(&body)?;
        parse_dag_json(cid, &doc)
    }

    async fn fetch_bytes(&self, cid: &Cid) -> Result<Vec<u8>> {
        self.call("block/get", &[("arg", cid.to_string())]).await
    }
}

/// Interpret a dag-json document returned for `cid`.
pub fn parse_dag_json(cid: &Cid, doc: &Value) -> Result<ResolvedNode> {
    if cid.codec() != DAG_PB {
        let mut links = Vec::new();
        collect_links(doc, &mut links);
        return Ok(ResolvedNode {
            descriptor: None,
            links,
        });
    }

    let mut links = Vec::new();
    for entry in doc
        .get("Links")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
    {
        let target = entry
            .get("Hash")
            .and_then(link_target)
            .ok_or_else(|| AppError::resolve(cid, "dag-pb link without Hash"))?;
        links.push(Link {
            cid: Cid::try_from(target)?,
            name: entry.get("Name").and_then(Value::as_str).map(String::from),
            size: entry.get("Tsize").and_then(Value::as_u64),
        });
    }

    let descriptor = match doc.get("Data").and_then(bytes_value) {
        Some(encoded) => {
            let raw = BYTES_ENGINE
                .decode(encoded)
                .map_err(|e| AppError::resolve(cid, format!("invalid Data bytes: {e}")))?;
            match unixfs::decode(&raw) {
                Ok(data) => Some(Descriptor {
                    kind: data.kind.as_str().to_string(),
                    data: data.data,
                }),
                Err(e) => {
                    log::debug!("Block {cid} carries no unixfs data: {e}");
                    None
                }
            }
        }
        None => None,
    };

    Ok(ResolvedNode { descriptor, links })
}

/// Target of an IPLD link object `{"/": "<cid>"}`.
fn link_target(value: &Value) -> Option<&str> {
    let object = value.as_object()?;
    if object.len() != 1 {
        return None;
    }
    object.get("/")?.as_str()
}

/// Payload of an IPLD bytes object `{"/": {"bytes": "<base64>"}}`.
fn bytes_value(value: &Value) -> Option<&str> {
    value.get("/")?.get("bytes")?.as_str()
}

/// Collect every link object in a document, depth first.
fn collect_links(value: &Value, out: &mut Vec<Link>) {
    if let Some(target) = link_target(value) {
        match Cid::try_from(target) {
            Ok(cid) => out.push(Link::new(cid)),
            Err(e) => log::debug!("Ignoring invalid link {target}: {e}"),
        }
        return;
    }

    match value {
        Value::Array(items) => items.iter().for_each(|item| collect_links(item, out)),
        Value::Object(map) => map.values().for_each(|item| collect_links(item, out)),
        _ => {}
    }
}
