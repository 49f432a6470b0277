// src/lib.rs

//! dag-crawler library
//!
//! Crawls the merkle-DAGs of content identifiers requested on the IPFS
//! Bitswap network: every wanted CID is resolved recursively, its topology is
//! recorded as a block graph and leaf payloads are exported as files.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;

#[cfg(test)]
mod testing;
