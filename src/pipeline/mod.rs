//! Pipeline entry points for crawler operations.
//!
//! - `run_ingest`: Crawl every CID wanted in a stream of event batches
//! - `run_fetch`: Crawl explicitly given root CIDs

pub mod crawl;
pub mod ingest;
pub mod source;

pub use crawl::{CrawlSession, CrawlSummary, run_fetch, run_ingest};
pub use ingest::{EventIngester, IngestOutcome, decode_batch};
pub use source::{BatchSource, FileSource};
