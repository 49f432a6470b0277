//! Service layer for the crawler.
//!
//! This module contains the business logic for:
//! - DAG traversal (`DagWalker`)
//! - Content resolution (`ContentResolver`, `KuboResolver`)
//! - Bounded leaf downloads (`JobScheduler`)
//! - unixfs metadata decoding (`unixfs`)

mod kubo;
mod resolver;
mod scheduler;
pub mod unixfs;
mod walker;

pub use kubo::{KuboResolver, parse_dag_json};
pub use resolver::{ContentResolver, Descriptor, ResolvedNode};
pub use scheduler::{JobReport, JobScheduler};
pub use walker::{CrawlContext, DagWalker, WalkStats};
