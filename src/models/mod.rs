// src/models/mod.rs

//! Domain models for the crawler application.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

pub mod block;
mod config;
mod event;
mod link;

// Re-export all public types
pub use block::{BlockEdge, BlockNode};
pub use config::{
    Config, CrawlerConfig, ErrorPolicy, LoggingConfig, ResolverConfig, StorageConfig,
};
pub use event::{BitswapMessage, Event, LinkRef, WantlistEntry};
pub use link::{Link, unique_children};
