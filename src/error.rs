// src/error.rs

//! Unified error handling for the crawler application.

use std::fmt;

use thiserror::Error;

/// Result type alias for crawler operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Content identifier could not be parsed
    #[error("CID error: {0}")]
    Cid(#[from] cid::Error),

    /// A resolver call exceeded its time bound
    #[error("Timeout while {0}")]
    Timeout(String),

    /// Content resolution failed for a CID
    #[error("Resolve error for {cid}: {message}")]
    Resolve { cid: String, message: String },

    /// Graph store operation failed
    #[error("Graph error: {0}")]
    Graph(String),

    /// unixfs payload of a dag-pb block could not be decoded
    #[error("unixfs decode error: {0}")]
    Unixfs(String),

    /// Event batch could not be decompressed or decoded
    #[error("Malformed batch: {0}")]
    MalformedBatch(String),

    /// Job submitted after the scheduler was drained
    #[error("Job scheduler is closed")]
    SchedulerClosed,

    /// A scheduled job panicked or was aborted
    #[error("Job error: {0}")]
    Job(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Create a timeout error describing the interrupted operation.
    pub fn timeout(context: impl Into<String>) -> Self {
        Self::Timeout(context.into())
    }

    /// Create a resolve error for a CID.
    pub fn resolve(cid: impl fmt::Display, message: impl fmt::Display) -> Self {
        Self::Resolve {
            cid: cid.to_string(),
            message: message.to_string(),
        }
    }

    /// Create a graph store error.
    pub fn graph(message: impl Into<String>) -> Self {
        Self::Graph(message.into())
    }

    /// Create a malformed batch error.
    pub fn malformed(message: impl fmt::Display) -> Self {
        Self::MalformedBatch(message.to_string())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Whether this error is transient (a timed out resolver or fetch call).
    ///
    /// Timeouts abandon the affected branch only; everything else is handled
    /// by the configured error policy.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Http(e) => e.is_timeout(),
            Self::Io(e) => e.kind() == std::io::ErrorKind::TimedOut,
            _ => false,
        }
    }
}
