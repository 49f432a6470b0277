//! Utility functions and helpers.

pub mod http;

use std::path::{Path, PathBuf};

use chrono::Local;

/// Timestamped file name like `execution_20240131235959.log` under `dir`.
pub fn timestamped_path(dir: &Path, prefix: &str, extension: &str) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d%H%M%S");
    dir.join(format!("{prefix}_{stamp}.{extension}"))
}
