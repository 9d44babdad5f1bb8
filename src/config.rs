//! Configuration types for boost-dl
//!
//! [`DownloadConfig`] carries the per-run options consumed by the download
//! engine. [`FileConfig`] holds the subset of defaults that can be set from
//! the `~/.boostdlrc` config file (`key=value` lines, `#` comments).

use crate::error::{Error, Result};
use std::path::PathBuf;

/// Default number of concurrent parts
pub const DEFAULT_BOOST: usize = 8;
/// Default maximum attempts per part
pub const DEFAULT_RETRIES: usize = 3;
/// Config file name, looked up in the user's home directory
pub const CONFIG_FILE_NAME: &str = ".boostdlrc";

/// Per-download behavior configuration
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Requested number of parallel parts (must be >= 1)
    pub boost: usize,
    /// Maximum attempts per part before giving up
    pub retries: usize,
    /// Resume interrupted downloads from journal or file length (default: true)
    pub resume: bool,
    /// Global bandwidth limit in bytes per second (None = unlimited)
    pub bandwidth_limit: Option<u64>,
    /// Custom output filename, overriding server- and URI-derived names
    pub filename: Option<String>,
    /// Directory where the output file and journal are placed
    pub working_dir: PathBuf,
    /// User-Agent header sent with every request
    pub user_agent: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            boost: DEFAULT_BOOST,
            retries: DEFAULT_RETRIES,
            resume: true,
            bandwidth_limit: None,
            filename: None,
            working_dir: PathBuf::from("."),
            user_agent: concat!("boost-dl/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Defaults loaded from the user's config file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileConfig {
    /// Default number of concurrent parts
    pub boost: usize,
    /// Default maximum attempts per part
    pub retries: usize,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            boost: DEFAULT_BOOST,
            retries: DEFAULT_RETRIES,
        }
    }
}

/// Load defaults from `~/.boostdlrc`.
///
/// A missing or unreadable file silently falls back to the built-in
/// defaults; individual malformed lines are ignored.
pub fn load_file_config() -> FileConfig {
    let Some(home) = dirs::home_dir() else {
        return FileConfig::default();
    };
    match std::fs::read_to_string(home.join(CONFIG_FILE_NAME)) {
        Ok(contents) => parse_file_config(&contents),
        Err(_) => FileConfig::default(),
    }
}

fn parse_file_config(contents: &str) -> FileConfig {
    let mut cfg = FileConfig::default();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let (key, value) = (key.trim(), value.trim());
        match key {
            "boost" => {
                if let Ok(v) = value.parse::<usize>()
                    && v > 0
                {
                    cfg.boost = v;
                }
            }
            "retries" => {
                if let Ok(v) = value.parse::<usize>()
                    && v > 0
                {
                    cfg.retries = v;
                }
            }
            _ => {}
        }
    }
    cfg
}

/// Parse a bandwidth limit string like `1M`, `500K`, or `100KB/s`.
///
/// Units are base-1024 (`B`, `K`/`KB`, `M`/`MB`, `G`/`GB`), case-insensitive,
/// with an optional `/s` suffix. An empty string (or a zero value) means
/// unlimited and yields `None`.
pub fn parse_bandwidth_limit(limit: &str) -> Result<Option<u64>> {
    if limit.is_empty() {
        return Ok(None);
    }

    let upper = limit.to_ascii_uppercase();
    let trimmed = upper.trim_end_matches("/S").trim();

    let split = trimmed
        .find(|ch: char| !ch.is_ascii_digit() && ch != '.')
        .unwrap_or(trimmed.len());
    let (num_str, unit) = trimmed.split_at(split);

    let num: f64 = num_str
        .parse()
        .map_err(|_| Error::InvalidLimit(limit.to_string()))?;

    let multiplier: f64 = match unit.trim() {
        "G" | "GB" => 1024.0 * 1024.0 * 1024.0,
        "M" | "MB" => 1024.0 * 1024.0,
        "K" | "KB" => 1024.0,
        "B" | "" => 1.0,
        _ => return Err(Error::InvalidLimit(limit.to_string())),
    };

    let bytes_per_sec = (num * multiplier) as u64;
    if bytes_per_sec == 0 {
        return Ok(None);
    }
    Ok(Some(bytes_per_sec))
}
