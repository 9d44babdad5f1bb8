//! # boost-dl
//!
//! Resumable, concurrent HTTP file downloader.
//!
//! Given a source URI, boost-dl probes the origin, partitions the resource
//! into byte ranges, and fetches the ranges in parallel straight into a
//! single output file at their final offsets. Fine-grained progress is
//! persisted in a crash-safe sidecar journal so interrupted transfers
//! resume from the exact byte positions last confirmed written.
//!
//! ## Design
//!
//! - **Library-first** - the engine is a plain Rust crate; the CLI binary
//!   is a thin collaborator on top
//! - **Explicit cancellation** - one `CancellationToken` threads through
//!   every worker, limiter wait, and journal save; no global state
//! - **Lock-free hot path** - workers bump cache-line-padded atomic
//!   counters; journal saves and progress rendering aggregate them
//!   out-of-band
//!
//! ## Quick start
//!
//! ```no_run
//! use boost_dl::{DownloadConfig, Downloader};
//!
//! #[tokio::main]
//! async fn main() -> boost_dl::Result<()> {
//!     let downloader = Downloader::new(DownloadConfig::default())?;
//!     let outcome = downloader.download("https://example.com/big.iso").await?;
//!     println!("saved {}", outcome.filename);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Post-download checksum verification
pub mod checksum;
/// Configuration types and parsing
pub mod config;
/// The download engine (coordinator, planner, workers)
pub mod downloader;
/// Error types
pub mod error;
/// Durable progress journal and per-part counters
pub mod journal;
mod retry;
/// Bandwidth limiting with a token bucket
pub mod speed_limiter;
/// Core types and the progress observer interface
pub mod types;
/// Offset and rate-limited write adapters
pub mod writers;

// Re-export commonly used types
pub use checksum::verify_file;
pub use config::{DownloadConfig, FileConfig, load_file_config, parse_bandwidth_limit};
pub use downloader::{Downloaded, Downloader, plan_parts};
pub use error::{Error, Result};
pub use speed_limiter::SpeedLimiter;
pub use types::{NoopProgress, Part, ProgressReporter, ResourceInfo};
