//! The download engine, decomposed into focused submodules:
//! - [`metadata`] - HEAD probe and filename derivation
//! - [`planner`] - byte-range partitioning
//! - [`prepare`] - output file sizing (sparse / truncate)
//! - [`part`] - per-part range-GET workers with retry
//! - [`single`] - single-stream fallback path
//! - [`multi`] - concurrent fetch orchestration
//!
//! [`Downloader`] is the coordinator: probe, plan, prepare, fetch,
//! finalize. Cancellation flows through one [`CancellationToken`] into
//! every worker, limiter wait, and the periodic journal saver; the journal
//! and partial output survive an abort so a later run can resume.

mod metadata;
mod multi;
mod part;
mod planner;
mod prepare;
mod single;

pub use planner::plan_parts;

use crate::config::DownloadConfig;
use crate::error::Result;
use crate::journal::{JournalStore, PartCounters};
use crate::types::{NoopProgress, ProgressReporter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Timeout for metadata probes and connection establishment
pub(crate) const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
/// How long idle pooled connections are kept around
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
/// Idle connections retained per host
const MAX_IDLE_CONNS_PER_HOST: usize = 10;
/// Floor for per-request download timeouts
const MIN_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);
/// Additional timeout granted per MiB still to transfer
const TIMEOUT_PER_MIB: Duration = Duration::from_secs(3);

/// Per-request timeout scaled to the bytes still to transfer.
pub(crate) fn download_timeout(remaining: u64) -> Duration {
    MIN_DOWNLOAD_TIMEOUT + TIMEOUT_PER_MIB * (remaining / (1024 * 1024)) as u32
}

/// Path of the progress journal for `filename` inside `working_dir`.
pub(crate) fn journal_path(working_dir: &Path, filename: &str) -> PathBuf {
    working_dir.join(format!(".{filename}.dl_progress"))
}

/// Outcome of a successful download.
#[derive(Debug, Clone)]
pub struct Downloaded {
    /// Where the output file was written
    pub path: PathBuf,
    /// The resolved output filename
    pub filename: String,
    /// Total size of the resource in bytes
    pub total_size: u64,
    /// True when the file was already fully present and nothing was fetched
    pub already_complete: bool,
}

/// The top-level download coordinator.
///
/// Holds the shared HTTP client (one connection pool across all parts and
/// downloads), the run configuration, the cancellation token, and the
/// progress observer. Cloning is cheap; all state is shared.
#[derive(Clone)]
pub struct Downloader {
    pub(crate) client: reqwest::Client,
    pub(crate) config: DownloadConfig,
    pub(crate) cancel: CancellationToken,
    pub(crate) reporter: Arc<dyn ProgressReporter>,
}

impl Downloader {
    /// Create a downloader with the given configuration and a no-op
    /// progress observer.
    pub fn new(config: DownloadConfig) -> Result<Self> {
        // HTTP/1.1 only: boosted downloads want multiple TCP connections,
        // not multiplexed streams. Compression stays off; response bodies
        // are opaque file content.
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(MAX_IDLE_CONNS_PER_HOST)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .connect_timeout(HTTP_TIMEOUT)
            .http1_only()
            .build()?;
        Ok(Self {
            client,
            config,
            cancel: CancellationToken::new(),
            reporter: Arc::new(NoopProgress),
        })
    }

    /// Replace the progress observer.
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// The token that aborts this downloader's transfers when cancelled.
    ///
    /// Callers wire this to signal handling or an explicit abort. On
    /// cancellation the journal and partial output are retained for a
    /// later resume.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Download one resource to `<working_dir>/<filename>`.
    ///
    /// Runs the full state machine: probe, plan, prepare (including resume
    /// detection), fetch, finalize. Returns once the file is fully written
    /// and the journal removed, or with the first error observed.
    pub async fn download(&self, uri: &str) -> Result<Downloaded> {
        let mut info =
            metadata::fetch_metadata(&self.client, uri, &self.config.user_agent, &self.cancel)
                .await?;
        if let Some(name) = &self.config.filename {
            info.filename = name.clone();
        }
        info!(filename = %info.filename, size = info.total_size, "downloading");

        let mut boost = self.config.boost.max(1);
        if boost > 1 && !info.supports_range {
            info!("server does not support partial content, falling back to single-stream download");
            boost = 1;
        }
        if info.total_size == 0 {
            boost = 1;
        }

        let parts = if boost > 1 {
            plan_parts(info.total_size, boost)
        } else {
            Vec::new()
        };
        let multi = parts.len() > 1;
        let counters = Arc::new(PartCounters::new(parts.len()));
        let journal = Arc::new(JournalStore::new(journal_path(
            &self.config.working_dir,
            &info.filename,
        )));
        let output_path = self.config.working_dir.join(&info.filename);

        // Prepare: resume detection and output file setup
        let mut existing_size = 0u64;
        let mut resume_from_journal = false;
        let mut out_file: Option<std::fs::File> = None;

        if self.config.resume {
            if multi {
                match journal.load(&info, &parts).await {
                    Ok(_) => {}
                    Err(err) => warn!(error = %err, "could not load progress journal"),
                }
            }

            match std::fs::metadata(&output_path) {
                Ok(meta) => {
                    existing_size = meta.len();
                    if multi && journal.is_active().await {
                        resume_from_journal = true;
                        journal.restore_counters(&counters).await;
                        info!(
                            downloaded = journal.total_downloaded().await,
                            total = info.total_size,
                            "resuming download using progress journal"
                        );
                    } else if existing_size >= info.total_size {
                        info!(
                            filename = %info.filename,
                            bytes = existing_size,
                            "file already fully downloaded"
                        );
                        return Ok(Downloaded {
                            path: output_path,
                            filename: info.filename,
                            total_size: info.total_size,
                            already_complete: true,
                        });
                    } else if !multi && existing_size > 0 {
                        info!(
                            bytes = existing_size,
                            total = info.total_size,
                            "resuming download from existing file length"
                        );
                    }
                    out_file = Some(
                        std::fs::OpenOptions::new()
                            .write(true)
                            .open(&output_path)?,
                    );
                }
                Err(_) => {
                    if journal.is_active().await {
                        info!("progress journal found but output file is missing, starting fresh");
                        journal.discard().await;
                    }
                }
            }
        }

        let created = out_file.is_none();
        let out_file = match out_file {
            Some(file) => file,
            None => {
                existing_size = 0;
                std::fs::File::create(&output_path)?
            }
        };

        if multi && created {
            prepare::allocate(&out_file, info.total_size)?;
        }

        if multi && !journal.is_active().await {
            journal.init(&info, &parts).await;
            if let Err(err) = journal.save(&counters).await {
                warn!(error = %err, "could not save initial progress journal");
            }
        }

        self.reporter.set_total(info.total_size);
        if resume_from_journal {
            self.reporter
                .set_downloaded(journal.total_downloaded().await);
        } else if !multi && self.config.resume {
            self.reporter.set_downloaded(existing_size);
        } else {
            self.reporter.set_downloaded(0);
        }

        // Fetch
        let file = Arc::new(out_file);
        let result = if multi {
            multi::run_multi(self, &info, &parts, &counters, &journal, &file).await
        } else {
            let resume_offset = if self.config.resume { existing_size } else { 0 };
            let result = single::run_single(self, &info, Arc::clone(&file), resume_offset).await;
            if result.is_ok()
                && let Err(err) = journal.remove()
            {
                warn!(error = %err, "could not remove progress journal");
            }
            result
        };
        drop(file);

        // Finalize
        match result {
            Ok(()) => {
                self.reporter.done();
                Ok(Downloaded {
                    path: output_path,
                    filename: info.filename,
                    total_size: info.total_size,
                    already_complete: false,
                })
            }
            Err(err) => {
                // Without a journal there is nothing to resume from, so a
                // failed fresh download leaves no partial file behind.
                // Cancellation always retains state for a later resume.
                if !err.is_cancelled() && !journal.is_active().await {
                    let _ = std::fs::remove_file(&output_path);
                }
                Err(err)
            }
        }
    }
}
