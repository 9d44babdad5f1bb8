//! boost-dl command-line interface
//!
//! Thin collaborator around the download engine: argument parsing, config
//! file defaults, an indicatif progress bar behind the engine's observer
//! interface, signal-driven cancellation, and post-download checksum
//! verification.

use boost_dl::{
    DownloadConfig, Downloader, ProgressReporter, load_file_config, parse_bandwidth_limit,
    verify_file,
};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Resumable, concurrent HTTP file downloader
#[derive(Parser, Debug)]
#[command(name = "boost-dl", version, about)]
struct Args {
    /// Custom output filename
    #[arg(long)]
    filename: Option<String>,

    /// Number of concurrent parts (default from ~/.boostdlrc, else 8)
    #[arg(short, long)]
    boost: Option<usize>,

    /// Max attempts per part (default from ~/.boostdlrc, else 3)
    #[arg(long)]
    retries: Option<usize>,

    /// Disable auto-resume of interrupted downloads
    #[arg(long)]
    no_resume: bool,

    /// Bandwidth limit, e.g. 1M, 500K, 100KB/s
    #[arg(short, long, default_value = "")]
    limit: String,

    /// Verify the download against algorithm:hash (md5 or sha256)
    #[arg(long)]
    checksum: Option<String>,

    /// Working directory for the output file and journal
    #[arg(long)]
    workdir: Option<PathBuf>,

    /// One or more URIs to download, processed sequentially
    #[arg(required = true)]
    uris: Vec<String>,
}

/// Progress observer rendering an indicatif byte bar.
struct BarReporter {
    bar: ProgressBar,
}

impl BarReporter {
    fn new() -> Self {
        let style = ProgressStyle::with_template(
            "{wide_bar} {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar());
        Self {
            bar: ProgressBar::no_length().with_style(style),
        }
    }
}

impl ProgressReporter for BarReporter {
    fn set_total(&self, total: u64) {
        self.bar.reset();
        self.bar.set_length(total);
    }

    fn set_downloaded(&self, downloaded: u64) {
        self.bar.set_position(downloaded);
    }

    fn add_downloaded(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn done(&self) {
        self.bar.finish_and_clear();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let file_config = load_file_config();

    let boost = args.boost.unwrap_or(file_config.boost);
    if boost < 1 {
        eprintln!("boost must be greater than 0");
        return ExitCode::FAILURE;
    }

    let bandwidth_limit = match parse_bandwidth_limit(&args.limit) {
        Ok(limit) => limit,
        Err(err) => {
            eprintln!("error parsing bandwidth limit: {err}");
            return ExitCode::FAILURE;
        }
    };

    let working_dir = match args.workdir {
        Some(dir) => dir,
        None => match std::env::current_dir() {
            Ok(dir) => dir,
            Err(err) => {
                eprintln!("error getting working directory: {err}");
                return ExitCode::FAILURE;
            }
        },
    };

    let config = DownloadConfig {
        boost,
        retries: args.retries.unwrap_or(file_config.retries),
        resume: !args.no_resume,
        bandwidth_limit,
        filename: args.filename,
        working_dir,
        ..DownloadConfig::default()
    };

    let downloader = match Downloader::new(config) {
        Ok(downloader) => downloader.with_reporter(std::sync::Arc::new(BarReporter::new())),
        Err(err) => {
            eprintln!("error creating HTTP client: {err}");
            return ExitCode::FAILURE;
        }
    };

    // Signals cancel the shared token; workers stop, the journal is saved,
    // and partial output is kept for a later resume.
    let cancel = downloader.cancellation_token();
    tokio::spawn(async move {
        wait_for_signal().await;
        println!("\nReceived termination signal; cancelling downloads...");
        cancel.cancel();
    });

    for uri in &args.uris {
        match downloader.download(uri).await {
            Ok(outcome) => {
                println!("Download completed: {}", outcome.filename);
                if let Some(checksum) = &args.checksum {
                    print!("Verifying checksum...");
                    let _ = std::io::Write::flush(&mut std::io::stdout());
                    if let Err(err) = verify_file(&outcome.path, checksum) {
                        eprintln!("\nChecksum verification failed: {err}");
                        return ExitCode::FAILURE;
                    }
                    println!(" ok");
                }
            }
            Err(err) if err.is_cancelled() => {
                eprintln!("Download cancelled");
                return ExitCode::FAILURE;
            }
            Err(err) => {
                eprintln!("Error while downloading {uri}: {err}");
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {}
                _ = sigint.recv() => {}
            }
        }
        _ => {
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    tokio::signal::ctrl_c().await.ok();
}
