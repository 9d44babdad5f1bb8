//! Multi-part fetch orchestration
//!
//! Launches one worker per incomplete part, a periodic journal saver, and a
//! low-frequency ticker that aggregates the per-part counters into the
//! progress observer. Workers only touch their own padded counter on the
//! hot path; the saver and ticker read all counters with atomic loads.

use super::Downloader;
use super::part::PartWorker;
use crate::error::{Error, Result};
use crate::journal::{JournalStore, PartCounters};
use crate::speed_limiter::SpeedLimiter;
use crate::types::{Part, ProgressReporter, ResourceInfo};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How often the journal is persisted while the fetch runs
const SAVE_INTERVAL: Duration = Duration::from_secs(2);
/// How often the counters are aggregated into the progress observer
const UI_TICK: Duration = Duration::from_millis(100);
/// Minimum per-part rate when a global bandwidth limit is divided up
const MIN_PART_LIMIT: u64 = 1024;

/// Run the concurrent fetch across `parts`, returning after every worker
/// has stopped and the journal has been finalized.
pub(crate) async fn run_multi(
    dl: &Downloader,
    info: &ResourceInfo,
    parts: &[Part],
    counters: &Arc<PartCounters>,
    journal: &Arc<JournalStore>,
    file: &Arc<std::fs::File>,
) -> Result<()> {
    let boost = parts.len();
    let per_part_limit = dl
        .config
        .bandwidth_limit
        .map(|limit| (limit / boost as u64).max(MIN_PART_LIMIT));

    let saver_stop = CancellationToken::new();
    let saver = tokio::spawn(save_periodically(
        Arc::clone(journal),
        Arc::clone(counters),
        saver_stop.clone(),
    ));

    let ticker_stop = CancellationToken::new();
    let ticker = tokio::spawn(aggregate_progress(
        Arc::clone(counters),
        Arc::clone(&dl.reporter),
        counters.total(),
        ticker_stop.clone(),
    ));

    // Worker errors funnel through a bounded channel; the first one
    // observed is surfaced after all workers have stopped.
    let (err_tx, mut err_rx) = mpsc::channel::<Error>(boost);
    let mut handles = Vec::with_capacity(boost);

    for part in parts {
        if journal.part_completed(part.index).await {
            info!(part = part.index, "part already completed, skipping");
            continue;
        }

        let worker = PartWorker {
            client: dl.client.clone(),
            uri: info.uri.clone(),
            user_agent: dl.config.user_agent.clone(),
            part: *part,
            retries: dl.config.retries,
            file: Arc::clone(file),
            counters: Arc::clone(counters),
            journal: Arc::clone(journal),
            limiter: per_part_limit.map(|bps| Arc::new(SpeedLimiter::new(bps))),
            cancel: dl.cancel.clone(),
        };
        let err_tx = err_tx.clone();
        handles.push(tokio::spawn(async move {
            if let Err(err) = worker.run().await {
                let _ = err_tx.try_send(err);
            }
        }));
    }
    drop(err_tx);

    for handle in handles {
        let _ = handle.await;
    }

    saver_stop.cancel();
    let _ = saver.await;
    ticker_stop.cancel();
    let _ = ticker.await;

    // One last save so the journal reflects every confirmed byte
    if let Err(err) = journal.save(counters).await {
        warn!(error = %err, "could not save final progress journal");
    }

    if dl.cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let mut first_err: Option<Error> = None;
    while let Ok(err) = err_rx.try_recv() {
        if first_err.is_none() {
            first_err = Some(err);
        } else {
            error!(error = %err, "additional part failure");
        }
    }
    if let Some(err) = first_err {
        return Err(err);
    }

    journal.mark_completed().await;
    if let Err(err) = journal.save(counters).await {
        warn!(error = %err, "could not save completed progress journal");
    }
    if let Err(err) = journal.remove() {
        warn!(error = %err, "could not remove progress journal");
    }
    Ok(())
}

/// Persist the journal every [`SAVE_INTERVAL`] until stopped.
async fn save_periodically(
    journal: Arc<JournalStore>,
    counters: Arc<PartCounters>,
    stop: CancellationToken,
) {
    loop {
        tokio::select! {
            () = stop.cancelled() => return,
            () = tokio::time::sleep(SAVE_INTERVAL) => {
                if let Err(err) = journal.save(&counters).await {
                    warn!(error = %err, "could not save progress journal");
                }
            }
        }
    }
}

/// Feed counter deltas to the progress observer at ~10 Hz, decoupling UI
/// updates from the write hot path.
async fn aggregate_progress(
    counters: Arc<PartCounters>,
    reporter: Arc<dyn ProgressReporter>,
    initial: u64,
    stop: CancellationToken,
) {
    let mut last_total = initial;
    loop {
        tokio::select! {
            () = stop.cancelled() => break,
            () = tokio::time::sleep(UI_TICK) => {}
        }
        let total = counters.total();
        if total > last_total {
            reporter.add_downloaded(total - last_total);
            last_total = total;
        }
    }
    // Final flush so the observer lands on the true byte count
    let total = counters.total();
    if total > last_total {
        reporter.add_downloaded(total - last_total);
    }
}
