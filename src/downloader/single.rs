//! Single-stream download path
//!
//! Used when boost is 1 or the server does not accept byte ranges. Shares
//! the engine's resume semantics, but the resume cursor is the on-disk file
//! length itself; no per-part journal is kept in this mode.

use super::Downloader;
use super::download_timeout;
use crate::error::{Error, Result};
use crate::types::ResourceInfo;
use crate::writers::{OffsetWriter, RateLimitedWriter};
use futures::StreamExt;
use reqwest::{StatusCode, header};
use std::io::Write;
use std::sync::Arc;

/// Sink that reports every confirmed byte straight to the progress
/// observer; with a single stream there is no aggregation ticker.
struct SingleSink {
    writer: OffsetWriter<Arc<std::fs::File>>,
    reporter: Arc<dyn crate::types::ProgressReporter>,
}

impl Write for SingleSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.writer.write(buf)?;
        self.reporter.add_downloaded(n as u64);
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Stream the whole resource (or its tail, when resuming) in one GET.
pub(crate) async fn run_single(
    dl: &Downloader,
    info: &ResourceInfo,
    file: Arc<std::fs::File>,
    existing: u64,
) -> Result<()> {
    let remaining = info.total_size.saturating_sub(existing);

    let mut request = dl
        .client
        .get(&info.uri)
        .header(header::USER_AGENT, &dl.config.user_agent)
        .timeout(download_timeout(remaining));
    if existing > 0 {
        request = request.header(header::RANGE, format!("bytes={existing}-"));
    }

    let response = tokio::select! {
        () = dl.cancel.cancelled() => return Err(Error::Cancelled),
        response = request.send() => response?,
    };

    let expected = if existing > 0 {
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    };
    let status = response.status();
    if status != expected {
        return Err(Error::UnexpectedStatus {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("unknown").to_string(),
        });
    }

    let limiter = dl
        .config
        .bandwidth_limit
        .map(|bps| Arc::new(crate::speed_limiter::SpeedLimiter::new(bps)));
    let sink = SingleSink {
        writer: OffsetWriter::new(file, existing),
        reporter: Arc::clone(&dl.reporter),
    };
    let mut writer = RateLimitedWriter::new(sink, limiter, dl.cancel.clone());

    let mut stream = response.bytes_stream();
    loop {
        let next = tokio::select! {
            () = dl.cancel.cancelled() => return Err(Error::Cancelled),
            next = stream.next() => next,
        };
        match next {
            Some(chunk) => {
                writer.write(&chunk?).await?;
            }
            None => break,
        }
    }

    Ok(())
}
