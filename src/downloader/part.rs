//! Part fetcher — one worker's range-GET into the shared output file
//!
//! Each worker owns exactly one part. A single attempt computes the
//! effective start from bytes already confirmed written, issues a range-GET,
//! and streams the body into the output file with positioned writes,
//! bumping the part's atomic counter as bytes land. The retry controller
//! wraps attempts with exponential backoff.

use super::download_timeout;
use crate::error::{Error, Result};
use crate::journal::{JournalStore, PartCounters};
use crate::retry::with_retries;
use crate::speed_limiter::SpeedLimiter;
use crate::types::Part;
use crate::writers::{OffsetWriter, RateLimitedWriter};
use futures::StreamExt;
use reqwest::{Client, StatusCode, header};
use std::io::Write;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Everything one part worker needs, owned so the worker can be spawned.
pub(crate) struct PartWorker {
    pub(crate) client: Client,
    pub(crate) uri: String,
    pub(crate) user_agent: String,
    pub(crate) part: Part,
    pub(crate) retries: usize,
    pub(crate) file: Arc<std::fs::File>,
    pub(crate) counters: Arc<PartCounters>,
    pub(crate) journal: Arc<JournalStore>,
    pub(crate) limiter: Option<Arc<SpeedLimiter>>,
    pub(crate) cancel: CancellationToken,
}

/// Sequential sink for one part: positioned writes into the shared file,
/// with every confirmed byte added to the part's counter.
struct PartSink<'a> {
    writer: OffsetWriter<&'a std::fs::File>,
    counters: &'a PartCounters,
    index: usize,
}

impl Write for PartSink<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.writer.write(buf)?;
        self.counters.add(self.index, n as u64);
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl PartWorker {
    /// Fetch this worker's part, retrying failed attempts with exponential
    /// backoff.
    pub(crate) async fn run(&self) -> Result<()> {
        with_retries(self.part.index, self.retries, &self.cancel, || {
            self.fetch_once()
        })
        .await
    }

    /// A single fetch attempt.
    async fn fetch_once(&self) -> Result<()> {
        let part = self.part;

        // Bytes already confirmed written, either restored from the journal
        // or accumulated by earlier attempts.
        let already = self.counters.load(part.index);
        if already >= part.len() {
            self.journal.mark_part_completed(part.index, already).await;
            return Ok(());
        }

        let effective_start = part.start_byte + already;
        let remaining = part.end_byte - effective_start + 1;

        let range = format!("bytes={}-{}", effective_start, part.end_byte);
        let request = self
            .client
            .get(&self.uri)
            .header(header::RANGE, &range)
            .header(header::USER_AGENT, &self.user_agent)
            .timeout(download_timeout(remaining));

        let response = tokio::select! {
            () = self.cancel.cancelled() => return Err(Error::Cancelled),
            response = request.send() => response?,
        };

        let status = response.status();
        if status != StatusCode::PARTIAL_CONTENT && status != StatusCode::OK {
            return Err(Error::PartStatus {
                index: part.index,
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("unknown").to_string(),
                start: effective_start,
                end: part.end_byte,
            });
        }

        let sink = PartSink {
            writer: OffsetWriter::new(&*self.file, effective_start),
            counters: &self.counters,
            index: part.index,
        };
        let mut writer = RateLimitedWriter::new(sink, self.limiter.clone(), self.cancel.clone());

        let mut stream = response.bytes_stream();
        loop {
            let next = tokio::select! {
                () = self.cancel.cancelled() => return Err(Error::Cancelled),
                next = stream.next() => next,
            };
            match next {
                Some(chunk) => {
                    writer.write(&chunk?).await?;
                }
                None => break,
            }
        }

        self.journal
            .mark_part_completed(part.index, self.counters.load(part.index))
            .await;
        Ok(())
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::plan_parts;
    use crate::types::ResourceInfo;
    use wiremock::matchers::{header as header_matcher, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn worker_for(
        server: &MockServer,
        part: Part,
        file: std::fs::File,
        counters: Arc<PartCounters>,
        journal: Arc<JournalStore>,
    ) -> PartWorker {
        PartWorker {
            client: Client::new(),
            uri: format!("{}/file.bin", server.uri()),
            user_agent: "boost-dl/test".to_string(),
            part,
            retries: 1,
            file: Arc::new(file),
            counters,
            journal,
            limiter: None,
            cancel: CancellationToken::new(),
        }
    }

    async fn journal_for(
        dir: &tempfile::TempDir,
        server: &MockServer,
        parts: &[Part],
    ) -> JournalStore {
        let info = ResourceInfo {
            uri: format!("{}/file.bin", server.uri()),
            total_size: 1000,
            supports_range: true,
            filename: "file.bin".to_string(),
        };
        let store = JournalStore::new(dir.path().join(".file.bin.dl_progress"));
        store.init(&info, parts).await;
        store
    }

    #[tokio::test]
    async fn worker_streams_its_range_to_the_right_offset() {
        let payload: Vec<u8> = (0..1000u32).map(|i| (i % 256) as u8).collect();
        let parts = plan_parts(1000, 2);

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/file.bin"))
            .and(header_matcher("Range", "bytes=500-999"))
            .respond_with(
                ResponseTemplate::new(206).set_body_bytes(payload[500..=999].to_vec()),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let out_path = dir.path().join("file.bin");
        let file = std::fs::File::create(&out_path).unwrap();
        file.set_len(1000).unwrap();

        let counters = Arc::new(PartCounters::new(2));
        let journal = Arc::new(journal_for(&dir, &server, &parts).await);
        let worker = worker_for(&server, parts[1], file, counters.clone(), journal.clone());

        worker.run().await.unwrap();

        assert_eq!(counters.load(1), 500);
        assert!(journal.part_completed(1).await);
        let written = std::fs::read(&out_path).unwrap();
        assert_eq!(&written[500..], &payload[500..]);
        assert!(written[..500].iter().all(|&b| b == 0));
    }

    #[tokio::test]
    async fn resumed_worker_requests_only_the_remainder() {
        let payload: Vec<u8> = (0..1000u32).map(|i| (i % 256) as u8).collect();
        let parts = plan_parts(1000, 2);

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/file.bin"))
            .and(header_matcher("Range", "bytes=250-499"))
            .respond_with(
                ResponseTemplate::new(206).set_body_bytes(payload[250..=499].to_vec()),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = std::fs::File::create(dir.path().join("file.bin")).unwrap();
        file.set_len(1000).unwrap();

        let counters = Arc::new(PartCounters::new(2));
        counters.store(0, 250);
        let journal = Arc::new(journal_for(&dir, &server, &parts).await);
        let worker = worker_for(&server, parts[0], file, counters.clone(), journal);

        worker.run().await.unwrap();
        assert_eq!(counters.load(0), 500);
    }

    #[tokio::test]
    async fn fully_downloaded_part_short_circuits_without_a_request() {
        let parts = plan_parts(1000, 2);
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = std::fs::File::create(dir.path().join("file.bin")).unwrap();

        let counters = Arc::new(PartCounters::new(2));
        counters.store(0, 500);
        let journal = Arc::new(journal_for(&dir, &server, &parts).await);
        let worker = worker_for(&server, parts[0], file, counters, journal.clone());

        worker.run().await.unwrap();
        assert!(journal.part_completed(0).await);
    }

    #[tokio::test]
    async fn unexpected_status_names_the_part_and_range() {
        let parts = plan_parts(1000, 2);
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(416))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = std::fs::File::create(dir.path().join("file.bin")).unwrap();
        let counters = Arc::new(PartCounters::new(2));
        let journal = Arc::new(journal_for(&dir, &server, &parts).await);
        let worker = worker_for(&server, parts[1], file, counters, journal);

        let err = worker.run().await.unwrap_err();
        match err {
            Error::RetriesExhausted { index, source, .. } => {
                assert_eq!(index, 1);
                assert!(matches!(
                    *source,
                    Error::PartStatus {
                        index: 1,
                        status: 416,
                        start: 500,
                        end: 999,
                        ..
                    }
                ));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }
}
