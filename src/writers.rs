//! Write adapters for the download engine
//!
//! [`OffsetWriter`] turns a positioned-write sink (`pwrite`-style) into a
//! sequential writer by tracking its own offset, letting every worker stream
//! into a shared output file without seeking or locking.
//! [`RateLimitedWriter`] throttles a sequential writer through a token
//! bucket, splitting large buffers into capped chunks.

use crate::error::Result;
use crate::speed_limiter::SpeedLimiter;
use std::io::Write;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Maximum bytes forwarded per limiter acquisition
///
/// Keeps individual waits short so throttled writes stay responsive to
/// cancellation and limit changes.
pub const RATE_LIMIT_CHUNK: usize = 16 * 1024;

/// A positioned-write sink: writes take an explicit byte offset and do not
/// move any shared cursor.
pub trait WriteAt {
    /// Write `buf` at `offset`, returning the number of bytes written.
    /// Short writes are allowed.
    fn write_at(&self, buf: &[u8], offset: u64) -> std::io::Result<usize>;
}

#[cfg(unix)]
impl WriteAt for std::fs::File {
    fn write_at(&self, buf: &[u8], offset: u64) -> std::io::Result<usize> {
        std::os::unix::fs::FileExt::write_at(self, buf, offset)
    }
}

#[cfg(windows)]
impl WriteAt for std::fs::File {
    fn write_at(&self, buf: &[u8], offset: u64) -> std::io::Result<usize> {
        std::os::windows::fs::FileExt::seek_write(self, buf, offset)
    }
}

impl<W: WriteAt + ?Sized> WriteAt for Arc<W> {
    fn write_at(&self, buf: &[u8], offset: u64) -> std::io::Result<usize> {
        (**self).write_at(buf, offset)
    }
}

impl<W: WriteAt + ?Sized> WriteAt for &W {
    fn write_at(&self, buf: &[u8], offset: u64) -> std::io::Result<usize> {
        (**self).write_at(buf, offset)
    }
}

/// Adapts a [`WriteAt`] sink into a sequential [`Write`] by tracking a
/// monotonically increasing offset.
///
/// Each write lands at the current offset, and the offset advances by the
/// number of bytes the sink reports written, so short writes stay correct.
/// The writer never seeks and never reorders writes.
#[derive(Debug)]
pub struct OffsetWriter<W> {
    sink: W,
    offset: u64,
}

impl<W: WriteAt> OffsetWriter<W> {
    /// Create a writer positioned at `offset` in `sink`
    pub fn new(sink: W, offset: u64) -> Self {
        Self { sink, offset }
    }

    /// The offset the next write will land at
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

impl<W: WriteAt> Write for OffsetWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.sink.write_at(buf, self.offset)?;
        self.offset += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Wraps a sequential writer with an optional token-bucket limiter.
///
/// Without a limiter, writes pass straight through. With one, each call is
/// split into chunks of at most [`RATE_LIMIT_CHUNK`] bytes; every chunk
/// waits for the limiter to admit exactly that many bytes before being
/// forwarded. A cancelled wait returns a cancellation error; the bytes
/// already forwarded remain written and are visible via
/// [`bytes_written`](Self::bytes_written).
pub struct RateLimitedWriter<W> {
    inner: W,
    limiter: Option<Arc<SpeedLimiter>>,
    cancel: CancellationToken,
    written: u64,
}

impl<W: Write> RateLimitedWriter<W> {
    /// Wrap `inner`, throttled by `limiter` when one is given
    pub fn new(inner: W, limiter: Option<Arc<SpeedLimiter>>, cancel: CancellationToken) -> Self {
        Self {
            inner,
            limiter,
            cancel,
            written: 0,
        }
    }

    /// Total bytes successfully forwarded through this writer
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Write all of `buf`, waiting for limiter admission chunk by chunk.
    ///
    /// Returns the number of bytes written (`buf.len()` on success).
    pub async fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let Some(limiter) = self.limiter.clone() else {
            self.inner.write_all(buf)?;
            self.written += buf.len() as u64;
            return Ok(buf.len());
        };

        let mut done = 0;
        while done < buf.len() {
            let chunk = (buf.len() - done).min(RATE_LIMIT_CHUNK);
            limiter.acquire(chunk as u64, &self.cancel).await?;
            self.inner.write_all(&buf[done..done + chunk])?;
            done += chunk;
            self.written += chunk as u64;
        }
        Ok(done)
    }
}
