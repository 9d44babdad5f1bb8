//! Core types for boost-dl

/// Negotiated properties of a remote resource, produced by the metadata probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceInfo {
    /// Source URI, immutable for the lifetime of a download
    pub uri: String,
    /// Total resource size in bytes (from Content-Length; required)
    pub total_size: u64,
    /// Whether the server advertises `Accept-Ranges: bytes`
    pub supports_range: bool,
    /// Output filename, derived from Content-Disposition or the URI path
    pub filename: String,
}

/// A contiguous byte range of the resource, owned by exactly one worker
///
/// Ranges are inclusive on both ends. The planner guarantees that the parts
/// of a download are contiguous, non-overlapping, and together cover
/// `[0, total_size)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Part {
    /// Dense 0-based part index
    pub index: usize,
    /// First byte of the range
    pub start_byte: u64,
    /// Last byte of the range (inclusive)
    pub end_byte: u64,
}

impl Part {
    /// Length of the range in bytes
    pub fn len(&self) -> u64 {
        self.end_byte - self.start_byte + 1
    }

    /// Whether the range is empty (never true for planner output)
    pub fn is_empty(&self) -> bool {
        self.end_byte < self.start_byte
    }
}

/// Observer interface consumed by an external progress renderer
///
/// Implementations must be safe to call from any worker or the aggregation
/// ticker. All methods take `&self`; implementations typically update an
/// internal thread-safe progress bar or counter.
pub trait ProgressReporter: Send + Sync {
    /// Set the total number of bytes expected for the current download
    fn set_total(&self, total: u64);
    /// Set the absolute number of bytes downloaded so far
    fn set_downloaded(&self, downloaded: u64);
    /// Add a delta of newly downloaded bytes
    fn add_downloaded(&self, delta: u64);
    /// Signal that the current download has finished
    fn done(&self);
}

/// A [`ProgressReporter`] that discards all updates
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn set_total(&self, _total: u64) {}
    fn set_downloaded(&self, _downloaded: u64) {}
    fn add_downloaded(&self, _delta: u64) {}
    fn done(&self) {}
}
