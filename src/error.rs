//! Error types for boost-dl
//!
//! The error taxonomy separates hard failures (metadata probe, filesystem),
//! retryable part-fetch failures, terminal cancellation, and non-fatal
//! journal I/O so callers can distinguish interruption from true failure.

use thiserror::Error;

/// Result type alias for boost-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for boost-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Metadata probe failed (non-200 HEAD, missing or invalid Content-Length)
    #[error("metadata probe failed for {uri}: {reason}")]
    Metadata {
        /// The URI that was probed
        uri: String,
        /// Human-readable description of the probe failure
        reason: String,
    },

    /// Server returned an unexpected status for a part range request
    #[error("server returned status {status} ({reason}) for part {index} (bytes {start}-{end})")]
    PartStatus {
        /// Index of the part whose request failed
        index: usize,
        /// HTTP status code returned by the server
        status: u16,
        /// Canonical reason phrase for the status
        reason: String,
        /// First byte of the requested range
        start: u64,
        /// Last byte of the requested range
        end: u64,
    },

    /// Server returned an unexpected status for a single-stream download
    #[error("server returned status {status} ({reason}) for download")]
    UnexpectedStatus {
        /// HTTP status code returned by the server
        status: u16,
        /// Canonical reason phrase for the status
        reason: String,
    },

    /// A part exhausted its retry budget
    #[error("part {index} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Index of the part that failed
        index: usize,
        /// Number of attempts made before giving up
        attempts: usize,
        /// The last underlying failure
        #[source]
        source: Box<Error>,
    },

    /// The download was cancelled (signal or explicit abort)
    ///
    /// Terminal: never retried, and takes precedence when aggregating
    /// worker errors.
    #[error("download cancelled")]
    Cancelled,

    /// I/O error (output file creation, extension, positioned writes, rename)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error from the HTTP client
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Progress journal could not be read, parsed, or saved
    ///
    /// Non-fatal: callers log a warning and continue; a later save may
    /// succeed.
    #[error("progress journal error: {0}")]
    Journal(String),

    /// Bandwidth limit string could not be parsed
    #[error("invalid bandwidth limit: {0}")]
    InvalidLimit(String),

    /// Checksum argument was not in `algorithm:hex` form
    #[error("invalid checksum format, expected algorithm:hash")]
    ChecksumFormat,

    /// Requested hash algorithm is not supported
    #[error("unsupported hash algorithm: {0} (supported: md5, sha256)")]
    UnsupportedAlgorithm(String),

    /// Computed hash did not match the expected value
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// The caller-supplied expected hash (lowercase hex)
        expected: String,
        /// The hash actually computed over the file (lowercase hex)
        actual: String,
    },
}

impl Error {
    /// Whether this error represents cancellation rather than a true failure.
    ///
    /// Cancellation is terminal: the retry controller returns it immediately
    /// and the coordinator reports it in preference to worker errors.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Error::Cancelled => true,
            Error::RetriesExhausted { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_is_cancelled() {
        assert!(Error::Cancelled.is_cancelled());
    }

    #[test]
    fn io_error_is_not_cancelled() {
        let err = Error::Io(std::io::Error::other("disk fail"));
        assert!(!err.is_cancelled());
    }

    #[test]
    fn exhausted_retries_wrapping_cancellation_count_as_cancelled() {
        let err = Error::RetriesExhausted {
            index: 2,
            attempts: 3,
            source: Box::new(Error::Cancelled),
        };
        assert!(err.is_cancelled());
    }

    #[test]
    fn exhausted_retries_wrapping_status_error_is_not_cancelled() {
        let err = Error::RetriesExhausted {
            index: 0,
            attempts: 3,
            source: Box::new(Error::PartStatus {
                index: 0,
                status: 503,
                reason: "Service Unavailable".into(),
                start: 0,
                end: 99,
            }),
        };
        assert!(!err.is_cancelled());
    }

    #[test]
    fn part_status_display_names_part_range_and_status() {
        let err = Error::PartStatus {
            index: 3,
            status: 416,
            reason: "Range Not Satisfiable".into(),
            start: 750,
            end: 999,
        };
        let msg = err.to_string();
        assert!(msg.contains("part 3"));
        assert!(msg.contains("416"));
        assert!(msg.contains("bytes 750-999"));
    }

    #[test]
    fn retries_exhausted_display_includes_attempt_count_and_cause() {
        let err = Error::RetriesExhausted {
            index: 1,
            attempts: 5,
            source: Box::new(Error::UnexpectedStatus {
                status: 500,
                reason: "Internal Server Error".into(),
            }),
        };
        let msg = err.to_string();
        assert!(msg.contains("part 1"));
        assert!(msg.contains("5 attempts"));
        assert!(msg.contains("500"));
    }
}
