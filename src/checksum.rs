//! Post-download checksum verification
//!
//! Verifies a completed file against a caller-supplied `algorithm:hex`
//! string. The algorithm name is case-insensitive; the hash comparison is
//! done over lowercase hex.

use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// Verify `path` against a checksum in `algorithm:hash` form.
///
/// Supported algorithms: `md5` and `sha256`.
pub fn verify_file(path: &Path, checksum: &str) -> Result<()> {
    let (algorithm, expected) = checksum.split_once(':').ok_or(Error::ChecksumFormat)?;
    let algorithm = algorithm.to_ascii_lowercase();
    let expected = expected.to_ascii_lowercase();

    let mut file = std::fs::File::open(path)?;
    let mut buf = vec![0u8; 64 * 1024];

    let actual = match algorithm.as_str() {
        "md5" => {
            let mut context = md5::Context::new();
            loop {
                let n = file.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                context.consume(&buf[..n]);
            }
            format!("{:x}", context.compute())
        }
        "sha256" => {
            let mut hasher = Sha256::new();
            loop {
                let n = file.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
            format!("{:x}", hasher.finalize())
        }
        _ => return Err(Error::UnsupportedAlgorithm(algorithm)),
    };

    if actual != expected {
        return Err(Error::ChecksumMismatch { expected, actual });
    }
    Ok(())
}
