//! Common test utilities for boost-dl end-to-end tests

use boost_dl::DownloadConfig;
use std::path::Path;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Build a payload where `byte[i] = i mod 256`.
#[allow(dead_code)]
pub fn patterned_payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 256) as u8).collect()
}

/// Mount a HEAD mock for `/file.bin` advertising the payload size and,
/// optionally, byte-range support.
#[allow(dead_code)]
pub async fn mount_head(server: &MockServer, payload: &[u8], ranges: bool) {
    let mut template = ResponseTemplate::new(200).set_body_bytes(payload.to_vec());
    if ranges {
        template = template.insert_header("Accept-Ranges", "bytes");
    }
    Mock::given(method("HEAD"))
        .and(path("/file.bin"))
        .respond_with(template)
        .mount(server)
        .await;
}

/// Engine configuration pointing at a scratch directory, with resume on.
#[allow(dead_code)]
pub fn test_config(dir: &Path, boost: usize) -> DownloadConfig {
    DownloadConfig {
        boost,
        retries: 1,
        working_dir: dir.to_path_buf(),
        ..DownloadConfig::default()
    }
}
