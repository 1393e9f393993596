//! File integrity verification
//!
//! Streams completed downloads through SHA-256 and compares against
//! expected digests from the configuration.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::core::models::AppResult;

/// Read buffer for hashing
const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Outcome of verifying one file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityResult {
    pub matches: bool,
    pub expected: String,
    pub actual: String,
}

/// Compute the SHA-256 digest of a file as lowercase hex
pub async fn sha256_file(path: &Path) -> AppResult<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];

    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Verify a file against an expected SHA-256 hex digest.
/// Comparison is case-insensitive on the expected side.
pub async fn verify_file(path: &Path, expected: &str) -> AppResult<IntegrityResult> {
    let actual = sha256_file(path).await?;
    let expected_normalized = expected.trim().to_lowercase();
    let matches = actual == expected_normalized;

    debug!(
        "Integrity check for {:?}: expected {}, actual {}, match {}",
        path, expected_normalized, actual, matches
    );

    Ok(IntegrityResult {
        matches,
        expected: expected_normalized,
        actual,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    // SHA-256 of the ASCII string "hello world"
    const HELLO_WORLD_SHA256: &str =
        "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[tokio::test]
    async fn test_sha256_of_known_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        tokio::fs::write(&path, b"hello world").await.unwrap();

        let digest = sha256_file(&path).await.unwrap();
        assert_eq!(digest, HELLO_WORLD_SHA256);
    }

    #[tokio::test]
    async fn test_verify_match_and_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        tokio::fs::write(&path, b"hello world").await.unwrap();

        let ok = verify_file(&path, HELLO_WORLD_SHA256).await.unwrap();
        assert!(ok.matches);

        // Uppercase expected digests are accepted
        let upper = verify_file(&path, &HELLO_WORLD_SHA256.to_uppercase())
            .await
            .unwrap();
        assert!(upper.matches);

        let bad = verify_file(&path, &"0".repeat(64)).await.unwrap();
        assert!(!bad.matches);
        assert_eq!(bad.actual, HELLO_WORLD_SHA256);
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.bin");
        assert!(sha256_file(&path).await.is_err());
    }

    #[tokio::test]
    async fn test_large_file_spans_multiple_buffers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("large.bin");
        let content = vec![0xABu8; HASH_BUFFER_SIZE * 2 + 17];
        tokio::fs::write(&path, &content).await.unwrap();

        let streamed = sha256_file(&path).await.unwrap();
        let direct = hex::encode(Sha256::digest(&content));
        assert_eq!(streamed, direct);
    }
}
