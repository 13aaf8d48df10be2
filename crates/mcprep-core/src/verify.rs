//! Content-integrity checks for downloaded artifacts.

use std::fmt;
use std::path::Path;

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use tokio::io::AsyncReadExt;

use crate::{PrepError, Result};

/// Supported digest algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    /// Detect the algorithm from the length of an expected hex digest
    pub fn from_hex_length(len: usize) -> Option<Self> {
        match len {
            32 => Some(HashAlgorithm::Md5),
            40 => Some(HashAlgorithm::Sha1),
            64 => Some(HashAlgorithm::Sha256),
            128 => Some(HashAlgorithm::Sha512),
            _ => None,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HashAlgorithm::Md5 => "MD5",
            HashAlgorithm::Sha1 => "SHA-1",
            HashAlgorithm::Sha256 => "SHA-256",
            HashAlgorithm::Sha512 => "SHA-512",
        };
        f.write_str(name)
    }
}

/// One expected digest for an artifact. Comparison is case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashSpec {
    pub algorithm: HashAlgorithm,
    pub expected: String,
}

impl HashSpec {
    pub fn new(algorithm: HashAlgorithm, expected: impl Into<String>) -> Self {
        Self {
            algorithm,
            expected: expected.into(),
        }
    }

    /// Build a spec by inferring the algorithm from the digest length
    pub fn infer(expected: impl Into<String>) -> Result<Self> {
        let expected = expected.into();
        let algorithm = HashAlgorithm::from_hex_length(expected.len()).ok_or_else(|| {
            PrepError::InvalidParameter(format!(
                "cannot infer hash algorithm from a {}-character digest",
                expected.len()
            ))
        })?;
        Ok(Self {
            algorithm,
            expected,
        })
    }
}

/// Compute the hex digest of a file's full contents
pub async fn compute(path: &Path, algorithm: HashAlgorithm) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut buffer = Vec::new();
    file.read_to_end(&mut buffer).await?;

    let digest = match algorithm {
        HashAlgorithm::Md5 => {
            let mut hasher = Md5::new();
            hasher.update(&buffer);
            format!("{:x}", hasher.finalize())
        }
        HashAlgorithm::Sha1 => {
            let mut hasher = Sha1::new();
            hasher.update(&buffer);
            format!("{:x}", hasher.finalize())
        }
        HashAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(&buffer);
            format!("{:x}", hasher.finalize())
        }
        HashAlgorithm::Sha512 => {
            let mut hasher = Sha512::new();
            hasher.update(&buffer);
            format!("{:x}", hasher.finalize())
        }
    };

    Ok(digest)
}

/// Verify a file against a list of expected digests.
///
/// The first mismatch raises [`PrepError::Integrity`] naming both the
/// expected and the actual value. An empty spec list trivially succeeds.
pub async fn verify(path: &Path, specs: &[HashSpec]) -> Result<()> {
    for spec in specs {
        let actual = compute(path, spec.algorithm).await?;
        if !actual.eq_ignore_ascii_case(&spec.expected) {
            return Err(PrepError::Integrity {
                path: path.display().to_string(),
                algorithm: spec.algorithm,
                expected: spec.expected.clone(),
                actual,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HELLO_WORLD_MD5: &str = "b10a8db164e0754105b7a99be72e3fe5";

    async fn write_hello_world(dir: &TempDir) -> std::path::PathBuf {
        let path = dir.path().join("hello.txt");
        tokio::fs::write(&path, b"Hello World").await.unwrap();
        path
    }

    #[test]
    fn test_from_hex_length() {
        assert_eq!(HashAlgorithm::from_hex_length(32), Some(HashAlgorithm::Md5));
        assert_eq!(HashAlgorithm::from_hex_length(40), Some(HashAlgorithm::Sha1));
        assert_eq!(
            HashAlgorithm::from_hex_length(64),
            Some(HashAlgorithm::Sha256)
        );
        assert_eq!(
            HashAlgorithm::from_hex_length(128),
            Some(HashAlgorithm::Sha512)
        );
        assert_eq!(HashAlgorithm::from_hex_length(50), None);
    }

    #[tokio::test]
    async fn test_md5_hello_world() {
        let dir = TempDir::new().unwrap();
        let path = write_hello_world(&dir).await;

        let actual = compute(&path, HashAlgorithm::Md5).await.unwrap();
        assert_eq!(actual, HELLO_WORLD_MD5);
    }

    #[tokio::test]
    async fn test_verify_case_insensitive() {
        let dir = TempDir::new().unwrap();
        let path = write_hello_world(&dir).await;

        let spec = HashSpec::new(HashAlgorithm::Md5, HELLO_WORLD_MD5.to_uppercase());
        verify(&path, &[spec]).await.unwrap();
    }

    #[tokio::test]
    async fn test_verify_mismatch_names_both_values() {
        let dir = TempDir::new().unwrap();
        let path = write_hello_world(&dir).await;

        let spec = HashSpec::new(HashAlgorithm::Md5, "BAD");
        let err = verify(&path, &[spec]).await.unwrap_err();

        match err {
            PrepError::Integrity {
                algorithm,
                expected,
                actual,
                ..
            } => {
                assert_eq!(algorithm, HashAlgorithm::Md5);
                assert_eq!(expected, "BAD");
                assert_eq!(actual, HELLO_WORLD_MD5);
            }
            other => panic!("expected Integrity error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_spec_list_succeeds() {
        let dir = TempDir::new().unwrap();
        let path = write_hello_world(&dir).await;

        verify(&path, &[]).await.unwrap();
    }

    #[tokio::test]
    async fn test_multiple_specs_first_mismatch_wins() {
        let dir = TempDir::new().unwrap();
        let path = write_hello_world(&dir).await;

        let good = HashSpec::new(HashAlgorithm::Md5, HELLO_WORLD_MD5);
        let bad = HashSpec::new(HashAlgorithm::Sha1, "0000000000000000000000000000000000000000");

        let err = verify(&path, &[good, bad]).await.unwrap_err();
        assert!(matches!(
            err,
            PrepError::Integrity {
                algorithm: HashAlgorithm::Sha1,
                ..
            }
        ));
    }

    #[test]
    fn test_infer() {
        let spec = HashSpec::infer(HELLO_WORLD_MD5).unwrap();
        assert_eq!(spec.algorithm, HashAlgorithm::Md5);

        let err = HashSpec::infer("nothex").unwrap_err();
        assert!(matches!(err, PrepError::InvalidParameter(_)));
    }
}
