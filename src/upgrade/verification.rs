//! SHA-256 digests and package verification.

use crate::core::FetchError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// A 256-bit SHA-256 digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sha256Digest([u8; 32]);

impl Sha256Digest {
    /// Digest of an in-memory buffer.
    pub fn of(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for Sha256Digest {
    type Err = hex::FromHexError;

    /// Accepts 64 hex digits in either case, optionally prefixed with `sha256:`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let hex_part = trimmed
            .get(..7)
            .filter(|prefix| prefix.eq_ignore_ascii_case("sha256:"))
            .map_or(trimmed, |_| &trimmed[7..]);

        let mut bytes = [0u8; 32];
        hex::decode_to_slice(hex_part, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl Serialize for Sha256Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Sha256Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Incremental hasher fed while a download streams to disk.
#[derive(Default)]
pub struct StreamingHasher {
    inner: Sha256,
}

impl StreamingHasher {
    /// Fresh hasher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes.
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Final digest.
    pub fn finalize(self) -> Sha256Digest {
        Sha256Digest(self.inner.finalize().into())
    }
}

/// File checksum computation and comparison.
pub struct ChecksumVerifier;

impl ChecksumVerifier {
    /// Compute the SHA-256 digest of a file, reading it in blocks.
    pub fn compute_sha256(file_path: &Path) -> std::io::Result<Sha256Digest> {
        debug!(path = %file_path.display(), "Computing SHA256 checksum");

        let mut file = std::fs::File::open(file_path)?;
        let mut hasher = StreamingHasher::new();
        let mut buffer = vec![0u8; 64 * 1024];
        loop {
            let read = file.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }
        Ok(hasher.finalize())
    }

    /// Compare a computed digest with the published one.
    pub fn verify_digest(actual: &Sha256Digest, expected: &Sha256Digest) -> Result<(), FetchError> {
        if actual != expected {
            return Err(FetchError::ChecksumMismatch {
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }
        info!(checksum = %actual, "Checksum verification successful");
        Ok(())
    }

    /// Hash a file and compare with the published digest.
    pub fn verify_checksum(file_path: &Path, expected: &Sha256Digest) -> Result<(), FetchError> {
        let actual = Self::compute_sha256(file_path)?;
        Self::verify_digest(&actual, expected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HELLO_WORLD: &str = "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f";

    #[test]
    fn test_compute_sha256() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"Hello, World!").unwrap();

        let checksum = ChecksumVerifier::compute_sha256(temp_file.path()).unwrap();
        assert_eq!(checksum.to_string(), HELLO_WORLD);
        assert_eq!(checksum, Sha256Digest::of(b"Hello, World!"));
    }

    #[test]
    fn test_verify_checksum_failure() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"Test content").unwrap();

        let wrong: Sha256Digest = "00".repeat(32).parse().unwrap();
        let err = ChecksumVerifier::verify_checksum(temp_file.path(), &wrong).unwrap_err();
        assert!(matches!(err, FetchError::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_parse_case_insensitive_with_prefix() {
        let lower: Sha256Digest =
            "sha256:532eaabd9574880dbf76b9b8cc00832c20a6ec113d682299550d7a6e0f345e25"
                .parse()
                .unwrap();
        let upper: Sha256Digest =
            "532EAABD9574880DBF76B9B8CC00832C20A6EC113D682299550D7A6E0F345E25"
                .parse()
                .unwrap();
        assert_eq!(lower, upper);
        assert_eq!(lower, Sha256Digest::of(b"Test"));
    }

    #[test]
    fn test_rejects_short_digest() {
        assert!("abcd".parse::<Sha256Digest>().is_err());
        assert!("zz".repeat(32).parse::<Sha256Digest>().is_err());
    }

    #[test]
    fn test_streaming_matches_one_shot() {
        let mut hasher = StreamingHasher::new();
        hasher.update(b"Hello, ");
        hasher.update(b"World!");
        assert_eq!(hasher.finalize().to_string(), HELLO_WORLD);
    }
}
