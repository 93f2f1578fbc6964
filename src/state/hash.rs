//! Content hashing for guarded deletes.
//!
//! A `RemoveFile` step records the SHA-256 of the content it expects to
//! delete; the executor re-hashes the file and refuses on mismatch.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io;
use std::path::Path;

const ABBREV_LEN: usize = 12;

/// Hasher for node content.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContentHasher;

impl ContentHasher {
    /// Creates a new content hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes the lowercase hex SHA-256 of `content`.
    #[must_use]
    pub fn hash_bytes(&self, content: &[u8]) -> String {
        hex::encode(Sha256::digest(content))
    }

    /// Computes the lowercase hex SHA-256 of the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be read.
    pub fn hash_file(&self, path: &Path) -> io::Result<String> {
        let mut file = File::open(path)?;
        let mut hasher = Sha256::new();
        io::copy(&mut file, &mut hasher)?;
        Ok(hex::encode(hasher.finalize()))
    }

    /// Returns true if `content` hashes to the hex digest `expected`.
    ///
    /// The comparison runs over the raw digest bytes in constant time. A
    /// malformed `expected` never matches.
    #[must_use]
    pub fn content_matches(&self, content: &[u8], expected: &str) -> bool {
        let Ok(expected) = hex::decode(expected) else {
            return false;
        };
        let actual = Sha256::digest(content);
        expected.len() == actual.len()
            && actual
                .iter()
                .zip(&expected)
                .fold(0u8, |diff, (a, b)| diff | (a ^ b))
                == 0
    }

    /// Abbreviates a hex digest for log lines.
    #[must_use]
    pub fn abbrev(hash: &str) -> &str {
        hash.get(..ABBREV_LEN).unwrap_or(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_known_digest() {
        let hasher = ContentHasher::new();
        assert_eq!(
            hasher.hash_bytes(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_file_and_bytes_agree() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let path = temp.path().join("payload");
        std::fs::write(&path, b"payload bytes").expect("write failed");

        let hasher = ContentHasher::new();
        let from_file = hasher.hash_file(&path).expect("hash failed");
        assert_eq!(from_file, hasher.hash_bytes(b"payload bytes"));
    }

    #[test]
    fn test_content_matches_only_its_digest() {
        let hasher = ContentHasher::new();
        let digest = hasher.hash_bytes(b"kept");

        assert!(hasher.content_matches(b"kept", &digest));
        assert!(hasher.content_matches(b"kept", &digest.to_uppercase()));
        assert!(!hasher.content_matches(b"kept!", &digest));
        assert!(!hasher.content_matches(b"kept", &digest[..62]));
        assert!(!hasher.content_matches(b"kept", "not hex"));
    }

    #[test]
    fn test_abbrev() {
        let digest = ContentHasher::new().hash_bytes(b"abc");
        assert_eq!(ContentHasher::abbrev(&digest), "ba7816bf8f01");
        assert_eq!(ContentHasher::abbrev("beef"), "beef");
    }
}
