use sha2::{Digest, Sha256};
use std::fmt;

/// A SHA-256 digest of an image stream.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceHash([u8; 32]);

impl SourceHash {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hashes a byte slice in one go.
    pub fn digest(data: &[u8]) -> Self {
        let mut hasher = StreamHasher::new();
        hasher.update(data);
        hasher.finish()
    }
}

impl fmt::Display for SourceHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for SourceHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SourceHash({self})")
    }
}

/// Rolling hash accumulator fed one chunk at a time.
///
/// The writer and the verifier both use this type so the two digests are
/// always produced by the same algorithm.
#[derive(Clone, Default)]
pub struct StreamHasher {
    inner: Sha256,
}

impl StreamHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.inner.update(chunk);
    }

    pub fn finish(self) -> SourceHash {
        SourceHash(self.inner.finalize().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunked_and_whole_digests_agree() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();

        let mut hasher = StreamHasher::new();
        for chunk in data.chunks(333) {
            hasher.update(chunk);
        }
        assert_eq!(hasher.finish(), SourceHash::digest(&data));
    }

    #[test]
    fn displays_as_lowercase_hex() {
        // SHA-256 of the empty string.
        assert_eq!(
            SourceHash::digest(b"").to_string(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
