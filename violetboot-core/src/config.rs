//! Runtime settings for a flashing session.
use crate::error::{FlashError, Result};

/// Default number of bytes moved per read/write iteration (16 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024 * 1024;
/// Largest accepted chunk. Each session holds one chunk in memory.
pub const MAX_CHUNK_SIZE: usize = 256 * 1024 * 1024;
/// Chunks must be whole sectors.
pub const SECTOR_SIZE: usize = 512;

/// Settings for one [`Session`](crate::session::Session).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlashConfig {
    /// Bytes per read/write iteration, shared by the write and verify passes.
    pub chunk_size: usize,
    /// Re-read the device after writing and compare hashes.
    pub verify: bool,
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            verify: true,
        }
    }
}

impl FlashConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.chunk_size % SECTOR_SIZE != 0 {
            return Err(FlashError::InvalidConfig(format!(
                "chunk size {} is not a non-zero multiple of {SECTOR_SIZE} bytes",
                self.chunk_size
            )));
        }
        if self.chunk_size > MAX_CHUNK_SIZE {
            return Err(FlashError::InvalidConfig(format!(
                "chunk size {} exceeds the maximum of {MAX_CHUNK_SIZE} bytes",
                self.chunk_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid_and_verifies() {
        let config = FlashConfig::default();
        assert!(config.verify);
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_unaligned_and_oversized_chunks() {
        assert!(FlashConfig::new().chunk_size(0).validate().is_err());
        assert!(FlashConfig::new().chunk_size(1000).validate().is_err());
        assert!(
            FlashConfig::new()
                .chunk_size(MAX_CHUNK_SIZE + SECTOR_SIZE)
                .validate()
                .is_err()
        );
        assert!(FlashConfig::new().chunk_size(4096).validate().is_ok());
    }
}
