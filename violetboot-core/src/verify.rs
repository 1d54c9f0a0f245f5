//! Read-back verification of a flashed device.
use log::{info, warn};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use crate::config::DEFAULT_CHUNK_SIZE;
use crate::error::{FlashError, Result};
use crate::hash::{SourceHash, StreamHasher};
use crate::platform;

/// Opens a flashed device for reading back.
pub trait ReadBack {
    fn open(&self, target: &Path) -> io::Result<Box<dyn Read>>;
}

/// Reads the device itself, after evicting whatever the write left in the
/// page cache.
#[derive(Clone, Copy, Debug, Default)]
pub struct DeviceReadBack;

impl ReadBack for DeviceReadBack {
    fn open(&self, target: &Path) -> io::Result<Box<dyn Read>> {
        let device = File::open(target)?;
        platform::drop_cached_pages(&device)?;
        Ok(Box::new(device))
    }
}

/// Result of a completed read-back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Verification {
    pub expected: SourceHash,
    pub actual: SourceHash,
}

impl Verification {
    pub fn matches(&self) -> bool {
        self.expected == self.actual
    }

    /// Turns a mismatch into [`FlashError::HashMismatch`].
    pub fn into_result(self) -> Result<()> {
        if self.matches() {
            Ok(())
        } else {
            Err(FlashError::HashMismatch {
                expected: self.expected,
                actual: self.actual,
            })
        }
    }
}

/// Re-reads the leading bytes of a device and compares their hash with the
/// hash taken while writing.
pub struct Verifier {
    chunk_size: usize,
    read_back: Box<dyn ReadBack + Send>,
}

impl Default for Verifier {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl Verifier {
    /// `chunk_size` must match the one used for writing so both digests cover
    /// the same chunk sequence.
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            read_back: Box::new(DeviceReadBack),
        }
    }

    pub fn with_read_back(mut self, read_back: impl ReadBack + Send + 'static) -> Self {
        self.read_back = Box::new(read_back);
        self
    }

    /// Hashes the first `size_bytes` of `target` and compares the digest with
    /// `expected`. The device is opened read-only; [`Verification::matches`]
    /// is true only on an exact match.
    ///
    /// # Errors
    ///
    /// [`FlashError::TargetRead`] if reading fails and [`FlashError::ShortRead`]
    /// if the device ends before `size_bytes`. Neither is a mismatch.
    pub fn check<F>(
        &self,
        target: &Path,
        size_bytes: u64,
        expected: &SourceHash,
        on_progress: F,
    ) -> Result<Verification>
    where
        F: FnMut(u64),
    {
        let device = self.read_back.open(target).map_err(|e| FlashError::TargetRead {
            path: target.to_path_buf(),
            offset: 0,
            source: e,
        })?;
        let actual = self.hash_stream(device, target, size_bytes, on_progress)?;

        let verification = Verification {
            expected: *expected,
            actual,
        };
        if verification.matches() {
            info!("Verified {size_bytes} bytes on {}", target.display());
        } else {
            warn!(
                "Hash mismatch on {}: expected {expected}, read back {actual}",
                target.display()
            );
        }
        Ok(verification)
    }

    /// Hashes exactly `size_bytes` of `reader` in chunk order.
    pub fn hash_stream<R, F>(
        &self,
        mut reader: R,
        target: &Path,
        size_bytes: u64,
        mut on_progress: F,
    ) -> Result<SourceHash>
    where
        R: Read,
        F: FnMut(u64),
    {
        let mut hasher = StreamHasher::new();
        let mut buffer = vec![0u8; self.chunk_size];

        let mut read_total: u64 = 0;
        while read_total < size_bytes {
            let to_read = std::cmp::min(self.chunk_size as u64, size_bytes - read_total) as usize;
            let filled = fill(&mut reader, &mut buffer[..to_read]).map_err(|e| {
                FlashError::TargetRead {
                    path: target.to_path_buf(),
                    offset: read_total,
                    source: e,
                }
            })?;

            hasher.update(&buffer[..filled]);
            read_total += filled as u64;

            if filled < to_read {
                return Err(FlashError::ShortRead {
                    path: target.to_path_buf(),
                    expected: size_bytes,
                    actual: read_total,
                });
            }
            on_progress(read_total);
        }

        if size_bytes == 0 {
            on_progress(0);
        }

        Ok(hasher.finish())
    }
}

/// Reads until `buf` is full or the stream ends, returning the bytes read.
fn fill<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
