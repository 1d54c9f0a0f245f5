//! Contains the logic for copying an image onto a device.
//!
//! The image is streamed in fixed-size chunks. Each chunk is optionally fed into
//! a SHA-256 accumulator and then written to the target at the current offset.
//! Once the last chunk is out the target is flushed and synced, so nothing is
//! left in memory when the copy reports completion.
use log::{debug, info};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use crate::config::DEFAULT_CHUNK_SIZE;
use crate::error::{FlashError, Result};
use crate::hash::{SourceHash, StreamHasher};
use crate::image::ImageSource;
use crate::platform;

/// What a finished copy produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CopyOutcome {
    pub bytes_written: u64,
    /// Present only when hashing was requested.
    pub source_hash: Option<SourceHash>,
}

/// Chunked image-to-device copier.
#[derive(Clone, Debug)]
pub struct StreamingWriter {
    chunk_size: usize,
    compute_hash: bool,
}

impl Default for StreamingWriter {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, true)
    }
}

impl StreamingWriter {
    pub fn new(chunk_size: usize, compute_hash: bool) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            compute_hash,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Writes `source` onto the device at `target`, then flushes and syncs it.
    ///
    /// `on_progress` receives the running total of bytes written after every
    /// chunk. The target is opened for writing only: it is never created or
    /// truncated. A partial write is left as is on failure.
    ///
    /// # Errors
    ///
    /// - [`FlashError::SourceRead`] if the image cannot be read in full.
    /// - [`FlashError::TargetOpen`] or [`FlashError::TargetWrite`] if the device
    ///   cannot be opened, written or synced (full, removed, permission lost).
    /// - [`FlashError::TargetTooSmall`] if the device is smaller than the image.
    /// - [`FlashError::SourceChanged`] if the image changed size meanwhile.
    pub fn copy<F>(&self, source: &ImageSource, target: &Path, on_progress: F) -> Result<CopyOutcome>
    where
        F: FnMut(u64),
    {
        let image_file = File::open(&source.path).map_err(|e| FlashError::SourceRead {
            path: source.path.clone(),
            source: e,
        })?;

        let device_file = OpenOptions::new()
            .write(true)
            .open(target)
            .map_err(|e| FlashError::TargetOpen {
                path: target.to_path_buf(),
                source: e,
            })?;

        let capacity = platform::block_device_capacity(&device_file).map_err(|e| {
            FlashError::TargetOpen {
                path: target.to_path_buf(),
                source: e,
            }
        })?;
        if let Some(capacity) = capacity {
            debug!("{} holds {capacity} bytes", target.display());
            if capacity < source.size_bytes {
                return Err(FlashError::TargetTooSmall {
                    path: target.to_path_buf(),
                    capacity,
                    required: source.size_bytes,
                });
            }
        }

        let mut device = BufWriter::with_capacity(self.chunk_size, device_file);
        let outcome = self.copy_stream(source, image_file, target, &mut device, on_progress)?;

        let sync_err = |e: io::Error| FlashError::TargetWrite {
            path: target.to_path_buf(),
            offset: outcome.bytes_written,
            source: e,
        };
        let device_file = device.into_inner().map_err(|e| sync_err(e.into_error()))?;
        device_file.sync_all().map_err(sync_err)?;
        platform::sync_all_filesystems();
        info!(
            "Wrote and synced {} bytes to {}",
            outcome.bytes_written,
            target.display()
        );

        source.ensure_unchanged()?;
        Ok(outcome)
    }

    /// The copy loop over arbitrary streams. Reads exactly
    /// `source.size_bytes` from `reader` and flushes `writer` at the end.
    pub fn copy_stream<R, W, F>(
        &self,
        source: &ImageSource,
        mut reader: R,
        target: &Path,
        writer: &mut W,
        mut on_progress: F,
    ) -> Result<CopyOutcome>
    where
        R: Read,
        W: Write,
        F: FnMut(u64),
    {
        let image_len = source.size_bytes;
        let mut hasher = self.compute_hash.then(StreamHasher::new);
        let mut buffer = vec![0u8; self.chunk_size];

        let mut written: u64 = 0;
        while written < image_len {
            let to_read = std::cmp::min(self.chunk_size as u64, image_len - written) as usize;
            let chunk = &mut buffer[..to_read];

            reader
                .read_exact(chunk)
                .map_err(|e| FlashError::SourceRead {
                    path: source.path.clone(),
                    source: e,
                })?;

            if let Some(hasher) = hasher.as_mut() {
                hasher.update(chunk);
            }

            writer
                .write_all(chunk)
                .map_err(|e| FlashError::TargetWrite {
                    path: target.to_path_buf(),
                    offset: written,
                    source: e,
                })?;

            written += to_read as u64;
            on_progress(written);
        }

        if image_len == 0 {
            on_progress(0);
        }

        writer.flush().map_err(|e| FlashError::TargetWrite {
            path: target.to_path_buf(),
            offset: written,
            source: e,
        })?;

        Ok(CopyOutcome {
            bytes_written: written,
            source_hash: hasher.map(StreamHasher::finish),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::path::PathBuf;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 256) as u8).collect()
    }

    fn source(len: usize) -> ImageSource {
        ImageSource {
            path: PathBuf::from("image.iso"),
            size_bytes: len as u64,
        }
    }

    /// Accepts `limit` bytes, then fails like a device pulled out of its port.
    struct VanishingDevice {
        accepted: Vec<u8>,
        limit: usize,
    }

    impl Write for VanishingDevice {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.accepted.len() >= self.limit {
                return Err(io::Error::other("No such device"));
            }
            let n = buf.len().min(self.limit - self.accepted.len());
            self.accepted.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn copies_sizes_that_are_not_chunk_multiples() {
        let writer = StreamingWriter::new(4096, true);
        for len in [0, 1, 4095, 4096, 4097, 3 * 4096 + 17] {
            let data = pattern(len);
            let mut out = Vec::new();
            let outcome = writer
                .copy_stream(&source(len), Cursor::new(&data), Path::new("dev"), &mut out, |_| {})
                .unwrap();

            assert_eq!(outcome.bytes_written, len as u64);
            assert_eq!(out, data);
            assert_eq!(outcome.source_hash, Some(SourceHash::digest(&data)));
        }
    }

    #[test]
    fn reports_progress_per_chunk() {
        let data = pattern(10_000);
        let mut seen = Vec::new();
        StreamingWriter::new(4096, false)
            .copy_stream(
                &source(data.len()),
                Cursor::new(&data),
                Path::new("dev"),
                &mut Vec::new(),
                |n| seen.push(n),
            )
            .unwrap();

        assert_eq!(seen, [4096, 8192, 10_000]);
    }

    #[test]
    fn skips_hashing_when_not_requested() {
        let data = pattern(100);
        let outcome = StreamingWriter::new(512, false)
            .copy_stream(
                &source(100),
                Cursor::new(&data),
                Path::new("dev"),
                &mut Vec::new(),
                |_| {},
            )
            .unwrap();
        assert_eq!(outcome.source_hash, None);
    }

    #[test]
    fn device_vanishing_mid_write_is_fatal() {
        let data = pattern(16 * 1024);
        let mut device = VanishingDevice {
            accepted: Vec::new(),
            limit: 6000,
        };
        let err = StreamingWriter::new(4096, true)
            .copy_stream(
                &source(data.len()),
                Cursor::new(&data),
                Path::new("/dev/sdz"),
                &mut device,
                |_| {},
            )
            .unwrap_err();

        assert!(matches!(err, FlashError::TargetWrite { offset: 4096, .. }));
        assert_eq!(device.accepted.len(), 6000);
    }

    #[test]
    fn truncated_source_is_a_read_failure() {
        let data = pattern(1000);
        let err = StreamingWriter::new(512, true)
            .copy_stream(
                &source(2000),
                Cursor::new(&data),
                Path::new("dev"),
                &mut Vec::new(),
                |_| {},
            )
            .unwrap_err();
        assert!(matches!(err, FlashError::SourceRead { .. }));
    }

    #[test]
    fn copy_writes_into_an_existing_target_without_truncating() {
        let data = pattern(5000);
        let mut image = tempfile::NamedTempFile::new().unwrap();
        image.write_all(&data).unwrap();
        image.flush().unwrap();

        let target = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(target.path(), vec![0xAAu8; 8192]).unwrap();

        let source = ImageSource::open(image.path()).unwrap();
        let outcome = StreamingWriter::new(1024, true)
            .copy(&source, target.path(), |_| {})
            .unwrap();

        let written = std::fs::read(target.path()).unwrap();
        assert_eq!(outcome.bytes_written, 5000);
        assert_eq!(&written[..5000], &data[..]);
        assert!(written[5000..].iter().all(|&b| b == 0xAA));
    }

    #[test]
    fn missing_target_is_not_created() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("image.iso");
        std::fs::write(&image, pattern(10)).unwrap();
        let target = dir.path().join("sdz");

        let err = StreamingWriter::default()
            .copy(&ImageSource::open(&image).unwrap(), &target, |_| {})
            .unwrap_err();
        assert!(matches!(err, FlashError::TargetOpen { .. }));
        assert!(!target.exists());
    }
}
