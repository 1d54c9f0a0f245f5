//! Error types shared by every stage of a flashing session.
use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::hash::SourceHash;

pub type Result<T> = std::result::Result<T, FlashError>;

/// Everything that can go wrong while enumerating, releasing, writing or
/// verifying a device.
///
/// Only [`FlashError::Enumeration`] and [`FlashError::Unmount`] are absorbed
/// inside the engine. The rest end the session and reach the caller.
#[derive(Error, Debug)]
pub enum FlashError {
    #[error("Device enumeration failed: {0}")]
    Enumeration(String),

    #[error("Failed to unmount {}: {source}", mount_point.display())]
    Unmount {
        mount_point: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read source image {}: {source}", path.display())]
    SourceRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Source image {} changed size during the session ({expected} -> {actual} bytes)", path.display())]
    SourceChanged {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error("Failed to open target {}: {source}", path.display())]
    TargetOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Target {} holds {capacity} bytes but the image needs {required}", path.display())]
    TargetTooSmall {
        path: PathBuf,
        capacity: u64,
        required: u64,
    },

    #[error("Failed to write to {} at offset {offset}: {source}", path.display())]
    TargetWrite {
        path: PathBuf,
        offset: u64,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read back {} at offset {offset}: {source}", path.display())]
    TargetRead {
        path: PathBuf,
        offset: u64,
        #[source]
        source: io::Error,
    },

    #[error("Target {} ended after {actual} of {expected} bytes", path.display())]
    ShortRead {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error("Verification failed: hash mismatch (image {expected}, device {actual})")]
    HashMismatch {
        expected: SourceHash,
        actual: SourceHash,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Coarse classification of a [`FlashError`], letting a front-end tell an
/// unusable device apart from corrupted data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Enumeration,
    Unmount,
    /// The source could not be read or the target could not be written.
    WriteIo,
    /// The target could not be read back during verification.
    ReadIo,
    HashMismatch,
    Config,
}

impl FlashError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FlashError::Enumeration(_) => ErrorKind::Enumeration,
            FlashError::Unmount { .. } => ErrorKind::Unmount,
            FlashError::SourceRead { .. }
            | FlashError::SourceChanged { .. }
            | FlashError::TargetOpen { .. }
            | FlashError::TargetTooSmall { .. }
            | FlashError::TargetWrite { .. } => ErrorKind::WriteIo,
            FlashError::TargetRead { .. } | FlashError::ShortRead { .. } => ErrorKind::ReadIo,
            FlashError::HashMismatch { .. } => ErrorKind::HashMismatch,
            FlashError::InvalidConfig(_) => ErrorKind::Config,
        }
    }

    /// `true` when the session failed because the bytes on the device differ
    /// from the image, as opposed to an I/O failure.
    pub fn is_mismatch(&self) -> bool {
        self.kind() == ErrorKind::HashMismatch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_separate_io_from_corruption() {
        let write = FlashError::TargetWrite {
            path: PathBuf::from("/dev/sdz"),
            offset: 0,
            source: io::Error::from(io::ErrorKind::BrokenPipe),
        };
        let read = FlashError::ShortRead {
            path: PathBuf::from("/dev/sdz"),
            expected: 10,
            actual: 4,
        };
        let mismatch = FlashError::HashMismatch {
            expected: SourceHash::from_bytes([0; 32]),
            actual: SourceHash::from_bytes([1; 32]),
        };

        assert_eq!(write.kind(), ErrorKind::WriteIo);
        assert_eq!(read.kind(), ErrorKind::ReadIo);
        assert!(mismatch.is_mismatch());
        assert!(!write.is_mismatch());
    }

    #[test]
    fn messages_name_the_device() {
        let err = FlashError::TargetTooSmall {
            path: PathBuf::from("/dev/sdz"),
            capacity: 1024,
            required: 2048,
        };
        let msg = err.to_string();
        assert!(msg.contains("/dev/sdz"));
        assert!(msg.contains("2048"));
    }
}
