use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{FlashError, Result};

/// The image being flashed. Its size is captured once and must hold for the
/// whole session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageSource {
    pub path: PathBuf,
    pub size_bytes: u64,
}

impl ImageSource {
    /// Stats `path` and records its current length.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = fs::metadata(&path).map_err(|source| FlashError::SourceRead {
            path: path.clone(),
            source,
        })?;

        if !metadata.is_file() {
            return Err(FlashError::SourceRead {
                path,
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "image is not a regular file",
                ),
            });
        }

        Ok(Self {
            path,
            size_bytes: metadata.len(),
        })
    }

    /// Fails with [`FlashError::SourceChanged`] if the file on disk no longer
    /// has the length recorded by [`ImageSource::open`].
    pub fn ensure_unchanged(&self) -> Result<()> {
        let actual = fs::metadata(&self.path)
            .map_err(|source| FlashError::SourceRead {
                path: self.path.clone(),
                source,
            })?
            .len();

        if actual != self.size_bytes {
            return Err(FlashError::SourceChanged {
                path: self.path.clone(),
                expected: self.size_bytes,
                actual,
            });
        }
        Ok(())
    }
}
