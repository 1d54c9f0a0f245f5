//! Stand-ins for operating systems without a block-device backend yet.
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{FlashError, Result};
use crate::release::MountOps;

pub fn lsblk_json() -> Result<String> {
    Err(FlashError::Enumeration(
        "device discovery is only implemented for Linux".to_string(),
    ))
}

pub fn system_disk() -> Option<PathBuf> {
    None
}

pub fn block_device_capacity(_file: &File) -> io::Result<Option<u64>> {
    Ok(None)
}

pub fn drop_cached_pages(_file: &File) -> io::Result<()> {
    Ok(())
}

pub fn sync_all_filesystems() {}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemMounts;

impl MountOps for SystemMounts {
    fn mount_points(&self, _device: &Path) -> io::Result<Vec<PathBuf>> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "mount discovery is only implemented for Linux",
        ))
    }

    fn unmount(&self, _mount_point: &Path) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "unmounting is only implemented for Linux",
        ))
    }
}
