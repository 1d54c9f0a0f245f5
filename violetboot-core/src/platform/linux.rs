use log::debug;
use nix::fcntl::{PosixFadviseAdvice, posix_fadvise};
use nix::ioctl_read;
use nix::mount::{MntFlags, umount2};
use std::fs::File;
use std::io;
use std::os::unix::fs::FileTypeExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{FlashError, Result};
use crate::release::MountOps;

ioctl_read!(blkgetsize64, 0x12, 114, u64);

/// Columns requested from `lsblk`. `-b` makes SIZE a plain byte count.
const LSBLK_COLUMNS: &str = "NAME,PATH,SIZE,TYPE,TRAN,MODEL,RM";

/// Runs `lsblk` in JSON mode and returns its raw stdout.
pub fn lsblk_json() -> Result<String> {
    let output = Command::new("lsblk")
        .args(["-J", "-b", "-o", LSBLK_COLUMNS])
        .output()
        .map_err(|e| FlashError::Enumeration(format!("failed to run lsblk: {e}")))?;

    if !output.status.success() {
        return Err(FlashError::Enumeration(format!(
            "lsblk exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    String::from_utf8(output.stdout)
        .map_err(|e| FlashError::Enumeration(format!("lsblk printed invalid UTF-8: {e}")))
}

/// Helper to find the parent device of a partition (e.g., /dev/sda1 -> /dev/sda).
fn parent_device_path(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();

    if path_str.starts_with("/dev/sd") || path_str.starts_with("/dev/vd") {
        if let Some(index) = path_str.rfind(|c: char| c.is_alphabetic()) {
            return PathBuf::from(&path_str[..=index]);
        }
    } else if path_str.starts_with("/dev/mmcblk") || path_str.starts_with("/dev/nvme") {
        if let Some(index) = path_str.rfind('p') {
            if index > "/dev/".len() && path_str[index + 1..].chars().all(|c| c.is_ascii_digit())
            {
                return PathBuf::from(&path_str[..index]);
            }
        }
    }

    path.to_path_buf()
}

/// Finds the whole disk that hosts the root filesystem, so it can never be
/// offered as a flashing target.
pub fn system_disk() -> Option<PathBuf> {
    let disks = sysinfo::Disks::new_with_refreshed_list();
    let root = disks
        .iter()
        .find(|disk| disk.mount_point() == Path::new("/"))?;

    let name = PathBuf::from(root.name());
    let path = if name.is_absolute() {
        name
    } else {
        PathBuf::from("/dev/").join(name)
    };
    let parent = parent_device_path(&path);
    debug!("System disk is {}", parent.display());
    Some(parent)
}

/// Returns the capacity of `file` if it is a block device.
///
/// Regular files have no fixed capacity and yield `None`.
pub fn block_device_capacity(file: &File) -> io::Result<Option<u64>> {
    if !file.metadata()?.file_type().is_block_device() {
        return Ok(None);
    }

    let mut size_bytes: u64 = 0;
    // SAFETY: BLKGETSIZE64 writes a single u64 into the pointer we pass.
    unsafe {
        blkgetsize64(file.as_raw_fd(), &mut size_bytes).map_err(io::Error::from)?;
    }
    Ok(Some(size_bytes))
}

/// Evicts the cached pages of a block device so later reads hit the medium.
///
/// Only clean pages are dropped, so call this after the device was synced.
/// Regular files are left alone.
pub fn drop_cached_pages(file: &File) -> io::Result<()> {
    if !file.metadata()?.file_type().is_block_device() {
        return Ok(());
    }
    posix_fadvise(file, 0, 0, PosixFadviseAdvice::POSIX_FADV_DONTNEED).map_err(io::Error::from)
}

/// Flushes every dirty buffer in the system to stable storage.
pub fn sync_all_filesystems() {
    nix::unistd::sync();
}

/// The live mount table, read through `lsblk` and changed with `umount2`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemMounts;

impl MountOps for SystemMounts {
    fn mount_points(&self, device: &Path) -> io::Result<Vec<PathBuf>> {
        let output = Command::new("lsblk")
            .args(["-lnpo", "MOUNTPOINT"])
            .arg(device)
            .output()?;

        if !output.status.success() {
            return Err(io::Error::other(format!(
                "lsblk exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('['))
            .map(PathBuf::from)
            .collect())
    }

    fn unmount(&self, mount_point: &Path) -> io::Result<()> {
        umount2(mount_point, MntFlags::MNT_FORCE | MntFlags::MNT_DETACH).map_err(io::Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_paths_map_to_their_disk() {
        assert_eq!(parent_device_path(Path::new("/dev/sda1")), Path::new("/dev/sda"));
        assert_eq!(
            parent_device_path(Path::new("/dev/nvme0n1p2")),
            Path::new("/dev/nvme0n1")
        );
        assert_eq!(
            parent_device_path(Path::new("/dev/mmcblk0p1")),
            Path::new("/dev/mmcblk0")
        );
        assert_eq!(parent_device_path(Path::new("/dev/sdb")), Path::new("/dev/sdb"));
    }

    #[test]
    fn regular_files_have_no_capacity() {
        let file = tempfile::tempfile().unwrap();
        assert_eq!(block_device_capacity(&file).unwrap(), None);
    }

    #[test]
    fn dropping_cache_skips_regular_files() {
        let file = tempfile::tempfile().unwrap();
        drop_cached_pages(&file).unwrap();
    }
}
