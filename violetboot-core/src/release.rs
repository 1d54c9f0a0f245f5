//! Releasing a device from the mount table before it is overwritten.
use log::{info, warn};
use std::io;
use std::path::{Path, PathBuf};

use crate::error::FlashError;
use crate::platform::SystemMounts;

/// Access to the mount table.
pub trait MountOps {
    /// Return every active mount point on `device` or its partitions.
    fn mount_points(&self, device: &Path) -> io::Result<Vec<PathBuf>>;

    /// Force-unmount a single mount point.
    fn unmount(&self, mount_point: &Path) -> io::Result<()>;
}

/// Unmounts everything living on a device so the session has it to itself.
pub struct DeviceReleaser {
    mounts: Box<dyn MountOps + Send>,
}

impl Default for DeviceReleaser {
    fn default() -> Self {
        Self::new(SystemMounts)
    }
}

impl DeviceReleaser {
    pub fn new(mounts: impl MountOps + Send + 'static) -> Self {
        Self {
            mounts: Box::new(mounts),
        }
    }

    /// Force-unmounts every mount point on `device`.
    ///
    /// The sweep keeps going after an individual failure, logging it. Returns
    /// `false` when the mount table could not be read or something is still
    /// mounted afterwards. A device with nothing mounted is a no-op returning
    /// `true`.
    pub fn release(&self, device: &Path) -> bool {
        let mount_points = match self.mounts.mount_points(device) {
            Ok(mps) => mps,
            Err(e) => {
                warn!("Could not list mounts on {}: {e}", device.display());
                return false;
            }
        };

        if mount_points.is_empty() {
            return true;
        }

        for mount_point in &mount_points {
            info!("Unmounting {}", mount_point.display());
            if let Err(source) = self.mounts.unmount(mount_point) {
                let err = FlashError::Unmount {
                    mount_point: mount_point.clone(),
                    source,
                };
                warn!("{err}");
            }
        }

        match self.mounts.mount_points(device) {
            Ok(remaining) if remaining.is_empty() => true,
            Ok(remaining) => {
                warn!(
                    "{} still has {} active mount(s) after release",
                    device.display(),
                    remaining.len()
                );
                false
            }
            Err(e) => {
                warn!("Could not re-check mounts on {}: {e}", device.display());
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    /// In-memory mount table. Mount points listed in `stuck` refuse to go.
    #[derive(Clone, Default)]
    struct FakeMounts {
        mounted: Arc<Mutex<Vec<PathBuf>>>,
        stuck: HashSet<PathBuf>,
        unmount_calls: Arc<Mutex<usize>>,
        broken: bool,
    }

    impl FakeMounts {
        fn with(mounts: &[&str]) -> Self {
            Self {
                mounted: Arc::new(Mutex::new(mounts.iter().map(PathBuf::from).collect())),
                ..Self::default()
            }
        }
    }

    impl MountOps for FakeMounts {
        fn mount_points(&self, _device: &Path) -> io::Result<Vec<PathBuf>> {
            if self.broken {
                return Err(io::Error::from(io::ErrorKind::NotFound));
            }
            Ok(self.mounted.lock().unwrap().clone())
        }

        fn unmount(&self, mount_point: &Path) -> io::Result<()> {
            *self.unmount_calls.lock().unwrap() += 1;
            if self.stuck.contains(mount_point) {
                return Err(io::Error::from(io::ErrorKind::ResourceBusy));
            }
            self.mounted.lock().unwrap().retain(|mp| mp != mount_point);
            Ok(())
        }
    }

    #[test]
    fn unmounts_every_partition() {
        let fake = FakeMounts::with(&["/media/usb1", "/media/usb2"]);
        let releaser = DeviceReleaser::new(fake.clone());

        assert!(releaser.release(Path::new("/dev/sdb")));
        assert!(fake.mounted.lock().unwrap().is_empty());
        assert_eq!(*fake.unmount_calls.lock().unwrap(), 2);
    }

    #[test]
    fn release_is_idempotent() {
        let fake = FakeMounts::with(&["/media/usb1"]);
        let releaser = DeviceReleaser::new(fake.clone());

        assert!(releaser.release(Path::new("/dev/sdb")));
        assert!(releaser.release(Path::new("/dev/sdb")));
        assert_eq!(*fake.unmount_calls.lock().unwrap(), 1);
    }

    #[test]
    fn sweep_continues_past_a_stuck_mount() {
        let mut fake = FakeMounts::with(&["/media/a", "/media/b", "/media/c"]);
        fake.stuck.insert(PathBuf::from("/media/b"));
        let releaser = DeviceReleaser::new(fake.clone());

        assert!(!releaser.release(Path::new("/dev/sdb")));
        assert_eq!(*fake.unmount_calls.lock().unwrap(), 3);
        assert_eq!(
            *fake.mounted.lock().unwrap(),
            vec![PathBuf::from("/media/b")]
        );
    }

    #[test]
    fn unreadable_mount_table_is_not_released() {
        let fake = FakeMounts {
            broken: true,
            ..FakeMounts::default()
        };
        assert!(!DeviceReleaser::new(fake).release(Path::new("/dev/sdb")));
    }
}
