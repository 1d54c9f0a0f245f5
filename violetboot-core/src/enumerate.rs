//! Discovery of removable whole-disk block devices.
//!
//! The kernel's view of block devices is read through `lsblk -J` and parsed
//! into typed records. Listing is best-effort: a front-end must stay usable
//! even on a machine where `lsblk` is missing or prints something unexpected,
//! so [`list_removable_devices`] logs failures and returns an empty list.
use log::{debug, warn};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::device::{BlockDevice, Transport};
use crate::error::{FlashError, Result};
use crate::platform;

#[derive(Debug, Deserialize)]
struct LsblkOutput {
    blockdevices: Vec<LsblkEntry>,
}

#[derive(Debug, Deserialize)]
struct LsblkEntry {
    name: String,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    size: Option<NumberOrText>,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    tran: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    rm: Option<Flag>,
}

/// Recent `lsblk` releases print numbers, older ones print strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(u64),
    Text(String),
}

impl NumberOrText {
    fn to_u64(&self) -> Result<u64> {
        match self {
            NumberOrText::Number(n) => Ok(*n),
            NumberOrText::Text(s) => s.trim().parse().map_err(|_| {
                FlashError::Enumeration(format!("lsblk reported a non-numeric size {s:?}"))
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Text(String),
}

impl Flag {
    fn is_set(&self) -> bool {
        match self {
            Flag::Bool(b) => *b,
            Flag::Text(s) => s.trim() == "1",
        }
    }
}

impl LsblkEntry {
    fn is_removable_disk(&self) -> bool {
        if self.kind != "disk" {
            return false;
        }
        let removable_flag = self.rm.as_ref().is_some_and(Flag::is_set);
        match self.tran.as_deref().map(Transport::from_tran) {
            Some(Transport::Usb) => true,
            Some(Transport::Mmc) => removable_flag,
            _ => false,
        }
    }

    fn into_device(self, size_bytes: u64) -> BlockDevice {
        let path = self
            .path
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/dev/").join(&self.name));
        let model = self
            .model
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty());
        let transport = Transport::from_tran(self.tran.as_deref().unwrap_or_default());
        BlockDevice::new(path, self.name, model, size_bytes, transport)
    }
}

/// Parses `lsblk -J -b` output into the removable whole disks it lists.
///
/// Partitions, non-removable transports, zero-sized disks (empty card
/// readers) and the `exclude` disk are dropped. Any structural problem in the
/// JSON is an [`FlashError::Enumeration`].
pub fn parse_lsblk(json: &str, exclude: Option<&Path>) -> Result<Vec<BlockDevice>> {
    let output: LsblkOutput = serde_json::from_str(json)
        .map_err(|e| FlashError::Enumeration(format!("malformed lsblk output: {e}")))?;

    let mut devices = Vec::new();
    for entry in output.blockdevices {
        if !entry.is_removable_disk() {
            continue;
        }

        let size_bytes = match &entry.size {
            Some(size) => size.to_u64()?,
            None => 0,
        };
        if size_bytes == 0 {
            debug!("Skipping {}: reports zero size", entry.name);
            continue;
        }

        let device = entry.into_device(size_bytes);
        if exclude.is_some_and(|system| system == device.path) {
            debug!("Skipping {}: hosts the root filesystem", device.path.display());
            continue;
        }
        devices.push(device);
    }

    Ok(devices)
}

/// Queries the system for removable devices, reporting failures.
pub fn try_list_removable_devices() -> Result<Vec<BlockDevice>> {
    let json = platform::lsblk_json()?;
    parse_lsblk(&json, platform::system_disk().as_deref())
}

/// Lists removable whole-disk devices. Never fails; see the module docs.
pub fn list_removable_devices() -> Vec<BlockDevice> {
    list_with(platform::lsblk_json, platform::system_disk())
}

fn list_with<F>(query: F, exclude: Option<PathBuf>) -> Vec<BlockDevice>
where
    F: FnOnce() -> Result<String>,
{
    match query().and_then(|json| parse_lsblk(&json, exclude.as_deref())) {
        Ok(devices) => {
            debug!("Found {} removable devices", devices.len());
            devices
        }
        Err(e) => {
            warn!("{e}");
            Vec::new()
        }
    }
}
