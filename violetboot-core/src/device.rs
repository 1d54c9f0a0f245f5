use bytesize::ByteSize;
use std::fmt;
use std::path::PathBuf;

/// Bus a block device is attached through, as reported by the kernel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transport {
    Usb,
    /// SD/MMC card readers.
    Mmc,
    Other(String),
}

impl Transport {
    pub fn from_tran(tran: &str) -> Self {
        match tran.to_ascii_lowercase().as_str() {
            "usb" => Transport::Usb,
            "mmc" => Transport::Mmc,
            other => Transport::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Usb => f.write_str("usb"),
            Transport::Mmc => f.write_str("mmc"),
            Transport::Other(name) => f.write_str(name),
        }
    }
}

/// A removable whole-disk block device discovered on the system.
///
/// Values are snapshots taken at enumeration time. If the hardware is
/// unplugged the struct goes stale; nothing here tracks that.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockDevice {
    /// The device node (e.g., `/dev/sdb`).
    pub path: PathBuf,
    /// The kernel-provided name of the device (e.g., "sdb").
    pub name: String,
    /// Vendor model string, if the kernel reports one.
    pub model: Option<String>,
    /// Total capacity in bytes.
    pub size_bytes: u64,
    pub transport: Transport,
    /// Human-readable "model (size) - path" label for pickers.
    pub display_label: String,
}

impl BlockDevice {
    pub fn new(
        path: PathBuf,
        name: String,
        model: Option<String>,
        size_bytes: u64,
        transport: Transport,
    ) -> Self {
        let display_label = format!(
            "{} ({}) - {}",
            model.as_deref().unwrap_or("USB"),
            ByteSize(size_bytes),
            path.display()
        );
        Self {
            path,
            name,
            model,
            size_bytes,
            transport,
            display_label,
        }
    }
}

impl fmt::Display for BlockDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_falls_back_to_usb_without_model() {
        let dev = BlockDevice::new(
            PathBuf::from("/dev/sdb"),
            "sdb".into(),
            None,
            8_000_000_000,
            Transport::Usb,
        );
        assert!(dev.display_label.starts_with("USB ("));
        assert!(dev.display_label.ends_with(") - /dev/sdb"));
        assert_eq!(dev.to_string(), dev.display_label);
    }

    #[test]
    fn transport_parsing_is_case_insensitive() {
        assert_eq!(Transport::from_tran("USB"), Transport::Usb);
        assert_eq!(Transport::from_tran("mmc"), Transport::Mmc);
        assert_eq!(Transport::from_tran("sata"), Transport::Other("sata".into()));
    }
}
