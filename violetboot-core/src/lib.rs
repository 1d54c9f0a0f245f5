//! The core, UI-agnostic engine for the `violetboot` media flasher.
//!
//! `violetboot-core` can back any front-end, whether it's a command-line
//! interface (like `violetboot`) or a graphical one. It finds removable
//! drives, releases their mounts, streams an image onto them sector for sector
//! and verifies the result.
//!
//! The library is structured into several key modules:
//! - [`enumerate`]: Lists removable whole-disk devices as [`BlockDevice`]s.
//! - [`release`]: Force-unmounts everything on a target device.
//! - [`mod@write`]: Streams an image onto a device, hashing as it goes.
//! - [`verify`]: Reads the device back and compares hashes.
//! - [`session`]: Orchestrates the above and reports progress as messages.
//! - [`platform`]: The OS-specific pieces (`lsblk`, `umount2`, ioctls).
//!
//! The primary entry points are [`Session`] for callers that want the raw
//! event stream, and [`flash_image`] for callers that prefer callbacks.
//!
//! ## Example: Flashing an Image with Progress Reporting
//!
//! ```rust,no_run
//! use std::sync::mpsc;
//! use std::thread;
//! use violetboot_core::{FlashConfig, FlashEvent, Session, list_removable_devices};
//!
//! fn main() -> violetboot_core::Result<()> {
//!     let devices = list_removable_devices();
//!     let device = devices.first().expect("No removable devices found.");
//!
//!     let session = Session::new("path/to/image.iso", &device.path, FlashConfig::default())?;
//!     let (tx, rx) = mpsc::channel();
//!     let worker = thread::spawn(move || session.with_events(tx).run());
//!
//!     for event in rx {
//!         match event {
//!             FlashEvent::Status(phase) => println!("{phase}"),
//!             FlashEvent::Progress(p) => println!("{:.0}%", p.fraction() * 100.0),
//!         }
//!     }
//!
//!     let report = worker.join().expect("worker panicked")?;
//!     println!("Wrote {} bytes", report.bytes_written);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod device;
pub mod enumerate;
pub mod error;
pub mod hash;
pub mod image;
pub mod platform;
pub mod progress;
pub mod release;
pub mod session;
pub mod verify;
pub mod write;

pub use config::{DEFAULT_CHUNK_SIZE, FlashConfig};
pub use device::{BlockDevice, Transport};
pub use enumerate::{list_removable_devices, try_list_removable_devices};
pub use error::{ErrorKind, FlashError, Result};
pub use hash::SourceHash;
pub use image::ImageSource;
pub use progress::{FlashEvent, Phase, ProgressEvent};
pub use release::{DeviceReleaser, MountOps};
pub use session::{FlashReport, Session, flash_image, flash_session};
pub use verify::{DeviceReadBack, ReadBack, Verification, Verifier};
pub use write::{CopyOutcome, StreamingWriter};
