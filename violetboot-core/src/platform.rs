//! Provides platform-specific functionality.
//!
//! This module holds everything that talks to the operating system directly:
//! querying the block-device registry, reading and changing the mount table,
//! asking the kernel for a device's capacity and flushing its caches.
//!
//! It uses conditional compilation (`#[cfg]`) to expose the correct
//! implementation for the target OS. Each submodule exposes the same API, so the
//! engine can use it without caring which one is compiled in.

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub use self::linux::*;

#[cfg(not(target_os = "linux"))]
mod unsupported;
#[cfg(not(target_os = "linux"))]
pub use self::unsupported::*;
