//! PCIe NVMe Block-Device Driver
//!
//! Brings an NVMe controller from cold reset to serving 512-byte logical
//! blocks of namespace 1 through a single I/O queue pair, and exposes the
//! result as a byte-addressable, seekable [`BlockDevice`].
//!
//! The driver is single-threaded cooperative: one outstanding command per
//! queue, callers serialise block operations externally. Two wait modes
//! are chosen at build time: busy-wait polling (default) or
//! interrupt-driven completion (feature `irq`).
//!
//! Platform services (PCIe bridge, tick clock, cache maintenance, device
//! registry) are injected through the traits in [`platform`]; nothing here
//! reaches for globals.
//!
//! # Supported configuration
//!
//! - NVMe 1.3 / 1.4 controllers
//! - one namespace (NSID 1), 512-byte LBA format, no metadata
//! - one I/O queue pair with 64 entries, 4 KiB controller pages
//!
//! # Example
//!
//! ```ignore
//! use basalt_nvme::{BlockDevice, DmaWindow, NvmeDevice};
//!
//! let window = DmaWindow { start: coherent_base, end: coherent_base + 2 * 4096 };
//! let mut nvme = NvmeDevice::new(platform, window);
//! nvme.initialize(&mut registry)?;
//!
//! nvme.seek(0);
//! nvme.read(&mut sector)?;
//! ```

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

pub mod command;
pub mod controller;
pub mod device;
pub mod dma;
pub mod error;
pub mod identify;
pub mod partition;
pub mod platform;
pub mod prp;
pub mod queue;

#[cfg(feature = "irq")]
pub mod event;

#[cfg(test)]
pub(crate) mod mock;

pub use controller::NvmeDevice;
pub use device::{BlockDevice, IOCTL_SYNC, LBA_SIZE};
pub use dma::DmaWindow;
pub use error::NvmeError;
pub use platform::{CacheMaintenance, DeviceRegistry, PcieBridge, Platform, Timer};

#[cfg(feature = "irq")]
pub use platform::{InterruptMux, IrqHandler};
