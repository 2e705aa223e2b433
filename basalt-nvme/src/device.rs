//! Block-device contract
//!
//! The surface the driver offers upward: byte-addressable, seekable,
//! fixed-size logical blocks. Offsets and transfer counts must be
//! multiples of the 512-byte logical block.

use crate::error::NvmeError;

/// The only supported logical block size, in bytes.
pub const LBA_SIZE: usize = 512;

/// ioctl: make the contents of the volatile write cache non-volatile.
pub const IOCTL_SYNC: u32 = 1;

/// A seekable block device.
pub trait BlockDevice {
    /// Read `buf.len()` bytes at the current offset.
    ///
    /// Returns the number of bytes read. The offset and length must be
    /// multiples of [`LBA_SIZE`]; the buffer should be cache aligned for
    /// best performance (the driver bounces it otherwise).
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, NvmeError>;

    /// Write `buf.len()` bytes at the current offset.
    ///
    /// Returns the number of bytes written. Same alignment rules as
    /// [`BlockDevice::read`].
    fn write(&mut self, buf: &[u8]) -> Result<usize, NvmeError>;

    /// Set the byte offset for the next transfer. Returns the new offset.
    fn seek(&mut self, offset: u64) -> u64;

    /// Total byte size of the device.
    fn size(&self) -> u64;

    /// Device control. Only [`IOCTL_SYNC`] is supported; any other
    /// command fails with [`NvmeError::BadParam`].
    fn ioctl(&mut self, cmd: u32) -> Result<(), NvmeError>;
}
