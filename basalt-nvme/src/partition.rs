//! MBR partition table support
//!
//! Reads logical block 0 through the [`BlockDevice`] interface, decodes
//! the classic Master Boot Record, and exposes the four primary entries.
//! A device without the boot signature simply yields an empty table.

use zerocopy::byteorder::{LittleEndian, U16, U32};
use zerocopy::{FromBytes, Immutable, KnownLayout, Unaligned};

use crate::device::{BlockDevice, LBA_SIZE};
use crate::error::NvmeError;

/// MBR boot signature at offset 510.
const BOOT_SIGNATURE: u16 = 0xAA55;

/// One primary partition entry (16 bytes on disk).
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, Immutable, KnownLayout, Unaligned)]
#[allow(dead_code)]
struct RawEntry {
    status: u8,
    first_chs: [u8; 3],
    part_type: u8,
    last_chs: [u8; 3],
    first_lba: U32<LittleEndian>,
    sector_count: U32<LittleEndian>,
}

/// The Master Boot Record (logical block 0).
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, Immutable, KnownLayout, Unaligned)]
#[allow(dead_code)]
struct RawMbr {
    boot_code: [u8; 446],
    partitions: [RawEntry; 4],
    boot_signature: U16<LittleEndian>,
}

const _: () = assert!(core::mem::size_of::<RawMbr>() == LBA_SIZE);

/// One decoded partition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PartitionInfo {
    /// Partition type byte.
    pub part_type: u8,
    /// First logical block of the partition.
    pub first_lba: u64,
    /// Number of logical blocks.
    pub block_count: u64,
}

/// The four primary slots of an MBR, decoded.
pub struct PartitionTable {
    slots: [Option<PartitionInfo>; 4],
}

impl PartitionTable {
    /// Read block 0 of `dev` and decode its partition table.
    ///
    /// A missing boot signature yields an empty table; only I/O errors
    /// propagate.
    pub fn scan<D: BlockDevice>(dev: &mut D) -> Result<Self, NvmeError> {
        let mut sector = [0u8; LBA_SIZE];
        dev.seek(0);
        dev.read(&mut sector)?;

        Ok(Self::from_sector(&sector))
    }

    /// Decode a partition table from an in-memory boot sector.
    #[must_use]
    pub fn from_sector(sector: &[u8; LBA_SIZE]) -> Self {
        let mut slots = [None; 4];

        // The sector is exactly one MBR by construction.
        let Ok(mbr) = RawMbr::read_from_bytes(sector.as_slice()) else {
            return Self { slots };
        };
        if mbr.boot_signature.get() != BOOT_SIGNATURE {
            log::debug!("No MBR boot signature, treating device as unpartitioned");
            return Self { slots };
        }

        for (slot, raw) in slots.iter_mut().zip(mbr.partitions.iter()) {
            let count = raw.sector_count.get();
            if raw.part_type != 0 && count != 0 {
                *slot = Some(PartitionInfo {
                    part_type: raw.part_type,
                    first_lba: u64::from(raw.first_lba.get()),
                    block_count: u64::from(count),
                });
            }
        }

        Self { slots }
    }

    /// Iterate over populated slots as `(index, info)`.
    pub fn entries(&self) -> impl Iterator<Item = (usize, &PartitionInfo)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|info| (i, info)))
    }

    /// The entry in `slot` (0-based), if populated.
    #[must_use]
    pub fn get(&self, slot: usize) -> Option<&PartitionInfo> {
        self.slots.get(slot)?.as_ref()
    }

    /// Whether no slot is populated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }
}

/// A window onto one partition of an underlying block device.
///
/// Seeks are partition-relative; transfers that would leave the
/// partition fail with [`NvmeError::LbaRange`]. The view borrows the
/// device, so it cannot outlive the driver it reads through.
pub struct Partition<'a, D: BlockDevice> {
    dev: &'a mut D,
    first_byte: u64,
    byte_count: u64,
    offset: u64,
}

impl<'a, D: BlockDevice> Partition<'a, D> {
    /// Create a view of `info` on `dev`.
    #[must_use]
    pub fn new(dev: &'a mut D, info: &PartitionInfo) -> Self {
        Self {
            dev,
            first_byte: info.first_lba * LBA_SIZE as u64,
            byte_count: info.block_count * LBA_SIZE as u64,
            offset: 0,
        }
    }

    fn check_window(&self, count: usize) -> Result<(), NvmeError> {
        if self.offset + count as u64 > self.byte_count {
            return Err(NvmeError::LbaRange);
        }
        Ok(())
    }
}

impl<D: BlockDevice> BlockDevice for Partition<'_, D> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, NvmeError> {
        self.check_window(buf.len())?;
        self.dev.seek(self.first_byte + self.offset);
        let n = self.dev.read(buf)?;
        self.offset += n as u64;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, NvmeError> {
        self.check_window(buf.len())?;
        self.dev.seek(self.first_byte + self.offset);
        let n = self.dev.write(buf)?;
        self.offset += n as u64;
        Ok(n)
    }

    fn seek(&mut self, offset: u64) -> u64 {
        self.offset = offset;
        offset
    }

    fn size(&self) -> u64 {
        self.byte_count
    }

    fn ioctl(&mut self, cmd: u32) -> Result<(), NvmeError> {
        self.dev.ioctl(cmd)
    }
}
