//! Physical Region Page (PRP) construction
//!
//! NVMe describes a data buffer with two 64-bit pointers:
//!
//! - `PRP1`: bus address of the first byte (offset within page preserved)
//! - `PRP2`: zero if the transfer fits the first page, the bus address of
//!   the second page if it fits two, otherwise the bus address of a list
//!   page holding one 8-byte entry per further page
//!
//! The buffer is treated as virtually contiguous mapping to physically
//! contiguous pages; the platform guarantees this for coherent and
//! kernel-mapped memory, and the builder does not verify it.

use spin::Mutex;

use crate::dma::{DmaBlock, PAGE_SIZE, SharedMemAllocator};
use crate::error::NvmeError;
use crate::platform::PcieBridge;

/// Bytes per PRP list entry.
const PRP_ENTRY_SIZE: usize = 8;

/// PRP entries that fit one list page.
const ENTRIES_PER_PAGE: usize = PAGE_SIZE / PRP_ENTRY_SIZE;

/// The PRP descriptor pair for one command, plus the list page backing it
/// when the transfer spans more than two controller pages.
///
/// The list page is returned to the allocator when the set is dropped, so
/// it lives exactly as long as the command that consumes it.
pub struct PrpSet<'a> {
    prp1: u64,
    prp2: u64,
    list: Option<DmaBlock<'a>>,
}

impl<'a> PrpSet<'a> {
    /// Build descriptors covering `len` bytes at `buffer`.
    ///
    /// `len` must be non-zero; the caller validates that. Fails with
    /// [`NvmeError::NoResource`] when a required list page cannot be
    /// allocated.
    pub fn build<B: PcieBridge>(
        allocator: &'a Mutex<SharedMemAllocator>,
        bridge: &B,
        buffer: *const u8,
        len: usize,
    ) -> Result<Self, NvmeError> {
        debug_assert!(!buffer.is_null());
        debug_assert!(len > 0);

        let buf = buffer as usize;
        let prp1 = bridge.dma_address(buf);

        let first_remain = PAGE_SIZE - (buf & (PAGE_SIZE - 1));
        if len <= first_remain {
            return Ok(Self {
                prp1,
                prp2: 0,
                list: None,
            });
        }

        let second_page = (buf & !(PAGE_SIZE - 1)) + PAGE_SIZE;
        let remaining = len - first_remain;
        if remaining <= PAGE_SIZE {
            return Ok(Self {
                prp1,
                prp2: bridge.dma_address(second_page),
                list: None,
            });
        }

        let needed = remaining.div_ceil(PAGE_SIZE);
        let list_pages = needed.div_ceil(ENTRIES_PER_PAGE);
        let mut list = DmaBlock::new(allocator, list_pages * PAGE_SIZE, PAGE_SIZE)
            .ok_or(NvmeError::NoResource)?;
        list.zero();

        let entries = list.as_ptr() as *mut u64;
        for i in 0..needed {
            let page = second_page + i * PAGE_SIZE;
            // SAFETY: The list block holds at least `needed` entries.
            unsafe {
                entries.add(i).write(bridge.dma_address(page));
            }
        }

        let prp2 = bridge.dma_address(list.addr());
        Ok(Self {
            prp1,
            prp2,
            list: Some(list),
        })
    }

    /// The PRP1 value.
    #[inline]
    #[must_use]
    pub const fn prp1(&self) -> u64 {
        self.prp1
    }

    /// The PRP2 value.
    #[inline]
    #[must_use]
    pub const fn prp2(&self) -> u64 {
        self.prp2
    }

    /// Whether a list page backs this set.
    #[inline]
    #[must_use]
    pub const fn has_list(&self) -> bool {
        self.list.is_some()
    }
}
