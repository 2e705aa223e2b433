//! DMA Region Allocator
//!
//! Carves controller-visible buffers out of a coherent memory window. Two
//! paths:
//!
//! - **Recycle**: freed blocks matching the canonical page spec
//!   (4 KiB size, 4 KiB alignment, 1 MiB boundary) go on a free list and
//!   are handed out again first.
//! - **Bump**: otherwise the cursor advances past a block header, rounds
//!   up to the requested alignment, and rounds up to the requested
//!   power-of-two boundary if the block would cross it.
//!
//! Every allocation is preceded by a [`BlockHeader`] carrying a magic word
//! and the block's nominal spec. Freed blocks that do not match the
//! canonical spec are logged and leaked; callers of such one-shot buffers
//! must treat them as living until the driver goes away.

use core::ptr::NonNull;

use spin::Mutex;

/// The only supported controller page size.
pub const PAGE_SIZE: usize = 4096;

/// Canonical recycled block size.
pub const BLOCK_SIZE: usize = PAGE_SIZE;
/// Canonical recycled block alignment.
pub const BLOCK_ALIGN: usize = PAGE_SIZE;
/// Canonical recycled block boundary. Not mandated by NVMe; chosen so a
/// block never straddles a 1 MiB line.
pub const BLOCK_BOUNDARY: usize = 0x10_0000;

/// "NVME"
const BLOCK_MAGIC: u32 = 0x4E56_4D45;

/// Header preceding every allocation.
#[repr(C)]
struct BlockHeader {
    magic: u32,
    size: u32,
    align: u32,
    boundary: u32,
    next: *mut BlockHeader,
}

const HEADER_SIZE: usize = core::mem::size_of::<BlockHeader>();

/// The coherent byte interval `[start, end)` handed to the allocator.
#[derive(Clone, Copy, Debug)]
pub struct DmaWindow {
    /// First usable byte.
    pub start: usize,
    /// One past the last usable byte.
    pub end: usize,
}

/// Bump allocator with page-block recycling over a coherent window.
pub struct SharedMemAllocator {
    cursor: usize,
    end: usize,
    free_list: *mut BlockHeader,
}

// SAFETY: The raw free-list pointers all point into the window the caller
// vouched for at construction; the allocator is used behind a lock.
unsafe impl Send for SharedMemAllocator {}

impl SharedMemAllocator {
    /// Create an allocator over `window`.
    ///
    /// # Safety
    ///
    /// The window must be mapped, coherent with respect to the device,
    /// and exclusively owned by this allocator.
    #[must_use]
    pub unsafe fn new(window: DmaWindow) -> Self {
        debug_assert!(window.start != 0);
        debug_assert!(window.end > window.start);
        Self {
            cursor: window.start,
            end: window.end,
            free_list: core::ptr::null_mut(),
        }
    }

    /// Bytes remaining in the bump region.
    #[must_use]
    pub fn free_space(&self) -> usize {
        self.end.saturating_sub(self.cursor)
    }

    /// Allocate `size` bytes at `align`, not crossing `boundary`.
    ///
    /// `align` and `boundary` must be powers of two, `align <= boundary`.
    /// Returns `None` when the window is exhausted.
    pub fn allocate(&mut self, size: usize, align: usize, boundary: usize) -> Option<NonNull<u8>> {
        debug_assert!(size > 0);
        debug_assert!(align.is_power_of_two() && boundary.is_power_of_two());
        debug_assert!(align <= boundary);
        debug_assert!(align >= core::mem::align_of::<BlockHeader>());

        let (size, align, boundary) =
            if size <= BLOCK_SIZE && align <= BLOCK_ALIGN && boundary <= BLOCK_BOUNDARY {
                if !self.free_list.is_null() {
                    // SAFETY: Free-list entries were valid headers when pushed.
                    let header = unsafe { &mut *self.free_list };
                    debug_assert!(header.magic == BLOCK_MAGIC);
                    debug_assert!(header.size as usize == BLOCK_SIZE);

                    self.free_list = header.next;
                    header.next = core::ptr::null_mut();

                    let data = Self::data_of(header);
                    debug_assert!((data as usize).is_multiple_of(BLOCK_ALIGN));
                    return NonNull::new(data);
                }

                // Canonicalise so this block is recyclable once freed.
                (BLOCK_SIZE, BLOCK_ALIGN, BLOCK_BOUNDARY)
            } else {
                (size, align, boundary)
            };

        let mut data = self.cursor + HEADER_SIZE;

        let align_mask = align - 1;
        if data & align_mask != 0 {
            data = (data + align_mask) & !align_mask;
        }

        // Round up to the boundary if the block would straddle it.
        let boundary_mask = boundary - 1;
        if (data & !boundary_mask) != ((data + size - 1) & !boundary_mask) {
            data = (data + boundary_mask) & !boundary_mask;
        }

        if data + size > self.end {
            return None;
        }
        self.cursor = data + size;

        let header = (data - HEADER_SIZE) as *mut BlockHeader;
        // SAFETY: The header slot lies inside the window, before `data`.
        unsafe {
            header.write(BlockHeader {
                magic: BLOCK_MAGIC,
                size: size as u32,
                align: align as u32,
                boundary: boundary as u32,
                next: core::ptr::null_mut(),
            });
        }

        NonNull::new(data as *mut u8)
    }

    /// Return a block to the allocator.
    ///
    /// Blocks matching the canonical page spec are recycled; anything else
    /// is logged and leaked.
    ///
    /// # Safety
    ///
    /// `block` must have come from [`SharedMemAllocator::allocate`] on this
    /// allocator and must not be used afterwards.
    pub unsafe fn free(&mut self, block: NonNull<u8>) {
        let header = (block.as_ptr() as usize - HEADER_SIZE) as *mut BlockHeader;
        // SAFETY: `block` came from `allocate`, so a header precedes it.
        let header = unsafe { &mut *header };
        debug_assert!(header.magic == BLOCK_MAGIC);

        if header.size as usize == BLOCK_SIZE
            && header.align as usize == BLOCK_ALIGN
            && header.boundary as usize == BLOCK_BOUNDARY
        {
            header.next = self.free_list;
            self.free_list = header;
        } else {
            log::warn!(
                "Leaking shared memory at {:#x} (size {}, align {})",
                block.as_ptr() as usize,
                header.size,
                header.align
            );
        }
    }

    fn data_of(header: &mut BlockHeader) -> *mut u8 {
        (header as *mut BlockHeader as usize + HEADER_SIZE) as *mut u8
    }
}

/// A DMA block that returns itself to the allocator when dropped.
///
/// Used for allocations whose lifetime is bound to one command, so the
/// block is released on every exit path.
pub struct DmaBlock<'a> {
    ptr: NonNull<u8>,
    len: usize,
    allocator: &'a Mutex<SharedMemAllocator>,
}

impl<'a> DmaBlock<'a> {
    /// Allocate a block of `size` bytes at `align`, bounded by the
    /// canonical boundary.
    #[must_use]
    pub fn new(allocator: &'a Mutex<SharedMemAllocator>, size: usize, align: usize) -> Option<Self> {
        let ptr = allocator.lock().allocate(size, align, BLOCK_BOUNDARY)?;
        Some(Self {
            ptr,
            len: size,
            allocator,
        })
    }

    /// Pointer to the block's data.
    #[inline]
    #[must_use]
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Address of the block's data.
    #[inline]
    #[must_use]
    pub fn addr(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// Length requested at allocation.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the block is empty (never true for live blocks).
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Zero the block.
    pub fn zero(&mut self) {
        // SAFETY: The block owns `len` bytes at `ptr`.
        unsafe { core::ptr::write_bytes(self.ptr.as_ptr(), 0, self.len) }
    }
}

impl Drop for DmaBlock<'_> {
    fn drop(&mut self) {
        // SAFETY: The block came from this allocator and is dropped once.
        unsafe { self.allocator.lock().free(self.ptr) }
    }
}
