//! NVMe Controller Driver
//!
//! Brings a PCIe NVMe controller from cold reset to serving block I/O on
//! one namespace through one I/O queue pair, and exposes the result as a
//! [`BlockDevice`].
//!
//! Supported configuration:
//! - NVMe 1.3 / 1.4 controllers
//! - one I/O queue, one outstanding command
//! - 512-byte LBA format without metadata
//! - namespace 1, 4 KiB controller pages

use core::ptr::NonNull;

use basalt_mmio::MmioRegion;
use spin::Mutex;
use tock_registers::LocalRegisterCopy;

use crate::command::{
    AQA, CAP, CC, CC_IOCQES_16B, CC_IOSQES_64B, CSTS, NvmeCommand, NvmeCompletion, REG_ACQ,
    REG_AQA, REG_ASQ, REG_CAP, REG_CC, REG_CSTS, REG_VS, VS, admin_opcode, identify_cns,
    nvm_opcode,
};
use crate::device::{BlockDevice, IOCTL_SYNC, LBA_SIZE};
use crate::dma::{BLOCK_BOUNDARY, DmaWindow, PAGE_SIZE, SharedMemAllocator};
use crate::error::NvmeError;
use crate::identify::{IdentifyController, IdentifyNamespace};
use crate::partition::PartitionTable;
use crate::platform::{DeviceRegistry, Platform, msec_to_ticks};
use crate::prp::PrpSet;
use crate::queue::{CommandRequest, QUEUE_ENTRIES, Queue};

#[cfg(feature = "irq")]
use crate::command::{INTM_ALL_VECTORS, INTM_VECTOR0, REG_INTMC, REG_INTMS};
#[cfg(feature = "irq")]
use crate::event::CompletionEvent;
#[cfg(feature = "irq")]
use alloc::boxed::Box;

/// PCIe slot the controller sits in.
const PCIE_SLOT: u32 = 0;
/// PCIe function of the controller.
const PCIE_FUNC: u32 = 0;
/// NVM Express class code.
const PCIE_CLASS_CODE: u32 = 0x01_0802;

/// ID of our only supported namespace.
const NSID: u32 = 1;

/// Admin queue identifier (always 0 in NVMe).
const ADMIN_QID: u16 = 0;
/// Our single I/O queue identifier.
const IO_QID: u16 = 1;

/// Per-command completion budget, in milliseconds.
const POLL_TIMEOUT_MS: u32 = 5000;

/// Cache line length the bounce decision is based on.
const CACHE_LINE: usize = 64;

/// Size of the register window we map (registers + doorbells).
const REG_WINDOW_SIZE: usize = 0x2000;

const GIGABYTE: u64 = 1 << 30;

/// Registered device name.
const DEVICE_NAME: &str = "nvme1";

#[inline]
fn is_cache_aligned(addr: usize, len: usize) -> bool {
    addr.is_multiple_of(CACHE_LINE) && len.is_multiple_of(CACHE_LINE)
}

/// Which queue a command goes to.
#[derive(Clone, Copy)]
enum QueueSel {
    Admin,
    Io,
}

/// State shared with the INTA handler.
#[cfg(feature = "irq")]
struct IrqShared {
    regs: MmioRegion,
    event: CompletionEvent,
}

/// The INTA handler: mask vector 0, signal the waiter.
#[cfg(feature = "irq")]
fn inta_handler(ctx: *mut ()) {
    // SAFETY: The driver registered `ctx` as a pointer to its own
    // `IrqShared`, which outlives the connection.
    let shared = unsafe { &*(ctx as *const IrqShared) };
    shared.regs.write32(REG_INTMS, INTM_VECTOR0);
    shared.event.set();
}

/// Driver for a PCIe NVMe controller.
pub struct NvmeDevice<P: Platform> {
    platform: P,
    regs: MmioRegion,
    allocator: Mutex<SharedMemAllocator>,

    version: u32,
    caps: u64,
    doorbell_stride: usize,
    /// `CSTS.RDY` wait budget, in ticks.
    timeout_ticks: u32,

    admin_queue: Queue,
    io_queue: Queue,

    namespace_size: u64,
    offset: u64,

    partitions: Option<PartitionTable>,

    #[cfg(feature = "irq")]
    irq_shared: Box<IrqShared>,
    #[cfg(feature = "irq")]
    irq_connected: bool,
}

impl<P: Platform> NvmeDevice<P> {
    /// Create a driver instance over `platform`, with `window` as its
    /// coherent DMA arena. The controller is untouched until
    /// [`NvmeDevice::initialize`].
    #[must_use]
    pub fn new(platform: P, window: DmaWindow) -> Self {
        let regs = unsafe { MmioRegion::new(platform.mmio_base(), REG_WINDOW_SIZE) };
        Self {
            platform,
            regs,
            // SAFETY: The caller hands the window over exclusively.
            allocator: Mutex::new(unsafe { SharedMemAllocator::new(window) }),
            version: 0,
            caps: 0,
            doorbell_stride: 4,
            timeout_ticks: 5 * P::HZ,
            admin_queue: Queue::new("Admin", ADMIN_QID, QUEUE_ENTRIES),
            io_queue: Queue::new("I/O", IO_QID, QUEUE_ENTRIES),
            namespace_size: 0,
            offset: 0,
            partitions: None,
            #[cfg(feature = "irq")]
            irq_shared: Box::new(IrqShared {
                regs,
                event: CompletionEvent::new(),
            }),
            #[cfg(feature = "irq")]
            irq_connected: false,
        }
    }

    /// Bring the controller from reset to ready and register the device.
    ///
    /// Runs the ordered sequence: enable the PCIe function, gate on the
    /// controller version, derive doorbell stride and ready timeout from
    /// CAP, reset, provision admin queues, enable, create the I/O queue
    /// pair, identify namespace and controller, then scan the partition
    /// table and announce the device names.
    pub fn initialize<R: DeviceRegistry>(&mut self, registry: &mut R) -> Result<(), NvmeError> {
        if let Err(e) = self.platform.initialize() {
            log::error!("Cannot init external PCIe: {}", e);
            return Err(NvmeError::Controller);
        }

        if let Err(e) = self
            .platform
            .enable_device(PCIE_CLASS_CODE, PCIE_SLOT, PCIE_FUNC)
        {
            log::error!("Cannot enable PCIe device: {}", e);
            return Err(NvmeError::Controller);
        }

        self.version = self.regs.read32(REG_VS);
        let vs = LocalRegisterCopy::<u32, VS::Register>::new(self.version);
        let (mjr, mnr) = (vs.read(VS::MJR), vs.read(VS::MNR));
        if mjr != 1 || (mnr != 3 && mnr != 4) {
            log::error!("NVMe version not supported ({:#x})", self.version);
            return Err(NvmeError::Controller);
        }

        self.caps = self.regs.read64(REG_CAP);
        let cap = LocalRegisterCopy::<u64, CAP::Register>::new(self.caps);
        self.doorbell_stride = 4usize << cap.read(CAP::DSTRD);
        self.timeout_ticks = msec_to_ticks::<P>(cap.read(CAP::TO) as u32 * 500);
        if self.timeout_ticks == 0 {
            log::debug!("Timeout adjusted");
            self.timeout_ticks = 5 * P::HZ;
        }

        log::debug!(
            "NVMe controller found (ver {}.{}.{})",
            mjr,
            mnr,
            vs.read(VS::TER)
        );

        // Reset: clear CC.EN, wait for RDY to drop.
        let mut cc = LocalRegisterCopy::<u32, CC::Register>::new(self.regs.read32(REG_CC));
        cc.modify(CC::EN::CLEAR);
        self.regs.write32(REG_CC, cc.get());
        if !self.wait_ready(false) {
            log::error!("Cannot reset controller");
            return Err(NvmeError::Timeout);
        }

        #[cfg(feature = "irq")]
        {
            self.regs.write32(REG_INTMS, INTM_ALL_VECTORS);
            let ctx = &*self.irq_shared as *const IrqShared as *mut ();
            self.platform.connect_inta(inta_handler, ctx);
            self.irq_connected = true;
        }

        if let Err(e) = self.create_admin_queues() {
            log::error!("Cannot create admin queues");
            return Err(e);
        }

        // Select SQ/CQ entry sizes and enable the controller.
        let mut cc = LocalRegisterCopy::<u32, CC::Register>::new(self.regs.read32(REG_CC));
        cc.modify(
            CC::IOSQES.val(CC_IOSQES_64B) + CC::IOCQES.val(CC_IOCQES_16B) + CC::EN::SET,
        );
        self.regs.write32(REG_CC, cc.get());
        if !self.wait_ready(true) {
            log::error!("Cannot enable controller");
            return Err(NvmeError::Timeout);
        }

        if let Err(e) = self.create_io_queue(IO_QID, QUEUE_ENTRIES) {
            log::error!("Cannot create I/O queue");
            return Err(e);
        }

        self.identify_device()?;

        // Announce the whole device, then whatever the partition table
        // holds. The registry is an injected collaborator; partitions are
        // scanned through our own block interface.
        registry.add_device(DEVICE_NAME, 0, self.namespace_size / LBA_SIZE as u64);

        let table = PartitionTable::scan(self)?;
        for (index, part) in table.entries() {
            log::info!(
                "Partition {}: type {:#04x}, {} blocks at {}",
                index + 1,
                part.part_type,
                part.block_count,
                part.first_lba
            );
            let name = alloc::format!("{}-{}", DEVICE_NAME, index + 1);
            registry.add_device(&name, part.first_lba, part.block_count);
        }
        self.partitions = Some(table);

        Ok(())
    }

    /// The partition table found at initialisation.
    #[must_use]
    pub fn partitions(&self) -> Option<&PartitionTable> {
        self.partitions.as_ref()
    }

    /// Log the low register window and allocator state.
    pub fn dump_status(&self) {
        let mut offset = 0;
        while offset <= 0x3C {
            log::debug!("{:04X}: {:08X}", offset, self.regs.read32(offset));
            offset += 4;
        }
        log::debug!(
            "{} bytes shared memory free",
            self.allocator.lock().free_space()
        );
    }

    /// Wait for `CSTS.RDY` to reach `target` within the ready budget.
    fn wait_ready(&self, target: bool) -> bool {
        let start = self.platform.ticks();

        loop {
            let csts = LocalRegisterCopy::<u32, CSTS::Register>::new(self.regs.read32(REG_CSTS));
            if csts.is_set(CSTS::RDY) == target {
                return true;
            }

            if self.platform.ticks().wrapping_sub(start) >= self.timeout_ticks {
                log::debug!("Ready wait timed out");
                return false;
            }

            #[cfg(feature = "irq")]
            self.platform.ms_sleep(1);
            #[cfg(not(feature = "irq"))]
            self.platform.ms_delay(1);
        }
    }

    /// Allocate and zero both admin rings and program AQA/ASQ/ACQ.
    fn create_admin_queues(&mut self) -> Result<(), NvmeError> {
        let sq_size = QUEUE_ENTRIES as usize * core::mem::size_of::<NvmeCommand>();
        let cq_size = QUEUE_ENTRIES as usize * core::mem::size_of::<NvmeCompletion>();

        let (sq, cq) = self.allocate_queue_memory(sq_size, cq_size)?;
        let sq_bus = self.platform.dma_address(sq.as_ptr() as usize);
        let cq_bus = self.platform.dma_address(cq.as_ptr() as usize);

        // SAFETY: Freshly allocated, zeroed coherent memory of ring size.
        unsafe {
            self.admin_queue.attach(
                sq.as_ptr() as *mut NvmeCommand,
                sq_bus,
                cq.as_ptr() as *mut NvmeCompletion,
                cq_bus,
            );
        }

        let mut aqa = LocalRegisterCopy::<u32, AQA::Register>::new(0);
        aqa.modify(
            AQA::ASQS.val(u32::from(QUEUE_ENTRIES) - 1) + AQA::ACQS.val(u32::from(QUEUE_ENTRIES) - 1),
        );
        self.regs.write32(REG_AQA, aqa.get());
        self.regs.write64(REG_ASQ, sq_bus);
        self.regs.write64(REG_ACQ, cq_bus);

        Ok(())
    }

    /// Allocate and zero the I/O rings, then create them on the
    /// controller: Completion Queue first, Submission Queue second.
    fn create_io_queue(&mut self, qid: u16, entries: u16) -> Result<(), NvmeError> {
        let sq_size = entries as usize * core::mem::size_of::<NvmeCommand>();
        let cq_size = entries as usize * core::mem::size_of::<NvmeCompletion>();

        let (sq, cq) = self.allocate_queue_memory(sq_size, cq_size)?;
        let sq_bus = self.platform.dma_address(sq.as_ptr() as usize);
        let cq_bus = self.platform.dma_address(cq.as_ptr() as usize);

        // SAFETY: Freshly allocated, zeroed coherent memory of ring size.
        unsafe {
            self.io_queue.attach(
                sq.as_ptr() as *mut NvmeCommand,
                sq_bus,
                cq.as_ptr() as *mut NvmeCompletion,
                cq_bus,
            );
        }

        let qsize_qid = u32::from(qid) | (u32::from(entries) - 1) << 16;

        // CQ: PC=1, IEN=1, IRQ vector 0.
        self.admin_command(
            admin_opcode::CREATE_IO_CQ,
            0,
            qsize_qid,
            (1 << 0) | (1 << 1),
            cq_bus,
        )?;

        // SQ: bound to the CQ above, PC=1.
        self.admin_command(
            admin_opcode::CREATE_IO_SQ,
            0,
            qsize_qid,
            u32::from(qid) << 16 | 1,
            sq_bus,
        )?;

        Ok(())
    }

    fn allocate_queue_memory(
        &mut self,
        sq_size: usize,
        cq_size: usize,
    ) -> Result<(NonNull<u8>, NonNull<u8>), NvmeError> {
        let mut allocator = self.allocator.lock();
        let sq = allocator
            .allocate(sq_size, PAGE_SIZE, BLOCK_BOUNDARY)
            .ok_or(NvmeError::NoResource)?;
        let cq = allocator
            .allocate(cq_size, PAGE_SIZE, BLOCK_BOUNDARY)
            .ok_or(NvmeError::NoResource)?;
        drop(allocator);

        // SAFETY: Both blocks were just allocated with these sizes.
        unsafe {
            core::ptr::write_bytes(sq.as_ptr(), 0, sq_size);
            core::ptr::write_bytes(cq.as_ptr(), 0, cq_size);
        }

        Ok((sq, cq))
    }

    /// Identify namespace 1 and the controller; gate on the LBA format.
    fn identify_device(&mut self) -> Result<(), NvmeError> {
        let buf = self
            .allocator
            .lock()
            .allocate(PAGE_SIZE, PAGE_SIZE, BLOCK_BOUNDARY)
            .ok_or_else(|| {
                log::error!("Allocation failed");
                NvmeError::NoResource
            })?;

        let result = self.identify_and_parse(buf);

        // The identify buffer is a canonical page block; hand it back on
        // every path.
        // SAFETY: Allocated above, no longer referenced.
        unsafe { self.allocator.lock().free(buf) };

        result
    }

    fn identify_and_parse(&mut self, buf: NonNull<u8>) -> Result<(), NvmeError> {
        let bus = self.platform.dma_address(buf.as_ptr() as usize);

        // CNS 0: the namespace.
        self.admin_command(admin_opcode::IDENTIFY, NSID, identify_cns::NAMESPACE, 0, bus)
            .inspect_err(|e| log::error!("Identify failed (cns 0, err {})", e.code()))?;

        // SAFETY: The controller wrote a 4096-byte identify page at `buf`,
        // which is page aligned.
        let ns = unsafe { core::ptr::read_volatile(buf.as_ptr() as *const IdentifyNamespace) };

        let block_size = ns.block_size();
        if block_size != LBA_SIZE {
            log::error!("LBA size not supported ({})", block_size);
            return Err(NvmeError::Controller);
        }

        let metadata = ns.metadata_size();
        if metadata != 0 {
            log::error!("Metadata not supported ({})", metadata);
            return Err(NvmeError::Controller);
        }

        self.namespace_size = ns.size_blocks() * LBA_SIZE as u64;

        // CNS 1: the controller.
        self.admin_command(admin_opcode::IDENTIFY, 0, identify_cns::CONTROLLER, 0, bus)
            .inspect_err(|e| log::error!("Identify failed (cns 1, err {})", e.code()))?;

        // SAFETY: Same buffer, now holding the controller page.
        let ctrl = unsafe { core::ptr::read_volatile(buf.as_ptr() as *const IdentifyController) };

        log::info!(
            "{}GB NVMe Model {}",
            self.namespace_size / GIGABYTE,
            ctrl.model_number()
        );

        Ok(())
    }

    /// Submit an admin command carrying one data pointer and wait for it.
    fn admin_command(
        &mut self,
        opcode: u8,
        nsid: u32,
        cdw10: u32,
        cdw11: u32,
        data_bus: u64,
    ) -> Result<(), NvmeError> {
        debug_assert!(data_bus != 0);

        self.submit_command(
            QueueSel::Admin,
            CommandRequest {
                opcode,
                nsid,
                cdw10,
                cdw11,
                cdw12: 0,
                prp1: data_bus,
                prp2: 0,
            },
        )
    }

    /// Submit `req` on the selected queue and wait for its completion.
    fn submit_command(&mut self, sel: QueueSel, req: CommandRequest) -> Result<(), NvmeError> {
        let regs = self.regs;
        let stride = self.doorbell_stride;
        let timeout = msec_to_ticks::<P>(POLL_TIMEOUT_MS);

        #[cfg(feature = "irq")]
        {
            self.irq_shared.event.clear();
            regs.write32(REG_INTMC, INTM_VECTOR0);
        }

        let queue = match sel {
            QueueSel::Admin => &mut self.admin_queue,
            QueueSel::Io => &mut self.io_queue,
        };

        let cid = queue.submit(&regs, stride, &req);

        #[cfg(feature = "irq")]
        if self
            .irq_shared
            .event
            .wait_with_timeout(&self.platform, timeout)
        {
            log::debug!("{} command timed out", queue.name());
            return Err(NvmeError::Timeout);
        }

        queue.poll_for_completion(&regs, stride, &self.platform, cid, timeout)
    }

    /// Issue one NVM Read or Write covering `blocks` logical blocks.
    fn io_pass_through(
        &mut self,
        nsid: u32,
        lba: u64,
        blocks: u32,
        buffer: *mut u8,
        is_write: bool,
    ) -> Result<(), NvmeError> {
        debug_assert!(!buffer.is_null());
        debug_assert!(blocks > 0);

        let regs = self.regs;
        let stride = self.doorbell_stride;
        let timeout = msec_to_ticks::<P>(POLL_TIMEOUT_MS);

        let prp = PrpSet::build(
            &self.allocator,
            &self.platform,
            buffer as *const u8,
            blocks as usize * LBA_SIZE,
        )?;

        let req = CommandRequest {
            opcode: if is_write {
                nvm_opcode::WRITE
            } else {
                nvm_opcode::READ
            },
            nsid,
            cdw10: lba as u32,
            cdw11: (lba >> 32) as u32,
            cdw12: blocks - 1,
            prp1: prp.prp1(),
            prp2: prp.prp2(),
        };

        #[cfg(feature = "irq")]
        {
            self.irq_shared.event.clear();
            regs.write32(REG_INTMC, INTM_VECTOR0);
        }

        let cid = self.io_queue.submit(&regs, stride, &req);

        #[cfg(feature = "irq")]
        if self
            .irq_shared
            .event
            .wait_with_timeout(&self.platform, timeout)
        {
            log::debug!("{} command timed out", self.io_queue.name());
            return Err(NvmeError::Timeout);
        }

        // The PRP set (and any list page) stays alive until the
        // completion is consumed.
        self.io_queue
            .poll_for_completion(&regs, stride, &self.platform, cid, timeout)
    }

    /// Flush the volatile write cache of `nsid`.
    fn flush(&mut self, nsid: u32) -> Result<(), NvmeError> {
        self.submit_command(
            QueueSel::Io,
            CommandRequest {
                opcode: nvm_opcode::FLUSH,
                nsid,
                ..Default::default()
            },
        )
    }

    fn check_transfer(&self, count: usize) -> Result<(u64, u32), NvmeError> {
        if !(self.offset as usize).is_multiple_of(LBA_SIZE) {
            return Err(NvmeError::BadParam);
        }
        if count == 0 || !count.is_multiple_of(LBA_SIZE) {
            return Err(NvmeError::BadParam);
        }
        Ok((self.offset / LBA_SIZE as u64, (count / LBA_SIZE) as u32))
    }
}

impl<P: Platform> BlockDevice for NvmeDevice<P> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, NvmeError> {
        let count = buf.len();
        let (lba, blocks) = self.check_transfer(count)?;

        // Bounce through a cache-aligned heap buffer if needed.
        let mut bounce = None;
        let transfer: *mut u8 = if is_cache_aligned(buf.as_ptr() as usize, count) {
            buf.as_mut_ptr()
        } else {
            let b = BounceBuffer::new(count).ok_or(NvmeError::NoResource)?;
            let ptr = b.as_ptr();
            bounce = Some(b);
            ptr
        };

        self.platform
            .invalidate_data_cache_range(transfer as usize, count);

        self.io_pass_through(NSID, lba, blocks, transfer, false)?;

        self.platform
            .invalidate_data_cache_range(transfer as usize, count);

        if let Some(b) = &bounce {
            // SAFETY: The bounce buffer holds `count` freshly read bytes.
            unsafe { core::ptr::copy_nonoverlapping(b.as_ptr(), buf.as_mut_ptr(), count) };
        }

        Ok(count)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, NvmeError> {
        let count = buf.len();
        let (lba, blocks) = self.check_transfer(count)?;

        #[cfg(feature = "read-only")]
        {
            let _ = (lba, blocks);
            return Err(NvmeError::ReadOnly);
        }

        #[cfg(not(feature = "read-only"))]
        {
            let mut bounce = None;
            let transfer: *mut u8 = if is_cache_aligned(buf.as_ptr() as usize, count) {
                // The device only reads this buffer.
                buf.as_ptr() as *mut u8
            } else {
                let b = BounceBuffer::new(count).ok_or(NvmeError::NoResource)?;
                // SAFETY: The bounce buffer owns `count` bytes.
                unsafe { core::ptr::copy_nonoverlapping(buf.as_ptr(), b.as_ptr(), count) };
                let ptr = b.as_ptr();
                bounce = Some(b);
                ptr
            };

            self.platform
                .clean_data_cache_range(transfer as usize, count);

            self.io_pass_through(NSID, lba, blocks, transfer, true)?;

            drop(bounce);
            Ok(count)
        }
    }

    fn seek(&mut self, offset: u64) -> u64 {
        self.offset = offset;
        offset
    }

    fn size(&self) -> u64 {
        self.namespace_size
    }

    fn ioctl(&mut self, cmd: u32) -> Result<(), NvmeError> {
        if cmd == IOCTL_SYNC {
            return self.flush(NSID);
        }

        Err(NvmeError::BadParam)
    }
}

impl<P: Platform> Drop for NvmeDevice<P> {
    fn drop(&mut self) {
        #[cfg(feature = "irq")]
        if self.irq_connected {
            self.regs.write32(REG_INTMS, INTM_ALL_VECTORS);
            self.platform.disconnect_inta();
            self.irq_connected = false;
        }

        // Disable the controller and wait for it to quiesce before the
        // ring memory goes away.
        let mut cc = LocalRegisterCopy::<u32, CC::Register>::new(self.regs.read32(REG_CC));
        cc.modify(CC::EN::CLEAR);
        self.regs.write32(REG_CC, cc.get());
        if !self.wait_ready(false) {
            log::warn!("Controller did not quiesce on shutdown");
        }

        let mut allocator = self.allocator.lock();
        for ptr in [
            self.admin_queue.sq_virt() as *mut u8,
            self.admin_queue.cq_virt() as *mut u8,
            self.io_queue.sq_virt() as *mut u8,
            self.io_queue.cq_virt() as *mut u8,
        ] {
            if let Some(block) = NonNull::new(ptr) {
                // SAFETY: Ring memory came from this allocator and is not
                // touched again.
                unsafe { allocator.free(block) };
            }
        }
    }
}

/// Cache-aligned heap buffer standing in for a misaligned caller buffer
/// during DMA. Freed on every exit path.
struct BounceBuffer {
    ptr: NonNull<u8>,
    layout: core::alloc::Layout,
}

impl BounceBuffer {
    fn new(len: usize) -> Option<Self> {
        let layout = core::alloc::Layout::from_size_align(len, CACHE_LINE).ok()?;
        // SAFETY: `len` is non-zero (validated by the transfer checks).
        let ptr = unsafe { alloc::alloc::alloc(layout) };
        NonNull::new(ptr).map(|ptr| Self { ptr, layout })
    }

    #[inline]
    fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }
}

impl Drop for BounceBuffer {
    fn drop(&mut self) {
        // SAFETY: Allocated in `new` with the stored layout.
        unsafe { alloc::alloc::dealloc(self.ptr.as_ptr(), self.layout) };
    }
}
