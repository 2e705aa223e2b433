//! Submission/Completion Queue Engine
//!
//! One queue pair: a ring of 64-byte commands the driver produces and a
//! ring of 16-byte completions the controller produces. The driver tracks
//! the SQ tail, the CQ head, and the phase bit it expects on the next
//! valid completion; the phase toggles each time the CQ head wraps to 0.
//!
//! Depth is one outstanding command per queue in this driver, which is
//! what makes reusing the SQ tail as the command identifier safe.

use core::sync::atomic::{AtomicU16, Ordering};

use basalt_mmio::{MmioRegion, barrier};

use crate::command::{CQE_STATUS_PHASE, DOORBELL_BASE, NvmeCommand, NvmeCompletion, generic_status};
use crate::error::NvmeError;
use crate::platform::Timer;

/// Entries per queue; fixed for both the admin and the I/O pair.
pub const QUEUE_ENTRIES: u16 = 64;

/// The field payload of one command submission.
#[derive(Clone, Copy, Default)]
pub struct CommandRequest {
    /// Command opcode
    pub opcode: u8,
    /// Namespace identifier
    pub nsid: u32,
    /// Command Dword 10
    pub cdw10: u32,
    /// Command Dword 11
    pub cdw11: u32,
    /// Command Dword 12
    pub cdw12: u32,
    /// Data pointer 1
    pub prp1: u64,
    /// Data pointer 2
    pub prp2: u64,
}

/// A submission/completion queue pair.
pub struct Queue {
    name: &'static str,
    id: u16,
    entries: u16,

    sq_virt: *mut NvmeCommand,
    cq_virt: *mut NvmeCompletion,
    sq_bus: u64,
    cq_bus: u64,

    sq_tail: u16,
    cq_head: u16,
    cq_phase: bool,
}

// SAFETY: The ring pointers target DMA memory owned by the controller
// handle; the queue moves with it.
unsafe impl Send for Queue {}

impl Queue {
    /// Create a queue pair with no ring memory attached yet.
    #[must_use]
    pub const fn new(name: &'static str, id: u16, entries: u16) -> Self {
        Self {
            name,
            id,
            entries,
            sq_virt: core::ptr::null_mut(),
            cq_virt: core::ptr::null_mut(),
            sq_bus: 0,
            cq_bus: 0,
            sq_tail: 0,
            cq_head: 0,
            cq_phase: true,
        }
    }

    /// Attach ring memory and reset the indices and phase.
    ///
    /// # Safety
    ///
    /// Both rings must be zeroed DMA memory of at least `entries` slots,
    /// mapped for the device at the given bus addresses, and must outlive
    /// the queue's use.
    pub unsafe fn attach(
        &mut self,
        sq_virt: *mut NvmeCommand,
        sq_bus: u64,
        cq_virt: *mut NvmeCompletion,
        cq_bus: u64,
    ) {
        self.sq_virt = sq_virt;
        self.cq_virt = cq_virt;
        self.sq_bus = sq_bus;
        self.cq_bus = cq_bus;
        self.sq_tail = 0;
        self.cq_head = 0;
        self.cq_phase = true;
    }

    /// Queue name, for logging.
    #[inline]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Queue identifier (0 for admin).
    #[inline]
    #[must_use]
    pub const fn id(&self) -> u16 {
        self.id
    }

    /// Ring depth.
    #[inline]
    #[must_use]
    pub const fn entries(&self) -> u16 {
        self.entries
    }

    /// Virtual address of the submission ring, null before `attach`.
    #[inline]
    #[must_use]
    pub const fn sq_virt(&self) -> *mut NvmeCommand {
        self.sq_virt
    }

    /// Virtual address of the completion ring, null before `attach`.
    #[inline]
    #[must_use]
    pub const fn cq_virt(&self) -> *mut NvmeCompletion {
        self.cq_virt
    }

    /// Bus address of the submission ring.
    #[inline]
    #[must_use]
    pub const fn sq_bus(&self) -> u64 {
        self.sq_bus
    }

    /// Bus address of the completion ring.
    #[inline]
    #[must_use]
    pub const fn cq_bus(&self) -> u64 {
        self.cq_bus
    }

    /// Current CQ head index.
    #[inline]
    #[must_use]
    pub const fn cq_head(&self) -> u16 {
        self.cq_head
    }

    /// Phase value expected on the next valid completion.
    #[inline]
    #[must_use]
    pub const fn expected_phase(&self) -> bool {
        self.cq_phase
    }

    #[inline]
    fn sq_doorbell(&self, stride: usize) -> usize {
        DOORBELL_BASE + self.id as usize * 2 * stride
    }

    #[inline]
    fn cq_doorbell(&self, stride: usize) -> usize {
        self.sq_doorbell(stride) + 4
    }

    /// Write one command into the ring and ring the SQ doorbell.
    ///
    /// Returns the command identifier, which is the SQ tail index the
    /// command was placed at.
    pub fn submit(&mut self, regs: &MmioRegion, stride: usize, req: &CommandRequest) -> u16 {
        debug_assert!(!self.sq_virt.is_null());

        let cid = self.sq_tail;
        let cmd = NvmeCommand {
            opc: req.opcode,
            cid,
            nsid: req.nsid,
            prp1: req.prp1,
            prp2: req.prp2,
            cdw10: req.cdw10,
            cdw11: req.cdw11,
            cdw12: req.cdw12,
            ..Default::default()
        };

        // SAFETY: `attach` guaranteed `entries` slots; tail stays in range.
        unsafe {
            core::ptr::write_volatile(self.sq_virt.add(self.sq_tail as usize), cmd);
        }

        self.sq_tail = (self.sq_tail + 1) % self.entries;

        // The slot must be visible before the doorbell makes it live.
        barrier::dsb();
        regs.write32(self.sq_doorbell(stride), u32::from(self.sq_tail));

        cid
    }

    /// Wait for the completion matching `cid` on this queue.
    ///
    /// Consumes the matching entry, rings the CQ doorbell and decodes the
    /// status word. Busy-wait builds delay 1 µs per poll iteration;
    /// interrupt builds spin only after the completion event fired.
    pub fn poll_for_completion<T: Timer>(
        &mut self,
        regs: &MmioRegion,
        stride: usize,
        timer: &T,
        cid: u16,
        timeout_ticks: u32,
    ) -> Result<(), NvmeError> {
        debug_assert!(!self.cq_virt.is_null());
        debug_assert!(cid < self.entries);

        let start = timer.ticks();

        loop {
            barrier::dmb();

            let entry = unsafe { self.cq_virt.add(self.cq_head as usize) };
            // Relaxed atomic loads: the entry is written by the device and
            // must not tear on strict-align builds.
            let status =
                unsafe { AtomicU16::from_ptr(&raw mut (*entry).status) }.load(Ordering::Relaxed);
            let ce_cid =
                unsafe { AtomicU16::from_ptr(&raw mut (*entry).cid) }.load(Ordering::Relaxed);
            let ce_sqid =
                unsafe { AtomicU16::from_ptr(&raw mut (*entry).sqid) }.load(Ordering::Relaxed);

            if (status & CQE_STATUS_PHASE != 0) == self.cq_phase
                && ce_cid == cid
                && ce_sqid == self.id
            {
                self.cq_head = (self.cq_head + 1) % self.entries;
                if self.cq_head == 0 {
                    self.cq_phase = !self.cq_phase;
                }
                barrier::dsb();
                regs.write32(self.cq_doorbell(stride), u32::from(self.cq_head));

                let sct = ((status >> 9) & 0x7) as u8;
                let sc = ((status >> 1) & 0xFF) as u8;
                if sct != 0 || sc != 0 {
                    log::debug!("{} command failed (sct {}, sc {:#x})", self.name, sct, sc);

                    if sct == 0 && sc == generic_status::LBA_OUT_OF_RANGE {
                        return Err(NvmeError::LbaRange);
                    }
                    return Err(NvmeError::Controller);
                }

                return Ok(());
            }

            if timer.ticks().wrapping_sub(start) > timeout_ticks {
                log::debug!("{} command timed out", self.name);
                return Err(NvmeError::Timeout);
            }

            #[cfg(not(feature = "irq"))]
            timer.us_delay(1);
        }
    }
}
