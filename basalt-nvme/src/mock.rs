//! Test doubles
//!
//! A RAM-backed register window plus a small NVMe controller model. The
//! model has no thread of its own: it advances inside the mock timer's
//! delay hooks, which the driver calls from every wait loop. Bus
//! addresses are identical to virtual addresses, so the model follows
//! queue base registers and PRP entries straight into test memory.

use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};

use crate::command::{
    NvmeCommand, REG_ACQ, REG_ASQ, REG_CAP, REG_CC, REG_CSTS, REG_VS, admin_opcode, identify_cns,
    nvm_opcode,
};
use crate::device::LBA_SIZE;
use crate::dma::PAGE_SIZE;
use crate::platform::{CacheMaintenance, DeviceRegistry, PcieBridge, Timer};

#[cfg(feature = "irq")]
use crate::platform::{InterruptMux, IrqHandler};

/// Ticks per second of the mock clock.
pub(crate) const MOCK_HZ: u32 = 100;

/// A zeroed, aligned heap buffer.
pub(crate) struct AlignedBuf {
    ptr: core::ptr::NonNull<u8>,
    layout: core::alloc::Layout,
}

impl AlignedBuf {
    pub(crate) fn new(len: usize, align: usize) -> Self {
        let layout = core::alloc::Layout::from_size_align(len, align).unwrap();
        let ptr = unsafe { alloc::alloc::alloc_zeroed(layout) };
        Self {
            ptr: core::ptr::NonNull::new(ptr).unwrap(),
            layout,
        }
    }

    pub(crate) fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub(crate) fn addr(&self) -> usize {
        self.ptr.as_ptr() as usize
    }
}

impl Drop for AlignedBuf {
    fn drop(&mut self) {
        unsafe { alloc::alloc::dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

/// A clock whose time only moves when something waits on it.
pub(crate) struct MockClock {
    us: Cell<u64>,
}

impl MockClock {
    pub(crate) fn new() -> Self {
        Self { us: Cell::new(0) }
    }
}

impl Timer for MockClock {
    const HZ: u32 = MOCK_HZ;

    fn ticks(&self) -> u32 {
        (self.us.get() / (1_000_000 / u64::from(MOCK_HZ))) as u32
    }

    fn us_delay(&self, us: u32) {
        self.us.set(self.us.get() + u64::from(us));
    }

    fn ms_delay(&self, ms: u32) {
        self.us_delay(ms * 1000);
    }

    fn ms_sleep(&self, ms: u32) {
        self.ms_delay(ms);
    }
}

/// Bridge whose bus addresses equal virtual addresses.
pub(crate) struct IdentityBridge;

impl PcieBridge for IdentityBridge {
    fn initialize(&mut self) -> Result<(), &'static str> {
        Ok(())
    }

    fn enable_device(&mut self, _class: u32, _slot: u32, _func: u32) -> Result<(), &'static str> {
        Ok(())
    }

    fn mmio_base(&self) -> usize {
        0
    }

    fn dma_address(&self, virt: usize) -> u64 {
        virt as u64
    }
}

/// One command the model consumed, for assertions.
#[derive(Clone, Copy, Debug)]
pub(crate) struct CmdRecord {
    pub qid: u16,
    pub opcode: u8,
    pub nsid: u32,
    pub cdw10: u32,
    pub cdw11: u32,
    pub cdw12: u32,
    pub prp1: u64,
    pub prp2: u64,
}

/// Producer state of one model-side completion queue.
struct ModelCq {
    bus: u64,
    entries: u16,
    tail: u16,
    phase: bool,
}

impl ModelCq {
    const fn idle() -> Self {
        Self {
            bus: 0,
            entries: 0,
            tail: 0,
            phase: true,
        }
    }

    fn reset(&mut self, bus: u64, entries: u16) {
        *self = Self {
            bus,
            entries,
            tail: 0,
            phase: true,
        };
    }

    fn push(&mut self, cid: u16, sqid: u16, status_bits: u16) {
        assert!(self.bus != 0, "completion pushed before CQ exists");
        let slot = (self.bus as usize + self.tail as usize * 16) as *mut u8;
        let status = status_bits | u16::from(self.phase);
        unsafe {
            // dw0, dw1, sq_head stay zero.
            (slot.add(10) as *mut u16).write_volatile(sqid);
            (slot.add(12) as *mut u16).write_volatile(cid);
            (slot.add(14) as *mut u16).write_volatile(status);
        }
        self.tail = (self.tail + 1) % self.entries;
        if self.tail == 0 {
            self.phase = !self.phase;
        }
    }
}

/// The controller model.
pub(crate) struct MockState {
    pub regs: AlignedBuf,
    pub time_us: u64,
    /// Microseconds added per `us_delay(1)`; raised to fast-forward
    /// timeout tests.
    pub time_scale: u32,
    /// When set the controller stops responding entirely.
    pub dead: bool,
    /// Status (SCT, SC) to fail the next I/O command with.
    pub fail_next_io: Option<(u8, u8)>,
    pub disk: Vec<u8>,
    pub model_number: &'static [u8],
    /// LBADS the identify namespace page reports (9 = 512-byte blocks).
    pub lba_data_size_shift: u8,

    admin_sq_head: u16,
    admin_cq: ModelCq,
    io_sq_head: u16,
    io_sq_bus: u64,
    io_sq_entries: u16,
    io_cq: ModelCq,

    pub cmds: Vec<CmdRecord>,
    pub flush_count: usize,
    pub invalidate_calls: usize,
    pub clean_calls: usize,

    #[cfg(feature = "irq")]
    irq: Option<(IrqHandler, usize)>,
}

impl MockState {
    pub(crate) fn new(disk_blocks: usize) -> Self {
        let regs = AlignedBuf::new(0x2000, PAGE_SIZE);
        let state = Self {
            regs,
            time_us: 0,
            time_scale: 1,
            dead: false,
            fail_next_io: None,
            disk: vec![0u8; disk_blocks * LBA_SIZE],
            model_number: b"BASALT MOCK CTRL",
            lba_data_size_shift: 9,
            admin_sq_head: 0,
            admin_cq: ModelCq::idle(),
            io_sq_head: 0,
            io_sq_bus: 0,
            io_sq_entries: 0,
            io_cq: ModelCq::idle(),
            cmds: Vec::new(),
            flush_count: 0,
            invalidate_calls: 0,
            clean_calls: 0,
            #[cfg(feature = "irq")]
            irq: None,
        };

        // CAP: MQES 63, TO 10 (5 s), DSTRD 0. VS: 1.4.0.
        state.write_reg64(REG_CAP, 63 | (10 << 24));
        state.write_reg32(REG_VS, 0x0001_0400);
        state
    }

    pub(crate) fn set_version(&self, version: u32) {
        self.write_reg32(REG_VS, version);
    }

    pub(crate) fn read_reg32(&self, offset: usize) -> u32 {
        unsafe { ((self.regs.addr() + offset) as *const u32).read_volatile() }
    }

    fn read_reg64(&self, offset: usize) -> u64 {
        unsafe { ((self.regs.addr() + offset) as *const u64).read_volatile() }
    }

    fn write_reg32(&self, offset: usize, value: u32) {
        unsafe { ((self.regs.addr() + offset) as *mut u32).write_volatile(value) }
    }

    fn write_reg64(&self, offset: usize, value: u64) {
        unsafe { ((self.regs.addr() + offset) as *mut u64).write_volatile(value) }
    }

    /// Advance the model: track CC.EN in CSTS.RDY, then consume any
    /// submissions published through the doorbells.
    fn step(&mut self) {
        if self.dead {
            return;
        }

        let enabled = self.read_reg32(REG_CC) & 1 != 0;
        self.write_reg32(REG_CSTS, u32::from(enabled));
        if !enabled {
            return;
        }

        // DSTRD is seeded 0, so the stride is 4 bytes.
        let stride = 4usize;

        let tail = self.read_reg32(0x1000) as u16;
        while self.admin_sq_head != tail {
            let cmd = Self::read_command(self.read_reg64(REG_ASQ), self.admin_sq_head);
            self.admin_sq_head = (self.admin_sq_head + 1) % 64;
            let status = self.exec_admin(&cmd);
            let acq = self.read_reg64(REG_ACQ);
            if self.admin_cq.bus != acq {
                self.admin_cq.reset(acq, 64);
            }
            self.admin_cq.push(cmd.cid, 0, status);
            self.raise_irq();
        }

        if self.io_sq_bus != 0 {
            let tail = self.read_reg32(0x1000 + 2 * stride) as u16;
            while self.io_sq_head != tail {
                let cmd = Self::read_command(self.io_sq_bus, self.io_sq_head);
                self.io_sq_head = (self.io_sq_head + 1) % self.io_sq_entries.max(1);
                let status = self.exec_io(&cmd);
                self.io_cq.push(cmd.cid, 1, status);
                self.raise_irq();
            }
        }
    }

    #[cfg(feature = "irq")]
    fn raise_irq(&self) {
        if let Some((handler, ctx)) = self.irq {
            handler(ctx as *mut ());
        }
    }

    #[cfg(not(feature = "irq"))]
    fn raise_irq(&self) {}

    fn read_command(sq_bus: u64, slot: u16) -> NvmeCommand {
        let ptr = (sq_bus as usize + slot as usize * 64) as *const NvmeCommand;
        unsafe { ptr.read_volatile() }
    }

    fn record(&mut self, qid: u16, cmd: &NvmeCommand) {
        self.cmds.push(CmdRecord {
            qid,
            opcode: cmd.opc,
            nsid: cmd.nsid,
            cdw10: cmd.cdw10,
            cdw11: cmd.cdw11,
            cdw12: cmd.cdw12,
            prp1: cmd.prp1,
            prp2: cmd.prp2,
        });
    }

    fn exec_admin(&mut self, cmd: &NvmeCommand) -> u16 {
        self.record(0, cmd);

        match cmd.opc {
            admin_opcode::IDENTIFY => {
                let page = cmd.prp1 as usize as *mut u8;
                unsafe { core::ptr::write_bytes(page, 0, PAGE_SIZE) };
                if cmd.cdw10 == identify_cns::NAMESPACE {
                    let blocks = (self.disk.len() / LBA_SIZE) as u64;
                    unsafe {
                        core::ptr::copy_nonoverlapping(
                            blocks.to_le_bytes().as_ptr(),
                            page,
                            8,
                        );
                        // flbas 0; lbaf[0]: ms 0, lbads from config.
                        page.add(130).write(self.lba_data_size_shift);
                    }
                } else {
                    unsafe {
                        core::ptr::copy_nonoverlapping(
                            self.model_number.as_ptr(),
                            page.add(24),
                            self.model_number.len(),
                        );
                        core::ptr::write_bytes(
                            page.add(24 + self.model_number.len()),
                            b' ',
                            40 - self.model_number.len(),
                        );
                    }
                }
                0
            }
            admin_opcode::CREATE_IO_CQ => {
                let entries = (cmd.cdw10 >> 16) as u16 + 1;
                self.io_cq.reset(cmd.prp1, entries);
                0
            }
            admin_opcode::CREATE_IO_SQ => {
                self.io_sq_bus = cmd.prp1;
                self.io_sq_entries = (cmd.cdw10 >> 16) as u16 + 1;
                self.io_sq_head = 0;
                0
            }
            // Invalid opcode.
            _ => 0x01 << 1,
        }
    }

    fn exec_io(&mut self, cmd: &NvmeCommand) -> u16 {
        self.record(1, cmd);

        if let Some((sct, sc)) = self.fail_next_io.take() {
            return (u16::from(sct) << 9) | (u16::from(sc) << 1);
        }

        match cmd.opc {
            nvm_opcode::FLUSH => {
                self.flush_count += 1;
                0
            }
            nvm_opcode::READ | nvm_opcode::WRITE => {
                let lba = u64::from(cmd.cdw10) | (u64::from(cmd.cdw11) << 32);
                let blocks = cmd.cdw12 as usize + 1;
                let len = blocks * LBA_SIZE;
                let start = lba as usize * LBA_SIZE;
                if start + len > self.disk.len() {
                    // SCT 0, SC 0x80: LBA out of range.
                    return 0x80 << 1;
                }

                let mut disk_off = start;
                for (addr, seg_len) in Self::prp_segments(cmd.prp1, cmd.prp2, len) {
                    let host = addr as usize as *mut u8;
                    unsafe {
                        if cmd.opc == nvm_opcode::READ {
                            core::ptr::copy_nonoverlapping(
                                self.disk.as_ptr().add(disk_off),
                                host,
                                seg_len,
                            );
                        } else {
                            core::ptr::copy_nonoverlapping(
                                host as *const u8,
                                self.disk.as_mut_ptr().add(disk_off),
                                seg_len,
                            );
                        }
                    }
                    disk_off += seg_len;
                }
                0
            }
            _ => 0x01 << 1,
        }
    }

    /// Decode PRP1/PRP2 the way the controller would.
    fn prp_segments(prp1: u64, prp2: u64, len: usize) -> Vec<(u64, usize)> {
        let mut segments = Vec::new();
        let first = (PAGE_SIZE - (prp1 as usize & (PAGE_SIZE - 1))).min(len);
        segments.push((prp1, first));
        let mut remaining = len - first;

        if remaining == 0 {
            return segments;
        }

        if remaining <= PAGE_SIZE {
            segments.push((prp2, remaining));
            return segments;
        }

        let list = prp2 as usize as *const u64;
        let mut index = 0;
        while remaining > 0 {
            let entry = unsafe { list.add(index).read_volatile() };
            let seg = remaining.min(PAGE_SIZE);
            segments.push((entry, seg));
            remaining -= seg;
            index += 1;
        }
        segments
    }
}

/// The injected platform: bridge, clock, cache ops, all backed by one
/// shared [`MockState`].
pub(crate) struct MockNvme {
    pub state: Rc<RefCell<MockState>>,
}

impl MockNvme {
    pub(crate) fn new(disk_blocks: usize) -> (Self, Rc<RefCell<MockState>>) {
        let state = Rc::new(RefCell::new(MockState::new(disk_blocks)));
        (
            Self {
                state: Rc::clone(&state),
            },
            state,
        )
    }
}

impl PcieBridge for MockNvme {
    fn initialize(&mut self) -> Result<(), &'static str> {
        Ok(())
    }

    fn enable_device(&mut self, class: u32, slot: u32, func: u32) -> Result<(), &'static str> {
        if class != 0x01_0802 || slot != 0 || func != 0 {
            return Err("no such function");
        }
        Ok(())
    }

    fn mmio_base(&self) -> usize {
        self.state.borrow().regs.addr()
    }

    fn dma_address(&self, virt: usize) -> u64 {
        virt as u64
    }
}

impl Timer for MockNvme {
    const HZ: u32 = MOCK_HZ;

    fn ticks(&self) -> u32 {
        let state = self.state.borrow();
        (state.time_us / (1_000_000 / u64::from(MOCK_HZ))) as u32
    }

    fn us_delay(&self, us: u32) {
        let mut state = self.state.borrow_mut();
        state.time_us += u64::from(us) * u64::from(state.time_scale);
        state.step();
    }

    fn ms_delay(&self, ms: u32) {
        let mut state = self.state.borrow_mut();
        state.time_us += u64::from(ms) * 1000;
        state.step();
    }

    fn ms_sleep(&self, ms: u32) {
        self.ms_delay(ms);
    }
}

#[cfg(feature = "irq")]
impl InterruptMux for MockNvme {
    fn connect_inta(&mut self, handler: IrqHandler, ctx: *mut ()) {
        self.state.borrow_mut().irq = Some((handler, ctx as usize));
    }

    fn disconnect_inta(&mut self) {
        self.state.borrow_mut().irq = None;
    }
}

impl CacheMaintenance for MockNvme {
    fn clean_data_cache_range(&self, _addr: usize, _len: usize) {
        self.state.borrow_mut().clean_calls += 1;
    }

    fn invalidate_data_cache_range(&self, _addr: usize, _len: usize) {
        self.state.borrow_mut().invalidate_calls += 1;
    }
}

/// Registry that remembers what was announced.
#[derive(Default)]
pub(crate) struct MockRegistry {
    pub devices: Vec<(String, u64, u64)>,
}

impl DeviceRegistry for MockRegistry {
    fn add_device(&mut self, name: &str, first_block: u64, block_count: u64) {
        self.devices.push((String::from(name), first_block, block_count));
    }
}
