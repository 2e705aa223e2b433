//! Trait definitions for platform-provided collaborators
//!
//! The driver is agnostic to the surrounding board support package. These
//! traits abstract the PCIe host bridge, the tick clock, cache maintenance,
//! and the device-name registry. The driver holds its collaborators by
//! value and never reaches for ambient singletons.

/// PCIe host bridge.
///
/// Enables the NVMe function, supplies the MMIO window base (fixed by
/// platform convention), and answers virtual-to-bus address translation
/// for DMA.
pub trait PcieBridge {
    /// Bring up the host bridge.
    fn initialize(&mut self) -> Result<(), &'static str>;

    /// Enable the PCIe function matching `class_code` at `slot`/`func`.
    fn enable_device(&mut self, class_code: u32, slot: u32, func: u32)
    -> Result<(), &'static str>;

    /// Base address of the device's register window.
    fn mmio_base(&self) -> usize;

    /// Translate a CPU virtual address to the address the device sees on
    /// the PCIe fabric.
    fn dma_address(&self, virt: usize) -> u64;
}

/// Tick clock and delay services.
///
/// `ticks()` is a free-running counter at `HZ` ticks per second, used for
/// all timeout bookkeeping. The delay calls busy-wait; `ms_sleep` may
/// yield to a cooperative scheduler.
pub trait Timer {
    /// Ticks per second of the `ticks()` counter.
    const HZ: u32;

    /// Current tick count. Wraps.
    fn ticks(&self) -> u32;

    /// Busy-wait for the given number of microseconds.
    fn us_delay(&self, us: u32);

    /// Busy-wait for the given number of milliseconds.
    fn ms_delay(&self, ms: u32);

    /// Sleep for the given number of milliseconds, yielding to the
    /// scheduler where one exists.
    fn ms_sleep(&self, ms: u32);
}

/// Data-cache maintenance over virtual address ranges.
///
/// Needed around DMA on platforms where the transfer buffers are mapped
/// cacheable: clean before the device reads a buffer, invalidate before
/// the CPU reads what the device wrote.
pub trait CacheMaintenance {
    /// Write dirty cache lines covering `[addr, addr + len)` to memory.
    fn clean_data_cache_range(&self, addr: usize, len: usize);

    /// Discard cache lines covering `[addr, addr + len)`.
    fn invalidate_data_cache_range(&self, addr: usize, len: usize);
}

/// Interrupt handler entry point: a plain function with a user-data slot.
#[cfg(feature = "irq")]
pub type IrqHandler = fn(*mut ());

/// Interrupt multiplexer exposing the PCIe host INTA line.
#[cfg(feature = "irq")]
pub trait InterruptMux {
    /// Route the INTA line to `handler`, which receives `ctx` verbatim.
    fn connect_inta(&mut self, handler: IrqHandler, ctx: *mut ());

    /// Detach the INTA line.
    fn disconnect_inta(&mut self);
}

/// Device-name registry.
///
/// The driver announces the whole device and each partition it finds;
/// what the registry does with the ranges is the platform's business.
pub trait DeviceRegistry {
    /// Register a block range under `name`.
    fn add_device(&mut self, name: &str, first_block: u64, block_count: u64);
}

/// Everything the driver needs from the platform, as one object.
#[cfg(not(feature = "irq"))]
pub trait Platform: PcieBridge + Timer + CacheMaintenance {}

#[cfg(not(feature = "irq"))]
impl<T: PcieBridge + Timer + CacheMaintenance> Platform for T {}

/// Everything the driver needs from the platform, as one object.
#[cfg(feature = "irq")]
pub trait Platform: PcieBridge + Timer + CacheMaintenance + InterruptMux {}

#[cfg(feature = "irq")]
impl<T: PcieBridge + Timer + CacheMaintenance + InterruptMux> Platform for T {}

/// Convert milliseconds to ticks of `T`'s clock.
#[inline]
pub(crate) fn msec_to_ticks<T: Timer>(ms: u32) -> u32 {
    (u64::from(ms) * u64::from(T::HZ) / 1000) as u32
}
