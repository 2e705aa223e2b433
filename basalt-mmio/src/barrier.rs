//! Memory Barriers
//!
//! Ordering primitives for driver/device communication. A driver that fills
//! a ring entry in ordinary memory and then writes a doorbell register must
//! make sure the entry is visible to the device before the doorbell is, and
//! must not let the CPU hoist loads of device-written completion entries
//! out of a polling loop.
//!
//! On aarch64 the heavy barriers map to the architectural `dsb`/`dmb`
//! instructions. On other targets (host-side unit tests) they degrade to
//! compiler/CPU fences, which is sufficient there since no real device
//! memory is involved.

use core::sync::atomic::{Ordering, fence};

/// Read barrier (acquire semantics).
///
/// All loads before the barrier complete before any loads after it.
#[inline]
pub fn read_barrier() {
    fence(Ordering::Acquire);
}

/// Write barrier (release semantics).
///
/// All stores before the barrier complete before any stores after it.
#[inline]
pub fn write_barrier() {
    fence(Ordering::Release);
}

/// Data Synchronisation Barrier (`dsb sy`).
///
/// Waits for every prior memory access, including device memory, to
/// complete. Required between filling a queue entry and ringing the
/// doorbell that publishes it.
#[inline]
pub fn dsb() {
    #[cfg(target_arch = "aarch64")]
    // SAFETY: DSB has no side effects beyond ordering.
    unsafe {
        core::arch::asm!("dsb sy", options(nostack, preserves_flags));
    }

    #[cfg(not(target_arch = "aarch64"))]
    fence(Ordering::SeqCst);
}

/// Data Memory Barrier (`dmb sy`).
///
/// Orders memory accesses without waiting for their completion. Used at
/// the top of completion-poll loops so each iteration observes fresh
/// device writes.
#[inline]
pub fn dmb() {
    #[cfg(target_arch = "aarch64")]
    // SAFETY: DMB has no side effects beyond ordering.
    unsafe {
        core::arch::asm!("dmb sy", options(nostack, preserves_flags));
    }

    #[cfg(not(target_arch = "aarch64"))]
    fence(Ordering::SeqCst);
}
