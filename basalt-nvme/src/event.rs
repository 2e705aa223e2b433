//! Single-shot completion event for interrupt-driven waits
//!
//! Cleared by the submitter before the doorbell write, set by the INTA
//! handler. The waiter still verifies the completion slot afterwards;
//! a spurious wake-up just means more polling.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::platform::Timer;

/// A one-shot event flag.
pub struct CompletionEvent {
    fired: AtomicBool,
}

impl CompletionEvent {
    /// Create an unsignalled event.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            fired: AtomicBool::new(false),
        }
    }

    /// Reset the event. Call before making the command visible.
    #[inline]
    pub fn clear(&self) {
        self.fired.store(false, Ordering::Release);
    }

    /// Signal the event. Safe to call from interrupt context.
    #[inline]
    pub fn set(&self) {
        self.fired.store(true, Ordering::Release);
    }

    /// Wait until the event fires or `timeout_ticks` elapse.
    ///
    /// Returns `true` on timeout. Sleeps cooperatively between checks.
    pub fn wait_with_timeout<T: Timer>(&self, timer: &T, timeout_ticks: u32) -> bool {
        let start = timer.ticks();
        while !self.fired.load(Ordering::Acquire) {
            if timer.ticks().wrapping_sub(start) > timeout_ticks {
                return true;
            }
            timer.ms_sleep(1);
        }
        false
    }
}

impl Default for CompletionEvent {
    fn default() -> Self {
        Self::new()
    }
}
