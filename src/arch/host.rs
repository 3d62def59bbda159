//! No-op port for non-ARM builds.
//!
//! Switch requests go nowhere: the unit tests invoke the kernel's
//! context-switch hooks directly, standing in for the exception.

pub fn set_interrupt_priorities() {}

pub fn pend_switch() {}

pub fn switch_pending() -> bool {
    false
}

pub fn barrier() {}

pub fn wait_for_interrupt() {}

/// # Safety
/// Trivially safe on the host; mirrors the Cortex-M signature.
pub unsafe fn enter_thread_mode(_handler_stack_top: *mut u8) {}
