//! Compile-time constants governing the kernel.
//!
//! Everything here is fixed at build time; there are no runtime knobs.

/// Maximum thread name length in bytes. `create` rejects longer names and
/// lookups treat an over-long query as a miss.
pub const MAX_NAME_LEN: usize = 16;

/// Smallest stack a thread may be given, not counting the initial trap
/// frame. Covers the prologue the code generator emits on entry before the
/// first context switch has a chance to save anything.
pub const MIN_STACK_SIZE: usize = 48;

/// Size of the private stack `init` hands to the exception handlers.
pub const KERNEL_STACK_SIZE: usize = 256;

/// Tick frequency in Hz. One tick per millisecond drives both the
/// millisecond clock and preemption.
pub const TICK_HZ: u32 = 1_000;

/// Core clock frequency used to derive the SysTick reload value
/// (16 MHz HSI default on STM32F4 parts).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;
