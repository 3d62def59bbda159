//! # prios
//!
//! A small preemptive RTOS kernel for single-core ARM Cortex-M parts:
//! named threads with fixed priorities, blocking and unblocking,
//! millisecond sleep, cooperative yield, and a 1 kHz tick driving PendSV
//! context switches.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 Application threads                 │
//! ├─────────────────────────────────────────────────────┤
//! │                Kernel API (kernel.rs)               │
//! │  init · create · start · block · unblock · sleep    │
//! ├───────────────┬──────────────────┬──────────────────┤
//! │  Scheduler    │  Stack factory   │  Sync primitives │
//! │  scheduler.rs │  stack.rs        │  sync.rs         │
//! │  ─ registry   │  ─ trap frames   │  ─ critical      │
//! │  ─ selector   │  ─ owned regions │    sections      │
//! │  ─ timers     │                  │                  │
//! ├───────────────┴──────────────────┴──────────────────┤
//! │          Thread model (tcb.rs · time.rs)            │
//! │     Tcb · Priority · ThreadState · SleepTimer       │
//! ├─────────────────────────────────────────────────────┤
//! │          Port layer (arch/cortex_m4.rs)             │
//! │   SysTick · PendSV · barriers · thread-mode entry   │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Scheduling model
//!
//! One thread runs at a time. Preemption points are the millisecond tick
//! and the explicit primitives; selection is strict fixed priority with
//! the root thread `_MAIN` as the floor, and an equal-priority tie
//! prefers a thread that has already started over one that has not.
//!
//! ## Memory model
//!
//! Thread stacks and control blocks come from the global allocator the
//! firmware installs; each stack is owned by its TCB and released when the
//! thread's entry function returns. The registry is a pointer-stable
//! vector, so thread handles remain valid for a thread's whole life.
//! Shared state is confined to the one kernel object, serialized by
//! interrupt-masked critical sections.

#![no_std]

extern crate alloc;
#[cfg(test)]
extern crate std;

pub mod arch;
pub mod config;
pub mod error;
pub mod kernel;
pub mod scheduler;
pub mod stack;
pub mod sync;
pub mod tcb;
pub mod time;

pub use error::{KernelError, KernelResult};
pub use kernel::{
    block, block_thread, create, current, init, main_thread, sleep, start, thread, unblock,
    yield_now, ThreadHandle,
};
pub use tcb::{Priority, ThreadEntry, ThreadState};
pub use time::now_ms;
