//! # Kernel
//!
//! The global kernel object and the public threading API.
//!
//! All public functions mask interrupts across their critical section and
//! issue synchronization barriers on the way out. The context-switch hooks
//! at the bottom are called from the lowest-priority exception, which by
//! construction cannot preempt any masked section.
//!
//! ## Startup sequence
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         ├─► kernel::init()      ← priorities, root thread, handler stack
//!         ├─► kernel::create()    ← register named threads (×N)
//!         ├─► kernel::start()     ← tick on, scheduler enabled
//!         └─► …main() continues as the root thread…
//! ```
//!
//! The caller of `init` *is* the root thread `_MAIN`: it keeps executing
//! after `start` and is preempted like anything else, but with the floor
//! priority it only gets the CPU back when nothing else is runnable.

use core::mem;
use core::ptr::{self, NonNull};

use crate::arch::port;
use crate::config::KERNEL_STACK_SIZE;
use crate::error::KernelResult;
use crate::scheduler::Scheduler;
use crate::stack::StackRegion;
use crate::sync;
use crate::tcb::{Priority, Tcb, ThreadEntry, ThreadName, ThreadState};
use crate::time::{self, SleepTimer};

// ---------------------------------------------------------------------------
// Global kernel object
// ---------------------------------------------------------------------------

/// The one scheduler instance. Set up by `init()`; accessed through
/// `KERNEL_PTR` from API calls (inside critical sections) and from the
/// context-switch exception.
static mut KERNEL: Scheduler = Scheduler::new();

/// Raw pointer to the global scheduler, for paths that cannot hold a
/// reference across an exception boundary. Written once during `init()`.
static mut KERNEL_PTR: *mut Scheduler = ptr::null_mut();

// ---------------------------------------------------------------------------
// Thread handles
// ---------------------------------------------------------------------------

/// Handle to a live thread, as returned by [`thread`], [`current`] and
/// [`main_thread`].
///
/// A handle is a bare pointer into the registry. It stays valid until the
/// thread terminates; using a handle after that is a programmer error and
/// undefined, the same as naming a freed resource anywhere else.
#[derive(Clone, Copy)]
pub struct ThreadHandle(NonNull<Tcb>);

impl ThreadHandle {
    pub fn name(&self) -> ThreadName {
        sync::critical_section(|| unsafe { self.0.as_ref().name.clone() })
    }

    pub fn state(&self) -> ThreadState {
        sync::critical_section(|| unsafe { self.0.as_ref().state })
    }

    pub fn priority(&self) -> Priority {
        sync::critical_section(|| unsafe { self.0.as_ref().priority })
    }
}

// ---------------------------------------------------------------------------
// Lifecycle API
// ---------------------------------------------------------------------------

/// Initialize the kernel: interrupt priorities, the root thread, and the
/// private handler stack. Must be called exactly once, from the initial
/// execution context, before [`start`].
pub fn init() {
    unsafe {
        KERNEL = Scheduler::new();
        KERNEL_PTR = ptr::addr_of_mut!(KERNEL);
    }
    sync::critical_section(|| unsafe { (*KERNEL_PTR).bootstrap() });
    port::set_interrupt_priorities();

    // Exception handlers get a private stack; the running context moves to
    // the process stack and keeps using its current memory.
    let handler_stack_top = match StackRegion::bare(KERNEL_STACK_SIZE) {
        Ok(region) => {
            let top = region.top();
            mem::forget(region); // lives for the rest of the run
            top
        }
        // No heap this early means the image is misconfigured; park here.
        Err(_) => loop {
            port::wait_for_interrupt();
        },
    };
    unsafe { port::enter_thread_mode(handler_stack_top) };
    port::barrier();
}

/// Start preemption: configure the millisecond tick and enable the
/// scheduler. Before this call, ticks do not request context switches.
#[cfg(target_arch = "arm")]
pub fn start(syst: &mut cortex_m::peripheral::SYST) {
    port::configure_tick(syst);
    enable();
}

/// Host build of [`start`]: there is no tick source, so this only flips
/// the enable flag. Tests drive scheduler passes through the hooks.
#[cfg(not(target_arch = "arm"))]
pub fn start() {
    enable();
}

fn enable() {
    sync::critical_section(|| unsafe { (*KERNEL_PTR).enabled = true });
    port::barrier();
}

/// Create a named thread in state `Ready`. It competes for the CPU at the
/// next scheduler pass.
pub fn create(
    name: &str,
    stack_size: usize,
    entry: ThreadEntry,
    priority: Priority,
) -> KernelResult<()> {
    let result = sync::critical_section(|| unsafe {
        (*KERNEL_PTR).create(name, stack_size, entry, priority, thread_return)
    });
    #[cfg(feature = "defmt")]
    if result.is_ok() {
        defmt::trace!("created thread {=str}", name);
    }
    result
}

/// Look up a live thread by name.
pub fn thread(name: &str) -> Option<ThreadHandle> {
    sync::critical_section(|| unsafe {
        (*KERNEL_PTR).find_mut(name).map(|t| ThreadHandle(NonNull::from(t)))
    })
}

/// The currently running thread.
pub fn current() -> ThreadHandle {
    sync::critical_section(|| unsafe {
        ThreadHandle(NonNull::new_unchecked((*KERNEL_PTR).current()))
    })
}

/// The root thread `_MAIN`.
pub fn main_thread() -> ThreadHandle {
    sync::critical_section(|| unsafe {
        ThreadHandle(NonNull::new_unchecked((*KERNEL_PTR).root()))
    })
}

// ---------------------------------------------------------------------------
// Blocking / yielding primitives
// ---------------------------------------------------------------------------

/// Pend the context-switch exception, unless the scheduler is disabled or
/// a switch is already on its way. Callers hold the critical section.
fn request_switch(kernel: &Scheduler) {
    if kernel.enabled && !port::switch_pending() {
        port::pend_switch();
    }
}

/// Give up the CPU immediately. No state change: the caller stays
/// runnable, and also forces parked threads to be re-evaluated, so a
/// freshly unblocked higher-priority thread runs right away.
pub fn yield_now() {
    sync::critical_section(|| unsafe { request_switch(&*KERNEL_PTR) });
    port::barrier();
}

/// Block the current thread. It will not run again until another thread
/// unblocks it.
pub fn block() {
    sync::critical_section(|| unsafe {
        let kernel = &mut *KERNEL_PTR;
        (*kernel.current()).state = ThreadState::Blocked;
        request_switch(kernel);
    });
    port::barrier();
}

/// Block another thread. No switch is requested: the victim is usually not
/// the caller, and deferring the switch lets the caller finish its own
/// work before the change takes effect.
pub fn block_thread(mut target: ThreadHandle) {
    sync::critical_section(|| unsafe {
        target.0.as_mut().state = ThreadState::Blocked;
    });
    port::barrier();
}

/// Return a blocked thread to contention. A switch is requested so that a
/// more urgent awakened thread preempts the caller immediately.
pub fn unblock(mut target: ThreadHandle) {
    sync::critical_section(|| unsafe {
        target.0.as_mut().state = ThreadState::Paused;
        request_switch(&*KERNEL_PTR);
    });
    port::barrier();
}

/// Put the current thread to sleep for at least `ms` milliseconds. Wake-up
/// happens on the first scheduler pass after the delay elapses; delays
/// beyond half the clock range are not supported.
pub fn sleep(ms: u32) {
    sync::critical_section(|| unsafe {
        let kernel = &mut *KERNEL_PTR;
        let cur = &mut *kernel.current();
        cur.state = ThreadState::Sleeping;
        cur.sleep = SleepTimer::until(ms, time::now_ms());
        request_switch(kernel);
    });
    port::barrier();
}

// ---------------------------------------------------------------------------
// Tick and context-switch hooks
// ---------------------------------------------------------------------------

/// Tick entry, called once per millisecond by the port's tick handler:
/// advance the clock and drive preemption. Selection happens later, in the
/// context-switch exception.
pub fn kernel_tick() {
    time::advance();
    let kernel = unsafe { &*KERNEL_PTR };
    request_switch(kernel);
}

/// Store the outgoing thread's stack pointer. The context-switch exception
/// calls this right after pushing the register frame onto that stack.
///
/// # Safety
/// `psp` must point at the frame just saved for the current thread, and the
/// kernel must have been initialized.
#[no_mangle]
pub unsafe extern "C" fn kernel_save_context(psp: *mut usize) {
    let kernel = unsafe { &mut *KERNEL_PTR };
    if let Some(cur) = unsafe { kernel.current().as_mut() } {
        debug_assert!(
            cur.stack.as_ref().map_or(true, |s| s.contains(psp)),
            "saved stack pointer escaped its region"
        );
        cur.sp = psp;
    }
}

/// Pick the next thread and hand back its saved stack pointer for the
/// restore half of the context-switch exception.
///
/// # Safety
/// Must run with nothing else touching kernel state: either from the
/// lowest-priority exception, or single-threaded on the host.
#[no_mangle]
pub unsafe extern "C" fn kernel_switch_context() -> *mut usize {
    let kernel = unsafe { &mut *KERNEL_PTR };
    kernel.reschedule(time::now_ms())
}

// ---------------------------------------------------------------------------
// Termination trampoline
// ---------------------------------------------------------------------------

/// Lands here when a thread's entry function returns; every initial trap
/// frame carries this address in its forged link register.
///
/// Runs in the dying thread's context — on a stack that is released part
/// way through — until the pended switch takes the CPU away, so it must do
/// nothing beyond the teardown itself.
extern "C" fn thread_return() -> ! {
    sync::critical_section(|| unsafe {
        let kernel = &mut *KERNEL_PTR;
        let dying = kernel.current();
        #[cfg(feature = "defmt")]
        defmt::trace!("thread {=str} terminated", (*dying).name.as_str());
        let root = kernel.root();
        kernel.set_current(root); // valid fallback until the switch lands
        kernel.remove(dying); // drops the TCB and frees its stack region
        request_switch(kernel);
    });
    port::barrier();
    loop {
        port::wait_for_interrupt();
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
