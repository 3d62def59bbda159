//! # Cortex-M4 port
//!
//! SysTick drives the millisecond tick; PendSV performs the context
//! switch. The two sit at opposite ends of the exception priority space:
//!
//! - **SysTick**: highest priority, so the clock never loses ticks. The
//!   handler mutates nothing — it advances the clock and pends PendSV.
//! - **PendSV**: lowest priority, so a switch only happens once no other
//!   handler is active and never inside a masked critical section.
//!
//! ## Context switch
//!
//! On exception entry the hardware stacks `r0`-`r3`, `r12`, `lr`, `pc` and
//! `xPSR` onto the process stack. The PendSV handler pushes `r4`-`r11`
//! below that, hands the resulting stack pointer to the kernel, gets the
//! incoming thread's pointer back, pops `r4`-`r11` from it and
//! exception-returns; the hardware unstacks the rest and execution resumes
//! in the incoming thread.

use core::arch::{asm, naked_asm};

use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::SYST;

use crate::config::{SYSTEM_CLOCK_HZ, TICK_HZ};

/// Interrupt Control and State Register.
const ICSR: *mut u32 = 0xE000_ED04 as *mut u32;
/// System Handler Priority Register 3: PendSV in bits [23:16], SysTick in
/// bits [31:24].
const SHPR3: *mut u32 = 0xE000_ED20 as *mut u32;
const PENDSVSET: u32 = 1 << 28;

// ---------------------------------------------------------------------------
// Tick configuration
// ---------------------------------------------------------------------------

/// Configure SysTick to fire at [`TICK_HZ`] from the core clock.
pub fn configure_tick(syst: &mut SYST) {
    let reload = SYSTEM_CLOCK_HZ / TICK_HZ - 1;
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

/// SysTick to the highest exception priority, PendSV to the lowest.
pub fn set_interrupt_priorities() {
    unsafe {
        let val = core::ptr::read_volatile(SHPR3);
        let val = (val & 0x0000_FFFF) | (0xFF << 16);
        core::ptr::write_volatile(SHPR3, val);
    }
}

// ---------------------------------------------------------------------------
// Switch requests
// ---------------------------------------------------------------------------

/// Pend the PendSV exception.
#[inline]
pub fn pend_switch() {
    unsafe { core::ptr::write_volatile(ICSR, PENDSVSET) }
}

/// True if a context switch is already pending.
#[inline]
pub fn switch_pending() -> bool {
    unsafe { core::ptr::read_volatile(ICSR as *const u32) & PENDSVSET != 0 }
}

/// Data then instruction synchronization barrier, issued when leaving a
/// critical section so state changes are visible before the next
/// instruction fetch.
#[inline]
pub fn barrier() {
    cortex_m::asm::dsb();
    cortex_m::asm::isb();
}

#[inline]
pub fn wait_for_interrupt() {
    cortex_m::asm::wfi();
}

// ---------------------------------------------------------------------------
// Thread-mode bootstrap
// ---------------------------------------------------------------------------

/// Move the running context onto the process stack and hand the exception
/// handlers a private main stack.
///
/// PSP is pointed at the current MSP value, so the executing code keeps
/// its stack memory and simply continues through the other stack-pointer
/// register; MSP is then free to be repointed at the handler stack.
/// Thread mode stays privileged: the switch-request path writes ICSR,
/// which faults from unprivileged code.
///
/// # Safety
/// `handler_stack_top` must be the 8-aligned top of a region large enough
/// for the deepest exception nesting. Call once, from the initial context,
/// with interrupts enabled but no kernel exceptions configured yet.
pub unsafe fn enter_thread_mode(handler_stack_top: *mut u8) {
    unsafe {
        asm!(
            "mrs {tmp}, msp",
            "msr psp, {tmp}",
            "msr msp, {kstack}",
            "mov {tmp}, #2",
            "msr control, {tmp}",
            "isb",
            tmp = out(reg) _,
            kstack = in(reg) handler_stack_top,
        );
    }
}

// ---------------------------------------------------------------------------
// Exception handlers
// ---------------------------------------------------------------------------

/// SysTick handler: one tick per millisecond.
#[allow(non_snake_case)]
#[unsafe(no_mangle)]
pub extern "C" fn SysTick() {
    crate::kernel::kernel_tick();
}

/// PendSV handler: the register save/restore stub around the kernel's
/// context-switch hooks.
///
/// Only `r0`-`r3` and `r12` may be touched outside the save/restore pairs;
/// everything else belongs to the thread being switched out.
///
/// # Safety
/// Invoked by the NVIC only. Requires an initialized kernel and a valid
/// process stack in PSP.
#[allow(non_snake_case)]
#[unsafe(no_mangle)]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() {
    naked_asm!(
        // Save the outgoing context below the hardware-stacked frame.
        "mrs r0, psp",
        "stmdb r0!, {{r4-r11}}",
        // kernel_save_context(psp): record where the context went.
        "bl {save}",
        // kernel_switch_context() -> incoming psp in r0.
        "bl {switch}",
        // Restore the incoming context.
        "ldmia r0!, {{r4-r11}}",
        "msr psp, r0",
        // Exception return 0xFFFFFFFD: thread mode, process stack.
        "mvn r0, #2",
        "bx r0",
        save = sym crate::kernel::kernel_save_context,
        switch = sym crate::kernel::kernel_switch_context,
    );
}
