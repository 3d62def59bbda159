//! Interrupt-masked critical sections.
//!
//! Every mutation of the registry or of thread state happens inside one of
//! these. The tick fires at the highest exception priority but mutates
//! nothing; the context-switch exception mutates state but runs at the
//! lowest priority, so it can never land inside a masked section.

/// Run `f` with interrupts masked. Keep the enclosed work short: the tick
/// is masked too, and long sections cost scheduling latency.
#[cfg(target_arch = "arm")]
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    cortex_m::interrupt::free(|_| f())
}

/// Host stand-in: unit tests drive the kernel from a single thread, so the
/// closure just runs.
#[cfg(not(target_arch = "arm"))]
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    f()
}
