//! # Demo firmware
//!
//! Exercises the kernel with three named threads plus the root thread:
//!
//! | Thread       | Priority | Behavior                                     |
//! |--------------|----------|----------------------------------------------|
//! | `heartbeat`  | High     | Bumps a counter twice a second, sleeping in  |
//! |              |          | between.                                     |
//! | `boot-check` | Normal   | Runs one sanity pass over the registry, then |
//! |              |          | returns — exercising thread termination.     |
//! | `background` | Low      | Spins and yields, soaking up leftover CPU.   |
//! | `_MAIN`      | None     | This file's `main`, parked in `wfi`.         |
//!
//! The heartbeat preempts the background spinner on every wake-up; when
//! both are parked the root thread gets the CPU back.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(target_os = "none")]
mod firmware {
    use core::alloc::{GlobalAlloc, Layout};
    use core::ptr::{addr_of_mut, null_mut};
    use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    use cortex_m_rt::entry;
    use panic_halt as _;

    use prios::{kernel, Priority};

    // -----------------------------------------------------------------------
    // Heap
    // -----------------------------------------------------------------------

    const HEAP_SIZE: usize = 8 * 1024;
    static mut HEAP_MEM: [u8; HEAP_SIZE] = [0; HEAP_SIZE];

    /// Minimal bump allocator backing thread stacks and control blocks.
    /// Freed blocks are not reclaimed, which is fine for a demo that
    /// creates a bounded set of threads.
    struct BumpAlloc {
        next: AtomicUsize,
        end: AtomicUsize,
    }

    impl BumpAlloc {
        const fn new() -> Self {
            Self {
                next: AtomicUsize::new(0),
                end: AtomicUsize::new(0),
            }
        }

        fn init(&self, start: usize, size: usize) {
            self.next.store(start, Ordering::Relaxed);
            self.end.store(start + size, Ordering::Relaxed);
        }
    }

    unsafe impl GlobalAlloc for BumpAlloc {
        unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
            let current = self.next.load(Ordering::Relaxed);
            let aligned = (current + layout.align() - 1) & !(layout.align() - 1);
            let new_next = aligned + layout.size();
            if new_next > self.end.load(Ordering::Relaxed) {
                return null_mut();
            }
            self.next.store(new_next, Ordering::Relaxed);
            aligned as *mut u8
        }

        unsafe fn dealloc(&self, _ptr: *mut u8, _layout: Layout) {}
    }

    #[global_allocator]
    static HEAP: BumpAlloc = BumpAlloc::new();

    // -----------------------------------------------------------------------
    // Thread bodies
    // -----------------------------------------------------------------------

    static BEATS: AtomicU32 = AtomicU32::new(0);

    /// Wakes twice a second and bumps the beat counter. Highest-priority
    /// work in the system, so each wake-up preempts whatever else runs.
    extern "C" fn heartbeat() {
        loop {
            BEATS.fetch_add(1, Ordering::Relaxed);
            kernel::sleep(500);
        }
    }

    /// One-shot startup check: confirms the other threads are registered,
    /// then returns and lets the kernel tear it down.
    extern "C" fn boot_check() {
        if kernel::thread("heartbeat").is_none() || kernel::thread("background").is_none() {
            // A missing sibling means creation order in main() changed;
            // park instead of reporting garbage.
            kernel::block();
        }
    }

    /// Soaks up whatever CPU is left, yielding on every pass so waking
    /// threads get re-evaluated promptly.
    extern "C" fn background() {
        loop {
            kernel::yield_now();
        }
    }

    // -----------------------------------------------------------------------
    // Entry
    // -----------------------------------------------------------------------

    #[entry]
    fn main() -> ! {
        HEAP.init(addr_of_mut!(HEAP_MEM) as usize, HEAP_SIZE);

        let mut peripherals = cortex_m::Peripherals::take().unwrap();

        kernel::init();

        kernel::create("heartbeat", 512, heartbeat, Priority::High)
            .expect("failed to create heartbeat");
        kernel::create("boot-check", 256, boot_check, Priority::Normal)
            .expect("failed to create boot-check");
        kernel::create("background", 256, background, Priority::Low)
            .expect("failed to create background");

        kernel::start(&mut peripherals.SYST);

        // From here on this is the root thread: floor priority, scheduled
        // only when everything else is parked.
        loop {
            cortex_m::asm::wfi();
        }
    }
}

#[cfg(not(target_os = "none"))]
fn main() {}
