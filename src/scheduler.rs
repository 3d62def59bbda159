//! # Scheduler core
//!
//! The registry of live threads, the priority selector, and sleep-timer
//! expiry. Nothing in this module touches hardware: callers either hold a
//! critical section (the API layer) or already run at the lowest exception
//! priority with nothing to race against (the context-switch hook). That
//! boundary is what lets the whole scheduling policy run under host tests.
//!
//! ## Selection policy
//!
//! The registry is scanned linearly with slot 0 (the root thread) as the
//! floor. A strictly more urgent priority always wins. On a priority tie a
//! `Paused` thread beats a `Ready` one, so a thread that has already been
//! started is resumed in preference to cold-starting a fresh one. There is
//! no aging and no round-robin between equals; ties fall to registry order.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::ptr;

use crate::config::MAX_NAME_LEN;
use crate::error::{KernelError, KernelResult};
use crate::stack::StackRegion;
use crate::tcb::{Priority, Tcb, ThreadEntry, ThreadName, ThreadState};

/// The central scheduler state: every live TCB plus the pointer to the one
/// that is running. Stored as a single global in `kernel.rs`; everything
/// here takes `&mut self` and leaves interrupt discipline to the caller.
pub struct Scheduler {
    /// All live threads. Slot 0 is the root thread and never leaves; the
    /// other slots keep their relative order across insertions and
    /// removals. Boxing pins each TCB so handles held by application code
    /// stay valid while the vector reallocates.
    threads: Vec<Box<Tcb>>,
    /// The one TCB in state `Running`. Null until [`bootstrap`] runs.
    ///
    /// [`bootstrap`]: Scheduler::bootstrap
    current: *mut Tcb,
    /// Ticks pend context switches only while this is set.
    pub enabled: bool,
}

impl Scheduler {
    pub const fn new() -> Self {
        Self {
            threads: Vec::new(),
            current: ptr::null_mut(),
            enabled: false,
        }
    }

    /// Install the root thread at slot 0 and make it current.
    pub fn bootstrap(&mut self) {
        debug_assert!(self.threads.is_empty());
        let mut root = Box::new(Tcb::root());
        let root_ptr: *mut Tcb = &mut *root;
        self.threads.push(root);
        self.current = root_ptr;
    }

    // -----------------------------------------------------------------------
    // Registry
    // -----------------------------------------------------------------------

    /// Create a thread in state `Ready`.
    ///
    /// The name is validated before anything is allocated, and a failed
    /// stack allocation leaves the registry untouched, so there is never a
    /// partially created thread.
    pub fn create(
        &mut self,
        name: &str,
        stack_size: usize,
        entry: ThreadEntry,
        priority: Priority,
        ret: extern "C" fn() -> !,
    ) -> KernelResult<()> {
        if name.is_empty() {
            return Err(KernelError::InvalidName);
        }
        let name = ThreadName::try_from(name).map_err(|_| KernelError::InvalidName)?;
        if self.find(name.as_str()).is_some() {
            return Err(KernelError::InvalidName);
        }
        let stack = StackRegion::with_frame(stack_size, entry, ret)?;
        self.threads.push(Box::new(Tcb::new(name, priority, entry, stack)));
        Ok(())
    }

    /// Look up a live thread by name. An over-long query can never match
    /// a stored name, so it misses without scanning.
    pub fn find(&self, name: &str) -> Option<&Tcb> {
        if name.len() > MAX_NAME_LEN {
            return None;
        }
        self.threads.iter().find(|t| t.name.as_str() == name).map(|t| &**t)
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut Tcb> {
        if name.len() > MAX_NAME_LEN {
            return None;
        }
        self.threads
            .iter_mut()
            .find(|t| t.name.as_str() == name)
            .map(|t| &mut **t)
    }

    /// Unlink `tcb` and drop it, releasing its stack region. The root
    /// thread is never removed.
    pub fn remove(&mut self, tcb: *mut Tcb) {
        if let Some(i) = self.threads.iter().position(|t| ptr::eq(&**t, tcb)) {
            if i != 0 {
                self.threads.remove(i);
            }
        }
    }

    /// Every live thread, root first; the rest in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Tcb> {
        self.threads.iter().map(|t| &**t)
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    pub fn current(&self) -> *mut Tcb {
        self.current
    }

    pub fn set_current(&mut self, tcb: *mut Tcb) {
        self.current = tcb;
    }

    pub fn root(&mut self) -> *mut Tcb {
        &mut *self.threads[0]
    }

    // -----------------------------------------------------------------------
    // Selection
    // -----------------------------------------------------------------------

    /// Wake sleepers whose delay has elapsed: `Sleeping` becomes `Paused`,
    /// which puts them back in contention for the selection that follows.
    pub fn update_timers(&mut self, now: u32) {
        for t in self.threads.iter_mut() {
            if t.state == ThreadState::Sleeping && t.sleep.expired(now) {
                t.state = ThreadState::Paused;
            }
        }
    }

    /// Choose the thread to run next and make it current.
    ///
    /// A current thread still in `Running` is demoted to `Paused` first:
    /// being chosen against is an implicit preemption. It then competes on
    /// equal terms with everything else.
    pub fn pick_next(&mut self) -> *mut Tcb {
        if let Some(cur) = unsafe { self.current.as_mut() } {
            if cur.state == ThreadState::Running {
                cur.state = ThreadState::Paused;
            }
        }

        let mut best = 0;
        for i in 1..self.threads.len() {
            let t = &self.threads[i];
            if !t.state.is_runnable() {
                continue;
            }
            let b = &self.threads[best];
            if t.priority < b.priority
                || (t.priority == b.priority
                    && t.state == ThreadState::Paused
                    && b.state == ThreadState::Ready)
            {
                best = i;
            }
        }

        let chosen: *mut Tcb = &mut *self.threads[best];
        unsafe { (*chosen).state = ThreadState::Running };
        self.current = chosen;
        chosen
    }

    /// The context-switch hook body: expire timers, reselect, and hand back
    /// the incoming thread's saved stack pointer.
    pub fn reschedule(&mut self, now: u32) -> *mut usize {
        self.update_timers(now);
        let next = self.pick_next();
        unsafe { (*next).sp }
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tcb::ROOT_NAME;

    extern "C" fn nop_entry() {}
    extern "C" fn never_returns() -> ! {
        unreachable!()
    }

    fn sched() -> Scheduler {
        let mut s = Scheduler::new();
        s.bootstrap();
        s
    }

    fn spawn(s: &mut Scheduler, name: &str, priority: Priority) {
        s.create(name, 128, nop_entry, priority, never_returns).unwrap();
    }

    fn state_of(s: &Scheduler, name: &str) -> ThreadState {
        s.find(name).unwrap().state
    }

    fn running_count(s: &Scheduler) -> usize {
        s.iter().filter(|t| t.state == ThreadState::Running).count()
    }

    #[test]
    fn bootstrap_installs_root_at_slot_zero() {
        let mut s = sched();
        let first = s.iter().next().unwrap();
        assert_eq!(first.name.as_str(), ROOT_NAME);
        assert_eq!(first.priority, Priority::None);
        assert_eq!(first.state, ThreadState::Running);
        assert!(ptr::eq(s.current(), s.root()));
    }

    #[test]
    fn create_inserts_ready_thread() {
        let mut s = sched();
        spawn(&mut s, "worker", Priority::High);
        assert_eq!(s.len(), 2);
        let t = s.find("worker").unwrap();
        assert_eq!(t.state, ThreadState::Ready);
        assert_eq!(t.priority, Priority::High);
        assert!(!t.sp.is_null());
    }

    #[test]
    fn duplicate_name_is_rejected_without_mutation() {
        let mut s = sched();
        assert!(s.create("foo", 256, nop_entry, Priority::Normal, never_returns).is_ok());
        let err = s.create("foo", 256, nop_entry, Priority::Normal, never_returns);
        assert_eq!(err, Err(KernelError::InvalidName));
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn bad_names_are_rejected() {
        let mut s = sched();
        assert_eq!(
            s.create("", 128, nop_entry, Priority::Normal, never_returns),
            Err(KernelError::InvalidName)
        );
        assert_eq!(
            s.create("name-that-is-far-too-long", 128, nop_entry, Priority::Normal, never_returns),
            Err(KernelError::InvalidName)
        );
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn overlong_lookup_misses() {
        let s = sched();
        assert!(s.find("name-that-is-far-too-long").is_none());
    }

    #[test]
    fn more_urgent_priority_always_wins() {
        let mut s = sched();
        spawn(&mut s, "hi", Priority::High);
        spawn(&mut s, "lo", Priority::Normal);

        let chosen = s.pick_next();
        assert_eq!(unsafe { (*chosen).name.as_str() }, "hi");
        assert_eq!(state_of(&s, "hi"), ThreadState::Running);
        assert_eq!(state_of(&s, "lo"), ThreadState::Ready);
        assert_eq!(running_count(&s), 1);

        // While "hi" is runnable, "lo" is never selected, wherever the
        // selector starts from.
        for _ in 0..3 {
            let chosen = s.pick_next();
            assert_eq!(unsafe { (*chosen).name.as_str() }, "hi");
        }

        // Once "hi" leaves contention the less urgent thread gets the CPU.
        s.find_mut("hi").unwrap().state = ThreadState::Blocked;
        let chosen = s.pick_next();
        assert_eq!(unsafe { (*chosen).name.as_str() }, "lo");
    }

    #[test]
    fn equal_priority_tie_prefers_started_thread() {
        let mut s = sched();
        // "fresh" sits earlier in the registry and has never run;
        // "resumed" has already been started and was preempted.
        spawn(&mut s, "fresh", Priority::Normal);
        spawn(&mut s, "resumed", Priority::Normal);
        s.find_mut("resumed").unwrap().state = ThreadState::Paused;

        let chosen = s.pick_next();
        assert_eq!(unsafe { (*chosen).name.as_str() }, "resumed");
    }

    #[test]
    fn block_then_unblock_hands_off_and_back() {
        let mut s = sched();
        spawn(&mut s, "x", Priority::Normal);
        spawn(&mut s, "y", Priority::Normal);

        // "x" runs first (registry order), then blocks itself.
        let chosen = s.pick_next();
        assert_eq!(unsafe { (*chosen).name.as_str() }, "x");
        s.find_mut("x").unwrap().state = ThreadState::Blocked;

        // "y" takes over.
        let chosen = s.pick_next();
        assert_eq!(unsafe { (*chosen).name.as_str() }, "y");

        // Unblocking returns "x" to Paused; on the next pass the started
        // pair tie falls to registry order and "x" resumes.
        s.find_mut("x").unwrap().state = ThreadState::Paused;
        assert_eq!(state_of(&s, "x"), ThreadState::Paused);
        let chosen = s.pick_next();
        assert_eq!(unsafe { (*chosen).name.as_str() }, "x");
        assert_eq!(state_of(&s, "y"), ThreadState::Paused);
    }

    #[test]
    fn block_unblock_roundtrip_preserves_sp() {
        let mut s = sched();
        spawn(&mut s, "t", Priority::Normal);
        let sp_before = s.find("t").unwrap().sp;

        s.find_mut("t").unwrap().state = ThreadState::Blocked;
        assert!(!state_of(&s, "t").is_runnable());
        s.find_mut("t").unwrap().state = ThreadState::Paused;

        let t = s.find("t").unwrap();
        assert!(t.state.is_runnable());
        assert_eq!(t.sp, sp_before);
    }

    #[test]
    fn root_is_the_fallback_when_everything_is_parked() {
        let mut s = sched();
        spawn(&mut s, "a", Priority::Critical);
        spawn(&mut s, "b", Priority::High);
        s.find_mut("a").unwrap().state = ThreadState::Blocked;
        s.find_mut("b").unwrap().state = ThreadState::Sleeping;
        s.find_mut("b").unwrap().sleep = crate::time::SleepTimer::until(u32::MAX / 4, 0);

        let chosen = s.pick_next();
        assert_eq!(unsafe { (*chosen).name.as_str() }, ROOT_NAME);
        assert_eq!(running_count(&s), 1);
    }

    #[test]
    fn sleeper_wakes_on_the_pass_after_expiry() {
        let mut s = sched();
        spawn(&mut s, "t", Priority::Normal);
        s.pick_next();
        let t = s.find_mut("t").unwrap();
        t.state = ThreadState::Sleeping;
        t.sleep = crate::time::SleepTimer::until(50, 0);

        // Before the deadline the sleeper is never selected.
        s.update_timers(40);
        assert_eq!(state_of(&s, "t"), ThreadState::Sleeping);
        let chosen = s.pick_next();
        assert_eq!(unsafe { (*chosen).name.as_str() }, ROOT_NAME);

        // At the deadline it becomes Paused and wins the next selection.
        s.update_timers(50);
        assert_eq!(state_of(&s, "t"), ThreadState::Paused);
        let chosen = s.pick_next();
        assert_eq!(unsafe { (*chosen).name.as_str() }, "t");
    }

    #[test]
    fn zero_sleep_behaves_like_a_yield() {
        let mut s = sched();
        spawn(&mut s, "t", Priority::Normal);
        s.pick_next();
        let t = s.find_mut("t").unwrap();
        t.state = ThreadState::Sleeping;
        t.sleep = crate::time::SleepTimer::until(0, 7);

        // Same pass, same timestamp: the sleep has already expired and the
        // thread competes exactly as a yielded (Paused) thread would.
        let sp = s.reschedule(7);
        assert_eq!(state_of(&s, "t"), ThreadState::Running);
        assert_eq!(sp, s.find("t").unwrap().sp);
    }

    #[test]
    fn demoted_current_competes_as_paused() {
        let mut s = sched();
        spawn(&mut s, "steady", Priority::Normal);
        s.pick_next();
        assert_eq!(state_of(&s, "steady"), ThreadState::Running);

        spawn(&mut s, "urgent", Priority::High);
        let chosen = s.pick_next();
        assert_eq!(unsafe { (*chosen).name.as_str() }, "urgent");
        // The loser was demoted, not blocked.
        assert_eq!(state_of(&s, "steady"), ThreadState::Paused);
    }

    #[test]
    fn removal_drops_the_thread_and_keeps_order() {
        let mut s = sched();
        spawn(&mut s, "a", Priority::Normal);
        spawn(&mut s, "b", Priority::Normal);
        spawn(&mut s, "c", Priority::Normal);

        let b: *mut Tcb = s.find_mut("b").unwrap();
        s.remove(b);

        assert_eq!(s.len(), 3);
        assert!(s.find("b").is_none());
        let names: alloc::vec::Vec<&str> = s.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, [ROOT_NAME, "a", "c"]);
    }

    #[test]
    fn root_cannot_be_removed() {
        let mut s = sched();
        let root = s.root();
        s.remove(root);
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn terminated_current_falls_back_to_root() {
        let mut s = sched();
        spawn(&mut s, "z", Priority::High);
        let z = s.pick_next();
        assert_eq!(unsafe { (*z).name.as_str() }, "z");

        // The teardown path: retarget current at the root, then unlink.
        let root = s.root();
        s.set_current(root);
        s.remove(z);

        assert!(s.find("z").is_none());
        let chosen = s.pick_next();
        assert_eq!(unsafe { (*chosen).name.as_str() }, ROOT_NAME);
    }

    #[test]
    fn selection_is_deterministic_over_identical_registries() {
        let build = || {
            let mut s = sched();
            spawn(&mut s, "a", Priority::Normal);
            spawn(&mut s, "b", Priority::High);
            spawn(&mut s, "c", Priority::High);
            s.find_mut("c").unwrap().state = ThreadState::Paused;
            s
        };
        let mut first = build();
        let mut second = build();
        for _ in 0..4 {
            let x = first.pick_next();
            let y = second.pick_next();
            assert_eq!(unsafe { (*x).name.as_str() }, unsafe { (*y).name.as_str() });
        }
    }

    #[test]
    fn exactly_one_running_after_every_pass() {
        let mut s = sched();
        spawn(&mut s, "a", Priority::High);
        spawn(&mut s, "b", Priority::Normal);
        spawn(&mut s, "c", Priority::Low);

        s.pick_next();
        assert_eq!(running_count(&s), 1);

        s.find_mut("a").unwrap().state = ThreadState::Blocked;
        s.reschedule(0);
        assert_eq!(running_count(&s), 1);

        let t = s.find_mut("b").unwrap();
        t.state = ThreadState::Sleeping;
        t.sleep = crate::time::SleepTimer::until(5, 0);
        s.reschedule(0);
        assert_eq!(running_count(&s), 1);

        s.reschedule(10);
        assert_eq!(running_count(&s), 1);
        // And every non-running thread is in a coherent parked state.
        for t in s.iter() {
            assert!(matches!(
                t.state,
                ThreadState::Running
                    | ThreadState::Ready
                    | ThreadState::Paused
                    | ThreadState::Sleeping
                    | ThreadState::Blocked
            ));
        }
    }

    #[test]
    fn handles_stay_valid_across_registry_growth() {
        let mut s = sched();
        spawn(&mut s, "pinned", Priority::Normal);
        let pinned: *const Tcb = s.find("pinned").unwrap();

        // Push enough threads to force the vector to reallocate.
        for i in 0..32 {
            let mut name = ThreadName::new();
            let _ = name.push_str("t");
            let _ = name.push_str(match i % 4 {
                0 => "a",
                1 => "b",
                2 => "c",
                _ => "d",
            });
            // Unique two-level suffix keeps names distinct.
            let digits = [b'0' + (i / 4) as u8];
            let _ = name.push_str(core::str::from_utf8(&digits).unwrap());
            s.create(name.as_str(), 64, nop_entry, Priority::Low, never_returns).unwrap();
        }

        assert!(ptr::eq(s.find("pinned").unwrap(), pinned));
    }
}
