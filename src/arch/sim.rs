//! Hosted port for unit tests: a simulated clock that only moves when a
//! test advances it or the scheduler waits for a tick, and a stack
//! allocator that hands out fake regions and catches double releases.

use std::vec::Vec;

use core::ptr::NonNull;

use super::Port;
use crate::process::{ProcessEntry, SavedContext};
use crate::stack::{StackAllocator, StackHandle};
use crate::time::{Instant, TimeBase};

/// Upper bound on a single idle wait, so a broken wake time fails the
/// test instead of hanging it.
const MAX_IDLE_TICKS: u32 = 1_000_000;

pub(crate) struct SimPort {
    time: TimeBase,
    pub interrupts_enabled: bool,
    pub timers_started: bool,
    /// Ticks spent inside `wait_for_tick`.
    pub idle_ticks: u32,
}

impl SimPort {
    pub(crate) fn new() -> Self {
        Self {
            time: TimeBase::new(),
            interrupts_enabled: false,
            timers_started: false,
            idle_ticks: 0,
        }
    }

    /// Let `ms` clock ticks elapse.
    pub(crate) fn advance(&self, ms: u32) {
        for _ in 0..ms {
            self.time.tick();
        }
    }
}

impl Port for SimPort {
    fn now(&self) -> Instant {
        self.time.now_ms()
    }

    fn start_timers(&mut self) {
        self.timers_started = true;
    }

    fn enable_interrupts(&mut self) {
        self.interrupts_enabled = true;
    }

    fn disable_interrupts(&mut self) {
        self.interrupts_enabled = false;
    }

    fn wait_for_tick(&mut self) {
        assert!(
            self.interrupts_enabled,
            "waiting for the clock with interrupts masked never terminates"
        );
        assert!(self.idle_ticks < MAX_IDLE_TICKS, "idle wait did not terminate");
        self.idle_ticks += 1;
        self.time.tick();
    }
}

/// Fake stack allocator with a fixed capacity.
pub(crate) struct SimStacks {
    capacity: usize,
    next_addr: usize,
    live: Vec<usize>,
    pub released: usize,
}

impl SimStacks {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            next_addr: 0x1000_0000,
            live: Vec::new(),
            released: 0,
        }
    }

    pub(crate) fn live(&self) -> usize {
        self.live.len()
    }
}

impl StackAllocator for SimStacks {
    fn init_stack(&mut self, _entry: ProcessEntry, size: usize) -> Option<StackHandle> {
        if self.live.len() >= self.capacity {
            return None;
        }
        let addr = self.next_addr;
        self.next_addr += 0x1_0000;
        self.live.push(addr);

        let base = NonNull::new(addr as *mut u32)?;
        let initial = SavedContext::from_ptr((addr + size - 64) as *mut u32)?;
        Some(StackHandle::new(base, initial))
    }

    fn release_stack(&mut self, stack: StackHandle, _size: usize) {
        let addr = stack.base().as_ptr() as usize;
        let index = self
            .live
            .iter()
            .position(|&a| a == addr)
            .expect("stack released twice or never allocated");
        self.live.swap_remove(index);
        self.released += 1;
    }
}
