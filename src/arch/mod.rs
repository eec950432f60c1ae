//! # Architecture Abstraction Layer
//!
//! Provides a hardware abstraction boundary for the scheduler. The
//! scheduler reads the clock, masks and unmasks interrupts, and arms the
//! timers only through [`Port`].
//!
//! Currently implements the Cortex-M4 port; extensible to other
//! architectures by adding sibling modules.

use crate::time::Instant;

/// Hardware services the scheduler consumes.
pub trait Port {
    /// Current absolute time. Must be safe to call from the dispatch trap.
    fn now(&self) -> Instant;

    /// Arm the clock tick and the dispatch quantum timer.
    fn start_timers(&mut self);

    /// Let interrupts (in particular the clock tick) be delivered again.
    fn enable_interrupts(&mut self);

    /// Mask interrupt delivery.
    fn disable_interrupts(&mut self);

    /// Called in a loop while the scheduler waits for the clock to reach a
    /// pending start time. Interrupts are enabled during the wait.
    fn wait_for_tick(&mut self) {
        core::hint::spin_loop();
    }
}

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod cortex_m4;

#[cfg(test)]
pub(crate) mod sim;
