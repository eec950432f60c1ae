//! # Synchronization Primitives
//!
//! Interrupt-safe critical section abstraction for the Cortex-M4.
//! The scheduler context is shared between Thread-mode kernel calls and
//! the dispatch trap, so every access happens with interrupts masked.

use cortex_m::interrupt;

/// Execute a closure within a critical section (interrupts disabled).
///
/// Interrupts are disabled on entry and restored on exit if they were
/// enabled before, so nested calls are fine.
///
/// # Usage
/// ```ignore
/// sync::critical_section(|cs| {
///     let scheduler = SCHEDULER.borrow(cs);
///     // ...
/// });
/// ```
///
/// Keep critical sections short: SysTick is delayed for their duration,
/// and every delayed tick is a millisecond the time base runs late.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(&interrupt::CriticalSection) -> R,
{
    interrupt::free(f)
}
