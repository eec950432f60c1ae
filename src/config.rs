//! # EdfOS Configuration
//!
//! Compile-time constants governing the scheduler and system behavior.
//! All limits are fixed at compile time; there is no dynamic allocation.

/// Maximum number of live processes. Bounds the PCB arena and the
/// capacity of every scheduler queue, so a queue can never overflow
/// while the arena has a free slot.
pub const MAX_PROCESSES: usize = 8;

/// Clock tick frequency in Hz. The time base advances once per tick,
/// so one tick is one millisecond.
pub const TICK_HZ: u32 = 1000;

/// Scheduling quantum in milliseconds. The dispatch trap fires on this
/// period in addition to explicit yields and process completion, which
/// bounds how late a newly started real-time process can preempt.
pub const QUANTUM_MS: u32 = 100;

/// Longest horizon a real-time process may be admitted with: start
/// offset plus deadline offset, in milliseconds. Instants are compared
/// modulo 2^32 ms, so only instants less than 2^31 ms apart are ordered.
pub const MAX_OFFSET_MS: u32 = i32::MAX as u32;

/// Size in bytes of one slot in the stack pool. Requests larger than
/// this fail admission with `OutOfMemory`.
pub const STACK_SIZE: usize = 1024;

/// Smallest stack a process may request. Must hold the initial
/// exception frame (8 hardware-stacked + 8 software-saved words).
pub const MIN_STACK_SIZE: usize = 16 * 4;

/// Stack size of the kernel idle context that runs once every process
/// has completed.
pub const IDLE_STACK_SIZE: usize = 256;

/// System clock frequency in Hz (default for STM32F4 at 16 MHz HSI).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;
