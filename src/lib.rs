//! # EdfOS: Earliest-Deadline-First Operating System
//!
//! A preemptive real-time kernel scheduler for single-core ARM Cortex-M4
//! microcontrollers, mixing hard-deadline and best-effort processes.
//!
//! ## Overview
//!
//! Processes come in two kinds:
//!
//! - **Best-effort** processes are served round-robin from a FIFO queue.
//! - **Real-time** processes carry an absolute start time and an absolute
//!   deadline. They wait until their start time, then are served
//!   earliest-deadline-first, always ahead of best-effort work.
//!
//! Every completed real-time process is counted as having met or missed
//! its deadline. A miss is data, not an error.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                   Application Processes                 │
//! ├────────────────────────────────────────────────────────┤
//! │                 Kernel API (kernel.rs)                  │
//! │    init() · create() · create_realtime() · start()     │
//! ├──────────────┬────────────────────┬───────────────────┤
//! │  Scheduler   │   Queues           │  Sync Primitives  │
//! │  scheduler.rs│   queue.rs, edf.rs │  sync.rs          │
//! │  ─ admit     │   ─ FIFO           │  ─ critical_section│
//! │  ─ select    │   ─ pending/ready  │                   │
//! │  ─ shutdown  │   ─ promote        │                   │
//! ├──────────────┴────────────────────┴───────────────────┤
//! │   Process Model (process.rs) · Stacks (stack.rs)        │
//! │   Time (time.rs) · Deadline Accounting (accounting.rs)  │
//! ├────────────────────────────────────────────────────────┤
//! │            Arch Port (arch/cortex_m4.rs)                │
//! │    PendSV · SysTick · Context Switch · Stack Init      │
//! ├────────────────────────────────────────────────────────┤
//! │         ARM Cortex-M4 Hardware (Thumb-2)                │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! The scheduler core only talks to hardware through [`arch::Port`] and
//! [`stack::StackAllocator`], so it builds and is tested on the host.
//!
//! ## Timing
//!
//! - SysTick fires every millisecond and advances the time base.
//! - Every `QUANTUM_MS` ticks it pends PendSV, the dispatch trap, which
//!   also fires on an explicit yield and when a process returns.
//! - A real-time process whose start time elapses takes the CPU at the
//!   next dispatch trap, not at the exact tick.
//!
//! ## Memory Model
//!
//! - **No heap**: All state is statically allocated
//! - **No `alloc`**: Pure `core` only
//! - **Fixed-size PCB arena**: `[Option<ProcessControlBlock>; MAX_PROCESSES]`
//! - **Stack pool**: `MAX_PROCESSES` slots of `STACK_SIZE` bytes
//! - **Critical sections**: `cortex_m::interrupt::free()` for shared state

#![cfg_attr(not(test), no_std)]

pub mod accounting;
pub mod arch;
pub mod config;
pub(crate) mod edf;
pub mod error;
pub mod process;
pub(crate) mod queue;
pub mod scheduler;
pub mod stack;
pub mod sync;
pub mod time;

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod kernel;

pub use accounting::DeadlineStats;
pub use error::{KernelError, KernelResult};
pub use process::{ProcessEntry, ProcessId};
pub use scheduler::{QueueLengths, Scheduler};
pub use time::{Duration, Instant, RealTime};
