//! # Kernel Errors
//!
//! Admission failures are recoverable and reported to the caller.
//! `InvariantViolation` means the queues are corrupt; the dispatch trap
//! treats it as fatal since there is no process left to fall back to.
//! Having nothing to run and missing a deadline are not errors.

use core::fmt;

/// Errors surfaced by the kernel API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// Stack or PCB allocation failed during admission.
    OutOfMemory {
        /// Requested stack size in bytes.
        requested: usize,
    },

    /// Scheduler state is inconsistent. Indicates a kernel bug.
    InvariantViolation(&'static str),

    /// `start()` was called on a scheduler that is already running.
    AlreadyStarted,

    /// The scheduler was shut down and accepts no more work.
    ShutDown,

    /// Start offset plus deadline offset exceeds `MAX_OFFSET_MS`.
    OffsetOutOfRange {
        /// Requested horizon in milliseconds, saturated at `u32::MAX`.
        offset_ms: u32,
    },

    /// The kernel API was used before `kernel::init`.
    NotInitialized,
}

/// Result alias used throughout the kernel.
pub type KernelResult<T> = Result<T, KernelError>;

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory { requested } => {
                write!(f, "out of memory admitting process ({} byte stack)", requested)
            }
            Self::InvariantViolation(reason) => {
                write!(f, "scheduler invariant violated: {}", reason)
            }
            Self::AlreadyStarted => write!(f, "scheduler already started"),
            Self::ShutDown => write!(f, "scheduler is shut down"),
            Self::OffsetOutOfRange { offset_ms } => {
                write!(f, "real-time offset of {} ms is beyond the clock horizon", offset_ms)
            }
            Self::NotInitialized => write!(f, "kernel not initialized"),
        }
    }
}

impl KernelError {
    /// Whether the kernel can keep running after this error.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::InvariantViolation(_))
    }
}
