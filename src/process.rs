//! # Process Control Block
//!
//! Defines the process model for EdfOS. A process is a plain function with
//! a private stack. It is either best-effort (served FIFO) or real-time
//! (served earliest-deadline-first once its start time has elapsed).
//!
//! PCBs live in a fixed arena, [`ProcessTable`]. Queues never hold pointers
//! to PCBs; they hold a [`Handle`], which is created once per admission,
//! cannot be cloned and is consumed when the process is retired. A PCB can
//! therefore sit in at most one queue (or the running slot) at a time, and
//! a retired PCB can never be reached again.
//!
//! ```text
//!   create / create_realtime
//!        │
//!        ▼
//!   ┌─────────┐  start elapsed  ┌──────────┐
//!   │ Pending │ ──────────────► │ RT Ready │ ◄──┐
//!   └─────────┘                 └──────────┘    │ yield (RT)
//!                                    │          │
//!   ┌─────────┐     select()         ▼          │
//!   │  FIFO   │ ──────────────► ┌─────────┐ ────┘
//!   └─────────┘ ◄────────────── │ Running │ ─────► retired (stack released)
//!               yield (FIFO)    └─────────┘ finish
//! ```

use core::fmt;
use core::ptr::NonNull;

use crate::config::MAX_PROCESSES;
use crate::error::{KernelError, KernelResult};
use crate::stack::StackHandle;
use crate::time::Instant;

/// Process entry point. Returning from it terminates the process.
pub type ProcessEntry = extern "C" fn();

// ---------------------------------------------------------------------------
// Identifiers and saved state
// ---------------------------------------------------------------------------

/// Identifier handed back by admission. Never reused while the kernel runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessId(u32);

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Opaque saved execution state of a suspended process: the stack pointer
/// at which its registers were saved.
///
/// `Option<SavedContext>` has the same layout as a raw pointer, with `None`
/// as null, so it can cross the assembly boundary of the dispatch trap
/// unchanged.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SavedContext(NonNull<u32>);

// Safety: a SavedContext is an address into a process stack. It is only
// dereferenced by the port layer while restoring that process.
unsafe impl Send for SavedContext {}

impl SavedContext {
    /// Wrap a saved stack pointer. Null means "no context".
    #[inline]
    pub fn from_ptr(sp: *mut u32) -> Option<Self> {
        NonNull::new(sp).map(Self)
    }

    #[inline]
    pub const fn from_non_null(sp: NonNull<u32>) -> Self {
        Self(sp)
    }

    #[inline]
    pub const fn as_ptr(self) -> *mut u32 {
        self.0.as_ptr()
    }
}

// ---------------------------------------------------------------------------
// Scheduling discipline
// ---------------------------------------------------------------------------

/// Scheduling discipline of a process, fixed at admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessKind {
    /// Served from the FIFO ready queue whenever no real-time work is ready.
    BestEffort,
    /// Becomes eligible at `start` and is served by absolute `deadline`.
    /// `deadline >= start` always holds.
    RealTime { start: Instant, deadline: Instant },
}

// ---------------------------------------------------------------------------
// Process Control Block
// ---------------------------------------------------------------------------

/// The scheduler's record for one live process.
#[derive(Debug)]
pub struct ProcessControlBlock {
    pub id: ProcessId,

    pub kind: ProcessKind,

    /// Saved state while suspended, `None` while the process runs.
    pub saved_context: Option<SavedContext>,

    /// Backing stack region, released exactly once on retirement.
    pub stack: StackHandle,

    /// Stack size in bytes, as requested at admission.
    pub stack_size: usize,
}

impl ProcessControlBlock {
    #[inline]
    pub fn is_real_time(&self) -> bool {
        matches!(self.kind, ProcessKind::RealTime { .. })
    }

    /// Absolute start time, for real-time processes.
    pub fn start_time(&self) -> Option<Instant> {
        match self.kind {
            ProcessKind::RealTime { start, .. } => Some(start),
            ProcessKind::BestEffort => None,
        }
    }

    /// Absolute deadline, for real-time processes.
    pub fn deadline(&self) -> Option<Instant> {
        match self.kind {
            ProcessKind::RealTime { deadline, .. } => Some(deadline),
            ProcessKind::BestEffort => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Arena
// ---------------------------------------------------------------------------

/// Exclusive reference to an occupied arena slot. Deliberately neither
/// `Clone` nor `Copy`: whoever holds it (a queue or the running slot) is
/// the only place the process is scheduled from.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Handle {
    slot: usize,
}

impl Handle {
    #[inline]
    pub(crate) fn slot(&self) -> usize {
        self.slot
    }

    #[cfg(test)]
    pub(crate) fn forge(slot: usize) -> Self {
        Self { slot }
    }
}

/// Fixed-capacity PCB arena.
pub(crate) struct ProcessTable {
    slots: [Option<ProcessControlBlock>; MAX_PROCESSES],
    next_id: u32,
    live: usize,
}

impl ProcessTable {
    pub(crate) const fn new() -> Self {
        const EMPTY: Option<ProcessControlBlock> = None;
        Self {
            slots: [EMPTY; MAX_PROCESSES],
            next_id: 0,
            live: 0,
        }
    }

    /// Allocate a PCB. When the arena is full the stack is handed back so
    /// the caller can release it.
    pub(crate) fn insert(
        &mut self,
        kind: ProcessKind,
        stack: StackHandle,
        stack_size: usize,
    ) -> Result<(Handle, ProcessId), StackHandle> {
        let Some(slot) = self.slots.iter().position(Option::is_none) else {
            return Err(stack);
        };

        let id = ProcessId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        let saved_context = Some(stack.initial_context());

        self.slots[slot] = Some(ProcessControlBlock {
            id,
            kind,
            saved_context,
            stack,
            stack_size,
        });
        self.live += 1;

        Ok((Handle { slot }, id))
    }

    pub(crate) fn get(&self, handle: &Handle) -> KernelResult<&ProcessControlBlock> {
        self.slots[handle.slot]
            .as_ref()
            .ok_or(KernelError::InvariantViolation("handle refers to an empty slot"))
    }

    pub(crate) fn get_mut(&mut self, handle: &Handle) -> KernelResult<&mut ProcessControlBlock> {
        self.slots[handle.slot]
            .as_mut()
            .ok_or(KernelError::InvariantViolation("handle refers to an empty slot"))
    }

    /// Free the slot, consuming the handle.
    pub(crate) fn remove(&mut self, handle: Handle) -> KernelResult<ProcessControlBlock> {
        let pcb = self.slots[handle.slot]
            .take()
            .ok_or(KernelError::InvariantViolation("retiring an empty slot"))?;
        self.live -= 1;
        Ok(pcb)
    }

    /// Free the slot holding `id`. Used to undo an admission whose handle
    /// was already given to a queue that refused it.
    pub(crate) fn remove_by_id(&mut self, id: ProcessId) -> Option<ProcessControlBlock> {
        let slot = self
            .slots
            .iter_mut()
            .find(|slot| slot.as_ref().is_some_and(|pcb| pcb.id == id))?;
        self.live -= 1;
        slot.take()
    }

    /// Empty the arena, yielding every remaining PCB once.
    pub(crate) fn drain(&mut self) -> impl Iterator<Item = ProcessControlBlock> + '_ {
        self.live = 0;
        self.slots.iter_mut().filter_map(Option::take)
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.live
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.live == 0
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
