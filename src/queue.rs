//! # Run Queues
//!
//! Two queue disciplines over process handles:
//!
//! - [`ReadyQueue`]: insertion-ordered FIFO for best-effort processes.
//! - [`TimedQueue`]: ordered by an absolute timestamp, ascending. Used
//!   keyed by start time for real-time processes that have not started yet
//!   and keyed by deadline for started ones (EDF order).
//!
//! Both are bounded by `MAX_PROCESSES`. Since every handle comes from the
//! PCB arena of the same size, a full queue can only mean a handle was
//! duplicated, and is reported as an invariant violation.

use heapless::{Deque, Vec};

use crate::config::MAX_PROCESSES;
use crate::error::{KernelError, KernelResult};
use crate::process::Handle;
use crate::time::Instant;

// ---------------------------------------------------------------------------
// FIFO
// ---------------------------------------------------------------------------

/// Best-effort ready queue, dispatched front to back.
pub(crate) struct ReadyQueue {
    fifo: Deque<Handle, MAX_PROCESSES>,
}

impl ReadyQueue {
    pub(crate) const fn new() -> Self {
        Self { fifo: Deque::new() }
    }

    pub(crate) fn push_back(&mut self, handle: Handle) -> KernelResult<()> {
        self.fifo
            .push_back(handle)
            .map_err(|_| KernelError::InvariantViolation("ready queue overflow"))
    }

    pub(crate) fn pop_front(&mut self) -> Option<Handle> {
        self.fifo.pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.fifo.len()
    }

    pub(crate) fn clear(&mut self) {
        self.fifo.clear();
    }
}

// ---------------------------------------------------------------------------
// Timestamp-ordered queue
// ---------------------------------------------------------------------------

struct Timed<V> {
    key: Instant,
    value: V,
}

/// Queue ordered by ascending key. Insertion is stable: an entry whose key
/// equals existing keys goes after all of them.
pub(crate) struct TimedQueue<V> {
    entries: Vec<Timed<V>, MAX_PROCESSES>,
}

impl<V> TimedQueue<V> {
    pub(crate) const fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub(crate) fn insert(&mut self, key: Instant, value: V) -> KernelResult<()> {
        let index = self.entries.partition_point(|e| e.key <= key);
        self.entries
            .insert(index, Timed { key, value })
            .map_err(|_| KernelError::InvariantViolation("timed queue overflow"))
    }

    /// Smallest key in the queue.
    pub(crate) fn peek_key(&self) -> Option<Instant> {
        self.entries.first().map(|e| e.key)
    }

    pub(crate) fn pop_front(&mut self) -> Option<(Instant, V)> {
        if self.entries.is_empty() {
            return None;
        }
        let Timed { key, value } = self.entries.remove(0);
        Some((key, value))
    }

    /// Pop the head if its key is at or before `now`.
    pub(crate) fn pop_due(&mut self, now: Instant) -> Option<(Instant, V)> {
        match self.peek_key() {
            Some(key) if key <= now => self.pop_front(),
            _ => None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
