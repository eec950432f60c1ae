//! # Real-Time Queues
//!
//! Real-time processes wait in two queues:
//!
//! 1. **Pending**: not started yet, ordered by absolute start time.
//! 2. **Ready**: started, ordered by absolute deadline (EDF).
//!
//! [`RealTimeQueues::promote`] moves every pending process whose start time
//! has elapsed into the ready queue. Because pending is start-ordered, the
//! scan stops at the first entry that is still in the future. Promotion must
//! run before every scheduling decision: the clock advances on its own
//! interrupt, so a process can become ready between two decisions.
//!
//! Equal deadlines keep FIFO order among themselves: a process entering the
//! ready queue goes behind every entry with the same deadline, whether it
//! arrives by promotion or by yielding.

use crate::error::KernelResult;
use crate::process::Handle;
use crate::queue::TimedQueue;
use crate::time::Instant;

pub(crate) struct RealTimeQueues {
    /// Keyed by start time; each entry carries its deadline.
    pending: TimedQueue<(Instant, Handle)>,
    /// Keyed by deadline.
    ready: TimedQueue<Handle>,
}

impl RealTimeQueues {
    pub(crate) const fn new() -> Self {
        Self {
            pending: TimedQueue::new(),
            ready: TimedQueue::new(),
        }
    }

    /// Queue a newly admitted process until `start`.
    pub(crate) fn admit(&mut self, start: Instant, deadline: Instant, handle: Handle) -> KernelResult<()> {
        self.pending.insert(start, (deadline, handle))
    }

    /// Put a started process back by its existing deadline.
    pub(crate) fn requeue(&mut self, deadline: Instant, handle: Handle) -> KernelResult<()> {
        self.ready.insert(deadline, handle)
    }

    /// Move every process whose start time is at or before `now` into the
    /// ready queue. Returns how many were promoted.
    pub(crate) fn promote(&mut self, now: Instant) -> KernelResult<usize> {
        let mut promoted = 0;
        while let Some((start, (deadline, handle))) = self.pending.pop_due(now) {
            log::trace!(
                "promote slot {} (start {} ms, deadline {} ms) at {} ms",
                handle.slot(),
                start.ticks(),
                deadline.ticks(),
                now.ticks()
            );
            self.ready.insert(deadline, handle)?;
            promoted += 1;
        }
        Ok(promoted)
    }

    /// Ready process with the earliest deadline.
    pub(crate) fn pop_earliest_deadline(&mut self) -> Option<Handle> {
        self.ready.pop_front().map(|(_, handle)| handle)
    }

    /// Earliest start time among pending processes.
    pub(crate) fn next_wake(&self) -> Option<Instant> {
        self.pending.peek_key()
    }

    pub(crate) fn has_ready(&self) -> bool {
        !self.ready.is_empty()
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn ready_len(&self) -> usize {
        self.ready.len()
    }

    pub(crate) fn clear(&mut self) {
        self.pending.clear();
        self.ready.clear();
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
