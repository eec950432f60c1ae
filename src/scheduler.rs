//! # Scheduler
//!
//! Core scheduling logic for EdfOS. Real-time processes are served
//! earliest-deadline-first once their start time has elapsed; best-effort
//! processes are served FIFO whenever no real-time process is ready.
//!
//! ## Scheduling Algorithm
//!
//! Every time the dispatch trap fires, [`Scheduler::select`] performs one
//! transition of "which process owns the CPU":
//!
//! 1. **Retire or requeue** the process that was running. A process that
//!    yielded (a saved context is passed in) goes back to the tail of the
//!    FIFO, or into the EDF queue by its existing deadline if real-time.
//!    A process that finished (no context) is checked against its deadline
//!    and its stack and PCB are released.
//! 2. **Promote** pending real-time processes whose start time has elapsed.
//! 3. **Choose**: earliest-deadline ready real-time process, else the FIFO
//!    head, else, if real-time processes are still pending, wait for the
//!    earliest start time with interrupts enabled and choose again.
//! 4. **Dispatch**: record the choice as running and return its context,
//!    or `None` when nothing is left.
//!
//! The scheduler is not a preemption mechanism on its own. A real-time
//! process becoming ready takes the CPU at the next dispatch trap, which
//! the port fires at least every `QUANTUM_MS`.
//!
//! ## Idle Wait
//!
//! When only pending real-time work exists nothing is runnable until the
//! clock reaches the earliest start time. The clock only advances on its
//! own interrupt, so the wait unmasks interrupts, spins on
//! [`Port::wait_for_tick`], and masks them again before touching the
//! queues. This is the only place the scheduler waits.

use core::mem;

use log::{debug, error, info, trace, warn};

use crate::accounting::{DeadlineStats, Outcome};
use crate::arch::Port;
use crate::config::MAX_OFFSET_MS;
use crate::edf::RealTimeQueues;
use crate::error::{KernelError, KernelResult};
use crate::process::{Handle, ProcessEntry, ProcessId, ProcessKind, ProcessTable, SavedContext};
use crate::queue::ReadyQueue;
use crate::stack::StackAllocator;
use crate::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Why the dispatch trap fired, from the running process's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The process was suspended before finishing.
    Yielded(SavedContext),
    /// The process returned from its entry point, or nothing was running.
    Finished,
}

impl From<Option<SavedContext>> for Event {
    fn from(suspended: Option<SavedContext>) -> Self {
        match suspended {
            Some(ctx) => Event::Yielded(ctx),
            None => Event::Finished,
        }
    }
}

/// Who owns the CPU between two transitions.
#[derive(Debug)]
enum CpuState {
    Idle,
    Running(Handle),
}

/// Outcome of one pass over the queues.
enum Selection {
    Dispatch(Handle),
    Idle { wake_at: Instant },
    Empty,
}

/// Scheduler lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Accepting processes, timers not armed.
    Created,
    /// Timers armed, first dispatch done.
    Started,
    /// All processes released, no further admission.
    ShutDown,
}

/// Queue occupancy snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueLengths {
    /// Best-effort FIFO.
    pub ready: usize,
    /// Real-time, not yet started.
    pub pending: usize,
    /// Real-time, started (EDF queue).
    pub realtime_ready: usize,
}

// ---------------------------------------------------------------------------
// Scheduler struct
// ---------------------------------------------------------------------------

/// The scheduler context: PCB arena, queues, running slot and deadline
/// counters, plus the port and stack allocator it drives.
///
/// All mutation goes through `&mut self`, so callers serialize admission
/// and dispatch the same way the kernel does: inside one critical section.
pub struct Scheduler<P: Port, S: StackAllocator> {
    port: P,
    stacks: S,
    table: ProcessTable,
    ready: ReadyQueue,
    realtime: RealTimeQueues,
    cpu: CpuState,
    stats: DeadlineStats,
    lifecycle: Lifecycle,
}

impl<P: Port, S: StackAllocator> Scheduler<P, S> {
    pub fn new(port: P, stacks: S) -> Self {
        Self {
            port,
            stacks,
            table: ProcessTable::new(),
            ready: ReadyQueue::new(),
            realtime: RealTimeQueues::new(),
            cpu: CpuState::Idle,
            stats: DeadlineStats::new(),
            lifecycle: Lifecycle::Created,
        }
    }

    // -----------------------------------------------------------------------
    // Admission
    // -----------------------------------------------------------------------

    /// Admit a best-effort process at the tail of the FIFO.
    ///
    /// # Errors
    /// `OutOfMemory` if the stack or the PCB cannot be allocated; nothing
    /// stays allocated in that case.
    pub fn create(&mut self, entry: ProcessEntry, stack_size: usize) -> KernelResult<ProcessId> {
        self.admit(entry, stack_size, ProcessKind::BestEffort)
    }

    /// Admit a real-time process that becomes eligible `start_offset` from
    /// now and must finish within `deadline_offset` of its start.
    ///
    /// A zero `deadline_offset` is legal; such a process can only miss.
    ///
    /// # Errors
    /// `OffsetOutOfRange` if the two offsets together exceed
    /// `MAX_OFFSET_MS`, in addition to the `create` errors.
    ///
    /// # Example
    /// ```ignore
    /// // Starts 1.5 s from now, 5 ms to finish.
    /// sched.create_realtime(sample, 512, RealTime::new(1, 500), Duration::millis(5))?;
    /// ```
    pub fn create_realtime(
        &mut self,
        entry: ProcessEntry,
        stack_size: usize,
        start_offset: impl Into<Duration>,
        deadline_offset: impl Into<Duration>,
    ) -> KernelResult<ProcessId> {
        let start_offset = start_offset.into();
        let deadline_offset = deadline_offset.into();

        let horizon = start_offset.ticks().checked_add(deadline_offset.ticks());
        match horizon {
            Some(ms) if ms <= MAX_OFFSET_MS => {}
            _ => {
                return Err(KernelError::OffsetOutOfRange {
                    offset_ms: horizon.unwrap_or(u32::MAX),
                })
            }
        }

        let start = self.port.now() + start_offset;
        let deadline = start + deadline_offset;
        self.admit(entry, stack_size, ProcessKind::RealTime { start, deadline })
    }

    fn admit(&mut self, entry: ProcessEntry, stack_size: usize, kind: ProcessKind) -> KernelResult<ProcessId> {
        if self.lifecycle == Lifecycle::ShutDown {
            return Err(KernelError::ShutDown);
        }

        let oom = KernelError::OutOfMemory { requested: stack_size };
        let stack = self.stacks.init_stack(entry, stack_size).ok_or(oom)?;

        let (handle, id) = match self.table.insert(kind, stack, stack_size) {
            Ok(admitted) => admitted,
            Err(stack) => {
                self.stacks.release_stack(stack, stack_size);
                return Err(oom);
            }
        };

        let queued = match kind {
            ProcessKind::BestEffort => self.ready.push_back(handle),
            ProcessKind::RealTime { start, deadline } => self.realtime.admit(start, deadline, handle),
        };

        if let Err(err) = queued {
            if let Some(pcb) = self.table.remove_by_id(id) {
                self.stacks.release_stack(pcb.stack, pcb.stack_size);
            }
            return Err(err);
        }

        match kind {
            ProcessKind::BestEffort => debug!("admit {} (best-effort, {} byte stack)", id, stack_size),
            ProcessKind::RealTime { start, deadline } => debug!(
                "admit {} (real-time, start {} ms, deadline {} ms, {} byte stack)",
                id,
                start.ticks(),
                deadline.ticks(),
                stack_size
            ),
        }
        Ok(id)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Arm the timers and perform the first dispatch.
    ///
    /// Returns the context to restore first, or `None` when no process was
    /// admitted, in which case the caller simply carries on.
    pub fn start(&mut self) -> KernelResult<Option<SavedContext>> {
        match self.lifecycle {
            Lifecycle::Started => return Err(KernelError::AlreadyStarted),
            Lifecycle::ShutDown => return Err(KernelError::ShutDown),
            Lifecycle::Created => {}
        }

        self.port.start_timers();
        self.lifecycle = Lifecycle::Started;
        info!("scheduler started with {} process(es)", self.table.len());

        if self.table.is_empty() {
            return Ok(None);
        }
        self.transition(Event::Finished)
    }

    /// Release every remaining process and refuse further admission.
    /// Returns the final deadline counters.
    ///
    /// Must not be called from a process: the running process's stack is
    /// released too.
    pub fn shutdown(&mut self) -> DeadlineStats {
        self.cpu = CpuState::Idle;
        self.ready.clear();
        self.realtime.clear();

        let mut released = 0;
        for pcb in self.table.drain() {
            self.stacks.release_stack(pcb.stack, pcb.stack_size);
            released += 1;
        }

        self.lifecycle = Lifecycle::ShutDown;
        info!(
            "scheduler shut down ({} released, {} met, {} missed)",
            released, self.stats.met, self.stats.missed
        );
        self.stats
    }

    // -----------------------------------------------------------------------
    // Decision engine
    // -----------------------------------------------------------------------

    /// Dispatch trap entry point.
    ///
    /// `suspended` is the saved context of the process that was running if
    /// it yielded, or `None` if it finished (or nothing was running).
    /// Returns the context to restore, or `None` when nothing is runnable.
    ///
    /// # Panics
    /// On a violated scheduler invariant. There is no process to fall back
    /// to once the queues are inconsistent.
    pub fn select(&mut self, suspended: Option<SavedContext>) -> Option<SavedContext> {
        match self.transition(suspended.into()) {
            Ok(next) => next,
            Err(err) => {
                error!("{}", err);
                panic!("fatal kernel error: {}", err);
            }
        }
    }

    /// One scheduling transition, with invariant violations reported
    /// instead of treated as fatal.
    pub fn transition(&mut self, event: Event) -> KernelResult<Option<SavedContext>> {
        self.retire(event)?;

        loop {
            self.promote()?;

            match self.choose() {
                Selection::Dispatch(handle) => return self.dispatch(handle).map(Some),
                Selection::Idle { wake_at } => {
                    self.idle_until(wake_at);
                    self.promote()?;
                    if !self.realtime.has_ready() {
                        return Err(KernelError::InvariantViolation(
                            "idle wait ended with no ready real-time process",
                        ));
                    }
                }
                Selection::Empty => {
                    trace!("nothing left to run");
                    return Ok(None);
                }
            }
        }
    }

    fn retire(&mut self, event: Event) -> KernelResult<()> {
        let handle = match mem::replace(&mut self.cpu, CpuState::Idle) {
            CpuState::Running(handle) => handle,
            CpuState::Idle => {
                if let Event::Yielded(_) = event {
                    trace!("context passed with no process running, ignored");
                }
                return Ok(());
            }
        };

        match event {
            Event::Yielded(ctx) => {
                let pcb = self.table.get_mut(&handle)?;
                pcb.saved_context = Some(ctx);
                trace!("{} yielded", pcb.id);
                match pcb.kind {
                    ProcessKind::BestEffort => self.ready.push_back(handle),
                    ProcessKind::RealTime { deadline, .. } => self.realtime.requeue(deadline, handle),
                }
            }
            Event::Finished => {
                let pcb = self.table.remove(handle)?;
                if let ProcessKind::RealTime { deadline, .. } = pcb.kind {
                    let now = self.port.now();
                    match self.stats.record(now, deadline) {
                        Outcome::Met => debug!("{} met its deadline ({} ms)", pcb.id, deadline.ticks()),
                        Outcome::Missed { late_by } => warn!(
                            "{} missed its deadline ({} ms) by {} ms",
                            pcb.id,
                            deadline.ticks(),
                            late_by.ticks()
                        ),
                    }
                }
                debug!("retire {}", pcb.id);
                self.stacks.release_stack(pcb.stack, pcb.stack_size);
                Ok(())
            }
        }
    }

    fn promote(&mut self) -> KernelResult<()> {
        let now = self.port.now();
        self.realtime.promote(now).map(|_| ())
    }

    fn choose(&mut self) -> Selection {
        if let Some(handle) = self.realtime.pop_earliest_deadline() {
            Selection::Dispatch(handle)
        } else if let Some(handle) = self.ready.pop_front() {
            Selection::Dispatch(handle)
        } else if let Some(wake_at) = self.realtime.next_wake() {
            Selection::Idle { wake_at }
        } else {
            Selection::Empty
        }
    }

    fn dispatch(&mut self, handle: Handle) -> KernelResult<SavedContext> {
        let pcb = self.table.get_mut(&handle)?;
        let ctx = pcb
            .saved_context
            .take()
            .ok_or(KernelError::InvariantViolation("queued process has no saved context"))?;
        trace!("dispatch {}", pcb.id);
        self.cpu = CpuState::Running(handle);
        Ok(ctx)
    }

    fn idle_until(&mut self, wake_at: Instant) {
        trace!("idle until {} ms", wake_at.ticks());
        self.port.enable_interrupts();
        while self.port.now() < wake_at {
            self.port.wait_for_tick();
        }
        self.port.disable_interrupts();
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// Process currently owning the CPU.
    pub fn current(&self) -> Option<ProcessId> {
        match &self.cpu {
            CpuState::Running(handle) => self.table.get(handle).ok().map(|pcb| pcb.id),
            CpuState::Idle => None,
        }
    }

    pub fn deadline_stats(&self) -> DeadlineStats {
        self.stats
    }

    pub fn queue_lengths(&self) -> QueueLengths {
        QueueLengths {
            ready: self.ready.len(),
            pending: self.realtime.pending_len(),
            realtime_ready: self.realtime.ready_len(),
        }
    }

    /// Admitted processes that have not been retired yet.
    pub fn live_processes(&self) -> usize {
        self.table.len()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn now(&self) -> Instant {
        self.port.now()
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn stacks(&self) -> &S {
        &self.stacks
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::sim::{SimPort, SimStacks};
    use crate::config::{MAX_OFFSET_MS, MAX_PROCESSES};
    use crate::time::RealTime;

    extern "C" fn body() {}

    type SimScheduler = Scheduler<SimPort, SimStacks>;

    fn sched() -> SimScheduler {
        Scheduler::new(SimPort::new(), SimStacks::new(64))
    }

    fn ms(n: u32) -> Duration {
        Duration::from_ticks(n)
    }

    /// Suspend the running process and select again.
    fn yield_current(s: &mut SimScheduler, ctx: SavedContext) -> Option<SavedContext> {
        s.select(Some(ctx))
    }

    #[test]
    fn test_empty_scheduler_has_nothing_to_run() {
        let mut s = sched();
        assert_eq!(s.select(None), None);
        assert_eq!(s.current(), None);
    }

    #[test]
    fn test_start_without_processes_returns_immediately() {
        let mut s = sched();
        assert_eq!(s.start(), Ok(None));
        assert!(s.port().timers_started);
        assert_eq!(s.lifecycle(), Lifecycle::Started);
        assert_eq!(s.start(), Err(KernelError::AlreadyStarted));
    }

    #[test]
    fn test_real_time_preferred_at_bootstrap_and_late_finish_misses() {
        let mut s = sched();
        let p = s.create(body, 256).unwrap();
        let r = s.create_realtime(body, 256, ms(0), ms(5)).unwrap();

        assert!(s.start().unwrap().is_some());
        assert_eq!(s.current(), Some(r));

        s.port().advance(6);
        assert!(s.select(None).is_some());
        assert_eq!(s.current(), Some(p));
        assert_eq!(s.deadline_stats(), DeadlineStats { met: 0, missed: 1 });

        assert_eq!(s.select(None), None);
        assert_eq!(s.live_processes(), 0);
        assert_eq!(s.stacks().live(), 0);
    }

    #[test]
    fn test_finishing_exactly_at_deadline_is_met() {
        let mut s = sched();
        s.create_realtime(body, 256, ms(0), ms(5)).unwrap();

        s.select(None).unwrap();
        s.port().advance(5);
        assert_eq!(s.select(None), None);
        assert_eq!(s.deadline_stats(), DeadlineStats { met: 1, missed: 0 });
    }

    #[test]
    fn test_zero_deadline_offset_can_only_miss_once_time_passes() {
        let mut s = sched();
        s.create_realtime(body, 256, ms(0), ms(0)).unwrap();

        s.select(None).unwrap();
        s.port().advance(1);
        s.select(None);
        assert_eq!(s.deadline_stats().missed, 1);
    }

    #[test]
    fn test_earliest_deadline_first_regardless_of_creation_order() {
        let mut s = sched();
        let late = s.create_realtime(body, 256, ms(0), ms(20)).unwrap();
        let early = s.create_realtime(body, 256, ms(0), ms(10)).unwrap();

        s.select(None).unwrap();
        assert_eq!(s.current(), Some(early));
        s.select(None).unwrap();
        assert_eq!(s.current(), Some(late));
    }

    #[test]
    fn test_equal_deadlines_dispatch_in_admission_order() {
        let mut s = sched();
        let first = s.create_realtime(body, 256, ms(0), ms(10)).unwrap();
        let second = s.create_realtime(body, 256, ms(0), ms(10)).unwrap();

        let ctx = s.select(None).unwrap();
        assert_eq!(s.current(), Some(first));

        // Yielding puts `first` behind `second`, which has the same deadline.
        yield_current(&mut s, ctx).unwrap();
        assert_eq!(s.current(), Some(second));
    }

    #[test]
    fn test_best_effort_round_robin() {
        let mut s = sched();
        let a = s.create(body, 256).unwrap();
        let b = s.create(body, 256).unwrap();
        let c = s.create(body, 256).unwrap();

        let ctx = s.select(None).unwrap();
        assert_eq!(s.current(), Some(a));
        let ctx = yield_current(&mut s, ctx).unwrap();
        assert_eq!(s.current(), Some(b));
        yield_current(&mut s, ctx).unwrap();
        assert_eq!(s.current(), Some(c));

        // c finishes; a and b resume in the order they yielded.
        s.select(None).unwrap();
        assert_eq!(s.current(), Some(a));
        s.select(None).unwrap();
        assert_eq!(s.current(), Some(b));
        assert_eq!(s.select(None), None);
    }

    #[test]
    fn test_yield_restores_saved_context() {
        let mut s = sched();
        s.create(body, 256).unwrap();
        s.create(body, 256).unwrap();

        let initial = s.select(None).unwrap();
        let suspended = SavedContext::from_ptr(0x4000_0100 as *mut u32).unwrap();
        let other = s.select(Some(suspended)).unwrap();
        assert_ne!(other, initial);

        // Back to the first process, at the context it was suspended with.
        assert_eq!(s.select(None), Some(suspended));
    }

    #[test]
    fn test_real_time_not_dispatched_before_start() {
        let mut s = sched();
        let p = s.create(body, 256).unwrap();
        let r = s.create_realtime(body, 256, ms(20), ms(10)).unwrap();

        let mut ctx = s.select(None).unwrap();
        assert_eq!(s.current(), Some(p));

        s.port().advance(19);
        ctx = yield_current(&mut s, ctx).unwrap();
        assert_eq!(s.current(), Some(p));
        assert_eq!(s.queue_lengths().pending, 1);

        s.port().advance(1);
        yield_current(&mut s, ctx).unwrap();
        assert_eq!(s.current(), Some(r));
        assert_eq!(s.queue_lengths(), QueueLengths { ready: 1, pending: 0, realtime_ready: 0 });
    }

    #[test]
    fn test_yielded_real_time_beats_best_effort() {
        let mut s = sched();
        s.create(body, 256).unwrap();
        let r = s.create_realtime(body, 256, ms(0), ms(100)).unwrap();

        let ctx = s.select(None).unwrap();
        assert_eq!(s.current(), Some(r));
        yield_current(&mut s, ctx).unwrap();
        assert_eq!(s.current(), Some(r));
        assert_eq!(s.deadline_stats().completed(), 0);
    }

    #[test]
    fn test_idle_wait_until_earliest_start() {
        let mut s = sched();
        let later = s.create_realtime(body, 256, ms(80), ms(5)).unwrap();
        let sooner = s.create_realtime(body, 256, ms(50), ms(5)).unwrap();

        assert!(s.select(None).is_some());
        assert_eq!(s.current(), Some(sooner));
        assert_eq!(s.now().ticks(), 50);
        assert_eq!(s.port().idle_ticks, 50);
        assert!(!s.port().interrupts_enabled);

        s.select(None).unwrap();
        assert_eq!(s.current(), Some(later));
        assert_eq!(s.now().ticks(), 80);
        assert_eq!(s.deadline_stats().met, 1);
    }

    #[test]
    fn test_idle_wait_not_taken_when_best_effort_ready() {
        let mut s = sched();
        s.create(body, 256).unwrap();
        s.create_realtime(body, 256, ms(50), ms(5)).unwrap();

        s.select(None).unwrap();
        assert_eq!(s.now().ticks(), 0);
        assert_eq!(s.port().idle_ticks, 0);
    }

    #[test]
    fn test_realtime_offsets_in_seconds() {
        let mut s = sched();
        s.port().advance(250);
        s.create_realtime(body, 256, RealTime::new(1, 500), RealTime::new(0, 3)).unwrap();

        s.select(None).unwrap();
        assert_eq!(s.now().ticks(), 1750);
    }

    #[test]
    fn test_offsets_beyond_clock_horizon_are_rejected() {
        let mut s = sched();
        s.create(body, 256).unwrap();

        let err = s.create_realtime(body, 256, ms(3_000_000_000), ms(10)).unwrap_err();
        assert_eq!(err, KernelError::OffsetOutOfRange { offset_ms: 3_000_000_010 });
        let err = s.create_realtime(body, 256, ms(0), ms(3_000_000_000)).unwrap_err();
        assert_eq!(err, KernelError::OffsetOutOfRange { offset_ms: 3_000_000_000 });
        let err = s.create_realtime(body, 256, ms(u32::MAX), ms(1)).unwrap_err();
        assert_eq!(err, KernelError::OffsetOutOfRange { offset_ms: u32::MAX });
        let err = s.create_realtime(body, 256, ms(MAX_OFFSET_MS), ms(1)).unwrap_err();
        assert_eq!(err, KernelError::OffsetOutOfRange { offset_ms: MAX_OFFSET_MS + 1 });

        // Nothing was committed by the rejected calls.
        assert_eq!(s.live_processes(), 1);
        assert_eq!(s.stacks().live(), 1);
        assert_eq!(s.queue_lengths(), QueueLengths { ready: 1, pending: 0, realtime_ready: 0 });
    }

    #[test]
    fn test_longest_horizon_orders_correctly() {
        let mut s = sched();
        let p = s.create(body, 256).unwrap();
        let r = s.create_realtime(body, 256, ms(0), ms(MAX_OFFSET_MS)).unwrap();
        s.create_realtime(body, 256, ms(MAX_OFFSET_MS - 10), ms(10)).unwrap();

        s.select(None).unwrap();
        assert_eq!(s.current(), Some(r));

        // Finishing early against a far deadline is met, and the process
        // starting far in the future is still pending.
        s.port().advance(1);
        s.select(None).unwrap();
        assert_eq!(s.current(), Some(p));
        assert_eq!(s.deadline_stats(), DeadlineStats { met: 1, missed: 0 });
        assert_eq!(s.queue_lengths().pending, 1);
    }

    #[test]
    fn test_queue_failure_rolls_back_admission() {
        let mut s = sched();
        for slot in 0..MAX_PROCESSES {
            s.ready.push_back(Handle::forge(slot)).unwrap();
        }

        let err = s.create(body, 256).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(s.live_processes(), 0);
        assert_eq!(s.stacks().live(), 0);
        assert_eq!(s.stacks().released, 1);
        s.ready.clear();
    }

    #[test]
    fn test_stack_failure_is_out_of_memory() {
        let mut s = Scheduler::new(SimPort::new(), SimStacks::new(1));
        s.create(body, 256).unwrap();

        let err = s.create_realtime(body, 512, ms(0), ms(1)).unwrap_err();
        assert_eq!(err, KernelError::OutOfMemory { requested: 512 });
        assert_eq!(s.live_processes(), 1);
    }

    #[test]
    fn test_pcb_failure_releases_stack() {
        let mut s = sched();
        for _ in 0..MAX_PROCESSES {
            s.create(body, 256).unwrap();
        }

        let err = s.create(body, 256).unwrap_err();
        assert_eq!(err, KernelError::OutOfMemory { requested: 256 });
        assert_eq!(s.stacks().live(), MAX_PROCESSES);
        assert_eq!(s.stacks().released, 1);
        assert_eq!(s.queue_lengths().ready, MAX_PROCESSES);
    }

    #[test]
    fn test_finished_slots_are_reusable() {
        let mut s = sched();
        for _ in 0..MAX_PROCESSES {
            s.create(body, 256).unwrap();
        }
        s.select(None).unwrap();
        s.select(None).unwrap();

        // The first process finished, freeing one slot.
        assert!(s.create(body, 256).is_ok());
        assert!(s.create(body, 256).is_err());
    }

    #[test]
    fn test_context_without_running_process_is_ignored() {
        let mut s = sched();
        let stray = SavedContext::from_ptr(0x2000_0000 as *mut u32).unwrap();
        assert_eq!(s.select(Some(stray)), None);

        let p = s.create(body, 256).unwrap();
        assert!(s.select(Some(stray)).is_some());
        assert_eq!(s.current(), Some(p));
    }

    #[test]
    fn test_shutdown_releases_everything() {
        let mut s = sched();
        s.create(body, 256).unwrap();
        s.create_realtime(body, 256, ms(10), ms(10)).unwrap();
        s.create_realtime(body, 256, ms(0), ms(10)).unwrap();
        s.start().unwrap();

        let stats = s.shutdown();
        assert_eq!(stats.completed(), 0);
        assert_eq!(s.live_processes(), 0);
        assert_eq!(s.stacks().live(), 0);
        assert_eq!(s.current(), None);
        assert_eq!(s.queue_lengths(), QueueLengths::default());

        assert_eq!(s.create(body, 256), Err(KernelError::ShutDown));
        assert_eq!(s.start(), Err(KernelError::ShutDown));
        assert_eq!(s.select(None), None);
    }
}

// ---------------------------------------------------------------------------
// Property tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod proptests {
    use std::collections::HashMap;
    use std::vec::Vec;

    use proptest::prelude::*;

    use super::*;
    use crate::arch::sim::{SimPort, SimStacks};
    use crate::config::MAX_PROCESSES;

    extern "C" fn body() {}

    #[derive(Debug, Clone)]
    enum Spec {
        BestEffort,
        RealTime { start: u32, deadline: u32 },
    }

    fn spec() -> impl Strategy<Value = Spec> {
        prop_oneof![
            Just(Spec::BestEffort),
            (0u32..40, 0u32..40).prop_map(|(start, deadline)| Spec::RealTime { start, deadline }),
        ]
    }

    /// Per step: does the running process finish, and how many ms pass
    /// before the next dispatch trap.
    fn steps() -> impl Strategy<Value = Vec<(bool, u32)>> {
        proptest::collection::vec((any::<bool>(), 0u32..8), 0..64)
    }

    proptest! {
        #[test]
        fn every_process_runs_to_completion_once_in_edf_order(
            specs in proptest::collection::vec(spec(), 1..=MAX_PROCESSES),
            steps in steps(),
        ) {
            let mut s = Scheduler::new(SimPort::new(), SimStacks::new(MAX_PROCESSES));
            let mut kinds = HashMap::new();
            let mut rt_count = 0;
            for spec in &specs {
                let (id, kind) = match *spec {
                    Spec::BestEffort => (s.create(body, 256).unwrap(), None),
                    Spec::RealTime { start, deadline } => {
                        rt_count += 1;
                        let id = s
                            .create_realtime(body, 256, Duration::from_ticks(start), Duration::from_ticks(deadline))
                            .unwrap();
                        (id, Some((start, start + deadline)))
                    }
                };
                kinds.insert(id, kind);
            }

            let mut finished = Vec::new();
            let mut next = s.select(None);
            let mut steps = steps.into_iter();

            while let Some(ctx) = next {
                let current = s.current().unwrap();
                let now = s.now().ticks();
                prop_assert!(!finished.contains(&current), "{} dispatched after finishing", current);

                // Never before its start time; always the earliest deadline
                // among started real-time processes; best-effort only when
                // no real-time process is eligible.
                let eligible: Vec<u32> = kinds
                    .iter()
                    .filter(|(id, _)| **id != current && !finished.contains(*id))
                    .filter_map(|(_, kind)| *kind)
                    .filter(|(start, _)| *start <= now)
                    .map(|(_, deadline)| deadline)
                    .collect();
                match kinds[&current] {
                    Some((start, deadline)) => {
                        prop_assert!(start <= now);
                        prop_assert!(eligible.iter().all(|d| deadline <= *d));
                    }
                    None => prop_assert!(eligible.is_empty()),
                }

                let (finish, elapsed) = steps.next().unwrap_or((true, 1));
                s.port().advance(elapsed);
                next = if finish {
                    finished.push(current);
                    s.select(None)
                } else {
                    s.select(Some(ctx))
                };
            }

            let mut expected: Vec<_> = kinds.keys().copied().collect();
            expected.sort();
            finished.sort();
            prop_assert_eq!(finished, expected);
            prop_assert_eq!(s.deadline_stats().completed(), rt_count);
            prop_assert_eq!(s.stacks().live(), 0);
            prop_assert_eq!(s.live_processes(), 0);
        }

        #[test]
        fn best_effort_dispatch_order_is_creation_order(count in 1usize..=MAX_PROCESSES) {
            let mut s = Scheduler::new(SimPort::new(), SimStacks::new(MAX_PROCESSES));
            let created: Vec<_> = (0..count).map(|_| s.create(body, 256).unwrap()).collect();

            let mut dispatched = Vec::new();
            while s.select(None).is_some() {
                dispatched.push(s.current().unwrap());
            }
            prop_assert_eq!(dispatched, created);
        }
    }
}
