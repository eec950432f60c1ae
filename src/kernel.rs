//! # Kernel
//!
//! Top-level kernel initialization and public API for EdfOS.
//!
//! The kernel owns the global scheduler instance, provides process
//! creation and lifecycle APIs, and coordinates system startup. Every
//! public function runs inside a critical section, as does the dispatch
//! trap, so the scheduler is never entered twice.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         ├─► kernel::init()            ← Claim SysTick/SCB and stack pool
//!         ├─► kernel::create()          ← Best-effort processes (×N)
//!         ├─► kernel::create_realtime() ← Real-time processes (×N)
//!         └─► kernel::start()           ← No return once a process exists
//!               ├─► Set priorities, configure SysTick
//!               ├─► Bootstrap dispatch
//!               └─► Launch it via cortex_m4::start_first_task()
//! ```

use core::cell::RefCell;

use cortex_m::interrupt::{self, Mutex};
use cortex_m::peripheral::{SCB, SYST};

use crate::accounting::DeadlineStats;
use crate::arch::cortex_m4::{self, CortexM4Port, TIME};
use crate::config::MAX_PROCESSES;
use crate::error::{KernelError, KernelResult};
use crate::process::{ProcessEntry, ProcessId, SavedContext};
use crate::scheduler::Scheduler;
use crate::stack::{StackPool, StackSlot};
use crate::sync;
use crate::time::{Duration, RealTime};

type KernelScheduler = Scheduler<CortexM4Port, StackPool>;

// ---------------------------------------------------------------------------
// Global scheduler instance
// ---------------------------------------------------------------------------

/// Global scheduler instance, set once by [`init`].
static SCHEDULER: Mutex<RefCell<Option<KernelScheduler>>> = Mutex::new(RefCell::new(None));

fn with_scheduler<R>(f: impl FnOnce(&mut KernelScheduler) -> KernelResult<R>) -> KernelResult<R> {
    sync::critical_section(|cs| match SCHEDULER.borrow(cs).borrow_mut().as_mut() {
        Some(scheduler) => f(scheduler),
        None => Err(KernelError::NotInitialized),
    })
}

// ---------------------------------------------------------------------------
// Kernel API
// ---------------------------------------------------------------------------

/// Initialize the EdfOS kernel.
///
/// Takes ownership of SysTick and the SCB and reserves `MAX_PROCESSES`
/// stack slots. Must be called before any other kernel function.
///
/// # Errors
/// `AlreadyStarted` if the kernel was already initialized.
pub fn init(syst: SYST, scb: SCB) -> KernelResult<()> {
    let slots = cortex_m::singleton!(
        : [StackSlot; MAX_PROCESSES] = [StackSlot::EMPTY; MAX_PROCESSES]
    )
    .ok_or(KernelError::AlreadyStarted)?;

    let scheduler = Scheduler::new(
        CortexM4Port::new(syst, scb),
        StackPool::new(slots, cortex_m4::init_frame),
    );

    sync::critical_section(|cs| {
        SCHEDULER.borrow(cs).replace(Some(scheduler));
    });
    Ok(())
}

/// Create a best-effort process, served FIFO behind real-time work.
///
/// May be called from a running process.
///
/// # Example
/// ```ignore
/// kernel::create(blink, 512).unwrap();
/// ```
pub fn create(entry: ProcessEntry, stack_size: usize) -> KernelResult<ProcessId> {
    with_scheduler(|s| s.create(entry, stack_size))
}

/// Create a real-time process that starts `start_offset` from now and
/// must finish within `deadline_offset` of its start.
///
/// The two offsets together may not exceed `MAX_OFFSET_MS` (about 24 days).
///
/// # Example
/// ```ignore
/// let start = RealTime::new(1, 0);
/// kernel::create_realtime(sample, 512, start, RealTime::from_millis(5)).unwrap();
/// ```
pub fn create_realtime(
    entry: ProcessEntry,
    stack_size: usize,
    start_offset: impl Into<Duration>,
    deadline_offset: impl Into<Duration>,
) -> KernelResult<ProcessId> {
    with_scheduler(|s| s.create_realtime(entry, stack_size, start_offset, deadline_offset))
}

/// Start the EdfOS scheduler.
///
/// Arms the timers and launches the first process. Does not return if any
/// process was created; once every process has finished, the CPU stays in
/// the kernel idle loop. Returns `Ok(())` immediately when nothing was
/// created.
///
/// # Errors
/// `NotInitialized` before [`init`], `AlreadyStarted` on a second call.
pub fn start() -> KernelResult<()> {
    // Stay masked until the first process runs on its own stack.
    interrupt::disable();
    let first = with_scheduler(|s| s.start());

    match first {
        Ok(Some(ctx)) => unsafe { cortex_m4::start_first_task(ctx) },
        Ok(None) => {
            // Safety: nothing is running, so no critical section is broken.
            unsafe { interrupt::enable() };
            Ok(())
        }
        Err(err) => {
            // Safety: as above.
            unsafe { interrupt::enable() };
            Err(err)
        }
    }
}

/// Give up the CPU. Real-time processes keep their deadline; best-effort
/// processes go to the back of the FIFO.
pub fn yield_now() {
    cortex_m4::trigger_pendsv();
}

/// Met and missed deadline counts so far.
pub fn deadline_stats() -> DeadlineStats {
    with_scheduler(|s| Ok(s.deadline_stats())).unwrap_or_default()
}

/// The process calling this, or `None` before [`start`].
pub fn current() -> Option<ProcessId> {
    with_scheduler(|s| Ok(s.current())).ok().flatten()
}

/// Time since [`start`].
pub fn now() -> RealTime {
    TIME.now()
}

// ---------------------------------------------------------------------------
// Dispatch trap
// ---------------------------------------------------------------------------

/// Scheduler side of the dispatch trap. `None` in, nothing was running or
/// the running process finished; `None` out, nothing is runnable.
pub(crate) fn dispatch(suspended: Option<SavedContext>) -> Option<SavedContext> {
    with_scheduler(|s| Ok(s.select(suspended))).ok().flatten()
}
