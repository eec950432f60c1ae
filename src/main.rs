//! # EdfOS Example Firmware
//!
//! Mixes best-effort and real-time processes so that both deadline
//! outcomes show up in the counters:
//!
//! | Process | Kind | Start | Deadline | Behavior |
//! |---------|------|-------|----------|----------|
//! | `background` | Best-effort | - | - | Busy work in slices, yields between them |
//! | `logger` | Best-effort | - | - | Short bursts, yields often |
//! | `sampler` | Real-time | 0 s | 1 s | 300 ms of work, meets its deadline |
//! | `burst` | Real-time | 1 s | 250 ms | 300 ms of work, misses its deadline |
//! | `urgent` | Real-time | 1.05 s | 150 ms | 50 ms of work, preempts `burst` |
//! | `report` | Real-time | 5 s | 1 s | Publishes the deadline counters |
//!
//! ## Expected Sequence
//!
//! ```text
//! t=0      sampler runs first (ready real-time work beats the FIFO)
//! t=0.3s   sampler done (met); background and logger alternate
//! t=1.0s   burst takes over at the next dispatch trap
//! t=1.1s   quantum trap: urgent (deadline 1.2s) preempts burst (1.25s)
//! t=1.15s  urgent done (met); burst resumes
//! t=1.3s   burst finishes late (missed)
//! t=5.0s   report stores met=2, missed=1 in REPORT_MET/REPORT_MISSED
//! ```
//!
//! The counters are plain statics so they can be inspected with a
//! debugger once the CPU has settled into the idle loop.

#![no_std]
#![no_main]

use core::sync::atomic::{AtomicU32, Ordering};

use cortex_m_rt::entry;
use panic_halt as _;

use edfos::kernel;
use edfos::{Duration, RealTime};

static REPORT_MET: AtomicU32 = AtomicU32::new(0);
static REPORT_MISSED: AtomicU32 = AtomicU32::new(0);

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Spin for `ms` milliseconds of wall-clock time. Time spent preempted
/// counts too.
fn busy_for(ms: u32) {
    let until = kernel::now().as_millis() + ms;
    while kernel::now().as_millis() < until {
        cortex_m::asm::nop();
    }
}

// ---------------------------------------------------------------------------
// Best-effort processes
// ---------------------------------------------------------------------------

extern "C" fn background() {
    for _ in 0..20 {
        busy_for(50);
        kernel::yield_now();
    }
}

extern "C" fn logger() {
    for _ in 0..40 {
        busy_for(5);
        kernel::yield_now();
    }
}

// ---------------------------------------------------------------------------
// Real-time processes
// ---------------------------------------------------------------------------

extern "C" fn sampler() {
    busy_for(300);
}

extern "C" fn burst() {
    busy_for(300);
}

extern "C" fn urgent() {
    busy_for(50);
}

extern "C" fn report() {
    let stats = kernel::deadline_stats();
    REPORT_MET.store(stats.met, Ordering::Relaxed);
    REPORT_MISSED.store(stats.missed, Ordering::Relaxed);
    log::info!("deadlines: {} met, {} missed", stats.met, stats.missed);
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

/// Firmware entry point. Initializes the kernel, creates the processes,
/// and starts the scheduler. Does not return.
#[entry]
fn main() -> ! {
    let cp = cortex_m::Peripherals::take().unwrap();
    kernel::init(cp.SYST, cp.SCB).unwrap();

    kernel::create(background, 512).unwrap();
    kernel::create(logger, 512).unwrap();

    kernel::create_realtime(sampler, 512, Duration::millis(0), RealTime::new(1, 0)).unwrap();
    kernel::create_realtime(burst, 512, RealTime::new(1, 0), Duration::millis(250)).unwrap();
    kernel::create_realtime(urgent, 512, RealTime::new(1, 50), Duration::millis(150)).unwrap();
    kernel::create_realtime(report, 512, RealTime::new(5, 0), RealTime::new(1, 0)).unwrap();

    kernel::start().unwrap();

    // Only reached when no process was created.
    loop {
        cortex_m::asm::wfi();
    }
}
