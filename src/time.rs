//! # Time Base
//!
//! Process-wide monotonic clock advanced once per millisecond by the
//! clock tick interrupt.
//!
//! The clock is kept as a normalized `(seconds, milliseconds)` pair and
//! collapsed to a single absolute millisecond [`Instant`] for every
//! comparison the scheduler makes.
//!
//! ## Torn reads
//!
//! The tick handler is the only writer and runs at a higher priority than
//! any reader, so it never blocks and never takes a lock. Readers use a
//! sequence counter instead: the writer makes the counter odd for the
//! duration of an update, and a reader that sees the counter change (or
//! odd) retries. This keeps a carry from seconds into milliseconds from
//! ever being observed half-applied.

use core::sync::atomic::{fence, AtomicU32, Ordering};

use crate::config::TICK_HZ;

/// Absolute time since kernel start, in milliseconds.
pub type Instant = fugit::TimerInstantU32<TICK_HZ>;

/// Relative time span, in milliseconds.
pub type Duration = fugit::TimerDurationU32<TICK_HZ>;

const MILLIS_PER_SEC: u32 = 1000;

// ---------------------------------------------------------------------------
// Seconds + milliseconds pair
// ---------------------------------------------------------------------------

/// A normalized seconds + milliseconds pair (`msec < 1000`).
///
/// Used both for reading the clock and for expressing real-time offsets
/// the way application code usually thinks about them, e.g.
/// `RealTime::new(1, 500)` for "one and a half seconds".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct RealTime {
    pub sec: u32,
    pub msec: u32,
}

impl RealTime {
    /// Build a normalized pair, carrying whole seconds out of `msec`.
    pub const fn new(sec: u32, msec: u32) -> Self {
        Self {
            sec: sec + msec / MILLIS_PER_SEC,
            msec: msec % MILLIS_PER_SEC,
        }
    }

    /// Split an absolute millisecond count into a pair.
    pub const fn from_millis(ms: u32) -> Self {
        Self::new(0, ms)
    }

    /// Collapse the pair to milliseconds (`1000 * sec + msec`).
    pub const fn as_millis(&self) -> u32 {
        self.sec.wrapping_mul(MILLIS_PER_SEC).wrapping_add(self.msec)
    }
}

impl From<RealTime> for Duration {
    fn from(t: RealTime) -> Self {
        Duration::from_ticks(t.as_millis())
    }
}

impl From<RealTime> for Instant {
    fn from(t: RealTime) -> Self {
        Instant::from_ticks(t.as_millis())
    }
}

// ---------------------------------------------------------------------------
// Time base
// ---------------------------------------------------------------------------

/// The kernel clock. Written only by [`TimeBase::tick`].
pub struct TimeBase {
    seq: AtomicU32,
    seconds: AtomicU32,
    millis: AtomicU32,
}

impl TimeBase {
    /// A clock reading zero. `const` so it can live in a `static`.
    pub const fn new() -> Self {
        Self {
            seq: AtomicU32::new(0),
            seconds: AtomicU32::new(0),
            millis: AtomicU32::new(0),
        }
    }

    /// Advance the clock by one millisecond. Called from the clock tick
    /// interrupt; must not be called concurrently with itself.
    pub fn tick(&self) {
        let seq = self.seq.load(Ordering::Relaxed);
        self.seq.store(seq.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);

        let ms = self.millis.load(Ordering::Relaxed) + 1;
        if ms >= MILLIS_PER_SEC {
            let sec = self.seconds.load(Ordering::Relaxed);
            self.seconds.store(sec.wrapping_add(1), Ordering::Relaxed);
            self.millis.store(0, Ordering::Relaxed);
        } else {
            self.millis.store(ms, Ordering::Relaxed);
        }

        self.seq.store(seq.wrapping_add(2), Ordering::Release);
    }

    /// Current time as a seconds + milliseconds pair.
    pub fn now(&self) -> RealTime {
        loop {
            let before = self.seq.load(Ordering::Acquire);
            if before & 1 == 1 {
                core::hint::spin_loop();
                continue;
            }

            let sec = self.seconds.load(Ordering::Relaxed);
            let msec = self.millis.load(Ordering::Relaxed);

            fence(Ordering::Acquire);
            if self.seq.load(Ordering::Relaxed) == before {
                return RealTime { sec, msec };
            }
        }
    }

    /// Current absolute time in milliseconds.
    #[inline]
    pub fn now_ms(&self) -> Instant {
        self.now().into()
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
