//! # Cortex-M4 Port Layer
//!
//! Hardware-specific code for the ARM Cortex-M4 (Thumb-2) processor.
//! Implements the clock tick, the dispatch trap and context switching,
//! initial stack frames, and the [`Port`] the scheduler drives.
//!
//! ## Context Switch Mechanism
//!
//! The Cortex-M4 uses a split-stack model:
//! - **MSP** (Main Stack Pointer): Used by the kernel and interrupt handlers
//! - **PSP** (Process Stack Pointer): Used by processes in Thread mode
//!
//! On exception entry, the hardware automatically stacks R0–R3, R12, LR, PC,
//! and xPSR onto the process stack. The PendSV handler manually saves and
//! restores R4–R11, so a saved context is simply the PSP after that push:
//!
//! ```text
//!   high ┌──────────┐ ← stack top
//!        │  xPSR    │
//!        │  PC      │
//!        │  LR      │  hardware frame (8 words)
//!        │  R12     │
//!        │  R3..R0  │
//!        ├──────────┤
//!        │  R11..R4 │  software frame (8 words)
//!   low  └──────────┘ ← SavedContext
//! ```
//!
//! ## Interrupt Priorities
//!
//! - SysTick: Priority 0x00 (highest). The 1 ms clock tick must keep
//!   running while the dispatch trap waits for a pending start time.
//! - PendSV: Priority 0xFF (lowest). The dispatch trap, pended by the tick
//!   every `QUANTUM_MS`, by an explicit yield, or by a finished process.
//!
//! Builds for the soft-float target (`thumbv7em-none-eabi`): the switch
//! code only handles the basic 8-word hardware frame.

use core::arch::{asm, naked_asm};
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use cortex_m::interrupt;
use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::{SCB, SYST};
use cortex_m_rt::exception;

use super::Port;
use crate::config::{IDLE_STACK_SIZE, QUANTUM_MS, SYSTEM_CLOCK_HZ, TICK_HZ};
use crate::process::{ProcessEntry, SavedContext};
use crate::time::{Instant, TimeBase};

/// System time, advanced only by the SysTick handler.
pub static TIME: TimeBase = TimeBase::new();

/// Ticks since the last pass through the dispatch trap.
static TICKS_SINCE_DISPATCH: AtomicU32 = AtomicU32::new(0);

/// Set by [`process_exit`] so the next trap retires instead of requeues.
static PROCESS_FINISHED: AtomicBool = AtomicBool::new(false);

/// Whether the CPU is running the kernel idle context.
static IDLE_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Set once the first process runs on the PSP. Until then the quantum
/// must not pend the trap: the bootstrap dispatch may itself wait for a
/// start time in Thread mode.
static DISPATCH_ARMED: AtomicBool = AtomicBool::new(false);

const XPSR_THUMB: u32 = 1 << 24;
const FRAME_WORDS: usize = 16;

// ---------------------------------------------------------------------------
// Port
// ---------------------------------------------------------------------------

/// The scheduler's view of this core. Owns the SysTick peripheral and the
/// SCB so nothing else can reconfigure the timers.
pub struct CortexM4Port {
    syst: SYST,
    scb: SCB,
}

impl CortexM4Port {
    pub fn new(syst: SYST, scb: SCB) -> Self {
        Self { syst, scb }
    }
}

impl Port for CortexM4Port {
    fn now(&self) -> Instant {
        TIME.now_ms()
    }

    fn start_timers(&mut self) {
        set_interrupt_priorities(&mut self.scb);
        configure_systick(&mut self.syst);
    }

    // The idle wait unmasks interrupts from inside the scheduler's critical
    // section. Only SysTick can run then, and it touches atomics alone.
    fn enable_interrupts(&mut self) {
        // Safety: see above.
        unsafe { interrupt::enable() }
    }

    fn disable_interrupts(&mut self) {
        interrupt::disable();
    }

    fn wait_for_tick(&mut self) {
        cortex_m::asm::wfi();
    }
}

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

/// Configure the SysTick timer for the clock tick.
///
/// Sets up SysTick to fire at `TICK_HZ` frequency using the processor
/// clock. Each tick advances [`TIME`] by one millisecond.
pub fn configure_systick(syst: &mut SYST) {
    let reload = SYSTEM_CLOCK_HZ / TICK_HZ - 1;
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

/// SysTick above everything, PendSV below everything.
pub fn set_interrupt_priorities(scb: &mut SCB) {
    // Safety: changing priorities cannot break priority-based critical
    // sections here, the kernel only uses PRIMASK.
    unsafe {
        scb.set_priority(SystemHandler::SysTick, 0x00);
        scb.set_priority(SystemHandler::PendSV, 0xFF);
    }
}

/// Pend the dispatch trap.
#[inline]
pub fn trigger_pendsv() {
    SCB::set_pendsv();
}

// ---------------------------------------------------------------------------
// Initial frames
// ---------------------------------------------------------------------------

/// Write an initial exception frame for `entry` just below `top`.
///
/// R0–R12 start zeroed, LR points at [`process_exit`] so that returning
/// from `entry` retires the process, and PC is `entry` with the Thumb bit
/// cleared (exception return requires a halfword-aligned PC).
///
/// # Safety
/// `top` must end a writable, 8-byte aligned region of at least
/// `FRAME_WORDS` words.
pub unsafe fn init_frame(top: NonNull<u32>, entry: ProcessEntry) -> SavedContext {
    let sp = top.as_ptr().sub(FRAME_WORDS);
    for i in 0..FRAME_WORDS {
        ptr::write_volatile(sp.add(i), 0);
    }
    ptr::write_volatile(sp.add(13), process_exit as usize as u32);
    ptr::write_volatile(sp.add(14), (entry as usize as u32) & !1);
    ptr::write_volatile(sp.add(15), XPSR_THUMB);
    SavedContext::from_non_null(NonNull::new_unchecked(sp))
}

/// Return address of every process entry point.
extern "C" fn process_exit() -> ! {
    PROCESS_FINISHED.store(true, Ordering::Release);
    trigger_pendsv();
    loop {
        cortex_m::asm::wfi();
    }
}

// ---------------------------------------------------------------------------
// Idle context
// ---------------------------------------------------------------------------

#[repr(C, align(8))]
struct IdleStack([u32; IDLE_STACK_SIZE / 4]);

static mut IDLE_STACK: IdleStack = IdleStack([0; IDLE_STACK_SIZE / 4]);

/// Runs whenever the scheduler has nothing left.
extern "C" fn idle() {
    loop {
        cortex_m::asm::wfi();
    }
}

/// Fresh idle frame. The idle loop keeps no state worth resuming.
unsafe fn idle_context() -> *mut u32 {
    let base = ptr::addr_of_mut!(IDLE_STACK).cast::<u32>();
    let top = NonNull::new_unchecked(base.add(IDLE_STACK_SIZE / 4));
    init_frame(top, idle).as_ptr()
}

// ---------------------------------------------------------------------------
// First process launch
// ---------------------------------------------------------------------------

/// Start the first process by switching Thread mode to the PSP and
/// unstacking its initial frame by hand.
///
/// # Safety
/// Must only be called once, from Thread mode with interrupts disabled,
/// with a context built by [`init_frame`].
pub unsafe fn start_first_task(ctx: SavedContext) -> ! {
    TICKS_SINCE_DISPATCH.store(0, Ordering::Relaxed);
    DISPATCH_ARMED.store(true, Ordering::Relaxed);

    asm!(
        // Skip the software-saved R4-R11 (zero in an initial frame)
        "adds r0, #32",
        "msr psp, r0",

        // Thread mode uses PSP from now on (CONTROL.SPSEL = 1)
        "movs r0, #2",
        "msr control, r0",
        "isb",

        // Unstack the hardware frame
        "pop {{r0-r3, r12}}",
        "pop {{r4}}",          // LR (process_exit)
        "pop {{r5}}",          // PC (entry point, Thumb bit cleared)
        "pop {{r6}}",          // xPSR (discarded)
        "mov lr, r4",
        "orr r5, r5, #1",

        "cpsie i",
        "bx r5",

        in("r0") ctx.as_ptr(),
        options(noreturn)
    );
}

// ---------------------------------------------------------------------------
// PendSV handler (dispatch trap)
// ---------------------------------------------------------------------------

/// PendSV exception handler. Performs the actual context switch.
///
/// ## Sequence
/// 1. Save R4–R11 onto the current process stack (PSP)
/// 2. Hand the resulting PSP to [`switch_context`], which runs one
///    scheduler transition and returns the PSP to resume
/// 3. Restore R4–R11 from the new stack
/// 4. Return from exception to Thread mode on PSP (EXC_RETURN = 0xFFFFFFFD)
///
/// # Safety
/// Called by the NVIC only. Must follow the exact Cortex-M4 exception
/// entry/exit convention.
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() {
    naked_asm!(
        "mrs r0, psp",
        "stmdb r0!, {{r4-r11}}",
        "bl {switch}",
        "ldmia r0!, {{r4-r11}}",
        "msr psp, r0",
        "mvn r0, #2",
        "bx r0",
        switch = sym switch_context,
    );
}

/// Translate the trap into a scheduler event and pick the stack to resume.
///
/// # Safety
/// Called from PendSV only, with `psp` pointing at a complete saved frame.
unsafe extern "C" fn switch_context(psp: *mut u32) -> *mut u32 {
    let was_idle = IDLE_ACTIVE.load(Ordering::Relaxed);
    let finished = PROCESS_FINISHED.swap(false, Ordering::Acquire);

    let suspended = if was_idle || finished {
        None
    } else {
        SavedContext::from_ptr(psp)
    };

    let next = crate::kernel::dispatch(suspended);
    TICKS_SINCE_DISPATCH.store(0, Ordering::Relaxed);

    match next {
        Some(ctx) => {
            IDLE_ACTIVE.store(false, Ordering::Relaxed);
            ctx.as_ptr()
        }
        None if was_idle => psp,
        None => {
            IDLE_ACTIVE.store(true, Ordering::Relaxed);
            idle_context()
        }
    }
}

// ---------------------------------------------------------------------------
// SysTick handler (clock tick)
// ---------------------------------------------------------------------------

#[exception]
fn SysTick() {
    TIME.tick();

    if !DISPATCH_ARMED.load(Ordering::Relaxed) {
        return;
    }
    let elapsed = TICKS_SINCE_DISPATCH.fetch_add(1, Ordering::Relaxed) + 1;
    if elapsed >= QUANTUM_MS {
        TICKS_SINCE_DISPATCH.store(0, Ordering::Relaxed);
        trigger_pendsv();
    }
}
