//! # Process Stacks
//!
//! The scheduler does not know how a stack is laid out or how an initial
//! machine frame looks; it asks a [`StackAllocator`] for a region whose
//! initial context starts executing the entry point when resumed, and
//! hands the region back exactly once when the process is retired.
//!
//! [`StackPool`] is the allocator used by the firmware: a fixed set of
//! equally sized, 8-byte aligned slots. The architecture port supplies the
//! [`FrameBuilder`] that writes the initial exception frame.

use core::ptr::NonNull;

use crate::config::{MIN_STACK_SIZE, STACK_SIZE};
use crate::process::{ProcessEntry, SavedContext};

/// Stack region backing one process. Not `Clone`: it is released once.
#[derive(Debug, PartialEq, Eq)]
pub struct StackHandle {
    base: NonNull<u32>,
    initial: SavedContext,
}

// Safety: the handle only names a region; ownership of the memory moves
// with it.
unsafe impl Send for StackHandle {}

impl StackHandle {
    pub const fn new(base: NonNull<u32>, initial: SavedContext) -> Self {
        Self { base, initial }
    }

    /// Lowest address of the region.
    #[inline]
    pub fn base(&self) -> NonNull<u32> {
        self.base
    }

    /// Context that begins executing the entry point when restored.
    #[inline]
    pub fn initial_context(&self) -> SavedContext {
        self.initial
    }
}

/// Stack allocation collaborator consumed by admission and retirement.
pub trait StackAllocator {
    /// Allocate `size` bytes of stack and build the initial context for
    /// `entry`. `None` means the allocation failed.
    fn init_stack(&mut self, entry: ProcessEntry, size: usize) -> Option<StackHandle>;

    /// Return a region obtained from [`StackAllocator::init_stack`].
    /// The scheduler calls this exactly once per handle.
    fn release_stack(&mut self, stack: StackHandle, size: usize);
}

// ---------------------------------------------------------------------------
// Fixed-slot pool
// ---------------------------------------------------------------------------

/// Writes the initial frame for `entry` just below `top` and returns the
/// resulting saved context.
///
/// # Safety
/// `top` must be the one-past-the-end address of a writable, 8-byte
/// aligned region of at least `MIN_STACK_SIZE` bytes.
pub type FrameBuilder = unsafe fn(top: NonNull<u32>, entry: ProcessEntry) -> SavedContext;

const SLOT_WORDS: usize = STACK_SIZE / 4;

/// One pool slot. Aligned to 8 bytes as required by ARM AAPCS.
#[repr(C, align(8))]
pub struct StackSlot([u32; SLOT_WORDS]);

impl StackSlot {
    pub const EMPTY: Self = Self([0; SLOT_WORDS]);

    fn base(&mut self) -> NonNull<u32> {
        NonNull::from(&mut self.0).cast()
    }
}

/// Fixed-slot stack allocator over statically reserved memory.
pub struct StackPool {
    slots: &'static mut [StackSlot],
    in_use: u64,
    build_frame: FrameBuilder,
}

impl StackPool {
    /// Manage `slots` (at most 64 are used).
    pub fn new(slots: &'static mut [StackSlot], build_frame: FrameBuilder) -> Self {
        Self {
            slots,
            in_use: 0,
            build_frame,
        }
    }

    /// Number of slots currently handed out.
    pub fn in_use(&self) -> usize {
        self.in_use.count_ones() as usize
    }

    pub fn capacity(&self) -> usize {
        self.slots.len().min(64)
    }
}

impl StackAllocator for StackPool {
    fn init_stack(&mut self, entry: ProcessEntry, size: usize) -> Option<StackHandle> {
        if !(MIN_STACK_SIZE..=STACK_SIZE).contains(&size) {
            return None;
        }

        let index = (0..self.capacity()).find(|i| self.in_use & (1 << i) == 0)?;
        self.in_use |= 1 << index;

        let base = self.slots[index].base();
        // Safety: one past the end of the slot we just claimed.
        let top = unsafe { NonNull::new_unchecked(base.as_ptr().add(SLOT_WORDS)) };
        // Safety: `top` ends a STACK_SIZE-byte, 8-byte aligned slot owned
        // by this pool and STACK_SIZE >= MIN_STACK_SIZE.
        let initial = unsafe { (self.build_frame)(top, entry) };

        Some(StackHandle::new(base, initial))
    }

    fn release_stack(&mut self, stack: StackHandle, _size: usize) {
        let index = self
            .slots
            .iter_mut()
            .take(64)
            .position(|slot| slot.base() == stack.base());

        match index {
            Some(i) => {
                debug_assert!(self.in_use & (1 << i) != 0, "stack slot released twice");
                self.in_use &= !(1 << i);
            }
            None => log::error!("release of a stack not owned by the pool"),
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
