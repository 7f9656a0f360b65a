//! Per-thread context chain.
//!
//! Each thread owns a singly linked stack of [`Checkpoint`]s, innermost
//! first, one per protected scope that has been entered and not yet left.
//! The head lives in a const-initialised `thread_local!` cell holding a
//! raw pointer: no lazy initialisation and no destructor, so the
//! dispatcher can read it from signal context without allocating.
//!
//! # Ownership
//!
//! A checkpoint is created by [`push`], owned by the chain while it is the
//! head or below the head, and destroyed by the matching pop. The pop is
//! tied to [`CheckpointGuard`]'s `Drop`, so it runs exactly once whether
//! the scope ends normally, by panic, or by fault-triggered resume.
//! Nothing outside this module keeps a checkpoint pointer beyond the
//! guard's lifetime.

use crate::debug::catch_debug;
use crate::dispatch::FaultRecord;
use crate::jmp::SigJmpBuf;
use std::cell::Cell;
use std::marker::PhantomData;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicBool, Ordering};

/// One active protected scope on one thread.
#[repr(C)]
pub(crate) struct Checkpoint {
    /// Resume point captured by `sigsetjmp`.
    pub(crate) resume_point: SigJmpBuf,
    /// Set once `resume_point` is valid, cleared when the body ends or the
    /// dispatcher consumes it.
    armed: AtomicBool,
    /// Whether the thread was already unwinding a panic when armed.
    armed_in_panic: AtomicBool,
    /// Written by the dispatcher immediately before it jumps.
    pub(crate) record: FaultRecord,
    /// Enclosing checkpoint on this thread, or null.
    previous: *mut Checkpoint,
    /// 1 for the outermost scope.
    depth: usize,
}

impl Checkpoint {
    /// Mark the resume point as valid.
    #[inline]
    pub(crate) fn arm(&self) {
        self.armed_in_panic.store(std::thread::panicking(), Ordering::Relaxed);
        self.armed.store(true, Ordering::Release);
    }

    /// Mark the resume point as no longer usable.
    #[inline]
    pub(crate) fn disarm(&self) {
        self.armed.store(false, Ordering::Release);
    }

    /// Claim the resume point for a jump. Succeeds at most once per arm.
    ///
    /// Fails, and leaves the checkpoint disarmed, when a panic started
    /// inside the body and is still unwinding: jumping out of the unwinder
    /// would swallow the panic and leave the thread's panic count raised.
    /// `std::thread::panicking` only reads an atomic and a const
    /// thread-local counter, so this stays usable from the dispatcher.
    #[inline]
    pub(crate) fn try_claim(&self) -> bool {
        self.armed.swap(false, Ordering::AcqRel)
            && self.armed_in_panic.load(Ordering::Relaxed) == std::thread::panicking()
    }

    /// 1 for the outermost scope on the thread.
    #[inline]
    pub(crate) fn depth(&self) -> usize {
        self.depth
    }
}

thread_local! {
    static HEAD: Cell<*mut Checkpoint> = const { Cell::new(ptr::null_mut()) };
}

/// The calling thread's innermost checkpoint, or null.
///
/// Async-signal-safe: a plain TLS load.
#[inline]
pub(crate) fn head() -> *mut Checkpoint {
    HEAD.try_with(Cell::get).unwrap_or(ptr::null_mut())
}

/// Number of protected scopes currently active on the calling thread.
pub fn chain_depth() -> usize {
    let head = head();
    if head.is_null() {
        0
    } else {
        // SAFETY: a non-null head is a live checkpoint owned by this thread.
        unsafe { (*head).depth() }
    }
}

/// Exclusive handle to the checkpoint pushed by one protected scope.
///
/// Dropping it pops that checkpoint. Not `Send`: the chain is per thread.
pub(crate) struct CheckpointGuard {
    checkpoint: NonNull<Checkpoint>,
    _not_send: PhantomData<*mut Checkpoint>,
}

/// Link a new checkpoint in front of the calling thread's chain.
pub(crate) fn push() -> CheckpointGuard {
    let previous = head();
    let depth = if previous.is_null() {
        1
    } else {
        // SAFETY: previous is this thread's live head.
        unsafe { (*previous).depth() + 1 }
    };

    let checkpoint = Box::new(Checkpoint {
        resume_point: SigJmpBuf::zeroed(),
        armed: AtomicBool::new(false),
        armed_in_panic: AtomicBool::new(false),
        record: FaultRecord::EMPTY,
        previous,
        depth,
    });
    let checkpoint = NonNull::from(Box::leak(checkpoint));
    HEAD.with(|h| h.set(checkpoint.as_ptr()));

    catch_debug!("push checkpoint {:p} over {:p} (depth {})", checkpoint, previous, depth);

    CheckpointGuard {
        checkpoint,
        _not_send: PhantomData,
    }
}

impl CheckpointGuard {
    /// Raw pointer for the resume-point capture and the dispatcher.
    pub(crate) fn as_ptr(&self) -> *mut Checkpoint {
        self.checkpoint.as_ptr()
    }

    /// The fault record left by the dispatcher.
    pub(crate) fn record(&self) -> FaultRecord {
        // SAFETY: the guard owns a live checkpoint; volatile because the
        // write happened in a signal handler the compiler cannot see.
        unsafe { ptr::read_volatile(&raw const (*self.checkpoint.as_ptr()).record) }
    }
}

impl Drop for CheckpointGuard {
    fn drop(&mut self) {
        let this = self.checkpoint.as_ptr();
        // SAFETY: the guard owns the checkpoint and it is still linked.
        let previous = unsafe {
            (*this).disarm();
            (*this).previous
        };

        // Scopes are strictly nested, so the guard being dropped is the head.
        debug_assert_eq!(head(), this, "protected scopes left out of order");
        HEAD.with(|h| h.set(previous));

        catch_debug!("pop checkpoint {:p} to {:p}", this, previous);

        // SAFETY: created by Box::leak in push and unlinked above.
        drop(unsafe { Box::from_raw(this) });
    }
}
