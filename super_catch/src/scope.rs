//! Protected scopes.
//!
//! [`protect`] brackets a body: it installs the handlers on first use,
//! pushes a checkpoint, captures the resume point and runs the body. A
//! fault anywhere below that point jumps back into [`run_at_checkpoint`],
//! which returns the signal number instead of `NORMAL_COMPLETION`, and
//! `protect` turns that into `Err(FaultException)` in its own frame.
//!
//! # Abandoned frames
//!
//! The jump discards every frame between the fault and the checkpoint
//! without unwinding: values owned by those frames are leaked, their
//! `Drop` never runs, and locks they held stay held. Frames above the
//! checkpoint are untouched and unwind normally if the caller propagates
//! the error. Keep protected bodies free of state that must be cleaned up,
//! or clean it up from the caller.

use crate::altstack;
use crate::chain::{self, Checkpoint};
use crate::debug::catch_debug;
use crate::exception::FaultException;
use crate::install;
use crate::jmp::sigsetjmp;
use std::ffi::c_int;
use std::mem::ManuallyDrop;
use std::sync::atomic::{Ordering, compiler_fence};
use super_catch_common::consts::NORMAL_COMPLETION;

/// Run `body`, converting a fault it raises into a [`FaultException`].
///
/// Scopes nest: a fault resumes the innermost active scope on the calling
/// thread only. A panic raised by `body` propagates unchanged after the
/// scope's checkpoint is popped.
///
/// ```rust,no_run
/// use super_catch::{Fault, protect, trigger};
///
/// let err = protect(|| trigger::null_dereference()).unwrap_err();
/// assert_eq!(err.kind(), Fault::InvalidMemoryAccess);
/// ```
pub fn protect<T, F>(body: F) -> Result<T, FaultException>
where
    F: FnOnce() -> T,
{
    let installation = install::ensure_installed();
    altstack::ensure_for_current_thread(installation.alt_stack_size());

    let guard = chain::push();

    // Never dropped here: consumed by the call, or abandoned by a fault.
    let mut body = ManuallyDrop::new(body);
    let mut output: Option<T> = None;
    let mut run = || {
        // SAFETY: run_at_checkpoint calls this closure at most once.
        let body = unsafe { ManuallyDrop::take(&mut body) };
        output = Some(body());
    };

    // SAFETY: the guard keeps the checkpoint linked for the whole call.
    let resume_value = unsafe { run_at_checkpoint(guard.as_ptr(), &mut run) };
    let record = guard.record();
    drop(guard);

    match output {
        Some(value) if resume_value == NORMAL_COMPLETION => Ok(value),
        _ => {
            catch_debug!("resumed checkpoint with signal {}", resume_value);
            Err(FaultException::from_resume(resume_value, record))
        }
    }
}

/// Capture the resume point, arm it, run `body`, disarm.
///
/// Returns `NORMAL_COMPLETION` when `body` returns, or the signal number
/// passed to `siglongjmp` by the dispatcher. This frame is the one
/// `sigsetjmp` returns into twice, so nothing but the two pointers it was
/// called with is live across the capture.
///
/// # Safety
///
/// `checkpoint` must be the calling thread's chain head and stay valid
/// until this returns.
#[inline(never)]
unsafe fn run_at_checkpoint(checkpoint: *mut Checkpoint, body: &mut dyn FnMut()) -> c_int {
    // SAFETY: caller contract; the buffer lives in the checkpoint.
    let resume_value = unsafe { sigsetjmp(&raw mut (*checkpoint).resume_point, 1) };
    compiler_fence(Ordering::SeqCst);
    if resume_value != NORMAL_COMPLETION {
        return resume_value;
    }

    // SAFETY: caller contract.
    let _armed = unsafe { Armed::new(checkpoint) };
    body();
    NORMAL_COMPLETION
}

/// Keeps a checkpoint armed for as long as it lives, including while a
/// panic from the body unwinds through `run_at_checkpoint`.
struct Armed(*mut Checkpoint);

impl Armed {
    /// # Safety
    ///
    /// `checkpoint` must stay valid until the returned value is dropped.
    unsafe fn new(checkpoint: *mut Checkpoint) -> Self {
        // SAFETY: caller contract.
        unsafe { (*checkpoint).arm() };
        Self(checkpoint)
    }
}

impl Drop for Armed {
    fn drop(&mut self) {
        // SAFETY: see Armed::new.
        unsafe { (*self.0).disarm() };
    }
}

/// `try`/`catch` spelling over [`protect`].
///
/// Evaluates to the body's value, or to the handler's value when the body
/// faults. Both blocks must have the same type. `return`, `break` and `?`
/// inside the body apply to the closure `protect` runs, not the
/// enclosing function.
///
/// ```rust,no_run
/// use super_catch::{Fault, super_try, trigger};
///
/// let kind = super_try!({
///     trigger::illegal_instruction();
///     None
/// } catch err => {
///     Some(err.kind())
/// });
/// assert_eq!(kind, Some(Fault::IllegalInstruction));
/// ```
#[macro_export]
macro_rules! super_try {
    ($body:block catch $err:ident => $handler:block) => {
        match $crate::protect(|| $body) {
            ::core::result::Result::Ok(value) => value,
            ::core::result::Result::Err($err) => $handler,
        }
    };
}
