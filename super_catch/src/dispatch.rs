//! Fault dispatcher.
//!
//! [`handle_fault`] is the `sa_sigaction` entry point registered for every
//! intercepted signal. It runs on the faulting thread, possibly on its
//! alternate signal stack, and is restricted to async-signal-safe work:
//! a TLS load, an atomic swap, plain stores into the checkpoint, and
//! either `siglongjmp` or the fallback below. Nothing here allocates,
//! locks or formats.
//!
//! # Fallback
//!
//! When the thread has no armed checkpoint the previous disposition of the
//! signal is restored, so the process behaves as if it had never been
//! installed:
//!
//! - a previous `SIG_IGN` keeps the signal ignored, except for
//!   kernel-generated synchronous faults, which cannot be ignored and get
//!   `SIG_DFL` instead;
//! - kernel-generated `SIGSEGV`/`SIGBUS`/`SIGILL`/`SIGFPE` return from the
//!   handler so the faulting instruction re-executes under the restored
//!   disposition with a genuine `siginfo_t`;
//! - everything else is re-raised and delivered once the handler returns.

use crate::chain;
use crate::debug::signal_safe_note;
use crate::install;
use crate::jmp::siglongjmp;
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, raise, sigaction};
use std::ffi::{c_int, c_void};
use std::ptr;
use std::sync::atomic::{Ordering, compiler_fence};
use super_catch_common::fault::{AccessKind, Fault};

/// Plain-old-data snapshot of one delivered fault.
///
/// Written by the dispatcher into the checkpoint it is about to resume,
/// read back by the protected scope after the jump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct FaultRecord {
    /// Delivered signal number. `0` only in [`FaultRecord::EMPTY`].
    pub signal: i32,
    /// `si_code`: positive when generated by the kernel, `<= 0` when sent
    /// by `kill`, `raise`, `sigqueue` or a timer.
    pub code: i32,
    /// Faulting data address, for kernel-generated `SIGSEGV`/`SIGBUS`.
    pub data_address: Option<usize>,
    /// Program counter at the time of the fault, where the platform's
    /// `ucontext_t` exposes it.
    pub instruction_address: Option<usize>,
    /// Attempted access, for access violations on platforms that report it.
    pub access: Option<AccessKind>,
}

impl FaultRecord {
    /// No fault delivered.
    pub const EMPTY: FaultRecord = FaultRecord {
        signal: 0,
        code: 0,
        data_address: None,
        instruction_address: None,
        access: None,
    };

    /// Whether this record carries a delivered fault.
    pub fn is_empty(&self) -> bool {
        self.signal == 0
    }

    /// Fault kind of the delivered signal.
    pub fn fault(&self) -> Fault {
        Fault::from_signal(self.signal)
    }

    /// Whether the fault came from the CPU/kernel rather than a process.
    pub fn is_kernel_generated(&self) -> bool {
        self.code > 0
    }
}

impl Default for FaultRecord {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Signal entry point registered by the installer.
pub(crate) extern "C" fn handle_fault(
    signal: c_int,
    info: *mut libc::siginfo_t,
    context: *mut c_void,
) {
    signal_safe_note(b"super_catch: dispatcher entered for signal ", signal);

    let head = chain::head();
    // SAFETY: a non-null head is this thread's live checkpoint; only this
    // thread ever touches it, and the scope that owns it is still on the
    // stack below us.
    if !head.is_null() && unsafe { (*head).try_claim() } {
        // SAFETY: info and context come straight from the kernel.
        let record = unsafe { capture(signal, info, context) };
        unsafe {
            ptr::write_volatile(&raw mut (*head).record, record);
        }
        compiler_fence(Ordering::SeqCst);
        signal_safe_note(b"super_catch: resuming checkpoint with ", signal);
        // Signal numbers are always positive, so the resume value never
        // collides with NORMAL_COMPLETION.
        // SAFETY: the checkpoint is claimed, so its resume point is valid
        // and its frame is still live.
        unsafe { siglongjmp(&raw mut (*head).resume_point, signal) };
    }

    // SAFETY: info is null or points at the kernel's siginfo_t.
    unsafe { fall_back(signal, info) };
}

/// Default-disposition path for a fault with no armed checkpoint.
unsafe fn fall_back(signal: c_int, info: *const libc::siginfo_t) {
    signal_safe_note(b"super_catch: no active scope, falling back for signal ", signal);

    let Ok(sig) = Signal::try_from(signal) else {
        return;
    };

    // SAFETY: caller contract.
    let kernel_generated = !info.is_null() && unsafe { (*info).si_code } > 0;
    let reexecutes = kernel_generated && Fault::from_signal(signal).refaults_on_return();

    let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    let previous = install::previous_action(signal).unwrap_or(default);
    let restored = match previous.handler() {
        SigHandler::SigIgn if kernel_generated => default,
        SigHandler::SigIgn => return,
        _ => previous,
    };

    // SAFETY: restores a disposition that was valid when it was recorded.
    let _ = unsafe { sigaction(sig, &restored) };

    if !reexecutes {
        let _ = raise(sig);
    }
}

/// Snapshot `siginfo_t` and `ucontext_t` into a [`FaultRecord`].
///
/// # Safety
///
/// `info` and `context` must be null or the pointers the kernel passed to
/// the handler.
pub(crate) unsafe fn capture(
    signal: c_int,
    info: *const libc::siginfo_t,
    context: *const c_void,
) -> FaultRecord {
    let mut record = FaultRecord {
        signal,
        ..FaultRecord::EMPTY
    };
    if info.is_null() {
        return record;
    }

    // SAFETY: non-null siginfo_t from the kernel.
    let (code, si_addr) = unsafe { ((*info).si_code, (*info).si_addr() as usize) };
    record.code = code;
    let kernel_generated = code > 0;

    // SAFETY: caller contract.
    let pc = unsafe { program_counter(context) };
    record.instruction_address = pc.or_else(|| {
        // si_addr is the faulting instruction for these two.
        (kernel_generated && matches!(signal, libc::SIGILL | libc::SIGFPE)).then_some(si_addr)
    });

    if kernel_generated && Fault::from_signal(signal).is_access_violation() {
        record.data_address = Some(si_addr);
        // SAFETY: caller contract.
        record.access = unsafe { access_kind(context) }.or_else(|| {
            // An instruction fetch faults at the program counter itself.
            (pc == Some(si_addr)).then_some(AccessKind::Execute)
        });
    }

    record
}

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
unsafe fn program_counter(context: *const c_void) -> Option<usize> {
    if context.is_null() {
        return None;
    }
    // SAFETY: the kernel passes a ucontext_t.
    let uc = unsafe { &*context.cast::<libc::ucontext_t>() };
    Some(uc.uc_mcontext.gregs[libc::REG_RIP as usize] as usize)
}

#[cfg(all(target_os = "linux", target_arch = "aarch64"))]
unsafe fn program_counter(context: *const c_void) -> Option<usize> {
    if context.is_null() {
        return None;
    }
    // SAFETY: the kernel passes a ucontext_t.
    let uc = unsafe { &*context.cast::<libc::ucontext_t>() };
    Some(uc.uc_mcontext.pc as usize)
}

#[cfg(all(target_os = "macos", target_arch = "x86_64"))]
unsafe fn program_counter(context: *const c_void) -> Option<usize> {
    if context.is_null() {
        return None;
    }
    // SAFETY: the kernel passes a ucontext_t whose mcontext pointer is
    // either null or valid for the duration of the handler.
    unsafe {
        let uc = &*context.cast::<libc::ucontext_t>();
        if uc.uc_mcontext.is_null() {
            return None;
        }
        Some((*uc.uc_mcontext).__ss.__rip as usize)
    }
}

#[cfg(all(target_os = "macos", target_arch = "aarch64"))]
unsafe fn program_counter(context: *const c_void) -> Option<usize> {
    if context.is_null() {
        return None;
    }
    // SAFETY: as above.
    unsafe {
        let uc = &*context.cast::<libc::ucontext_t>();
        if uc.uc_mcontext.is_null() {
            return None;
        }
        Some((*uc.uc_mcontext).__ss.__pc as usize)
    }
}

#[cfg(not(any(
    all(target_os = "linux", target_arch = "x86_64"),
    all(target_os = "linux", target_arch = "aarch64"),
    all(target_os = "macos", target_arch = "x86_64"),
    all(target_os = "macos", target_arch = "aarch64"),
)))]
unsafe fn program_counter(_context: *const c_void) -> Option<usize> {
    None
}

// x86 page-fault error code bits.
#[cfg(target_arch = "x86_64")]
const PF_WRITE: u64 = 0x2;
#[cfg(target_arch = "x86_64")]
const PF_INSTR: u64 = 0x10;

#[cfg(target_arch = "x86_64")]
fn access_from_error_code(err: u64) -> AccessKind {
    if err & PF_INSTR != 0 {
        AccessKind::Execute
    } else if err & PF_WRITE != 0 {
        AccessKind::Write
    } else {
        AccessKind::Read
    }
}

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
unsafe fn access_kind(context: *const c_void) -> Option<AccessKind> {
    if context.is_null() {
        return None;
    }
    // SAFETY: the kernel passes a ucontext_t.
    let uc = unsafe { &*context.cast::<libc::ucontext_t>() };
    Some(access_from_error_code(
        uc.uc_mcontext.gregs[libc::REG_ERR as usize] as u64,
    ))
}

#[cfg(all(target_os = "macos", target_arch = "x86_64"))]
unsafe fn access_kind(context: *const c_void) -> Option<AccessKind> {
    if context.is_null() {
        return None;
    }
    // SAFETY: as in program_counter.
    unsafe {
        let uc = &*context.cast::<libc::ucontext_t>();
        if uc.uc_mcontext.is_null() {
            return None;
        }
        Some(access_from_error_code(u64::from((*uc.uc_mcontext).__es.__err)))
    }
}

#[cfg(not(any(
    all(target_os = "linux", target_arch = "x86_64"),
    all(target_os = "macos", target_arch = "x86_64"),
)))]
unsafe fn access_kind(_context: *const c_void) -> Option<AccessKind> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_record() {
        assert!(FaultRecord::EMPTY.is_empty());
        assert_eq!(FaultRecord::default(), FaultRecord::EMPTY);
        assert!(!FaultRecord::EMPTY.is_kernel_generated());
    }

    #[test]
    fn capture_without_siginfo_keeps_signal_only() {
        // SAFETY: null pointers are accepted.
        let record = unsafe { capture(libc::SIGABRT, ptr::null(), ptr::null()) };
        assert_eq!(record.signal, libc::SIGABRT);
        assert_eq!(record.fault(), Fault::ProcessAbort);
        assert_eq!(record.data_address, None);
        assert_eq!(record.instruction_address, None);
    }

    #[test]
    fn user_sent_signal_has_no_addresses() {
        // SAFETY: all-zero siginfo_t is a valid value.
        let mut info: libc::siginfo_t = unsafe { std::mem::zeroed() };
        info.si_signo = libc::SIGSEGV;
        info.si_code = 0; // SI_USER
        // SAFETY: info is a live siginfo_t, context is null.
        let record = unsafe { capture(libc::SIGSEGV, &info, ptr::null()) };
        assert_eq!(record.fault(), Fault::InvalidMemoryAccess);
        assert!(!record.is_kernel_generated());
        assert_eq!(record.data_address, None);
        assert_eq!(record.access, None);
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn page_fault_error_bits() {
        assert_eq!(access_from_error_code(0x4), AccessKind::Read);
        assert_eq!(access_from_error_code(0x6), AccessKind::Write);
        assert_eq!(access_from_error_code(0x15), AccessKind::Execute);
    }
}
