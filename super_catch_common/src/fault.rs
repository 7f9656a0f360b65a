//! Fault taxonomy.
//!
//! The closed set of fault kinds the interceptor recognises, each mapped
//! 1:1 to the POSIX signal that delivers it, plus the full signal name
//! table used by the [`signal`](crate::domain::SIGNAL_DOMAIN) error domain.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A fault kind recognised by the interceptor.
///
/// Every variant except [`Fault::Unknown`] corresponds to exactly one
/// signal number on the running platform. `Unknown` carries the raw
/// code of anything outside the recognised set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fault {
    /// `SIGABRT`: the process called `abort()`.
    ProcessAbort,
    /// `SIGFPE`: integer divide by zero or other arithmetic trap.
    ArithmeticFault,
    /// `SIGILL`: the CPU refused to decode an instruction.
    IllegalInstruction,
    /// `SIGTRAP`: breakpoint or trace trap.
    Trap,
    /// `SIGSEGV`: access to unmapped or protected memory.
    InvalidMemoryAccess,
    /// `SIGBUS`: misaligned access or access past the end of a mapping.
    BusError,
    /// `SIGPIPE`: write to a pipe or socket with no reader.
    BrokenPipe,
    /// `SIGTERM`: termination was requested.
    TerminateRequest,
    /// Any other code, kept verbatim.
    Unknown(i32),
}

impl Fault {
    /// Every recognised kind, in installation order.
    pub const RECOGNISED: [Fault; 8] = [
        Fault::IllegalInstruction,
        Fault::ProcessAbort,
        Fault::ArithmeticFault,
        Fault::Trap,
        Fault::InvalidMemoryAccess,
        Fault::BusError,
        Fault::BrokenPipe,
        Fault::TerminateRequest,
    ];

    /// Map a platform signal number to a fault kind.
    ///
    /// Total: codes outside the recognised set become [`Fault::Unknown`].
    pub const fn from_signal(signal: i32) -> Self {
        match signal {
            libc::SIGABRT => Self::ProcessAbort,
            libc::SIGFPE => Self::ArithmeticFault,
            libc::SIGILL => Self::IllegalInstruction,
            libc::SIGTRAP => Self::Trap,
            libc::SIGSEGV => Self::InvalidMemoryAccess,
            libc::SIGBUS => Self::BusError,
            libc::SIGPIPE => Self::BrokenPipe,
            libc::SIGTERM => Self::TerminateRequest,
            other => Self::Unknown(other),
        }
    }

    /// The platform signal number for this kind.
    pub const fn signal(&self) -> i32 {
        match self {
            Self::ProcessAbort => libc::SIGABRT,
            Self::ArithmeticFault => libc::SIGFPE,
            Self::IllegalInstruction => libc::SIGILL,
            Self::Trap => libc::SIGTRAP,
            Self::InvalidMemoryAccess => libc::SIGSEGV,
            Self::BusError => libc::SIGBUS,
            Self::BrokenPipe => libc::SIGPIPE,
            Self::TerminateRequest => libc::SIGTERM,
            Self::Unknown(code) => *code,
        }
    }

    /// Human-readable name used in diagnostics.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ProcessAbort => "process abort",
            Self::ArithmeticFault => "arithmetic fault",
            Self::IllegalInstruction => "illegal instruction",
            Self::Trap => "trap",
            Self::InvalidMemoryAccess => "invalid memory access",
            Self::BusError => "bus error",
            Self::BrokenPipe => "broken pipe",
            Self::TerminateRequest => "terminate request",
            Self::Unknown(_) => "unknown",
        }
    }

    /// Conventional `SIG*` spelling of the underlying signal.
    pub const fn signal_label(&self) -> &'static str {
        match self {
            Self::ProcessAbort => "SIGABRT",
            Self::ArithmeticFault => "SIGFPE",
            Self::IllegalInstruction => "SIGILL",
            Self::Trap => "SIGTRAP",
            Self::InvalidMemoryAccess => "SIGSEGV",
            Self::BusError => "SIGBUS",
            Self::BrokenPipe => "SIGPIPE",
            Self::TerminateRequest => "SIGTERM",
            Self::Unknown(_) => "SIG?",
        }
    }

    /// Whether this kind reports a faulting data address.
    pub const fn is_access_violation(&self) -> bool {
        matches!(self, Self::InvalidMemoryAccess | Self::BusError)
    }

    /// Whether a kernel-generated instance of this kind is raised again
    /// when its handler returns, because the faulting instruction is
    /// re-executed. Traps report the instruction after the breakpoint, so
    /// they do not.
    pub const fn refaults_on_return(&self) -> bool {
        matches!(
            self,
            Self::InvalidMemoryAccess
                | Self::BusError
                | Self::IllegalInstruction
                | Self::ArithmeticFault
        )
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(code) => write!(f, "unknown fault {code}"),
            known => f.write_str(known.name()),
        }
    }
}

impl From<i32> for Fault {
    fn from(signal: i32) -> Self {
        Self::from_signal(signal)
    }
}

/// Attempted access of an invalid memory access or bus error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessKind {
    /// Load from the faulting address.
    Read,
    /// Store to the faulting address.
    Write,
    /// Instruction fetch from the faulting address.
    Execute,
}

impl AccessKind {
    /// Verb used when rendering diagnostics.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Execute => "execute",
        }
    }
}

impl fmt::Display for AccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
const POLL_SIGNAL: Option<i32> = Some(libc::SIGPOLL);
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const POLL_SIGNAL: Option<i32> = None;

/// Name of any POSIX signal number, `"unknown"` if unrecognised.
pub fn signal_name(signal: i32) -> &'static str {
    if POLL_SIGNAL == Some(signal) {
        return "poll";
    }

    match signal {
        libc::SIGABRT => "abort",
        libc::SIGALRM => "alarm",
        libc::SIGFPE => "arithmetic_exception",
        libc::SIGHUP => "hangup",
        libc::SIGILL => "illegal",
        libc::SIGINT => "interrupt",
        libc::SIGKILL => "kill",
        libc::SIGPIPE => "pipe",
        libc::SIGQUIT => "quit",
        libc::SIGSEGV => "segmentation",
        libc::SIGTERM => "terminate",
        libc::SIGUSR1 => "user1",
        libc::SIGUSR2 => "user2",
        libc::SIGCHLD => "child",
        libc::SIGCONT => "cont",
        libc::SIGSTOP => "stop",
        libc::SIGTSTP => "terminal_stop",
        libc::SIGTTIN => "terminal_in",
        libc::SIGTTOU => "terminal_out",
        libc::SIGBUS => "bus",
        libc::SIGPROF => "profiler",
        libc::SIGSYS => "system_call",
        libc::SIGTRAP => "trap",
        libc::SIGURG => "urgent_data",
        libc::SIGVTALRM => "virtual_timer",
        libc::SIGXCPU => "cpu_limit",
        libc::SIGXFSZ => "file_size_limit",
        _ => "unknown",
    }
}

/// Sub-reason of a kernel-generated fault, from its `si_code`.
///
/// Only kernel-generated codes (`si_code > 0`) are described; codes from
/// `kill`/`raise` and platforms other than Linux yield `None`.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn describe_code(signal: i32, si_code: i32) -> Option<&'static str> {
    if si_code <= 0 {
        return None;
    }
    let reason = match (signal, si_code) {
        (libc::SIGSEGV, 1) => "address not mapped",
        (libc::SIGSEGV, 2) => "invalid permissions for mapped object",
        (libc::SIGSEGV, 3) => "failed address bound checks",
        (libc::SIGSEGV, 4) => "failed protection key checks",
        (libc::SIGBUS, 1) => "invalid address alignment",
        (libc::SIGBUS, 2) => "nonexistent physical address",
        (libc::SIGBUS, 3) => "object-specific hardware error",
        (libc::SIGILL, 1) => "illegal opcode",
        (libc::SIGILL, 2) => "illegal operand",
        (libc::SIGILL, 3) => "illegal addressing mode",
        (libc::SIGILL, 4) => "illegal trap",
        (libc::SIGILL, 5) => "privileged opcode",
        (libc::SIGILL, 6) => "privileged register",
        (libc::SIGILL, 7) => "coprocessor error",
        (libc::SIGILL, 8) => "internal stack error",
        (libc::SIGFPE, 1) => "integer divide by zero",
        (libc::SIGFPE, 2) => "integer overflow",
        (libc::SIGFPE, 3) => "floating-point divide by zero",
        (libc::SIGFPE, 4) => "floating-point overflow",
        (libc::SIGFPE, 5) => "floating-point underflow",
        (libc::SIGFPE, 6) => "floating-point inexact result",
        (libc::SIGFPE, 7) => "floating-point invalid operation",
        (libc::SIGFPE, 8) => "subscript out of range",
        (libc::SIGTRAP, 1) => "process breakpoint",
        (libc::SIGTRAP, 2) => "process trace trap",
        // x86 reports int3 as SI_KERNEL.
        (libc::SIGTRAP, 0x80) => "breakpoint instruction",
        _ => return None,
    };
    Some(reason)
}

/// Sub-reason of a kernel-generated fault, from its `si_code`.
#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub fn describe_code(_signal: i32, _si_code: i32) -> Option<&'static str> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognised_kinds_round_trip_through_signals() {
        for fault in Fault::RECOGNISED {
            assert_eq!(Fault::from_signal(fault.signal()), fault);
            assert_ne!(fault.name(), "unknown");
        }
    }

    #[test]
    fn unrecognised_signal_is_unknown() {
        let fault = Fault::from_signal(libc::SIGUSR1);
        assert_eq!(fault, Fault::Unknown(libc::SIGUSR1));
        assert_eq!(fault.signal(), libc::SIGUSR1);
        assert_eq!(fault.name(), "unknown");
        assert_eq!(fault.to_string(), format!("unknown fault {}", libc::SIGUSR1));
    }

    #[test]
    fn signal_names_follow_signal_table() {
        assert_eq!(signal_name(libc::SIGSEGV), "segmentation");
        assert_eq!(signal_name(libc::SIGFPE), "arithmetic_exception");
        assert_eq!(signal_name(libc::SIGXFSZ), "file_size_limit");
        assert_eq!(signal_name(0), "unknown");
        assert_eq!(signal_name(-3), "unknown");
    }

    #[test]
    fn access_violation_kinds() {
        assert!(Fault::InvalidMemoryAccess.is_access_violation());
        assert!(Fault::BusError.is_access_violation());
        assert!(!Fault::ProcessAbort.is_access_violation());
    }

    #[test]
    fn refaulting_kinds() {
        assert!(Fault::InvalidMemoryAccess.refaults_on_return());
        assert!(Fault::ArithmeticFault.refaults_on_return());
        assert!(!Fault::Trap.refaults_on_return());
        assert!(!Fault::TerminateRequest.refaults_on_return());
        assert!(!Fault::Unknown(libc::SIGUSR1).refaults_on_return());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn kernel_codes_are_described() {
        assert_eq!(describe_code(libc::SIGSEGV, 1), Some("address not mapped"));
        assert_eq!(describe_code(libc::SIGFPE, 1), Some("integer divide by zero"));
        // SI_USER / SI_TKILL come from kill/raise.
        assert_eq!(describe_code(libc::SIGSEGV, 0), None);
        assert_eq!(describe_code(libc::SIGABRT, -6), None);
    }

    #[test]
    fn display_uses_readable_name() {
        assert_eq!(Fault::InvalidMemoryAccess.to_string(), "invalid memory access");
        assert_eq!(AccessKind::Write.to_string(), "write");
    }
}
