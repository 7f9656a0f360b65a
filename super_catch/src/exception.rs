//! Typed exception construction.

use crate::diagnostics::{DiagnosticProvider, FaultDiagnostics, platform_provider};
use crate::dispatch::FaultRecord;
use std::fmt::Write as _;
use super_catch_common::domain::ErrorCode;
use super_catch_common::fault::{Fault, signal_name};
use thiserror::Error;

/// Identity of an intercepted fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultIdentity {
    kind: Fault,
    platform_code: i32,
    raw_context: Option<FaultRecord>,
}

impl FaultIdentity {
    /// Identity with no platform context.
    pub fn new(platform_code: i32) -> Self {
        Self {
            kind: Fault::from_signal(platform_code),
            platform_code,
            raw_context: None,
        }
    }

    /// Identity carrying the dispatcher's record.
    pub fn with_context(record: FaultRecord) -> Self {
        Self {
            raw_context: Some(record),
            ..Self::new(record.signal)
        }
    }

    /// Fault kind.
    pub fn kind(&self) -> Fault {
        self.kind
    }

    /// Raw signal number.
    pub fn platform_code(&self) -> i32 {
        self.platform_code
    }

    /// The dispatcher's record, when one was captured.
    pub fn raw_context(&self) -> Option<&FaultRecord> {
        self.raw_context.as_ref()
    }
}

/// A fault converted into a recoverable error.
///
/// Returned by [`protect`](crate::protect) when its body faults. Immutable
/// once built; the message is rendered at construction.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct FaultException {
    identity: FaultIdentity,
    diagnostics: FaultDiagnostics,
    message: String,
}

impl FaultException {
    /// Exception with only the raw code, e.g. for faults reported by
    /// something other than the dispatcher.
    pub fn new(platform_code: i32) -> Self {
        Self::build(FaultIdentity::new(platform_code), FaultDiagnostics::default())
    }

    /// Exception enriched by `provider` from a dispatcher record.
    pub fn with_context(record: FaultRecord, provider: &dyn DiagnosticProvider) -> Self {
        let diagnostics = provider.diagnose(&record);
        Self::build(FaultIdentity::with_context(record), diagnostics)
    }

    /// Build the exception for a checkpoint resumed with `resume_value`.
    ///
    /// The record is only trusted when it describes the same signal as
    /// the resume value; otherwise the minimal form is used.
    pub(crate) fn from_resume(resume_value: i32, record: FaultRecord) -> Self {
        if !record.is_empty() && record.signal == resume_value {
            Self::with_context(record, platform_provider())
        } else {
            Self::new(resume_value)
        }
    }

    fn build(identity: FaultIdentity, diagnostics: FaultDiagnostics) -> Self {
        let message = render(&identity, &diagnostics);
        Self {
            identity,
            diagnostics,
            message,
        }
    }

    /// Fault kind, comparable against the taxonomy.
    pub fn kind(&self) -> Fault {
        self.identity.kind
    }

    /// Raw signal number.
    pub fn platform_code(&self) -> i32 {
        self.identity.platform_code
    }

    /// The code in the signal error domain.
    pub fn code(&self) -> ErrorCode {
        ErrorCode::signal(self.identity.platform_code)
    }

    /// Full identity, including the dispatcher's record.
    pub fn identity(&self) -> &FaultIdentity {
        &self.identity
    }

    /// Best-effort diagnostics; empty when none could be extracted.
    pub fn diagnostics(&self) -> &FaultDiagnostics {
        &self.diagnostics
    }

    /// Rendered diagnostic message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl PartialEq<Fault> for FaultException {
    fn eq(&self, other: &Fault) -> bool {
        self.kind() == *other
    }
}

impl From<&FaultException> for ErrorCode {
    fn from(exception: &FaultException) -> Self {
        exception.code()
    }
}

impl From<FaultException> for ErrorCode {
    fn from(exception: FaultException) -> Self {
        exception.code()
    }
}

impl From<FaultException> for std::io::Error {
    fn from(exception: FaultException) -> Self {
        std::io::Error::other(exception)
    }
}

fn render(identity: &FaultIdentity, diagnostics: &FaultDiagnostics) -> String {
    let code = identity.platform_code;
    let mut message = match identity.kind {
        Fault::Unknown(_) => format!("unknown fault (signal {code}, {})", signal_name(code)),
        kind => format!("{} ({}, signal {code})", kind.name(), kind.signal_label()),
    };

    // Writing into a String cannot fail.
    if let Some(reason) = diagnostics.reason {
        let _ = write!(message, ": {reason}");
    }
    match (diagnostics.access, diagnostics.data_address) {
        (Some(access), Some(address)) => {
            let _ = write!(message, "; {access} access to {address:#x}");
        }
        (None, Some(address)) => {
            let _ = write!(message, "; fault address {address:#x}");
        }
        _ => {}
    }
    if let Some(pc) = diagnostics.instruction_address {
        let _ = write!(message, "; at {pc:#x}");
        if let Some(module) = &diagnostics.module {
            let _ = write!(
                message,
                " in {} (base {:#x}, offset {:#x})",
                module.name,
                module.base,
                module.offset_of(pc)
            );
        }
    }

    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{MinimalDiagnostics, ModuleInfo};
    use super_catch_common::fault::AccessKind;

    struct FixedDiagnostics;

    impl DiagnosticProvider for FixedDiagnostics {
        fn diagnose(&self, _record: &FaultRecord) -> FaultDiagnostics {
            FaultDiagnostics {
                reason: Some("address not mapped"),
                instruction_address: Some(0x1234),
                module: Some(ModuleInfo {
                    name: "libdemo.so".to_string(),
                    base: 0x1000,
                }),
                access: Some(AccessKind::Write),
                data_address: Some(0x10),
            }
        }
    }

    fn segv_record() -> FaultRecord {
        FaultRecord {
            signal: libc::SIGSEGV,
            code: 1,
            data_address: Some(0x10),
            instruction_address: Some(0x1234),
            access: Some(AccessKind::Write),
        }
    }

    #[test]
    fn minimal_message_has_raw_code() {
        let exception = FaultException::new(libc::SIGSEGV);
        assert_eq!(exception.kind(), Fault::InvalidMemoryAccess);
        assert_eq!(
            exception.message(),
            format!("invalid memory access (SIGSEGV, signal {})", libc::SIGSEGV)
        );
        assert!(exception.diagnostics().is_empty());
        assert!(exception.identity().raw_context().is_none());
    }

    #[test]
    fn unknown_code_is_kept_verbatim() {
        let exception = FaultException::new(libc::SIGUSR1);
        assert_eq!(exception.kind(), Fault::Unknown(libc::SIGUSR1));
        assert_eq!(exception.platform_code(), libc::SIGUSR1);
        assert_eq!(
            exception.to_string(),
            format!("unknown fault (signal {}, user1)", libc::SIGUSR1)
        );
    }

    #[test]
    fn rich_message_lists_every_detail() {
        let exception = FaultException::with_context(segv_record(), &FixedDiagnostics);
        assert_eq!(
            exception.message(),
            format!(
                "invalid memory access (SIGSEGV, signal {}): address not mapped; \
                 write access to 0x10; at 0x1234 in libdemo.so (base 0x1000, offset 0x234)",
                libc::SIGSEGV
            )
        );
        assert_eq!(exception.identity().raw_context(), Some(&segv_record()));
    }

    #[test]
    fn minimal_provider_degrades_to_raw_code() {
        let exception = FaultException::with_context(segv_record(), &MinimalDiagnostics);
        assert_eq!(exception.message(), FaultException::new(libc::SIGSEGV).message());
    }

    #[test]
    fn mismatched_record_is_ignored() {
        let exception = FaultException::from_resume(libc::SIGABRT, segv_record());
        assert_eq!(exception.kind(), Fault::ProcessAbort);
        assert!(exception.identity().raw_context().is_none());
    }

    #[test]
    fn converts_into_generic_errors() {
        let exception = FaultException::new(libc::SIGFPE);
        assert!(exception == Fault::ArithmeticFault);
        assert_eq!(ErrorCode::from(&exception), Fault::ArithmeticFault);

        let io: std::io::Error = exception.into();
        assert_eq!(io.kind(), std::io::ErrorKind::Other);
        assert!(io.to_string().starts_with("arithmetic fault"));
    }
}
