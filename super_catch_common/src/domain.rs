//! Error domains.
//!
//! A small, comparable error-code abstraction so fault identities can be
//! handled by generic error code without special-casing them: an
//! [`ErrorCode`] is a raw integer qualified by the [`ErrorDomain`] that
//! gives it meaning. Two codes are equal when both the value and the
//! domain name match.

use crate::fault::{Fault, signal_name};
use std::borrow::Cow;
use std::fmt;

/// A named family of integer error codes.
pub trait ErrorDomain: Sync + 'static {
    /// Short, stable domain name (`"signal"`).
    fn name(&self) -> &'static str;

    /// Human-readable text for `code` within this domain.
    fn message(&self, code: i32) -> Cow<'static, str>;
}

/// Domain of POSIX signal numbers.
#[derive(Debug)]
pub struct SignalDomain;

impl ErrorDomain for SignalDomain {
    fn name(&self) -> &'static str {
        "signal"
    }

    fn message(&self, code: i32) -> Cow<'static, str> {
        Cow::Borrowed(signal_name(code))
    }
}

/// The process-wide signal domain instance.
pub static SIGNAL_DOMAIN: SignalDomain = SignalDomain;

/// An integer code qualified by its domain.
#[derive(Clone, Copy)]
pub struct ErrorCode {
    value: i32,
    domain: &'static dyn ErrorDomain,
}

impl ErrorCode {
    /// Build a code in an arbitrary domain.
    pub const fn new(value: i32, domain: &'static dyn ErrorDomain) -> Self {
        Self { value, domain }
    }

    /// Build a code in the signal domain.
    pub fn signal(value: i32) -> Self {
        Self::new(value, &SIGNAL_DOMAIN)
    }

    /// Raw code value.
    pub const fn value(&self) -> i32 {
        self.value
    }

    /// Owning domain.
    pub fn domain(&self) -> &'static dyn ErrorDomain {
        self.domain
    }

    /// Domain-provided message for this code.
    pub fn message(&self) -> Cow<'static, str> {
        self.domain.message(self.value)
    }

    /// The fault kind this code denotes, if it belongs to the signal domain.
    pub fn fault(&self) -> Option<Fault> {
        (self.domain.name() == SIGNAL_DOMAIN.name()).then(|| Fault::from_signal(self.value))
    }
}

impl PartialEq for ErrorCode {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value && self.domain.name() == other.domain.name()
    }
}

impl Eq for ErrorCode {}

impl PartialEq<Fault> for ErrorCode {
    fn eq(&self, other: &Fault) -> bool {
        *self == ErrorCode::from(*other)
    }
}

impl PartialEq<ErrorCode> for Fault {
    fn eq(&self, other: &ErrorCode) -> bool {
        other == self
    }
}

impl From<Fault> for ErrorCode {
    fn from(fault: Fault) -> Self {
        Self::signal(fault.signal())
    }
}

impl fmt::Debug for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorCode")
            .field("value", &self.value)
            .field("domain", &self.domain.name())
            .finish()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({})", self.domain.name(), self.value, self.message())
    }
}
