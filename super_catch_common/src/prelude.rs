//! Prelude module for common re-exports.
//!
//! ```rust
//! use super_catch_common::prelude::*;
//! ```

// ─── Taxonomy ───────────────────────────────────────────────────────
pub use crate::fault::{AccessKind, Fault, describe_code, signal_name};

// ─── Error domain ───────────────────────────────────────────────────
pub use crate::domain::{ErrorCode, ErrorDomain, SIGNAL_DOMAIN, SignalDomain};

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{CatchConfig, ConfigError, ConfigLoader, LogLevel};

// ─── Constants ──────────────────────────────────────────────────────
pub use crate::consts::{DEFAULT_ALT_STACK_SIZE, MIN_ALT_STACK_SIZE, NORMAL_COMPLETION};
