//! # super_catch
//!
//! Turns synchronous hardware faults into recoverable, typed errors inside
//! protected scopes.
//!
//! A fault raised while [`protect`] runs its body (a null dereference, an
//! undefined opcode, an integer divide by zero, an `abort()`) does not
//! kill the process. The innermost active scope on the faulting thread
//! returns `Err(FaultException)` instead, carrying the fault kind and
//! whatever diagnostics the platform exposes. A fault on a thread with no
//! active scope terminates the process exactly as it would without this
//! crate.
//!
//! ## Architecture
//!
//! ```text
//!   protect(body)
//!     │ ensure_installed() ── once per process ──► sigaction(SIGSEGV, ...)
//!     │ push checkpoint ───► thread-local chain (innermost first)
//!     │ sigsetjmp ◄────────────────────────────┐
//!     │ body() ── fault ──► handle_fault ──────┘ siglongjmp(signal)
//!     │ pop checkpoint
//!     ▼
//!   Ok(T) | Err(FaultException)
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use super_catch::{Fault, protect, trigger};
//!
//! match protect(|| trigger::null_dereference()) {
//!     Ok(()) => println!("no fault"),
//!     Err(e) if e == Fault::InvalidMemoryAccess => eprintln!("recovered: {e}"),
//!     Err(e) => eprintln!("other fault: {e}"),
//! }
//! ```
//!
//! ## What is not recovered
//!
//! Only control flow is restored. Memory the faulting code was modifying
//! stays as it was, and frames inside the faulted body are abandoned
//! without running `Drop` (see [`protect`]).
//!
//! ## Platform Support
//!
//! POSIX only. Program counter and access kind are extracted on Linux
//! (x86_64, aarch64) and macOS; other targets report the signal and
//! `si_code` alone.

#![deny(missing_docs)]
#![warn(clippy::all)]

#[cfg(not(unix))]
compile_error!("super_catch supports POSIX targets only");

mod altstack;
mod chain;
mod debug;
pub mod diagnostics;
mod dispatch;
pub mod error;
pub mod exception;
mod install;
mod jmp;
mod scope;
pub mod trigger;

pub use chain::chain_depth;
pub use diagnostics::{DiagnosticProvider, FaultDiagnostics, ModuleInfo};
pub use dispatch::FaultRecord;
pub use error::{CatchError, CatchResult};
pub use exception::{FaultException, FaultIdentity};
pub use install::{Installation, configure, installed};
pub use scope::protect;
pub use super_catch_common::config::{CatchConfig, ConfigLoader, LogLevel};
pub use super_catch_common::domain::ErrorCode;
pub use super_catch_common::fault::{AccessKind, Fault};

/// Initialize a `tracing` fmt subscriber.
///
/// `RUST_LOG` wins when set; otherwise `level` applies. Does nothing if a
/// global subscriber is already installed.
pub fn init_tracing(level: LogLevel) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter()));

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
