//! Process-wide handler installation.
//!
//! Installation runs at most once per process, on the first protected
//! scope entered by any thread, behind a [`OnceLock`]. Racing first
//! callers block until the winner has registered every handler, so no
//! scope is ever entered before the dispatcher is in place. The replaced
//! dispositions are recorded for the dispatcher's fallback path and are
//! never restored by the installer itself.

use crate::debug::catch_debug;
use crate::dispatch::handle_fault;
use crate::error::{CatchError, CatchResult};
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
use std::sync::OnceLock;
use super_catch_common::config::CatchConfig;
use super_catch_common::consts::LOG_TARGET;
use super_catch_common::fault::Fault;
use tracing::{debug, warn};

/// Outcome of the one-time installation.
#[derive(Debug)]
pub struct Installation {
    intercepted: Vec<Fault>,
    failed: Vec<(Fault, nix::Error)>,
    previous: Vec<(i32, SigAction)>,
    alt_stack_size: usize,
}

impl Installation {
    /// Fault kinds whose signals now run the dispatcher.
    pub fn intercepted(&self) -> &[Fault] {
        &self.intercepted
    }

    /// Fault kinds that were requested but could not be registered.
    pub fn failed(&self) -> &[(Fault, nix::Error)] {
        &self.failed
    }

    /// Whether `fault` is handled by the dispatcher.
    pub fn intercepts(&self, fault: Fault) -> bool {
        self.intercepted.contains(&fault)
    }

    /// Disposition that was in place for `signal` before installation.
    pub fn previous(&self, signal: i32) -> Option<&SigAction> {
        self.previous
            .iter()
            .find_map(|(s, action)| (*s == signal).then_some(action))
    }

    /// Alternate signal stack size used for threads entering a scope.
    pub fn alt_stack_size(&self) -> usize {
        self.alt_stack_size
    }
}

static INSTALLATION: OnceLock<Installation> = OnceLock::new();
static CONFIG: OnceLock<CatchConfig> = OnceLock::new();

/// Set the configuration used by the one-time installation.
///
/// Must be called before the first protected scope on any thread.
///
/// # Errors
///
/// - [`CatchError::Config`] if `config` fails validation
/// - [`CatchError::AlreadyInstalled`] if handlers are already installed
/// - [`CatchError::AlreadyConfigured`] on a second call
pub fn configure(config: CatchConfig) -> CatchResult<()> {
    config.validate()?;
    if INSTALLATION.get().is_some() {
        return Err(CatchError::AlreadyInstalled);
    }
    CONFIG
        .set(config)
        .map_err(|_| CatchError::AlreadyConfigured)?;
    debug!(target: LOG_TARGET, "Interceptor configuration recorded");
    Ok(())
}

/// The installation report, or `None` before the first protected scope.
pub fn installed() -> Option<&'static Installation> {
    INSTALLATION.get()
}

/// Install the handlers if this is the first call in the process.
pub(crate) fn ensure_installed() -> &'static Installation {
    INSTALLATION.get_or_init(|| {
        let default_config = CatchConfig::default();
        let config = CONFIG.get().unwrap_or(&default_config);
        install(config)
    })
}

/// Disposition recorded for `signal`, for the dispatcher's fallback.
///
/// Async-signal-safe: a lock-free `OnceLock` read and a linear scan.
pub(crate) fn previous_action(signal: i32) -> Option<SigAction> {
    INSTALLATION
        .get()
        .and_then(|installation| installation.previous(signal).copied())
}

fn install(config: &CatchConfig) -> Installation {
    let action = SigAction::new(
        SigHandler::SigAction(handle_fault),
        SaFlags::SA_SIGINFO | SaFlags::SA_ONSTACK,
        SigSet::empty(),
    );

    let mut installation = Installation {
        intercepted: Vec::with_capacity(config.intercept.len()),
        failed: Vec::new(),
        previous: Vec::with_capacity(config.intercept.len()),
        alt_stack_size: config.alt_stack_size,
    };

    for &fault in &config.intercept {
        let registered = Signal::try_from(fault.signal())
            // SAFETY: handle_fault only performs async-signal-safe work.
            .and_then(|signal| unsafe { sigaction(signal, &action) });

        match registered {
            Ok(previous) => {
                catch_debug!("installed handler for {} ({})", fault, fault.signal_label());
                installation.previous.push((fault.signal(), previous));
                installation.intercepted.push(fault);
            }
            Err(e) => {
                warn!(target: LOG_TARGET, "Failed to install handler for {}: {}", fault, e);
                installation.failed.push((fault, e));
            }
        }
    }

    debug!(
        target: LOG_TARGET,
        "Fault handlers installed for {} kinds ({} failed)",
        installation.intercepted.len(),
        installation.failed.len()
    );

    installation
}
