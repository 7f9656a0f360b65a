//! # super_catch probe
//!
//! Triggers one fault, inside nested protected scopes or unprotected, and
//! reports what happened. Used by the out-of-process tests and for manual
//! checks on new targets.
//!
//! # Usage
//!
//! ```bash
//! # Null dereference inside one scope: prints the caught exception, exits 0
//! super_catch_probe --fault segv
//!
//! # Innermost of three nested scopes catches it
//! super_catch_probe --fault ill --depth 3
//!
//! # No scope: the process dies by SIGSEGV
//! super_catch_probe --fault segv --unprotected
//!
//! # Fault from a Drop while a panic unwinds the scope: the process dies
//! super_catch_probe --fault ill --in-unwind
//!
//! # Narrowed interception from a config file
//! super_catch_probe --fault fpe --config super_catch.toml -v
//! ```
//!
//! Exit codes: `0` fault caught, `1` setup error, `2` the body completed
//! without faulting.

#![deny(warnings)]

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use super_catch::{
    CatchConfig, ConfigLoader, Fault, FaultException, LogLevel, chain_depth, configure,
    init_tracing, installed, protect, trigger,
};
use tracing::{debug, error, info};

/// Fault to trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FaultArg {
    /// Null pointer load (SIGSEGV)
    Segv,
    /// abort() (SIGABRT)
    Abort,
    /// Undefined opcode (SIGILL)
    Ill,
    /// Integer divide by zero (SIGFPE)
    Fpe,
    /// Breakpoint instruction (SIGTRAP)
    Trap,
    /// Read past the end of a file mapping (SIGBUS)
    Bus,
    /// Write to a pipe with no reader (SIGPIPE)
    Pipe,
    /// raise(SIGTERM)
    Term,
    /// Jump into non-executable data
    ExecData,
}

impl FaultArg {
    fn fire(self) {
        match self {
            Self::Segv => trigger::null_dereference(),
            Self::Abort => trigger::abort(),
            Self::Ill => trigger::illegal_instruction(),
            Self::Fpe => trigger::divide_by_zero(),
            Self::Trap => trigger::breakpoint(),
            Self::Bus => trigger::bus_error(),
            Self::Pipe => trigger::broken_pipe(),
            Self::Term => trigger::terminate_request(),
            Self::ExecData => trigger::execute_data(),
        }
    }
}

/// Fires its fault when dropped.
struct FireOnDrop(FaultArg);

impl Drop for FireOnDrop {
    fn drop(&mut self) {
        self.0.fire();
    }
}

/// Trigger a hardware fault and report whether a protected scope caught it
#[derive(Parser, Debug)]
#[command(name = "super_catch_probe")]
#[command(author = "Reito")]
#[command(version)]
#[command(about = "Trigger a hardware fault and report whether a protected scope caught it")]
#[command(long_about = None)]
struct Args {
    /// Fault to trigger
    #[arg(short, long, value_enum)]
    fault: FaultArg,

    /// Trigger the fault with no protected scope active
    #[arg(long)]
    unprotected: bool,

    /// Trigger the fault from a `Drop` while a panic unwinds the innermost scope
    #[arg(long, conflicts_with = "unprotected")]
    in_unwind: bool,

    /// Number of nested protected scopes around the fault
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=64))]
    depth: u32,

    /// Interceptor configuration (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// How the nested scopes ended.
enum Outcome {
    Caught {
        exception: FaultException,
        enclosing: usize,
    },
    Completed,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match args.config.as_deref().map(CatchConfig::load).transpose() {
        Ok(config) => config,
        Err(e) => {
            init_tracing(LogLevel::Error);
            error!("Failed to load configuration: {}", e);
            return ExitCode::from(1);
        }
    };

    let level = match (&config, args.verbose) {
        (_, true) => LogLevel::Debug,
        (Some(config), false) => config.log_level,
        (None, false) => LogLevel::Info,
    };
    init_tracing(level);

    if let Some(config) = config {
        if let Err(e) = configure(config) {
            error!("Failed to configure interceptor: {}", e);
            return ExitCode::from(1);
        }
    }

    if args.unprotected {
        // Enter and leave one scope so the handlers are installed and the
        // fault goes through the dispatcher's fallback path.
        let _ = protect(|| ());
        info!("Triggering {:?} with no protected scope", args.fault);
        args.fault.fire();
        println!("completed");
        return ExitCode::from(2);
    }

    info!("Triggering {:?} inside {} protected scope(s)", args.fault, args.depth);
    let outcome = guarded(args.depth, &args);

    if let Some(installation) = installed() {
        debug!(
            "Intercepted kinds: {:?}, failed: {:?}",
            installation.intercepted(),
            installation.failed()
        );
    }

    match outcome {
        Outcome::Caught {
            exception,
            enclosing,
        } => {
            println!(
                "caught kind={:?} code={} enclosing={} depth_after={}",
                exception.kind(),
                exception.platform_code(),
                enclosing,
                chain_depth()
            );
            println!("message: {}", exception);
            ExitCode::SUCCESS
        }
        Outcome::Completed => {
            println!("completed");
            ExitCode::from(2)
        }
    }
}

/// Run the fault inside `levels` nested scopes.
///
/// Only the innermost scope may catch it; the enclosing ones must see
/// their bodies complete normally.
fn guarded(levels: u32, args: &Args) -> Outcome {
    let enclosing = chain_depth();
    let result = protect(|| {
        if levels > 1 {
            guarded(levels - 1, args)
        } else if args.in_unwind {
            let _fire = FireOnDrop(args.fault);
            panic!("unwinding before {:?}", args.fault);
        } else {
            args.fault.fire();
            Outcome::Completed
        }
    });

    match result {
        Ok(outcome) => outcome,
        Err(exception) => {
            if exception.kind() == Fault::ProcessAbort {
                debug!("Recovered from abort(); further aborts in this process may hang");
            }
            Outcome::Caught {
                exception,
                enclosing,
            }
        }
    }
}
