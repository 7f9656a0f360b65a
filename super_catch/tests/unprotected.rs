//! Faults outside any protected scope, checked out of process

use std::os::unix::process::ExitStatusExt;
use std::process::{Command, Output};

fn run_child(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_super_catch_probe"))
        .args(args)
        .env("RUST_LOG", "off")
        .output()
        .expect("failed to spawn child")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_unprotected_faults_terminate_by_signal() {
    let cases = [
        ("segv", libc::SIGSEGV),
        ("ill", libc::SIGILL),
        ("abort", libc::SIGABRT),
        ("trap", libc::SIGTRAP),
        ("term", libc::SIGTERM),
    ];
    for (fault, signal) in cases {
        let output = run_child(&["--fault", fault, "--unprotected"]);
        assert_eq!(
            output.status.signal(),
            Some(signal),
            "{fault}: {:?}, stdout: {}",
            output.status,
            stdout(&output)
        );
        assert!(!stdout(&output).contains("completed"));
    }
}

#[cfg(target_arch = "x86_64")]
#[test]
fn test_unprotected_divide_by_zero_terminates() {
    let output = run_child(&["--fault", "fpe", "--unprotected"]);
    assert_eq!(output.status.signal(), Some(libc::SIGFPE));
}

#[test]
fn test_ignored_broken_pipe_stays_ignored() {
    // The Rust runtime ignores SIGPIPE; without a scope that must not change.
    let output = run_child(&["--fault", "pipe", "--unprotected"]);
    assert_eq!(output.status.code(), Some(2), "{:?}", output.status);
    assert!(stdout(&output).contains("completed"));
}

#[test]
fn test_protected_child_reports_caught_fault() {
    let output = run_child(&["--fault", "segv"]);
    assert!(output.status.success(), "{:?}", output.status);
    let text = stdout(&output);
    assert!(text.contains("caught kind=InvalidMemoryAccess"), "{text}");
    assert!(text.contains("enclosing=0 depth_after=0"), "{text}");
}

#[test]
fn test_nested_scopes_catch_in_child() {
    let output = run_child(&["--fault", "ill", "--depth", "4"]);
    assert!(output.status.success(), "{:?}", output.status);
    let text = stdout(&output);
    assert!(text.contains("caught kind=IllegalInstruction"), "{text}");
    assert!(text.contains("enclosing=3 depth_after=0"), "{text}");
}

#[test]
fn test_child_rejects_invalid_config() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    std::io::Write::write_all(&mut file, b"intercept = []\n").unwrap();

    let output = run_child(&["--fault", "segv", "--config", file.path().to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_child_with_narrowed_config() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    std::io::Write::write_all(
        &mut file,
        b"intercept = [\"invalid_memory_access\"]\nalt_stack_size = 32768\n",
    )
    .unwrap();
    let path = file.path().to_str().unwrap();

    let output = run_child(&["--fault", "segv", "--config", path]);
    assert!(output.status.success(), "{:?}", output.status);

    // SIGILL is no longer intercepted, so even a protected scope dies.
    let output = run_child(&["--fault", "ill", "--config", path]);
    assert_eq!(output.status.signal(), Some(libc::SIGILL));
}

#[test]
fn test_fault_during_body_unwind_is_not_resumed() {
    // Resuming from inside the unwinder would swallow the panic; the fault
    // takes the default path instead.
    for (fault, signal) in [("ill", libc::SIGILL), ("segv", libc::SIGSEGV)] {
        let output = run_child(&["--fault", fault, "--in-unwind", "--depth", "2"]);
        assert_eq!(
            output.status.signal(),
            Some(signal),
            "{fault}: {:?}, stdout: {}",
            output.status,
            stdout(&output)
        );
        assert!(!stdout(&output).contains("caught"));
    }
}

#[test]
fn test_recovered_abort_in_child_process() {
    // Recovering abort() poisons fork in the recovering process, so it is
    // exercised in a child that spawns nothing.
    let output = run_child(&["--fault", "abort"]);
    assert!(output.status.success(), "{:?}", output.status);
    assert!(stdout(&output).contains("caught kind=ProcessAbort"));
}
