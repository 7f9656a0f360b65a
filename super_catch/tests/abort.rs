//! Recovery from abort()
//!
//! Kept in its own test binary: glibc's abort() leaves an internal lock
//! held once a checkpoint resumes, so this process must not abort twice
//! and must not spawn children (`fork` takes the same lock).

use super_catch::{Fault, chain_depth, protect, trigger};

#[test]
fn test_abort_is_process_abort() {
    let err = protect(|| -> () { trigger::abort() }).unwrap_err();
    assert_eq!(err.kind(), Fault::ProcessAbort);
    assert_eq!(err.platform_code(), libc::SIGABRT);
    assert_eq!(chain_depth(), 0);

    // Other kinds still work afterwards.
    let err = protect(trigger::null_dereference).unwrap_err();
    assert_eq!(err.kind(), Fault::InvalidMemoryAccess);
}
