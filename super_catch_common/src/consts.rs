//! Workspace-wide constants.

use static_assertions::const_assert;

/// Resume value reported by a checkpoint whose body completed without a
/// fault. Signal numbers are strictly positive, so zero and negative
/// values never identify a fault.
pub const NORMAL_COMPLETION: i32 = 0;

/// Default per-thread alternate signal stack size (64 KiB).
pub const DEFAULT_ALT_STACK_SIZE: usize = 64 * 1024;

/// Smallest non-zero alternate signal stack accepted by configuration.
pub const MIN_ALT_STACK_SIZE: usize = 16 * 1024;

/// Target used by every `tracing` event emitted by the workspace.
pub const LOG_TARGET: &str = "super_catch";

const_assert!(MIN_ALT_STACK_SIZE <= DEFAULT_ALT_STACK_SIZE);
const_assert!(NORMAL_COMPLETION <= 0);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_signal_collides_with_normal_completion() {
        for fault in crate::fault::Fault::RECOGNISED {
            assert!(fault.signal() > NORMAL_COMPLETION);
        }
    }
}
