//! Per-thread alternate signal stacks.
//!
//! Handlers run with `SA_ONSTACK`, so a fault caused by exhausting the
//! thread's own stack can still reach the dispatcher. Threads spawned by
//! the Rust runtime usually have an alternate stack already; threads
//! created by foreign code usually do not. The first protected scope on a
//! thread installs one of the configured size unless a large enough one
//! is present, and the thread-local owner releases it on thread exit.

use std::cell::OnceCell;
use std::ptr;
use super_catch_common::consts::LOG_TARGET;
use tracing::warn;

/// An `mmap`ed alternate stack with a guard page below it.
struct AltStack {
    mapping: *mut libc::c_void,
    mapping_len: usize,
    stack: *mut libc::c_void,
}

thread_local! {
    static ALT_STACK: OnceCell<Option<AltStack>> = const { OnceCell::new() };
}

/// Make sure the calling thread has an alternate signal stack.
///
/// `size == 0` leaves the thread alone. Failure is logged and tolerated:
/// the only loss is recovery from stack-exhaustion faults.
pub(crate) fn ensure_for_current_thread(size: usize) {
    if size == 0 {
        return;
    }
    let _ = ALT_STACK.try_with(|slot| {
        slot.get_or_init(|| {
            if has_alt_stack(size) {
                None
            } else {
                AltStack::install(size)
            }
        });
    });
}

/// Whether the calling thread is running with our alternate stack.
#[cfg(test)]
pub(crate) fn owns_alt_stack() -> bool {
    ALT_STACK
        .try_with(|slot| matches!(slot.get(), Some(Some(_))))
        .unwrap_or(false)
}

/// Whether the calling thread has an enabled alternate stack of at least
/// `min_size` bytes.
fn has_alt_stack(min_size: usize) -> bool {
    // SAFETY: zeroed stack_t is valid; sigaltstack only writes to it.
    let mut current: libc::stack_t = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::sigaltstack(ptr::null(), &mut current) };
    rc == 0 && current.ss_flags & libc::SS_DISABLE == 0 && current.ss_size >= min_size
}

fn page_size() -> usize {
    // SAFETY: sysconf has no preconditions.
    match unsafe { libc::sysconf(libc::_SC_PAGESIZE) } {
        n if n > 0 => n as usize,
        _ => 4096,
    }
}

impl AltStack {
    fn install(size: usize) -> Option<Self> {
        let page = page_size();
        let size = size.div_ceil(page) * page;
        let mapping_len = size + page;

        // SAFETY: anonymous private mapping, no file descriptor involved.
        let mapping = unsafe {
            libc::mmap(
                ptr::null_mut(),
                mapping_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANON,
                -1,
                0,
            )
        };
        if mapping == libc::MAP_FAILED {
            warn!(
                target: LOG_TARGET,
                "Failed to map alternate signal stack: {}",
                std::io::Error::last_os_error()
            );
            return None;
        }

        // SAFETY: the first page lies inside the mapping created above.
        if unsafe { libc::mprotect(mapping, page, libc::PROT_NONE) } != 0 {
            warn!(
                target: LOG_TARGET,
                "Failed to protect alternate stack guard page: {}",
                std::io::Error::last_os_error()
            );
        }

        // SAFETY: page < mapping_len.
        let stack = unsafe { mapping.cast::<u8>().add(page).cast::<libc::c_void>() };
        let descriptor = libc::stack_t {
            ss_sp: stack,
            ss_flags: 0,
            ss_size: size,
        };
        // SAFETY: descriptor points at a live mapping owned by this thread.
        if unsafe { libc::sigaltstack(&descriptor, ptr::null_mut()) } != 0 {
            warn!(
                target: LOG_TARGET,
                "Failed to install alternate signal stack: {}",
                std::io::Error::last_os_error()
            );
            // SAFETY: mapping is ours and unused.
            unsafe { libc::munmap(mapping, mapping_len) };
            return None;
        }

        Some(Self {
            mapping,
            mapping_len,
            stack,
        })
    }
}

impl Drop for AltStack {
    fn drop(&mut self) {
        // SAFETY: zeroed stack_t is valid; sigaltstack only writes to it.
        let mut current: libc::stack_t = unsafe { std::mem::zeroed() };
        if unsafe { libc::sigaltstack(ptr::null(), &mut current) } != 0 {
            return;
        }

        if current.ss_sp == self.stack && current.ss_flags & libc::SS_DISABLE == 0 {
            let disable = libc::stack_t {
                ss_sp: ptr::null_mut(),
                ss_flags: libc::SS_DISABLE,
                ss_size: 0,
            };
            // SAFETY: disables the calling thread's alternate stack.
            unsafe { libc::sigaltstack(&disable, ptr::null_mut()) };
        }

        // SAFETY: the kernel no longer delivers signals onto this mapping.
        unsafe { libc::munmap(self.mapping, self.mapping_len) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_size_leaves_thread_alone() {
        std::thread::spawn(|| {
            ensure_for_current_thread(0);
            assert!(!owns_alt_stack());
        })
        .join()
        .unwrap();
    }

    #[test]
    fn large_enough_stack_is_kept() {
        std::thread::spawn(|| {
            ensure_for_current_thread(64 * 1024);
            assert!(has_alt_stack(64 * 1024));

            // A smaller request is already satisfied.
            let owned = owns_alt_stack();
            ensure_for_current_thread(16 * 1024);
            assert_eq!(owns_alt_stack(), owned);
        })
        .join()
        .unwrap();
    }

    #[test]
    fn installs_when_missing() {
        std::thread::spawn(|| {
            let disable = libc::stack_t {
                ss_sp: ptr::null_mut(),
                ss_flags: libc::SS_DISABLE,
                ss_size: 0,
            };
            // SAFETY: disabling the current thread's alternate stack.
            unsafe { libc::sigaltstack(&disable, ptr::null_mut()) };
            assert!(!has_alt_stack(1));

            ensure_for_current_thread(64 * 1024);
            assert!(has_alt_stack(64 * 1024));
            assert!(owns_alt_stack());
        })
        .join()
        .unwrap();
    }
}
