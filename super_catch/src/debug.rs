//! Lifecycle debug hook.
//!
//! With the `debug-output` feature, install / push / pop / resume events
//! are emitted as `tracing` TRACE events under the `super_catch` target,
//! so the sink is whatever subscriber the host installed. Without the
//! feature the macro expands to nothing.
//!
//! The dispatcher cannot use `tracing` (it may allocate or lock), so it
//! reports through [`signal_safe_note`], which only calls `write(2)`.

/// Emit a lifecycle event when `debug-output` is enabled.
macro_rules! catch_debug {
    ($($arg:tt)*) => {{
        #[cfg(feature = "debug-output")]
        {
            ::tracing::trace!(target: ::super_catch_common::consts::LOG_TARGET, $($arg)*);
        }
    }};
}

pub(crate) use catch_debug;

/// Write `prefix` followed by the decimal `value` and a newline to stderr.
///
/// Async-signal-safe: formats into a stack buffer and calls `write(2)`
/// once. A no-op unless `debug-output` is enabled.
#[cfg_attr(not(feature = "debug-output"), allow(unused_variables))]
pub(crate) fn signal_safe_note(prefix: &[u8], value: i32) {
    #[cfg(feature = "debug-output")]
    {
        let mut buf = [0u8; 128];
        let len = format_note(&mut buf, prefix, value);
        // SAFETY: buf[..len] is initialised; write(2) is async-signal-safe.
        unsafe {
            libc::write(libc::STDERR_FILENO, buf.as_ptr().cast(), len);
        }
    }
}

/// Lay out `prefix`, `value` and `\n` into `buf`, truncating the prefix
/// if needed. Returns the number of bytes used.
#[cfg_attr(not(any(feature = "debug-output", test)), allow(dead_code))]
fn format_note(buf: &mut [u8; 128], prefix: &[u8], value: i32) -> usize {
    // i32::MIN needs 11 characters plus the newline.
    let room = buf.len() - 12;
    let take = prefix.len().min(room);
    buf[..take].copy_from_slice(&prefix[..take]);
    let mut len = take;

    let mut digits = [0u8; 11];
    let mut n = value.unsigned_abs();
    let mut count = 0;
    loop {
        digits[count] = b'0' + (n % 10) as u8;
        count += 1;
        n /= 10;
        if n == 0 {
            break;
        }
    }
    if value < 0 {
        buf[len] = b'-';
        len += 1;
    }
    for i in (0..count).rev() {
        buf[len] = digits[i];
        len += 1;
    }
    buf[len] = b'\n';
    len + 1
}
