//! `sigsetjmp` / `siglongjmp` bindings.
//!
//! The `libc` crate does not expose `sigjmp_buf` as a usable type, so the
//! save buffer is an over-sized, 16-byte aligned opaque blob and the two
//! functions are bound directly.
//!
//! `sigsetjmp` returns twice. Callers must keep the frame that calls it
//! trivial: no locals that change between the first return and a later
//! `siglongjmp`, and nothing with a destructor live across the call.

use static_assertions::const_assert;
use std::ffi::c_int;

/// Opaque `sigjmp_buf`.
///
/// glibc needs 200 bytes on x86_64 and 312 on aarch64; musl and the
/// Darwin libcs need less. 512 bytes covers all supported targets.
#[repr(C, align(16))]
pub(crate) struct SigJmpBuf {
    _buf: [u8; 512],
}

const_assert!(std::mem::size_of::<SigJmpBuf>() >= 312);

impl SigJmpBuf {
    pub(crate) const fn zeroed() -> Self {
        Self { _buf: [0u8; 512] }
    }
}

unsafe extern "C" {
    // glibc only exports the underscored symbol; `sigsetjmp` is a macro there.
    #[cfg_attr(all(target_os = "linux", target_env = "gnu"), link_name = "__sigsetjmp")]
    pub(crate) fn sigsetjmp(env: *mut SigJmpBuf, savemask: c_int) -> c_int;

    pub(crate) fn siglongjmp(env: *mut SigJmpBuf, val: c_int) -> !;
}
