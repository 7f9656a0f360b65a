//! Deliberate fault triggers.
//!
//! Each function raises one fault kind on the calling thread the way real
//! code would hit it: a bad load, a bad opcode, a divide by zero. Kinds the
//! CPU cannot produce on the current target fall back to `raise`.
//!
//! Outside a protected scope every trigger terminates the process through
//! the signal's normal disposition. Inside one, the trigger never returns
//! and whatever it set up (a mapping, a pipe descriptor) is abandoned.

use nix::sys::signal::{Signal, raise};
use std::ptr;
use super_catch_common::fault::Fault;

/// Deliver `fault`'s signal to the calling thread with `raise`.
pub fn raise_fault(fault: Fault) {
    if let Ok(signal) = Signal::try_from(fault.signal()) {
        let _ = raise(signal);
    }
}

/// Trigger `fault` with the most realistic mechanism available.
pub fn trigger(fault: Fault) {
    match fault {
        Fault::ProcessAbort => abort(),
        Fault::ArithmeticFault => divide_by_zero(),
        Fault::IllegalInstruction => illegal_instruction(),
        Fault::Trap => breakpoint(),
        Fault::InvalidMemoryAccess => null_dereference(),
        Fault::BusError => bus_error(),
        Fault::BrokenPipe => broken_pipe(),
        Fault::TerminateRequest => terminate_request(),
        Fault::Unknown(_) => raise_fault(fault),
    }
}

/// Load through a null pointer. `SIGSEGV`.
#[inline(never)]
pub fn null_dereference() {
    #[cfg(target_arch = "x86_64")]
    // SAFETY: faults by design; touches no Rust-visible memory.
    unsafe {
        std::arch::asm!(
            "mov {0}, qword ptr [{1}]",
            out(reg) _,
            in(reg) 0usize,
            options(nostack, readonly)
        );
    }

    #[cfg(target_arch = "aarch64")]
    // SAFETY: as above.
    unsafe {
        std::arch::asm!(
            "ldr {0}, [{1}]",
            out(reg) _,
            in(reg) 0usize,
            options(nostack, readonly)
        );
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    // SAFETY: faults by design. Offset from null like a field access.
    unsafe {
        let _ = ptr::read_volatile(ptr::without_provenance::<usize>(16));
    }
}

/// `abort()`. `SIGABRT`.
///
/// glibc's `abort` takes an internal lock before raising and a resumed
/// checkpoint never releases it: recover from at most one abort per
/// process. Current glibc also takes that lock in `fork` and
/// `posix_spawn`, so once an abort has been recovered every later
/// `std::process::Command::spawn` in the process blocks forever. Only
/// recover an abort in a process that will not spawn children.
pub fn abort() -> ! {
    std::process::abort()
}

/// Execute an undefined opcode. `SIGILL`.
#[inline(never)]
pub fn illegal_instruction() {
    #[cfg(target_arch = "x86_64")]
    // SAFETY: faults by design.
    unsafe {
        std::arch::asm!("ud2", options(nomem, nostack));
    }

    #[cfg(target_arch = "aarch64")]
    // SAFETY: faults by design.
    unsafe {
        std::arch::asm!("udf #0", options(nomem, nostack));
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    raise_fault(Fault::IllegalInstruction);
}

/// Execute a breakpoint instruction. `SIGTRAP`.
#[inline(never)]
pub fn breakpoint() {
    #[cfg(target_arch = "x86_64")]
    // SAFETY: traps by design.
    unsafe {
        std::arch::asm!("int3", options(nomem, nostack));
    }

    #[cfg(target_arch = "aarch64")]
    // SAFETY: traps by design.
    unsafe {
        std::arch::asm!("brk #0", options(nomem, nostack));
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    raise_fault(Fault::Trap);
}

/// Integer divide by zero. `SIGFPE`.
///
/// Only x86_64 traps on it; elsewhere the signal is raised.
#[inline(never)]
pub fn divide_by_zero() {
    #[cfg(target_arch = "x86_64")]
    // SAFETY: faults by design; registers are declared clobbered.
    unsafe {
        std::arch::asm!(
            "div {0:e}",
            in(reg) 0u32,
            inout("eax") 1u32 => _,
            inout("edx") 0u32 => _,
            options(nomem, nostack)
        );
    }

    #[cfg(not(target_arch = "x86_64"))]
    raise_fault(Fault::ArithmeticFault);
}

#[cfg(target_arch = "x86_64")]
static DATA_AS_CODE: [u8; 4] = [0x0f, 0x0b, 0xc3, 0x00]; // ud2; ret
#[cfg(target_arch = "aarch64")]
static DATA_AS_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x00]; // udf #0
#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
static DATA_AS_CODE: [u8; 4] = [0; 4];

/// Jump into read-only data that holds a valid undefined opcode.
///
/// `SIGSEGV` with an execute access where the data segment is
/// non-executable, `SIGILL` where it is not.
#[inline(never)]
pub fn execute_data() {
    // SAFETY: faults by design; the target is never valid code.
    unsafe {
        let code: extern "C" fn() = std::mem::transmute(DATA_AS_CODE.as_ptr());
        code();
    }
}

/// Fill a fresh page with undefined opcodes, make it executable and call
/// into it. `SIGILL` on x86_64 and aarch64.
///
/// The page is leaked when the call faults.
#[inline(never)]
pub fn execute_opcode_page() {
    // SAFETY: sysconf has no preconditions.
    let page = match unsafe { libc::sysconf(libc::_SC_PAGESIZE) } {
        n if n > 0 => n as usize,
        _ => 4096,
    };
    // SAFETY: anonymous private mapping.
    let mem = unsafe {
        libc::mmap(
            ptr::null_mut(),
            page,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANON,
            -1,
            0,
        )
    };
    if mem == libc::MAP_FAILED {
        raise_fault(Fault::IllegalInstruction);
        return;
    }

    // x86_64 needs `ud2` written in; a zero word is already `udf #0` on
    // aarch64.
    #[cfg(target_arch = "x86_64")]
    {
        // SAFETY: the mapping is page bytes long and writable.
        let bytes = unsafe { std::slice::from_raw_parts_mut(mem.cast::<u8>(), page) };
        for opcode in bytes.chunks_exact_mut(2) {
            opcode.copy_from_slice(&[0x0f, 0x0b]);
        }
    }

    // SAFETY: the mapping is ours; faults by design once executable.
    unsafe {
        if libc::mprotect(mem, page, libc::PROT_READ | libc::PROT_EXEC) != 0 {
            libc::munmap(mem, page);
            raise_fault(Fault::IllegalInstruction);
            return;
        }
        let code: extern "C" fn() = std::mem::transmute(mem);
        code();
        libc::munmap(mem, page);
    }
}

/// Read past the end of a file-backed mapping. `SIGBUS`.
///
/// Uses an empty `memfd` on Linux; the signal is raised elsewhere. The
/// mapping is leaked when the read faults.
#[inline(never)]
pub fn bus_error() {
    #[cfg(target_os = "linux")]
    {
        // SAFETY: plain syscalls on descriptors and memory owned here.
        unsafe {
            let fd = libc::memfd_create(c"super_catch_bus".as_ptr(), libc::MFD_CLOEXEC);
            if fd < 0 {
                raise_fault(Fault::BusError);
                return;
            }
            let len = 4096;
            let mem = libc::mmap(ptr::null_mut(), len, libc::PROT_READ, libc::MAP_SHARED, fd, 0);
            libc::close(fd);
            if mem == libc::MAP_FAILED {
                raise_fault(Fault::BusError);
                return;
            }
            let _ = ptr::read_volatile(mem.cast::<u8>());
            libc::munmap(mem, len);
        }
    }

    #[cfg(not(target_os = "linux"))]
    raise_fault(Fault::BusError);
}

/// Write to a pipe whose read end is closed. `SIGPIPE`.
///
/// The write end is leaked when the write faults.
#[inline(never)]
pub fn broken_pipe() {
    let mut fds = [0; 2];
    // SAFETY: fds has room for both descriptors.
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        raise_fault(Fault::BrokenPipe);
        return;
    }
    let [read_end, write_end] = fds;
    // SAFETY: both descriptors were just created and are owned here.
    unsafe {
        libc::close(read_end);
        libc::write(write_end, b"x".as_ptr().cast(), 1);
        libc::close(write_end);
    }
}

/// `raise(SIGTERM)`.
pub fn terminate_request() {
    raise_fault(Fault::TerminateRequest);
}
