//! Best-effort fault diagnostics.
//!
//! Exception construction turns a [`FaultRecord`] into
//! [`FaultDiagnostics`] through a [`DiagnosticProvider`]. Providers run in
//! normal context after the resume, never inside the dispatcher, so a
//! lookup that misbehaves cannot re-enter the fault path. Every lookup is
//! guarded and a failed one just leaves its field empty.
//!
//! [`DlAddrDiagnostics`] resolves the owning module with `dladdr`;
//! [`MinimalDiagnostics`] reports nothing and is what platforms without
//! an equivalent facility get.

use crate::dispatch::FaultRecord;
use std::ffi::CStr;
use super_catch_common::fault::{AccessKind, describe_code};

/// Shared object containing an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    /// Path or name of the object as reported by the loader.
    pub name: String,
    /// Load address of the object.
    pub base: usize,
}

impl ModuleInfo {
    /// Offset of `address` from the module base.
    pub fn offset_of(&self, address: usize) -> usize {
        address.wrapping_sub(self.base)
    }
}

/// Everything known about a fault beyond its kind and code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaultDiagnostics {
    /// `si_code` sub-reason, for kernel-generated faults.
    pub reason: Option<&'static str>,
    /// Faulting instruction address.
    pub instruction_address: Option<usize>,
    /// Module owning the faulting instruction.
    pub module: Option<ModuleInfo>,
    /// Attempted access, for access violations.
    pub access: Option<AccessKind>,
    /// Faulting data address, for access violations.
    pub data_address: Option<usize>,
}

impl FaultDiagnostics {
    /// Whether nothing beyond the raw code is known.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Source of fault diagnostics.
pub trait DiagnosticProvider: Sync {
    /// Extract what is available from `record`. Must not panic.
    fn diagnose(&self, record: &FaultRecord) -> FaultDiagnostics;
}

/// Reports no diagnostics.
#[derive(Debug, Default, Clone, Copy)]
pub struct MinimalDiagnostics;

impl DiagnosticProvider for MinimalDiagnostics {
    fn diagnose(&self, _record: &FaultRecord) -> FaultDiagnostics {
        FaultDiagnostics::default()
    }
}

/// Record fields plus `dladdr` module resolution.
#[derive(Debug, Default, Clone, Copy)]
pub struct DlAddrDiagnostics;

impl DiagnosticProvider for DlAddrDiagnostics {
    fn diagnose(&self, record: &FaultRecord) -> FaultDiagnostics {
        FaultDiagnostics {
            reason: describe_code(record.signal, record.code),
            instruction_address: record.instruction_address,
            module: record.instruction_address.and_then(resolve_module),
            access: record.access,
            data_address: record.data_address,
        }
    }
}

/// Look up the shared object containing `address`.
pub fn resolve_module(address: usize) -> Option<ModuleInfo> {
    if address == 0 {
        return None;
    }

    // SAFETY: zeroed Dl_info is valid; dladdr only reads the address value
    // and fills the struct.
    let mut info: libc::Dl_info = unsafe { std::mem::zeroed() };
    if unsafe { libc::dladdr(address as *const libc::c_void, &mut info) } == 0 {
        return None;
    }
    if info.dli_fname.is_null() {
        return None;
    }

    // SAFETY: dladdr returned a NUL-terminated name owned by the loader.
    let name = unsafe { CStr::from_ptr(info.dli_fname) }
        .to_string_lossy()
        .into_owned();
    Some(ModuleInfo {
        name,
        base: info.dli_fbase as usize,
    })
}

static DLADDR: DlAddrDiagnostics = DlAddrDiagnostics;

/// Provider used when constructing exceptions after a resume.
pub fn platform_provider() -> &'static dyn DiagnosticProvider {
    &DLADDR
}
