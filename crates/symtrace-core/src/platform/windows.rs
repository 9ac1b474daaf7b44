//! DbgHelp-backed debug-info service.
//!
//! DbgHelp functions are single threaded; every call goes through one lock.
//! The process handle is initialized once per process through the shared
//! [`DiagnosticContext`] returned by [`shared_context`].

use std::ffi::{c_void, CStr};
use std::mem;
use std::ptr;
use std::sync::Mutex;

use once_cell::sync::Lazy;
use windows_sys::Win32::Foundation::{BOOL, HANDLE, TRUE};
use windows_sys::Win32::System::Diagnostics::Debug::{
    SymEnumerateModules64, SymFromAddr, SymGetLineFromAddr64, SymInitialize, SymSetOptions, IMAGEHLP_LINE64,
    MAX_SYM_NAME, SYMBOL_INFO, SYMOPT_DEFERRED_LOADS, SYMOPT_LOAD_LINES, SYMOPT_UNDNAME,
};
use windows_sys::Win32::System::Threading::GetCurrentProcess;

use super::{DebugInfoService, ModuleInfo};
use crate::context::DiagnosticContext;
use crate::types::{Address, SourceLocation};

static DBGHELP_LOCK: Mutex<()> = Mutex::new(());

static SHARED_CONTEXT: Lazy<DiagnosticContext<Dbghelp>> = Lazy::new(|| DiagnosticContext::new(Dbghelp::initialize));

/// The process-wide context around [`Dbghelp`].
pub fn shared_context() -> &'static DiagnosticContext<Dbghelp>
{
    &SHARED_CONTEXT
}

/// DbgHelp symbol handler for the current process.
#[derive(Debug)]
pub struct Dbghelp
{
    process: HANDLE,
}

// The pseudo-handle of the current process is valid on every thread, and all
// DbgHelp calls are serialized by DBGHELP_LOCK.
unsafe impl Send for Dbghelp {}
unsafe impl Sync for Dbghelp {}

impl Dbghelp
{
    /// Initialize the symbol handler, loading symbols of every module.
    ///
    /// `None` if `SymInitialize` fails.
    pub fn initialize() -> Option<Self>
    {
        let _guard = DBGHELP_LOCK.lock().ok()?;
        unsafe {
            let process = GetCurrentProcess();
            SymSetOptions(SYMOPT_UNDNAME | SYMOPT_DEFERRED_LOADS | SYMOPT_LOAD_LINES);
            if SymInitialize(process, ptr::null(), TRUE) == 0 {
                tracing::warn!("SymInitialize failed: {}", std::io::Error::last_os_error());
                return None;
            }
            Some(Self { process })
        }
    }
}

impl DebugInfoService for Dbghelp
{
    fn symbol_name(&self, address: Address) -> Option<String>
    {
        let _guard = DBGHELP_LOCK.lock().ok()?;

        // SYMBOL_INFO is followed by MaxNameLen bytes of name storage.
        let size = mem::size_of::<SYMBOL_INFO>() + MAX_SYM_NAME as usize;
        let mut buffer = vec![0u64; size / mem::size_of::<u64>() + 1];
        let info = buffer.as_mut_ptr().cast::<SYMBOL_INFO>();

        unsafe {
            (*info).SizeOfStruct = mem::size_of::<SYMBOL_INFO>() as u32;
            (*info).MaxNameLen = MAX_SYM_NAME;

            let mut displacement = 0u64;
            if SymFromAddr(self.process, address.value(), &mut displacement, info) == 0 {
                return None;
            }

            let len = (*info).NameLen.min((*info).MaxNameLen) as usize;
            let name = std::slice::from_raw_parts(ptr::addr_of!((*info).Name).cast::<u8>(), len);
            Some(String::from_utf8_lossy(name).into_owned())
        }
    }

    fn line_info(&self, address: Address) -> Option<SourceLocation>
    {
        let _guard = DBGHELP_LOCK.lock().ok()?;

        unsafe {
            let mut line: IMAGEHLP_LINE64 = mem::zeroed();
            line.SizeOfStruct = mem::size_of::<IMAGEHLP_LINE64>() as u32;

            let mut displacement = 0u32;
            if SymGetLineFromAddr64(self.process, address.value(), &mut displacement, &mut line) == 0 {
                return None;
            }
            if line.FileName.is_null() {
                return None;
            }

            let file = CStr::from_ptr(line.FileName.cast()).to_string_lossy().into_owned();
            Some(SourceLocation::new(file, line.LineNumber))
        }
    }

    fn modules(&self) -> Vec<ModuleInfo>
    {
        let Ok(_guard) = DBGHELP_LOCK.lock() else {
            return Vec::new();
        };

        let mut modules: Vec<ModuleInfo> = Vec::new();
        unsafe {
            let context = (&mut modules as *mut Vec<ModuleInfo>).cast::<c_void>();
            if SymEnumerateModules64(self.process, Some(collect_module), context) == 0 {
                tracing::warn!("SymEnumerateModules64 failed: {}", std::io::Error::last_os_error());
            }
        }
        modules
    }
}

unsafe extern "system" fn collect_module(name: *const u8, base: u64, context: *const c_void) -> BOOL
{
    let modules = &mut *(context as *mut Vec<ModuleInfo>);
    let name = if name.is_null() {
        String::new()
    } else {
        CStr::from_ptr(name.cast()).to_string_lossy().into_owned()
    };
    modules.push(ModuleInfo {
        base: Address::new(base),
        name,
    });
    TRUE
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_shared_context_enumerates_own_module()
    {
        let context = shared_context();
        if context.service().is_some() {
            assert!(!context.modules().is_empty());
        }
    }
}
