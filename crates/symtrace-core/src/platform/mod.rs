//! # Platform Collaborators
//!
//! The resolution engine does not walk the stack or talk to the loader
//! itself. It consumes four services, each behind a trait so the fallback
//! chains can be driven by fakes in tests:
//!
//! - [`StackCapture`]: the raw return addresses of the current thread
//! - [`DescriptorSource`]: `image(symbol+offset) [address]` text per address
//! - [`DynamicLoader`]: nearest exported symbol and owning object of an address
//! - [`DebugInfoService`]: symbol and line lookup through a platform debug API
//!
//! Default implementations:
//!
//! - **All platforms**: [`BacktraceCapture`] (the `backtrace` crate)
//! - **Unix**: `LoadedObjects` descriptors and `Dladdr`
//!   - See: [dl_iterate_phdr(3)](https://man7.org/linux/man-pages/man3/dl_iterate_phdr.3.html),
//!     [dladdr(3)](https://man7.org/linux/man-pages/man3/dladdr.3.html)
//! - **Windows**: `Dbghelp`
//!   - See: [DbgHelp Functions](https://learn.microsoft.com/en-us/windows/win32/debug/dbghelp-functions)

mod capture;
#[cfg(unix)]
pub mod unix;
#[cfg(windows)]
pub mod windows;

pub use capture::BacktraceCapture;

use crate::types::{Address, SourceLocation};

/// Platform-native stack walk.
pub trait StackCapture
{
    /// Up to `max_depth` return addresses, innermost first.
    ///
    /// Address 0 is the return address into the caller of this method;
    /// `skip` drops that many frames from there.
    fn capture_addresses(&self, skip: usize, max_depth: usize) -> Vec<Address>;
}

/// Textual descriptors for captured addresses.
pub trait DescriptorSource
{
    /// One descriptor per address, in the same order.
    ///
    /// The expected shape is `image(symbol+offset) [address]`; any field may
    /// be missing and an entry may be empty.
    fn describe(&self, addresses: &[Address]) -> Vec<String>;
}

/// What the dynamic loader knows about an address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoaderSymbol
{
    /// Nearest exported symbol, as stored (usually mangled).
    pub symbol: Option<String>,
    /// Path of the shared object containing the address.
    pub image: Option<String>,
}

/// Dynamic loader introspection.
pub trait DynamicLoader
{
    fn lookup(&self, address: Address) -> LoaderSymbol;
}

/// A module loaded in the current process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo
{
    pub base: Address,
    pub name: String,
}

/// Platform debug-info service (dbghelp on Windows).
pub trait DebugInfoService
{
    /// Symbol name covering `address`.
    fn symbol_name(&self, address: Address) -> Option<String>;

    /// Source file and line of `address`.
    fn line_info(&self, address: Address) -> Option<SourceLocation>;

    /// Every module loaded in the process, in any order.
    fn modules(&self) -> Vec<ModuleInfo>;
}
