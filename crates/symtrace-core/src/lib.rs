//! # symtrace-core
//!
//! Stack capture and address resolution.
//!
//! This crate turns raw return addresses into function names, source files
//! and line numbers:
//! - Parsing and batching of `backtrace_symbols`-style descriptors
//! - Symbol table and DWARF line table lookup per binary image, with inline
//!   frame unwinding and demangling
//! - Platform fallback chains: binary table → loader export table → owning
//!   module → raw descriptor on unix, debug-info service → owning module on
//!   Windows
//! - An owned, printable [`Stacktrace`]
//!
//! ## Platform Support
//!
//! - **Linux / Android**: `dl_iterate_phdr` descriptors, `dladdr`
//! - **Other unix**: `dladdr` descriptors and lookups
//! - **Windows**: DbgHelp (`SymFromAddr`, `SymGetLineFromAddr64`)
//!
//! ## Why unsafe code is needed
//!
//! Loader introspection (`dl_iterate_phdr`, `dladdr`) and DbgHelp are C APIs.
//! The unsafe calls are confined to [`platform`] and wrapped in safe types.

#![allow(unsafe_code)] // Required for loader and DbgHelp FFI

pub mod chain;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod frame;
pub mod platform;
pub mod prelude;
pub mod stacktrace;
pub mod symbols;
pub mod types;

// Re-export commonly used types
pub use chain::FrameResolver;
pub use error::{Result, SymtraceError};
pub use frame::{Frame, FrameSource, Provenance};
pub use stacktrace::{CaptureConfig, Stacktrace};
pub use symbols::{ImageResolver, ResolveOptions};
pub use types::{Address, AddressInfo};
