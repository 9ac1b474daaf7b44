//! # Symbols
//!
//! The image symbol resolver: turns offsets inside an object file into
//! function names and source locations.
//!
//! - [`image`]: [`ImageResolver`], the per-image batch resolver
//! - [`table`]: symbol table and section index of an opened image
//! - [`lines`]: discriminators from the DWARF line programs
//! - [`demangle`]: Rust and C++ demangling
//! - [`options`]: [`ResolveOptions`] and [`DemangleStyle`]
//!
//! Line-table lookup itself is delegated to `addr2line` on top of `gimli`
//! and `object`.

pub mod demangle;
pub mod image;
mod lines;
pub mod options;
mod table;

pub use demangle::demangle;
pub use image::{scan_hex, ImageResolver, ResolutionOutcome};
pub use options::{DemangleStyle, ResolveOptions, MAX_INLINE_DEPTH};
pub use table::SymbolSource;
