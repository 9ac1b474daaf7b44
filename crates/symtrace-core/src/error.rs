//! # Error Types
//!
//! Error handling for the resolution engine.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.
//!
//! ## Propagation
//!
//! - [`ResolveError`] aborts the batch for **one image** only. Other images
//!   in the same capture are still resolved.
//! - [`FrameError`] marks a single address that no strategy could resolve.
//!   The stacktrace container drops such frames instead of failing.
//! - [`StacktraceError`] is returned by bounds-checked accessors.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::Address;

/// Failure of a whole image batch in the image symbol resolver.
///
/// ## Error Categories
///
/// 1. **Input errors**: ImageUnreadable
/// 2. **Container errors**: UnsupportedContainer, AmbiguousFormat, UnrecognizedFormat
/// 3. **Debug data errors**: SymbolTableUnavailable
/// 4. **Resource errors**: OutOfMemory
#[derive(Error, Debug)]
pub enum ResolveError
{
    /// The image path does not name a non-empty, readable file
    ///
    /// This happens when:
    /// - The path does not exist (e.g. a `[vdso]` pseudo-image)
    /// - The file is empty
    /// - The file cannot be read
    #[error("cannot read image {}: {reason}", path.display())]
    ImageUnreadable
    {
        path: PathBuf,
        reason: String,
    },

    /// The image is an archive of objects rather than a single object
    ///
    /// Addresses cannot name a location in an archive because every member
    /// has its own address space.
    #[error("cannot get addresses from archive {}", path.display())]
    UnsupportedContainer
    {
        path: PathBuf,
    },

    /// The container holds several objects and none, or more than one,
    /// matches the requested target
    #[error("ambiguous image format for {}: {candidates}", path.display())]
    AmbiguousFormat
    {
        path: PathBuf,
        /// Comma separated list of the architectures that were found
        candidates: String,
    },

    /// The data is not an object file this crate understands, or it is an
    /// object for a different architecture than the requested target
    #[error("image format of {} does not match: {reason}", path.display())]
    UnrecognizedFormat
    {
        path: PathBuf,
        reason: String,
    },

    /// Symbol or line tables are present but cannot be loaded
    #[error("unable to read the symbol table of {}: {reason}", path.display())]
    SymbolTableUnavailable
    {
        path: PathBuf,
        reason: String,
    },

    /// Allocating storage for the symbol table or the results failed
    ///
    /// Reported separately so callers can tell "try another strategy" apart
    /// from "the process is out of resources".
    #[error("out of memory while loading {} ({requested} entries requested)", path.display())]
    OutOfMemory
    {
        path: PathBuf,
        requested: usize,
    },
}

/// Field-less discriminant of [`ResolveError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolveErrorKind
{
    ImageUnreadable,
    UnsupportedContainer,
    AmbiguousFormat,
    UnrecognizedFormat,
    SymbolTableUnavailable,
    OutOfMemory,
}

impl ResolveError
{
    /// The kind of failure, without its payload.
    pub fn kind(&self) -> ResolveErrorKind
    {
        match self {
            ResolveError::ImageUnreadable { .. } => ResolveErrorKind::ImageUnreadable,
            ResolveError::UnsupportedContainer { .. } => ResolveErrorKind::UnsupportedContainer,
            ResolveError::AmbiguousFormat { .. } => ResolveErrorKind::AmbiguousFormat,
            ResolveError::UnrecognizedFormat { .. } => ResolveErrorKind::UnrecognizedFormat,
            ResolveError::SymbolTableUnavailable { .. } => ResolveErrorKind::SymbolTableUnavailable,
            ResolveError::OutOfMemory { .. } => ResolveErrorKind::OutOfMemory,
        }
    }

    /// Image the failed batch was resolved against.
    pub fn path(&self) -> &std::path::Path
    {
        match self {
            ResolveError::ImageUnreadable { path, .. }
            | ResolveError::UnsupportedContainer { path }
            | ResolveError::AmbiguousFormat { path, .. }
            | ResolveError::UnrecognizedFormat { path, .. }
            | ResolveError::SymbolTableUnavailable { path, .. }
            | ResolveError::OutOfMemory { path, .. } => path,
        }
    }

    /// `true` for failures caused by resource exhaustion rather than by the
    /// image itself.
    pub fn is_fatal(&self) -> bool
    {
        self.kind() == ResolveErrorKind::OutOfMemory
    }
}

/// No fallback strategy produced a frame for an address.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError
{
    #[error("cannot construct frame for {address}: {reason}")]
    ConstructionFailed
    {
        address: Address,
        reason: String,
    },
}

impl FrameError
{
    pub(crate) fn construction(address: Address, reason: impl Into<String>) -> Self
    {
        FrameError::ConstructionFailed {
            address,
            reason: reason.into(),
        }
    }
}

/// Errors from stacktrace accessors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StacktraceError
{
    /// Indexed access past the last frame
    #[error("frame index {index} out of range for stacktrace of {len} frames")]
    IndexOutOfRange
    {
        index: usize,
        len: usize,
    },
}

/// Main error type for the crate
///
/// Wraps every component error so callers that do not care which layer
/// failed can use a single `?`.
#[derive(Error, Debug)]
pub enum SymtraceError
{
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Stacktrace(#[from] StacktraceError),

    /// Invalid argument passed to a public function
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Convenience type alias for `Result<T, SymtraceError>`
///
/// ```rust
/// use symtrace_core::error::Result;
/// fn foo() -> Result<()>
/// {
///     Ok(())
/// }
/// ```
pub type Result<T> = std::result::Result<T, SymtraceError>;
