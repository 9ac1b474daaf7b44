//! Common module for library exports

pub use crate::chain::{platform_resolver, FrameResolver};
pub use crate::error::{ResolveError, ResolveErrorKind, Result, SymtraceError};
pub use crate::frame::{Frame, Provenance};
pub use crate::stacktrace::{CaptureConfig, Stacktrace};
pub use crate::symbols::{DemangleStyle, ImageResolver, ResolveOptions};
pub use crate::types::{Address, AddressInfo};
