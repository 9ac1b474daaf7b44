//! # Types
//!
//! Value types shared by every layer of the resolution engine.
//!
//! These types are deliberately free of platform details: the image resolver,
//! the fallback chains and the stacktrace container all exchange `Address`
//! and `AddressInfo` values regardless of which symbol source produced them.

pub mod address;
pub mod symbols;

// Re-export all public types
pub use address::Address;
pub use symbols::{base_name, AddressInfo, SourceLocation};
