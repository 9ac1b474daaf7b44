//! # Fallback Chains
//!
//! Turn captured addresses into [`Frame`]s by trying resolution strategies in
//! order and stopping at the first that succeeds.
//!
//! - [`UnixChain`]: image symbol resolver, then dynamic loader export
//!   symbol, then owning object, then the raw descriptor
//! - [`WindowsChain`]: debug-info service, then module ownership
//!
//! Both chains are plain code over the collaborator traits in
//! [`crate::platform`]; [`platform_resolver`] wires up the ones for the
//! current target.

pub mod unix;
pub mod windows;

pub use unix::UnixChain;
pub use windows::WindowsChain;

use crate::error::FrameError;
use crate::frame::Frame;
use crate::symbols::ResolveOptions;
use crate::types::Address;

/// Resolves captured addresses into frames.
pub trait FrameResolver
{
    /// One result per address, in the same order.
    ///
    /// An `Err` marks an address no strategy could turn into a frame.
    fn resolve_frames(&self, addresses: &[Address]) -> Vec<Result<Frame, FrameError>>;
}

impl<R: FrameResolver + ?Sized> FrameResolver for &R
{
    fn resolve_frames(&self, addresses: &[Address]) -> Vec<Result<Frame, FrameError>>
    {
        (**self).resolve_frames(addresses)
    }
}

/// The fallback chain for the current target.
#[cfg(unix)]
pub fn platform_resolver(options: ResolveOptions) -> impl FrameResolver
{
    UnixChain::system(options)
}

/// The fallback chain for the current target.
#[cfg(windows)]
pub fn platform_resolver(_options: ResolveOptions) -> impl FrameResolver
{
    WindowsChain::new(crate::platform::windows::shared_context())
}

/// The fallback chain for the current target.
#[cfg(not(any(unix, windows)))]
pub fn platform_resolver(_options: ResolveOptions) -> impl FrameResolver
{
    Unsupported
}

/// Resolver for targets without a symbolication backend: every frame is
/// reported unresolved.
#[cfg(not(any(unix, windows)))]
struct Unsupported;

#[cfg(not(any(unix, windows)))]
impl FrameResolver for Unsupported
{
    fn resolve_frames(&self, addresses: &[Address]) -> Vec<Result<Frame, FrameError>>
    {
        addresses
            .iter()
            .map(|&address| Ok(Frame::unresolved(address, address.hex_label())))
            .collect()
    }
}
