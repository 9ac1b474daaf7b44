//! Stack capture through the `backtrace` crate.

use super::StackCapture;
use crate::types::Address;

/// Walks the current thread's stack with [`backtrace::trace`].
///
/// Frames up to and including a boundary function are dropped before `skip`
/// is applied, so the walker's own frames never show up. The boundary is
/// [`capture_addresses`](StackCapture::capture_addresses) itself unless set
/// with [`below`](Self::below). If the boundary frame is not found on the
/// stack, nothing is dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct BacktraceCapture
{
    boundary: Option<usize>,
}

impl BacktraceCapture
{
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Drop every frame up to and including the innermost frame of
    /// `function`, given as its entry address (`some_fn as usize`).
    ///
    /// `function` must not be inlined into its callers.
    pub fn below(function: usize) -> Self
    {
        Self {
            boundary: Some(function),
        }
    }
}

impl StackCapture for BacktraceCapture
{
    #[inline(never)]
    fn capture_addresses(&self, skip: usize, max_depth: usize) -> Vec<Address>
    {
        if max_depth == 0 {
            return Vec::new();
        }

        let own = <Self as StackCapture>::capture_addresses as usize;
        let boundary = self.boundary.unwrap_or(own);

        let mut addresses = Vec::new();
        let mut start = None;
        backtrace::trace(|frame| {
            addresses.push(Address::from_ptr(frame.ip().cast_const()));
            if start.is_none() && frame.symbol_address() as usize == boundary {
                start = Some(addresses.len());
            }
            start.map_or(true, |start| addresses.len() < start + skip + max_depth)
        });

        addresses
            .into_iter()
            .skip(start.unwrap_or(0) + skip)
            .take(max_depth)
            .collect()
    }
}
