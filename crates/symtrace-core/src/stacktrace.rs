//! # Stacktrace
//!
//! An owned, ordered sequence of resolved [`Frame`]s, innermost first.
//!
//! ## Example
//!
//! ```rust,no_run
//! use symtrace_core::Stacktrace;
//!
//! let trace = Stacktrace::capture(0, 32);
//! if trace.has_frames() {
//!     print!("{trace}");
//! }
//! ```

use std::fmt;
use std::ops::Index;
use std::slice;

use tracing::debug;

use crate::chain::{platform_resolver, FrameResolver};
use crate::error::StacktraceError;
use crate::frame::Frame;
use crate::platform::{BacktraceCapture, StackCapture};
use crate::symbols::ResolveOptions;

/// Default number of frames captured.
pub const DEFAULT_MAX_DEPTH: usize = 128;

/// How many frames to capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConfig
{
    /// Innermost frames dropped before capturing.
    pub skip: usize,
    /// Upper bound on the number of addresses captured.
    pub max_depth: usize,
}

impl Default for CaptureConfig
{
    fn default() -> Self
    {
        Self {
            skip: 0,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Resolved call stack.
///
/// Cloning copies every frame; the clone is independent of the original.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stacktrace
{
    frames: Vec<Frame>,
}

impl Stacktrace
{
    /// Capture and resolve the current stack with the platform collaborators.
    ///
    /// Frame 0 is the caller of `capture`; `skip` drops that many frames
    /// from there.
    ///
    /// Resolver options come from [`ResolveOptions::from_env`].
    #[inline(never)]
    pub fn capture(skip: usize, max_depth: usize) -> Self
    {
        let resolver = platform_resolver(ResolveOptions::from_env());
        let capture = BacktraceCapture::below(Self::capture as usize);
        Self::capture_with(&capture, &resolver, skip, max_depth)
    }

    /// [`capture`](Self::capture) driven by a [`CaptureConfig`].
    #[inline(never)]
    pub fn capture_config(config: &CaptureConfig) -> Self
    {
        let resolver = platform_resolver(ResolveOptions::from_env());
        let capture = BacktraceCapture::below(Self::capture_config as usize);
        Self::capture_with(&capture, &resolver, config.skip, config.max_depth)
    }

    /// Capture with injected collaborators.
    ///
    /// Frames the resolver fails to build are left out; a partial trace is
    /// still a valid trace. With `max_depth == 0` neither collaborator is
    /// called.
    pub fn capture_with<C, R>(capture: &C, resolver: &R, skip: usize, max_depth: usize) -> Self
    where
        C: StackCapture + ?Sized,
        R: FrameResolver + ?Sized,
    {
        if max_depth == 0 {
            return Self::default();
        }

        let mut addresses = capture.capture_addresses(skip, max_depth);
        addresses.truncate(max_depth);
        Self::from_results(resolver.resolve_frames(&addresses))
    }

    fn from_results(results: Vec<Result<Frame, crate::error::FrameError>>) -> Self
    {
        let frames = results
            .into_iter()
            .filter_map(|result| match result {
                Ok(frame) => Some(frame),
                Err(err) => {
                    debug!("dropping frame: {err}");
                    None
                }
            })
            .collect();
        Self { frames }
    }

    /// Build a trace from frames resolved elsewhere.
    pub fn from_frames(frames: Vec<Frame>) -> Self
    {
        Self { frames }
    }

    pub fn len(&self) -> usize
    {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.frames.is_empty()
    }

    /// `true` when at least one frame was resolved.
    pub fn has_frames(&self) -> bool
    {
        !self.frames.is_empty()
    }

    /// Bounds-checked access.
    ///
    /// ## Errors
    ///
    /// [`StacktraceError::IndexOutOfRange`] when `index >= len()`.
    pub fn get(&self, index: usize) -> Result<&Frame, StacktraceError>
    {
        self.frames.get(index).ok_or(StacktraceError::IndexOutOfRange {
            index,
            len: self.frames.len(),
        })
    }

    pub fn iter(&self) -> slice::Iter<'_, Frame>
    {
        self.frames.iter()
    }

    pub fn frames(&self) -> &[Frame]
    {
        &self.frames
    }

    /// Render one line per frame, `" {index}# {frame}"`.
    pub fn display(&self, full_paths: bool) -> StacktraceDisplay<'_>
    {
        StacktraceDisplay {
            trace: self,
            full_paths,
        }
    }
}

impl Index<usize> for Stacktrace
{
    type Output = Frame;

    fn index(&self, index: usize) -> &Frame
    {
        &self.frames[index]
    }
}

impl<'a> IntoIterator for &'a Stacktrace
{
    type Item = &'a Frame;
    type IntoIter = slice::Iter<'a, Frame>;

    fn into_iter(self) -> Self::IntoIter
    {
        self.frames.iter()
    }
}

impl IntoIterator for Stacktrace
{
    type Item = Frame;
    type IntoIter = std::vec::IntoIter<Frame>;

    fn into_iter(self) -> Self::IntoIter
    {
        self.frames.into_iter()
    }
}

/// Helper returned by [`Stacktrace::display`].
pub struct StacktraceDisplay<'a>
{
    trace: &'a Stacktrace,
    full_paths: bool,
}

impl fmt::Display for StacktraceDisplay<'_>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        for (index, frame) in self.trace.frames.iter().enumerate() {
            writeln!(f, " {index}# {}", frame.display(self.full_paths))?;
        }
        Ok(())
    }
}

impl fmt::Display for Stacktrace
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        self.display(false).fmt(f)
    }
}
