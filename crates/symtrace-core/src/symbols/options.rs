//! Resolver options.
//!
//! Every resolution entry point takes its behaviour from a [`ResolveOptions`]
//! value owned by the caller, never from process-global state.
//!
//! ## Environment Variables
//!
//! [`ResolveOptions::from_env`] starts from the defaults and applies:
//!
//! - `SYMTRACE_UNWIND_INLINES`: `0`/`false` to stop at the innermost inline record
//! - `SYMTRACE_DEMANGLE`: `0`/`false` to keep raw linkage names
//! - `SYMTRACE_DEMANGLE_STYLE`: `auto`, `rust`, `gnu-v3` (alias `c++`) or `none`
//! - `SYMTRACE_NO_RECURSE_LIMIT`: `1`/`true` to lift the C++ demangler's recursion limit

use std::env;
use std::fmt;
use std::str::FromStr;

use crate::error::SymtraceError;

/// Upper bound on enclosing-inliner steps taken for one address.
///
/// Well-formed debug info rarely nests inlining more than a dozen levels; the
/// bound only matters for corrupt `.debug_info`.
pub const MAX_INLINE_DEPTH: usize = 64;

/// Which demangling scheme to apply to linkage names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DemangleStyle
{
    /// Try Rust first, then Itanium C++.
    #[default]
    Auto,
    /// Rust legacy and v0 mangling only.
    Rust,
    /// Itanium C++ ABI mangling only (`_Z...`).
    GnuV3,
    /// Never demangle, even when demangling is enabled.
    None,
}

impl FromStr for DemangleStyle
{
    type Err = SymtraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "auto" => Ok(DemangleStyle::Auto),
            "rust" => Ok(DemangleStyle::Rust),
            "gnu-v3" | "gnu_v3" | "c++" | "cpp" | "itanium" => Ok(DemangleStyle::GnuV3),
            "none" => Ok(DemangleStyle::None),
            _ => Err(SymtraceError::InvalidArgument(format!(
                "unknown demangling style `{s}`. Use 'auto', 'rust', 'gnu-v3' or 'none'"
            ))),
        }
    }
}

impl fmt::Display for DemangleStyle
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let label = match self {
            DemangleStyle::Auto => "auto",
            DemangleStyle::Rust => "rust",
            DemangleStyle::GnuV3 => "gnu-v3",
            DemangleStyle::None => "none",
        };
        write!(f, "{label}")
    }
}

/// Options for the image symbol resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions
{
    /// Walk enclosing inliner frames after the first match.
    pub unwind_inlines: bool,
    /// Lift the recursion limit of the C++ demangler.
    pub no_recurse_limit: bool,
    /// Demangle function names that were found.
    pub demangle: bool,
    /// Scheme used when `demangle` is set.
    pub demangle_style: DemangleStyle,
}

impl Default for ResolveOptions
{
    fn default() -> Self
    {
        Self {
            unwind_inlines: true,
            no_recurse_limit: true,
            demangle: true,
            demangle_style: DemangleStyle::Auto,
        }
    }
}

impl ResolveOptions
{
    /// Defaults overridden by the `SYMTRACE_*` environment variables.
    ///
    /// Unparseable values are logged and ignored, leaving the default.
    #[must_use]
    pub fn from_env() -> Self
    {
        let mut options = Self::default();
        if let Some(value) = env_flag("SYMTRACE_UNWIND_INLINES") {
            options.unwind_inlines = value;
        }
        if let Some(value) = env_flag("SYMTRACE_DEMANGLE") {
            options.demangle = value;
        }
        if let Some(value) = env_flag("SYMTRACE_NO_RECURSE_LIMIT") {
            options.no_recurse_limit = value;
        }
        if let Ok(style) = env::var("SYMTRACE_DEMANGLE_STYLE") {
            options = options.with_style_name(&style);
        }
        options
    }

    /// Set the demangling style by name.
    ///
    /// An unknown name leaves the current style in place and logs a warning.
    #[must_use]
    pub fn with_style_name(mut self, name: &str) -> Self
    {
        match name.parse() {
            Ok(style) => self.demangle_style = style,
            Err(err) => tracing::warn!("{err}"),
        }
        self
    }

    /// Options that return names exactly as stored in the image.
    #[must_use]
    pub fn raw_names() -> Self
    {
        Self {
            demangle: false,
            ..Self::default()
        }
    }
}

fn env_flag(name: &str) -> Option<bool>
{
    let value = env::var(name).ok()?;
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        other => {
            tracing::warn!("ignoring {name}={other}: expected a boolean");
            None
        }
    }
}
