//! Symbol and source location types.

use std::fmt;

use super::Address;

/// Resolution result for a single requested address.
///
/// Produced by the image resolver, one per requested offset. Every field may
/// be empty or zero: an address that falls outside every allocatable section,
/// or inside a section without debug info, is still represented by an
/// `AddressInfo` (see [`AddressInfo::unknown`]).
///
/// ## Invariant
///
/// Line information never exists without its owning file. If `file_path` is
/// empty then `line` and `discriminator` are `0` and `file_base_name` is
/// empty. The only way to build a value is through [`AddressInfo::new`] or
/// [`AddressInfo::unknown`], both of which uphold this.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AddressInfo
{
    function_name: String,
    file_path: String,
    file_base_name: String,
    line: u32,
    discriminator: u32,
    address: Address,
}

impl AddressInfo
{
    /// Build a record, deriving the base name from `file_path`.
    pub fn new(
        address: Address,
        function_name: impl Into<String>,
        file_path: impl Into<String>,
        line: u32,
        discriminator: u32,
    ) -> Self
    {
        let file_path = file_path.into();
        let (file_base_name, line, discriminator) = if file_path.is_empty() {
            (String::new(), 0, 0)
        } else {
            (base_name(&file_path).to_string(), line, discriminator)
        };

        Self {
            function_name: function_name.into(),
            file_path,
            file_base_name,
            line,
            discriminator,
            address,
        }
    }

    /// The all-empty record for an address nothing is known about.
    pub fn unknown(address: Address) -> Self
    {
        Self {
            address,
            ..Self::default()
        }
    }

    /// Function name as found (demangled if demangling was requested and
    /// succeeded, raw otherwise). Empty if unknown.
    pub fn function_name(&self) -> &str
    {
        &self.function_name
    }

    /// Full source path. Empty if unknown.
    pub fn file_path(&self) -> &str
    {
        &self.file_path
    }

    /// Last component of [`file_path`](Self::file_path).
    pub fn file_base_name(&self) -> &str
    {
        &self.file_base_name
    }

    /// Line number, `0` if unknown.
    pub fn line(&self) -> u32
    {
        self.line
    }

    /// DWARF discriminator distinguishing blocks that share a line, `0` if
    /// not applicable.
    pub fn discriminator(&self) -> u32
    {
        self.discriminator
    }

    /// The queried address, after any address-width masking.
    pub fn address(&self) -> Address
    {
        self.address
    }

    /// `true` when a function name was found.
    pub fn is_resolved(&self) -> bool
    {
        !self.function_name.is_empty()
    }

    /// `true` when function, full path and base name are all present.
    ///
    /// This is the bar the unix fallback chain uses to accept a binary-table
    /// result; the line number is not part of it.
    pub fn has_symbol_identity(&self) -> bool
    {
        !self.function_name.is_empty() && !self.file_path.is_empty() && !self.file_base_name.is_empty()
    }
}

impl fmt::Display for AddressInfo
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let function = if self.function_name.is_empty() { "??" } else { &self.function_name };
        if self.file_path.is_empty() {
            write!(f, "{function} at ??:0")
        } else {
            write!(f, "{function} at {}:{}", self.file_path, self.line)?;
            if self.discriminator != 0 {
                write!(f, " (discriminator {})", self.discriminator)?;
            }
            Ok(())
        }
    }
}

/// Source code location for a resolved frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation
{
    /// Full path as recorded in the debug info.
    pub file: String,
    /// Last path component of `file`.
    pub base_name: String,
    /// Line number, `0` if unknown.
    pub line: u32,
}

impl SourceLocation
{
    /// Helper to build a location from a full path and a line.
    pub fn new(file: impl Into<String>, line: u32) -> Self
    {
        let file = file.into();
        Self {
            base_name: base_name(&file).to_string(),
            file,
            line,
        }
    }
}

/// Last component of a path, splitting on both `/` and `\`.
///
/// A path without any separator is its own base name.
///
/// ```rust
/// use symtrace_core::types::base_name;
///
/// assert_eq!(base_name("/usr/lib/libfoo.so"), "libfoo.so");
/// assert_eq!(base_name(r"C:\app\main.cpp"), "main.cpp");
/// assert_eq!(base_name("main.rs"), "main.rs");
/// ```
pub fn base_name(path: &str) -> &str
{
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}
