//! # Frames
//!
//! A [`Frame`] is one resolved return address. The information behind it
//! depends on which strategy of a fallback chain produced it, recorded as a
//! [`FrameSource`] variant:
//!
//! | variant | produced by | line |
//! |---------|-------------|------|
//! | `Debug` | platform debug-info service | yes |
//! | `BinaryTable` | image symbol resolver | yes, may be 0 |
//! | `ExportTable` | dynamic loader export symbol | no |
//! | `ModuleOnly` | owning module only, synthesized label | no |
//! | `Unresolved` | nothing, raw descriptor text | no |
//!
//! Frames are immutable values; cloning a frame clones its variant.

use std::fmt;

use crate::types::{base_name, Address, AddressInfo, SourceLocation};

/// Which strategy produced a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provenance
{
    Debug,
    BinaryTable,
    ExportTable,
    ModuleOnly,
    Unresolved,
}

impl fmt::Display for Provenance
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let label = match self {
            Provenance::Debug => "debug-info",
            Provenance::BinaryTable => "binary-table",
            Provenance::ExportTable => "export-table",
            Provenance::ModuleOnly => "module-only",
            Provenance::Unresolved => "unresolved",
        };
        f.write_str(label)
    }
}

/// Variant-specific payload of a [`Frame`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameSource
{
    /// Resolved through the platform debug-info service.
    Debug
    {
        function: String,
        location: SourceLocation,
    },
    /// Resolved through the image symbol resolver.
    BinaryTable
    {
        function: String,
        location: SourceLocation,
        discriminator: u32,
    },
    /// Exported symbol reported by the dynamic loader.
    ExportTable
    {
        function: String,
        image: String,
        image_name: String,
    },
    /// Owning module known, symbol not. `label` is usually the hex address.
    ModuleOnly
    {
        label: String,
        module: String,
        module_name: String,
    },
    /// No strategy succeeded; carries the raw descriptor text.
    Unresolved
    {
        descriptor: String,
    },
}

/// One resolved return address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame
{
    address: Address,
    source: FrameSource,
}

impl Frame
{
    /// Frame from the debug-info service. A location without a file carries no line.
    pub fn debug(address: Address, function: impl Into<String>, file: impl Into<String>, line: u32) -> Self
    {
        let file = file.into();
        let line = if file.is_empty() { 0 } else { line };
        Self {
            address,
            source: FrameSource::Debug {
                function: function.into(),
                location: SourceLocation::new(file, line),
            },
        }
    }

    /// Frame from an image resolver record.
    ///
    /// `address` is the process address; `info` carries the image-relative one.
    pub fn binary_table(address: Address, info: &AddressInfo) -> Self
    {
        Self {
            address,
            source: FrameSource::BinaryTable {
                function: info.function_name().to_string(),
                location: SourceLocation {
                    file: info.file_path().to_string(),
                    base_name: info.file_base_name().to_string(),
                    line: info.line(),
                },
                discriminator: info.discriminator(),
            },
        }
    }

    /// Frame from a dynamic loader symbol.
    pub fn export_table(address: Address, function: impl Into<String>, image: impl Into<String>) -> Self
    {
        let image = image.into();
        Self {
            address,
            source: FrameSource::ExportTable {
                function: function.into(),
                image_name: base_name(&image).to_string(),
                image,
            },
        }
    }

    /// Frame for an address whose owning module is known.
    ///
    /// Without a `symbol` the label is [`Address::hex_label`].
    pub fn module_only(address: Address, symbol: Option<String>, module: impl Into<String>) -> Self
    {
        let module = module.into();
        Self {
            address,
            source: FrameSource::ModuleOnly {
                label: symbol.unwrap_or_else(|| address.hex_label()),
                module_name: base_name(&module).to_string(),
                module,
            },
        }
    }

    /// Frame that only carries the raw descriptor.
    pub fn unresolved(address: Address, descriptor: impl Into<String>) -> Self
    {
        Self {
            address,
            source: FrameSource::Unresolved {
                descriptor: descriptor.into(),
            },
        }
    }

    pub fn address(&self) -> Address
    {
        self.address
    }

    pub fn source(&self) -> &FrameSource
    {
        &self.source
    }

    pub fn provenance(&self) -> Provenance
    {
        match self.source {
            FrameSource::Debug { .. } => Provenance::Debug,
            FrameSource::BinaryTable { .. } => Provenance::BinaryTable,
            FrameSource::ExportTable { .. } => Provenance::ExportTable,
            FrameSource::ModuleOnly { .. } => Provenance::ModuleOnly,
            FrameSource::Unresolved { .. } => Provenance::Unresolved,
        }
    }

    /// Function label: the symbol, the synthesized hex label, or the raw
    /// descriptor for unresolved frames.
    pub fn function(&self) -> &str
    {
        match &self.source {
            FrameSource::Debug { function, .. }
            | FrameSource::BinaryTable { function, .. }
            | FrameSource::ExportTable { function, .. } => function,
            FrameSource::ModuleOnly { label, .. } => label,
            FrameSource::Unresolved { descriptor } => descriptor,
        }
    }

    /// Source file, or the owning image for frames without source info.
    pub fn full_file_path(&self) -> &str
    {
        match &self.source {
            FrameSource::Debug { location, .. } | FrameSource::BinaryTable { location, .. } => &location.file,
            FrameSource::ExportTable { image, .. } => image,
            FrameSource::ModuleOnly { module, .. } => module,
            FrameSource::Unresolved { .. } => "",
        }
    }

    /// Last component of [`full_file_path`](Self::full_file_path).
    pub fn file(&self) -> &str
    {
        match &self.source {
            FrameSource::Debug { location, .. } | FrameSource::BinaryTable { location, .. } => &location.base_name,
            FrameSource::ExportTable { image_name, .. } => image_name,
            FrameSource::ModuleOnly { module_name, .. } => module_name,
            FrameSource::Unresolved { .. } => "",
        }
    }

    /// Line number, `0` if unknown.
    pub fn line(&self) -> u32
    {
        match &self.source {
            FrameSource::Debug { location, .. } | FrameSource::BinaryTable { location, .. } => location.line,
            _ => 0,
        }
    }

    pub fn discriminator(&self) -> u32
    {
        match &self.source {
            FrameSource::BinaryTable { discriminator, .. } => *discriminator,
            _ => 0,
        }
    }

    /// Render with full file paths (`true`) or base names (`false`).
    ///
    /// ```rust
    /// use symtrace_core::{Address, Frame};
    ///
    /// let frame = Frame::debug(Address::new(0x1000), "main", "/src/app/main.cpp", 12);
    /// assert_eq!(frame.display(false).to_string(), "main in main.cpp:12");
    /// assert_eq!(frame.display(true).to_string(), "main in /src/app/main.cpp:12");
    /// ```
    pub fn display(&self, full_paths: bool) -> FrameDisplay<'_>
    {
        FrameDisplay {
            frame: self,
            full_paths,
        }
    }
}

/// Helper returned by [`Frame::display`].
pub struct FrameDisplay<'a>
{
    frame: &'a Frame,
    full_paths: bool,
}

impl fmt::Display for FrameDisplay<'_>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let frame = self.frame;
        let file = if self.full_paths { frame.full_file_path() } else { frame.file() };

        if file.is_empty() {
            return f.write_str(frame.function());
        }
        write!(f, "{} in {file}", frame.function())?;

        // Debug-info frames always report their line, even when it is 0.
        if frame.provenance() == Provenance::Debug || frame.line() != 0 {
            write!(f, ":{}", frame.line())?;
        }
        Ok(())
    }
}

impl fmt::Display for Frame
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        self.display(false).fmt(f)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_binary_table_frame_from_info()
    {
        let info = AddressInfo::new(Address::new(0x10), "foo::bar", "/src/foo.rs", 42, 3);
        let frame = Frame::binary_table(Address::new(0x7f00_0000_0010), &info);

        assert_eq!(frame.provenance(), Provenance::BinaryTable);
        assert_eq!(frame.address().value(), 0x7f00_0000_0010);
        assert_eq!(frame.function(), "foo::bar");
        assert_eq!(frame.file(), "foo.rs");
        assert_eq!(frame.line(), 42);
        assert_eq!(frame.discriminator(), 3);
        assert_eq!(frame.to_string(), "foo::bar in foo.rs:42");
        assert_eq!(frame.display(true).to_string(), "foo::bar in /src/foo.rs:42");
    }

    #[test]
    fn test_line_zero_is_omitted_except_for_debug_frames()
    {
        let info = AddressInfo::new(Address::new(0x10), "foo", "/src/foo.c", 0, 0);
        let frame = Frame::binary_table(Address::new(0x10), &info);
        assert_eq!(frame.to_string(), "foo in foo.c");

        let frame = Frame::debug(Address::new(0x10), "foo", "C:\\src\\foo.c", 0);
        assert_eq!(frame.to_string(), "foo in foo.c:0");
    }

    #[test]
    fn test_debug_frame_without_file_has_no_line()
    {
        let frame = Frame::debug(Address::new(0x10), "foo", "", 9);
        assert_eq!(frame.line(), 0);
        assert_eq!(frame.to_string(), "foo");
    }

    #[test]
    fn test_export_table_frame()
    {
        let frame = Frame::export_table(Address::new(0x7f00), "malloc", "/lib/x86_64-linux-gnu/libc.so.6");
        assert_eq!(frame.provenance(), Provenance::ExportTable);
        assert_eq!(frame.line(), 0);
        assert_eq!(frame.file(), "libc.so.6");
        assert_eq!(frame.to_string(), "malloc in libc.so.6");
        assert_eq!(frame.display(true).to_string(), "malloc in /lib/x86_64-linux-gnu/libc.so.6");
    }

    #[test]
    fn test_module_only_frame_uses_hex_label()
    {
        let address = Address::new(0xabc);
        let frame = Frame::module_only(address, None, "/usr/lib/libfoo.so");
        assert_eq!(frame.function(), address.hex_label());
        assert_eq!(frame.to_string(), format!("{} in libfoo.so", address.hex_label()));

        let frame = Frame::module_only(address, Some("bar".to_string()), "foo.dll");
        assert_eq!(frame.function(), "bar");
        assert_eq!(frame.display(true).to_string(), "bar in foo.dll");
    }

    #[test]
    fn test_unresolved_frame_renders_descriptor()
    {
        let frame = Frame::unresolved(Address::new(0x10), "[0x10]");
        assert_eq!(frame.provenance(), Provenance::Unresolved);
        assert_eq!(frame.full_file_path(), "");
        assert_eq!(frame.to_string(), "[0x10]");
    }
}
