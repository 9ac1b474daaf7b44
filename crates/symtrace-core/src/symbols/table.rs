//! Symbol table and section index for an opened image.
//!
//! The symbol table answers "which function starts at or before this address"
//! when the DWARF line tables have no name for it. The section index answers
//! "is this address inside something the loader maps into memory".

use std::path::Path;

use object::{Object, ObjectSection, ObjectSymbol, SectionFlags, SectionKind, SymbolKind};

use crate::error::ResolveError;

/// Which table the symbols were read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolSource
{
    /// The static (`.symtab`, `LC_SYMTAB`, COFF) symbol table.
    Static,
    /// The dynamic (`.dynsym`) symbol table, used when the static one is empty or stripped.
    Dynamic,
    /// Neither table has a usable symbol.
    Empty,
}

#[derive(Debug)]
struct SymbolEntry
{
    address: u64,
    size: u64,
    name: String,
}

/// Defined function symbols sorted by address.
#[derive(Debug)]
pub(crate) struct SymbolTable
{
    entries: Vec<SymbolEntry>,
    source: SymbolSource,
}

impl SymbolTable
{
    /// Read the static symbol table, falling back to the dynamic one.
    ///
    /// An image with neither is not an error; lookups then rely on DWARF
    /// alone.
    pub(crate) fn load(file: &object::File<'_>, path: &Path) -> Result<Self, ResolveError>
    {
        let entries = collect(|| file.symbols(), path)?;
        if !entries.is_empty() {
            return Ok(Self::sorted(entries, SymbolSource::Static));
        }

        let entries = collect(|| file.dynamic_symbols(), path)?;
        if !entries.is_empty() {
            return Ok(Self::sorted(entries, SymbolSource::Dynamic));
        }

        Ok(Self {
            entries: Vec::new(),
            source: SymbolSource::Empty,
        })
    }

    fn sorted(mut entries: Vec<SymbolEntry>, source: SymbolSource) -> Self
    {
        entries.sort_by_key(|entry| entry.address);
        Self { entries, source }
    }

    pub(crate) fn source(&self) -> SymbolSource
    {
        self.source
    }

    pub(crate) fn len(&self) -> usize
    {
        self.entries.len()
    }

    /// Name of the symbol covering `address`.
    ///
    /// Symbols with a recorded size must contain the address; sizeless ones
    /// cover everything up to the next symbol.
    pub(crate) fn nearest(&self, address: u64) -> Option<&str>
    {
        let idx = self.entries.partition_point(|entry| entry.address <= address);
        let entry = self.entries.get(idx.checked_sub(1)?)?;
        if entry.size != 0 && address - entry.address >= entry.size {
            return None;
        }
        Some(&entry.name)
    }
}

fn collect<'data, F, I, S>(symbols: F, path: &Path) -> Result<Vec<SymbolEntry>, ResolveError>
where
    F: Fn() -> I,
    I: Iterator<Item = S>,
    S: ObjectSymbol<'data>,
{
    // Size the storage up front so an allocation failure surfaces as its own
    // error instead of aborting the process.
    let upper_bound = symbols().count();
    let mut entries = Vec::new();
    entries
        .try_reserve_exact(upper_bound)
        .map_err(|_| ResolveError::OutOfMemory {
            path: path.to_path_buf(),
            requested: upper_bound,
        })?;

    let mut unreadable = 0usize;
    for symbol in symbols() {
        if symbol.kind() != SymbolKind::Text || !symbol.is_definition() {
            continue;
        }
        match symbol.name() {
            Ok(name) if !name.is_empty() => entries.push(SymbolEntry {
                address: symbol.address(),
                size: symbol.size(),
                name: name.to_string(),
            }),
            Ok(_) => {}
            Err(_) => unreadable += 1,
        }
    }

    if entries.is_empty() && unreadable > 0 {
        return Err(ResolveError::SymbolTableUnavailable {
            path: path.to_path_buf(),
            reason: format!("{unreadable} symbol names could not be read"),
        });
    }

    Ok(entries)
}

/// One section of the image, reduced to what containment checks need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SectionRange
{
    pub name: String,
    pub start: u64,
    pub size: u64,
    pub allocatable: bool,
}

impl SectionRange
{
    /// `start <= address < start + size`
    pub(crate) fn contains(&self, address: u64) -> bool
    {
        address >= self.start && address - self.start < self.size
    }
}

/// Sections of the image ordered by ascending virtual address.
#[derive(Debug)]
pub(crate) struct SectionIndex
{
    sections: Vec<SectionRange>,
}

impl SectionIndex
{
    pub(crate) fn load(file: &object::File<'_>) -> Self
    {
        let mut sections: Vec<SectionRange> = file
            .sections()
            .map(|section| SectionRange {
                name: section.name().unwrap_or_default().to_string(),
                start: section.address(),
                size: section.size(),
                allocatable: is_allocatable(&section),
            })
            .collect();
        sections.sort_by_key(|section| section.start);
        Self { sections }
    }

    /// Section with exactly this name.
    pub(crate) fn named(&self, name: &str) -> Option<&SectionRange>
    {
        self.sections.iter().find(|section| section.name == name)
    }

    /// First allocatable section, in vma order, that contains `address`.
    pub(crate) fn containing(&self, address: u64) -> Option<&SectionRange>
    {
        self.sections
            .iter()
            .find(|section| section.allocatable && section.contains(address))
    }
}

fn is_allocatable<'data, S: ObjectSection<'data>>(section: &S) -> bool
{
    match section.flags() {
        SectionFlags::Elf { sh_flags } => sh_flags & u64::from(object::elf::SHF_ALLOC) != 0,
        _ => {
            section.address() != 0
                && !matches!(
                    section.kind(),
                    SectionKind::Debug
                        | SectionKind::DebugString
                        | SectionKind::Metadata
                        | SectionKind::Linker
                        | SectionKind::Note
                        | SectionKind::Other
                        | SectionKind::OtherString
                )
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn table(entries: &[(u64, u64, &str)]) -> SymbolTable
    {
        SymbolTable::sorted(
            entries
                .iter()
                .map(|&(address, size, name)| SymbolEntry {
                    address,
                    size,
                    name: name.to_string(),
                })
                .collect(),
            SymbolSource::Static,
        )
    }

    #[test]
    fn test_nearest_symbol_respects_size()
    {
        let symbols = table(&[(0x2000, 0x10, "second"), (0x1000, 0x100, "first")]);
        assert_eq!(symbols.nearest(0x1000), Some("first"));
        assert_eq!(symbols.nearest(0x10ff), Some("first"));
        assert_eq!(symbols.nearest(0x1100), None);
        assert_eq!(symbols.nearest(0x2008), Some("second"));
        assert_eq!(symbols.nearest(0x0fff), None);
    }

    #[test]
    fn test_sizeless_symbol_extends_to_next()
    {
        let symbols = table(&[(0x1000, 0, "start"), (0x3000, 0, "end")]);
        assert_eq!(symbols.nearest(0x2fff), Some("start"));
        assert_eq!(symbols.nearest(0x9000), Some("end"));
    }

    #[test]
    fn test_section_containment_is_half_open()
    {
        let section = SectionRange {
            name: ".text".to_string(),
            start: 0x1000,
            size: 0x100,
            allocatable: true,
        };
        assert!(section.contains(0x1000));
        assert!(section.contains(0x10ff));
        assert!(!section.contains(0x1100));
        assert!(!section.contains(0x0fff));
    }

    #[test]
    fn test_containing_skips_non_allocatable_sections()
    {
        let index = SectionIndex {
            sections: vec![
                SectionRange {
                    name: ".debug_info".to_string(),
                    start: 0,
                    size: 0x10000,
                    allocatable: false,
                },
                SectionRange {
                    name: ".text".to_string(),
                    start: 0x1000,
                    size: 0x100,
                    allocatable: true,
                },
            ],
        };
        assert_eq!(index.containing(0x1010).map(|s| s.name.as_str()), Some(".text"));
        assert!(index.containing(0x0010).is_none());
        assert!(index.named(".debug_info").is_some());
    }

    #[test]
    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn test_load_reads_own_executable()
    {
        let path = std::env::current_exe().unwrap();
        let data = std::fs::read(&path).unwrap();
        let file = object::File::parse(&*data).unwrap();

        let symbols = SymbolTable::load(&file, &path).unwrap();
        assert_eq!(symbols.source(), SymbolSource::Static);
        assert!(symbols.len() > 0);

        let own = symbols
            .entries
            .iter()
            .find(|entry| entry.name.contains("test_load_reads_own_executable"))
            .unwrap();
        assert_eq!(symbols.nearest(own.address), Some(own.name.as_str()));
    }
}
