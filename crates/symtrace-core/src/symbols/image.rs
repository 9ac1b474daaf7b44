//! Image symbol resolution.
//!
//! [`ImageResolver`] opens one object file, answers a batch of
//! "which function, file and line is at this offset" queries against its
//! symbol table and DWARF line tables, and releases the file again.
//!
//! ## Resolution Steps
//!
//! 1. Check that the path names a non-empty file and read it
//! 2. Classify the container (archives rejected, fat Mach-O narrowed to one member)
//! 3. Load the symbol table (static, then dynamic) and the DWARF sections
//! 4. For every offset: scan it as hex, mask it to the address width, check
//!    section containment, query the line tables, unwind inliners, demangle
//!
//! Nothing is cached between calls: the parsed image lives for exactly one
//! [`ImageResolver::resolve`] call.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use addr2line::Context;
use gimli::{Dwarf, EndianArcSlice, RunTimeEndian, SectionId};
use object::read::macho::{FatArch, MachOFatFile32, MachOFatFile64};
use object::{Architecture, BinaryFormat, FileKind, Object, ObjectSection};
use once_cell::unsync::OnceCell;
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use super::demangle::demangle;
use super::lines::DiscriminatorTable;
use super::options::{ResolveOptions, MAX_INLINE_DEPTH};
use super::table::{SectionIndex, SectionRange, SymbolTable};
use crate::error::ResolveError;
use crate::types::{Address, AddressInfo};

type OwnedReader = EndianArcSlice<RunTimeEndian>;
type OwnedDwarf = Dwarf<OwnedReader>;

/// Outcome of resolving one image's batch: one record per requested offset,
/// in request order, or the error that aborted the whole batch.
pub type ResolutionOutcome = Result<Vec<AddressInfo>, ResolveError>;

/// DWARF sections read from the image, with their Mach-O spellings.
const DWARF_SECTIONS: &[(SectionId, &[&str])] = &[
    (SectionId::DebugAbbrev, &[".debug_abbrev", "__debug_abbrev"]),
    (SectionId::DebugAddr, &[".debug_addr", "__debug_addr"]),
    (SectionId::DebugInfo, &[".debug_info", "__debug_info"]),
    (SectionId::DebugLine, &[".debug_line", "__debug_line"]),
    (SectionId::DebugLineStr, &[".debug_line_str", "__debug_line_str"]),
    (SectionId::DebugRanges, &[".debug_ranges", "__debug_ranges"]),
    (SectionId::DebugRngLists, &[".debug_rnglists", "__debug_rnglists"]),
    (SectionId::DebugStr, &[".debug_str", "__debug_str"]),
    (SectionId::DebugStrOffsets, &[".debug_str_offsets", "__debug_str_offs"]),
    (SectionId::DebugTypes, &[".debug_types", "__debug_types"]),
    (SectionId::DebugLoc, &[".debug_loc", "__debug_loc"]),
    (SectionId::DebugLocLists, &[".debug_loclists", "__debug_loclists"]),
];

/// Resolves offsets inside object files to function, file and line.
///
/// The resolver only holds its [`ResolveOptions`]; it is `Send + Sync` and
/// may be shared freely.
///
/// ## Example
///
/// ```rust,no_run
/// use symtrace_core::symbols::{ImageResolver, ResolveOptions};
///
/// let resolver = ImageResolver::new(ResolveOptions::default());
/// let infos = resolver.resolve("/usr/lib/libfoo.so", &["0x1a2b"], None, None)?;
/// println!("{}", infos[0]);
/// # Ok::<(), symtrace_core::error::ResolveError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct ImageResolver
{
    options: ResolveOptions,
}

impl ImageResolver
{
    pub fn new(options: ResolveOptions) -> Self
    {
        Self { options }
    }

    pub fn options(&self) -> &ResolveOptions
    {
        &self.options
    }

    /// Resolve every offset in `offsets` against the image at `path`.
    ///
    /// `section` restricts the search to one named section; when the image
    /// has no such section a warning is logged and all sections are searched.
    /// `target` is a target triple used to pick the member of a universal
    /// binary and to reject objects built for another architecture.
    ///
    /// ## Errors
    ///
    /// Any [`ResolveError`] aborts the whole batch. Addresses that simply
    /// have no symbol are not errors; they come back as
    /// [`AddressInfo::unknown`].
    pub fn resolve<P, S>(&self, path: P, offsets: &[S], section: Option<&str>, target: Option<&str>) -> ResolutionOutcome
    where
        P: AsRef<Path>,
        S: AsRef<str>,
    {
        let path = path.as_ref();
        let _span = tracing::debug_span!("resolve_image", path = %path.display(), count = offsets.len()).entered();

        let data = read_image(path)?;
        let image = LoadedImage::parse(path, &data, target)?;
        let section = image.named_section(section);

        let mut infos = Vec::new();
        infos
            .try_reserve_exact(offsets.len())
            .map_err(|_| ResolveError::OutOfMemory {
                path: path.to_path_buf(),
                requested: offsets.len(),
            })?;

        for offset in offsets {
            let pc = image.mask(scan_hex(offset.as_ref()));
            let info = image.lookup(pc, section, &self.options);
            trace!(offset = offset.as_ref(), "{info}");
            infos.push(info);
        }

        Ok(infos)
    }

    /// Every inline record for one offset, innermost function first.
    ///
    /// Where [`resolve`](Self::resolve) folds the enclosing-inliner records
    /// into a single [`AddressInfo`], this returns them individually: the
    /// first entry carries the source line of the address itself and each
    /// further entry the call site in its caller. The walk is bounded by
    /// [`MAX_INLINE_DEPTH`]. An address with no debug info yields a single
    /// record (possibly [`AddressInfo::unknown`]).
    ///
    /// ## Errors
    ///
    /// Same as [`resolve`](Self::resolve).
    pub fn resolve_inline_chain<P: AsRef<Path>>(
        &self,
        path: P,
        offset: &str,
        section: Option<&str>,
        target: Option<&str>,
    ) -> Result<SmallVec<[AddressInfo; 4]>, ResolveError>
    {
        let path = path.as_ref();
        let data = read_image(path)?;
        let image = LoadedImage::parse(path, &data, target)?;
        let section = image.named_section(section);
        let pc = image.mask(scan_hex(offset));
        Ok(image.inline_chain(pc, section, &self.options))
    }
}

/// One inline record before demangling and merging.
#[derive(Debug, Default)]
struct InlineRecord
{
    function: Option<String>,
    file: Option<String>,
    line: u32,
}

/// An opened image. Borrows the file bytes read by the caller.
struct LoadedImage<'data>
{
    path: &'data Path,
    symbols: SymbolTable,
    sections: SectionIndex,
    dwarf: Arc<OwnedDwarf>,
    context: Context<OwnedReader>,
    discriminators: OnceCell<DiscriminatorTable>,
    address_mask: Option<u64>,
}

impl<'data> LoadedImage<'data>
{
    fn parse(path: &'data Path, data: &'data [u8], target: Option<&str>) -> Result<Self, ResolveError>
    {
        let object_data = select_object(path, data, target)?;
        let file = object::File::parse(object_data).map_err(|err| ResolveError::UnrecognizedFormat {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;

        if let Some(triple) = target {
            let wanted = architecture_from_triple(path, triple)?;
            if file.architecture() != wanted {
                return Err(ResolveError::UnrecognizedFormat {
                    path: path.to_path_buf(),
                    reason: format!("object is {:?}, target {triple} wants {wanted:?}", file.architecture()),
                });
            }
        }

        let symbols = SymbolTable::load(&file, path)?;
        let sections = SectionIndex::load(&file);
        debug!(
            symbols = symbols.len(),
            source = ?symbols.source(),
            format = ?file.format(),
            "opened image"
        );

        let endian = if file.is_little_endian() {
            RunTimeEndian::Little
        } else {
            RunTimeEndian::Big
        };
        let debug_sections = load_debug_sections(&file, path)?;
        let section_reader = |id: SectionId| {
            let data = debug_sections
                .get(&id)
                .cloned()
                .unwrap_or_else(|| Arc::<[u8]>::from(Vec::new()));
            Ok::<_, gimli::Error>(EndianArcSlice::new(data, endian))
        };

        let unavailable = |err: gimli::Error| ResolveError::SymbolTableUnavailable {
            path: path.to_path_buf(),
            reason: err.to_string(),
        };
        let dwarf = Arc::new(Dwarf::load(section_reader).map_err(unavailable)?);
        let context = Context::from_arc_dwarf(Arc::clone(&dwarf)).map_err(unavailable)?;

        Ok(Self {
            path,
            symbols,
            sections,
            dwarf,
            context,
            discriminators: OnceCell::new(),
            address_mask: elf_address_mask(&file),
        })
    }

    /// Section restriction for a batch, if a section name was given and exists.
    fn named_section(&self, name: Option<&str>) -> Option<&SectionRange>
    {
        let name = name?;
        let section = self.sections.named(name);
        if section.is_none() {
            warn!("{}: cannot find section {name}, searching all sections", self.path.display());
        }
        section
    }

    fn mask(&self, pc: u64) -> u64
    {
        self.address_mask.map_or(pc, |mask| pc & mask)
    }

    fn in_searched_section(&self, pc: u64, section: Option<&SectionRange>) -> bool
    {
        match section {
            Some(section) => section.allocatable && section.contains(pc),
            None => self.sections.containing(pc).is_some(),
        }
    }

    fn lookup(&self, pc: u64, section: Option<&SectionRange>, options: &ResolveOptions) -> AddressInfo
    {
        let address = Address::new(pc);
        if !self.in_searched_section(pc, section) {
            return AddressInfo::unknown(address);
        }

        let records = self.records(pc, options.unwind_inlines);
        let mut merged = InlineRecord::default();
        for record in records {
            if let Some(function) = record.function.filter(|f| !f.is_empty()) {
                merged.function = Some(function);
            }
            if let Some(file) = record.file.filter(|f| !f.is_empty()) {
                merged.file = Some(file);
            }
            merged.line = record.line;
        }

        if merged.function.is_none() {
            merged.function = self.symbols.nearest(pc).map(str::to_string);
        }
        if merged.function.is_none() && merged.file.is_none() {
            return AddressInfo::unknown(address);
        }

        self.finish(address, merged, options)
    }

    fn inline_chain(
        &self,
        pc: u64,
        section: Option<&SectionRange>,
        options: &ResolveOptions,
    ) -> SmallVec<[AddressInfo; 4]>
    {
        let address = Address::new(pc);
        let mut chain = SmallVec::new();
        if !self.in_searched_section(pc, section) {
            chain.push(AddressInfo::unknown(address));
            return chain;
        }

        let mut records = self.records(pc, true);
        if records.is_empty() {
            records.push(InlineRecord::default());
        }
        if records[0].function.is_none() {
            records[0].function = self.symbols.nearest(pc).map(str::to_string);
        }

        for record in records {
            chain.push(self.finish(address, record, options));
        }
        chain
    }

    /// Raw inline records for `pc`, innermost first.
    fn records(&self, pc: u64, unwind_inlines: bool) -> SmallVec<[InlineRecord; 4]>
    {
        let mut frames = match self.context.find_frames(pc).skip_all_loads() {
            Ok(frames) => frames,
            Err(err) => {
                debug!("no frames for {pc:#x}: {err}");
                return SmallVec::new();
            }
        };

        let next = || {
            frames.next().map(|frame| {
                frame.map(|frame| {
                    let function = frame
                        .function
                        .as_ref()
                        .and_then(|func| func.raw_name().ok())
                        .map(|raw| raw.into_owned());
                    let (file, line) = frame
                        .location
                        .map_or((None, 0), |loc| (loc.file.map(str::to_string), loc.line.unwrap_or(0)));
                    InlineRecord { function, file, line }
                })
            })
        };

        let (records, truncated) = walk_inline_records(pc, unwind_inlines, next);
        if truncated {
            warn!("{}: inline chain at {pc:#x} exceeds {MAX_INLINE_DEPTH} levels", self.path.display());
        }
        records
    }

    fn finish(&self, address: Address, record: InlineRecord, options: &ResolveOptions) -> AddressInfo
    {
        let function = record
            .function
            .map(|raw| demangle(&raw, options))
            .unwrap_or_default();
        let file = record.file.unwrap_or_default();
        let discriminator = if file.is_empty() { 0 } else { self.discriminator(address.value()) };
        AddressInfo::new(address, function, file, record.line, discriminator)
    }

    fn discriminator(&self, pc: u64) -> u32
    {
        self.discriminators
            .get_or_init(|| DiscriminatorTable::build(&self.dwarf))
            .lookup(pc)
    }
}

/// Pull inline records from `next` until it runs dry, keeping at most
/// `MAX_INLINE_DEPTH + 1`. The flag reports whether records were dropped.
fn walk_inline_records<E, F>(pc: u64, unwind_inlines: bool, mut next: F) -> (SmallVec<[InlineRecord; 4]>, bool)
where
    E: std::fmt::Display,
    F: FnMut() -> Result<Option<InlineRecord>, E>,
{
    let mut records = SmallVec::new();
    loop {
        match next() {
            Ok(Some(record)) => {
                if records.len() > MAX_INLINE_DEPTH {
                    return (records, true);
                }
                records.push(record);
            }
            Ok(None) => break,
            Err(err) => {
                debug!("inline walk at {pc:#x} stopped: {err}");
                break;
            }
        }
        if !unwind_inlines {
            break;
        }
    }
    (records, false)
}

fn read_image(path: &Path) -> Result<Vec<u8>, ResolveError>
{
    let unreadable = |reason: String| ResolveError::ImageUnreadable {
        path: path.to_path_buf(),
        reason,
    };

    let metadata = fs::metadata(path).map_err(|err| unreadable(err.to_string()))?;
    if !metadata.is_file() {
        return Err(unreadable("not a regular file".to_string()));
    }
    if metadata.len() == 0 {
        return Err(unreadable("file is empty".to_string()));
    }

    fs::read(path).map_err(|err| unreadable(err.to_string()))
}

/// Narrow the file to the single object that will be resolved against.
fn select_object<'data>(path: &Path, data: &'data [u8], target: Option<&str>) -> Result<&'data [u8], ResolveError>
{
    let unrecognized = |reason: String| ResolveError::UnrecognizedFormat {
        path: path.to_path_buf(),
        reason,
    };

    match FileKind::parse(data).map_err(|err| unrecognized(err.to_string()))? {
        FileKind::Archive => Err(ResolveError::UnsupportedContainer {
            path: path.to_path_buf(),
        }),
        FileKind::MachOFat32 => {
            let fat = MachOFatFile32::parse(data).map_err(|err| unrecognized(err.to_string()))?;
            select_fat_member(path, data, fat.arches(), target)
        }
        FileKind::MachOFat64 => {
            let fat = MachOFatFile64::parse(data).map_err(|err| unrecognized(err.to_string()))?;
            select_fat_member(path, data, fat.arches(), target)
        }
        _ => Ok(data),
    }
}

fn select_fat_member<'data, A: FatArch>(
    path: &Path,
    data: &'data [u8],
    arches: &[A],
    target: Option<&str>,
) -> Result<&'data [u8], ResolveError>
{
    let wanted = match target {
        Some(triple) => architecture_from_triple(path, triple)?,
        None => host_architecture(),
    };

    let mut matching = arches.iter().filter(|arch| arch.architecture() == wanted);
    match (matching.next(), matching.next()) {
        (Some(arch), None) => arch.data(data).map_err(|err| ResolveError::UnrecognizedFormat {
            path: path.to_path_buf(),
            reason: err.to_string(),
        }),
        _ => Err(ResolveError::AmbiguousFormat {
            path: path.to_path_buf(),
            candidates: arches
                .iter()
                .map(|arch| format!("{:?}", arch.architecture()))
                .collect::<Vec<_>>()
                .join(", "),
        }),
    }
}

/// Architecture named by the first component of a target triple.
fn architecture_from_triple(path: &Path, triple: &str) -> Result<Architecture, ResolveError>
{
    let arch = triple.split('-').next().unwrap_or_default();
    let architecture = match arch {
        "x86_64" | "amd64" => Architecture::X86_64,
        "aarch64" | "arm64" | "arm64e" => Architecture::Aarch64,
        "i386" | "i486" | "i586" | "i686" | "x86" => Architecture::I386,
        "riscv64" | "riscv64gc" | "riscv64imac" => Architecture::Riscv64,
        "riscv32" | "riscv32imac" | "riscv32imc" => Architecture::Riscv32,
        "powerpc64" | "powerpc64le" => Architecture::PowerPc64,
        "powerpc" => Architecture::PowerPc,
        "mips64" | "mips64el" => Architecture::Mips64,
        "mips" | "mipsel" => Architecture::Mips,
        "s390x" => Architecture::S390x,
        "wasm32" => Architecture::Wasm32,
        other if other.starts_with("arm") || other.starts_with("thumb") => Architecture::Arm,
        other => {
            return Err(ResolveError::UnrecognizedFormat {
                path: path.to_path_buf(),
                reason: format!("unknown target architecture `{other}` in {triple}"),
            })
        }
    };
    Ok(architecture)
}

fn host_architecture() -> Architecture
{
    if cfg!(target_arch = "x86_64") {
        Architecture::X86_64
    } else if cfg!(target_arch = "aarch64") {
        Architecture::Aarch64
    } else if cfg!(target_arch = "x86") {
        Architecture::I386
    } else if cfg!(target_arch = "arm") {
        Architecture::Arm
    } else if cfg!(target_arch = "riscv64") {
        Architecture::Riscv64
    } else if cfg!(target_arch = "powerpc64") {
        Architecture::PowerPc64
    } else {
        Architecture::Unknown
    }
}

/// Mask for ELF objects narrower than 64 bits. Other formats are not masked.
fn elf_address_mask(file: &object::File<'_>) -> Option<u64>
{
    if file.format() != BinaryFormat::Elf {
        return None;
    }
    let bits = u32::from(file.architecture().address_size()?.bytes()) * 8;
    (bits < 64).then(|| (1u64 << bits) - 1)
}

fn load_debug_sections(file: &object::File<'_>, path: &Path) -> Result<HashMap<SectionId, Arc<[u8]>>, ResolveError>
{
    let mut sections = HashMap::new();
    for (id, names) in DWARF_SECTIONS {
        if let Some(data) = load_section_bytes(file, names, path)? {
            sections.insert(*id, data);
        }
    }
    Ok(sections)
}

fn load_section_bytes(file: &object::File<'_>, names: &[&str], path: &Path) -> Result<Option<Arc<[u8]>>, ResolveError>
{
    for name in names {
        if let Some(section) = file.section_by_name(name) {
            let data = section
                .uncompressed_data()
                .map_err(|err| ResolveError::SymbolTableUnavailable {
                    path: path.to_path_buf(),
                    reason: format!("failed to read {name}: {err}"),
                })?;
            return Ok(Some(match data {
                Cow::Borrowed(bytes) => Arc::<[u8]>::from(bytes),
                Cow::Owned(vec) => vec.into(),
            }));
        }
    }

    Ok(None)
}

/// Scan an offset the way the command-line `addr2line` does.
///
/// Accepts an optional `+`, an optional `0x`/`0X` prefix and then as many hex
/// digits as follow. Scanning stops at the first other character; text with
/// no leading digits scans as `0`.
///
/// ```rust
/// use symtrace_core::symbols::scan_hex;
///
/// assert_eq!(scan_hex("0x1a2b"), 0x1a2b);
/// assert_eq!(scan_hex("+0X10"), 0x10);
/// assert_eq!(scan_hex("ff)junk"), 0xff);
/// assert_eq!(scan_hex("zz"), 0);
/// ```
pub fn scan_hex(text: &str) -> u64
{
    let text = text.trim_start();
    let text = text.strip_prefix('+').unwrap_or(text);
    let text = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);

    text.chars()
        .map_while(|c| c.to_digit(16))
        .fold(0u64, |acc, digit| acc.wrapping_shl(4) | u64::from(digit))
}
