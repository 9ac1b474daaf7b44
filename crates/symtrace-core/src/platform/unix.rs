//! Unix collaborators: loaded-object descriptors and `dladdr`.
//!
//! Descriptors carry the offset of an address inside its object file, so the
//! image resolver can look it up against the file's own virtual addresses:
//!
//! - **Linux / Android**: objects and their load bias come from
//!   `dl_iterate_phdr`; offset = address - bias.
//! - **Apple**: `dladdr` names the object, dyld reports its slide; offset =
//!   address - slide.
//! - **Other unix**: `dladdr`; offset = address - object base.

use std::ffi::{c_void, CStr};

use super::{DescriptorSource, DynamicLoader, LoaderSymbol};
use crate::types::Address;

/// Describes addresses using the objects currently loaded in the process.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadedObjects;

/// Dynamic loader lookups through `dladdr(3)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Dladdr;

fn descriptor(image: &str, offset: u64, address: Address) -> String
{
    format!("{image}(+{offset:#x}) [{address:#x}]")
}

/// Descriptor for an address no loaded object claims.
fn bare_descriptor(address: Address) -> String
{
    format!("[{address:#x}]")
}

#[cfg(any(target_os = "linux", target_os = "android"))]
mod objects
{
    use std::ffi::{c_int, c_void, CStr};
    use std::slice;

    /// One object reported by `dl_iterate_phdr`.
    #[derive(Debug)]
    pub(super) struct LoadedObject
    {
        pub path: String,
        pub bias: u64,
        /// Absolute `[start, end)` ranges of the `PT_LOAD` segments.
        pub segments: Vec<(u64, u64)>,
    }

    impl LoadedObject
    {
        pub fn contains(&self, address: u64) -> bool
        {
            self.segments
                .iter()
                .any(|&(start, end)| start <= address && address < end)
        }
    }

    pub(super) fn loaded_objects() -> Vec<LoadedObject>
    {
        let mut objects: Vec<LoadedObject> = Vec::new();
        unsafe {
            libc::dl_iterate_phdr(Some(callback), (&mut objects as *mut Vec<LoadedObject>).cast::<c_void>());
        }

        // The main executable is reported with an empty name.
        let main_path = std::env::current_exe()
            .ok()
            .map(|path| path.to_string_lossy().into_owned());
        for object in &mut objects {
            if object.path.is_empty() {
                if let Some(path) = &main_path {
                    object.path.clone_from(path);
                }
            }
        }
        objects
    }

    extern "C" fn callback(info: *mut libc::dl_phdr_info, _size: libc::size_t, data: *mut c_void) -> c_int
    {
        unsafe {
            let objects = &mut *data.cast::<Vec<LoadedObject>>();
            let info = &*info;
            if info.dlpi_phdr.is_null() || info.dlpi_phnum == 0 {
                return 0;
            }

            let path = if info.dlpi_name.is_null() {
                String::new()
            } else {
                CStr::from_ptr(info.dlpi_name).to_string_lossy().into_owned()
            };

            let bias = info.dlpi_addr as u64;
            let headers = slice::from_raw_parts(info.dlpi_phdr, usize::from(info.dlpi_phnum));
            let segments = headers
                .iter()
                .filter(|header| header.p_type == libc::PT_LOAD)
                .map(|header| {
                    let start = bias.wrapping_add(header.p_vaddr as u64);
                    (start, start.wrapping_add(header.p_memsz as u64))
                })
                .collect();

            objects.push(LoadedObject { path, bias, segments });
        }
        0
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
impl DescriptorSource for LoadedObjects
{
    fn describe(&self, addresses: &[Address]) -> Vec<String>
    {
        let objects = objects::loaded_objects();
        tracing::trace!(count = objects.len(), "enumerated loaded objects");

        addresses
            .iter()
            .map(|&address| {
                objects
                    .iter()
                    .find(|object| object.contains(address.value()))
                    .map_or_else(
                        || bare_descriptor(address),
                        |object| descriptor(&object.path, address.value().wrapping_sub(object.bias), address),
                    )
            })
            .collect()
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
impl DescriptorSource for LoadedObjects
{
    fn describe(&self, addresses: &[Address]) -> Vec<String>
    {
        addresses
            .iter()
            .map(|&address| match dladdr(address) {
                Some(info) if !info.image.is_empty() => {
                    let offset = address.value().wrapping_sub(object_slide(info.base));
                    descriptor(&info.image, offset, address)
                }
                _ => bare_descriptor(address),
            })
            .collect()
    }
}

/// Amount to subtract from a runtime address to get the file's virtual address.
#[cfg(any(target_os = "macos", target_os = "ios"))]
fn object_slide(base: u64) -> u64
{
    let count = unsafe { libc::_dyld_image_count() };
    (0..count)
        .find(|&index| unsafe { libc::_dyld_get_image_header(index) } as usize as u64 == base)
        .map_or(base, |index| unsafe { libc::_dyld_get_image_vmaddr_slide(index) } as u64)
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "macos", target_os = "ios")))]
fn object_slide(base: u64) -> u64
{
    base
}

/// Raw `Dl_info` fields, copied out.
struct DlInfo
{
    image: String,
    #[cfg_attr(any(target_os = "linux", target_os = "android"), allow(dead_code))]
    base: u64,
    symbol: Option<String>,
}

fn dladdr(address: Address) -> Option<DlInfo>
{
    let mut info = std::mem::MaybeUninit::<libc::Dl_info>::zeroed();
    let ok = unsafe { libc::dladdr(address.value() as usize as *const c_void, info.as_mut_ptr()) };
    if ok == 0 {
        return None;
    }

    let info = unsafe { info.assume_init() };
    let image = if info.dli_fname.is_null() {
        String::new()
    } else {
        unsafe { CStr::from_ptr(info.dli_fname) }
            .to_string_lossy()
            .into_owned()
    };
    let symbol = if info.dli_sname.is_null() {
        None
    } else {
        Some(
            unsafe { CStr::from_ptr(info.dli_sname) }
                .to_string_lossy()
                .into_owned(),
        )
    };

    Some(DlInfo {
        image,
        base: info.dli_fbase as usize as u64,
        symbol,
    })
}

impl DynamicLoader for Dladdr
{
    fn lookup(&self, address: Address) -> LoaderSymbol
    {
        match dladdr(address) {
            Some(info) => LoaderSymbol {
                symbol: info.symbol.filter(|name| !name.is_empty()),
                image: Some(info.image).filter(|image| !image.is_empty()),
            },
            None => LoaderSymbol::default(),
        }
    }
}
