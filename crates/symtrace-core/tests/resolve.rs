//! Resolving functions of the running test binary against its own DWARF

#![cfg(any(target_os = "linux", target_os = "android"))]

use std::hint::black_box;

use symtrace_core::descriptor::{parse_descriptor, resolve_descriptors};
use symtrace_core::error::ResolveErrorKind;
use symtrace_core::platform::unix::LoadedObjects;
use symtrace_core::platform::DescriptorSource;
use symtrace_core::symbols::{ImageResolver, ResolveOptions};
use symtrace_core::Address;

#[inline(never)]
fn marker_function(x: u32) -> u32
{
    black_box(x).wrapping_mul(3)
}

#[inline(never)]
fn second_marker(x: u32) -> u32
{
    black_box(x).wrapping_add(11)
}

fn describe(function: fn(u32) -> u32) -> (String, String)
{
    let address = Address::from_ptr(function as *const ());
    let descriptors = LoadedObjects.describe(&[address]);
    let parsed = parse_descriptor(&descriptors[0]).expect("descriptor for a function of this binary");
    (parsed.image, parsed.offset)
}

#[test]
fn test_resolve_function_in_test_binary()
{
    assert_eq!(marker_function(2), 6);
    let (image, offset) = describe(marker_function);

    let infos = ImageResolver::default().resolve(&image, &[offset], None, None).unwrap();
    assert_eq!(infos.len(), 1);

    let info = &infos[0];
    assert!(info.function_name().contains("marker_function"), "{info}");
    assert!(info.file_path().ends_with("resolve.rs"), "{info}");
    assert_eq!(info.file_base_name(), "resolve.rs");
    assert!(info.line() > 0);
}

#[test]
fn test_results_keep_request_order()
{
    assert_eq!(second_marker(1), 12);
    let (image, first) = describe(marker_function);
    let (_, second) = describe(second_marker);

    let offsets = [second.clone(), "0x0".to_string(), first, second];
    let infos = ImageResolver::default().resolve(&image, &offsets, None, None).unwrap();

    assert_eq!(infos.len(), offsets.len());
    assert!(infos[0].function_name().contains("second_marker"));
    assert!(!infos[1].is_resolved());
    assert!(infos[2].function_name().contains("marker_function"));
    assert!(infos[3].function_name().contains("second_marker"));
}

#[test]
fn test_every_record_keeps_line_with_file()
{
    let (image, offset) = describe(marker_function);
    let offsets = [offset, "0x0".to_string(), "0xffffffffffff".to_string()];
    let infos = ImageResolver::default().resolve(&image, &offsets, None, None).unwrap();

    for info in &infos {
        if info.file_path().is_empty() {
            assert_eq!(info.line(), 0);
            assert_eq!(info.discriminator(), 0);
            assert!(info.file_base_name().is_empty());
        }
    }
}

#[test]
fn test_raw_names_are_not_demangled()
{
    let (image, offset) = describe(marker_function);
    let resolver = ImageResolver::new(ResolveOptions::raw_names());
    let infos = resolver.resolve(&image, &[offset], None, None).unwrap();
    let name = infos[0].function_name();
    assert!(name.contains("marker_function"));
    assert!(!name.contains("::"), "{name}");
}

#[test]
fn test_missing_section_searches_everything()
{
    let (image, offset) = describe(marker_function);
    let resolver = ImageResolver::default();
    let restricted = resolver
        .resolve(&image, &[offset.as_str()], Some(".no_such_section"), None)
        .unwrap();
    assert!(restricted[0].function_name().contains("marker_function"));

    let text = resolver.resolve(&image, &[offset.as_str()], Some(".text"), None).unwrap();
    assert!(text[0].function_name().contains("marker_function"));
}

#[test]
fn test_non_allocatable_section_rejects_address()
{
    let (image, offset) = describe(marker_function);
    let infos = ImageResolver::default()
        .resolve(&image, &[offset], Some(".debug_info"), None)
        .unwrap();
    assert!(!infos[0].is_resolved());
}

#[test]
fn test_inline_chain_starts_with_function()
{
    let (image, offset) = describe(marker_function);
    let chain = ImageResolver::default()
        .resolve_inline_chain(&image, &offset, None, None)
        .unwrap();
    assert!(!chain.is_empty());
    assert!(chain[0].function_name().contains("marker_function"));
}

#[test]
fn test_foreign_target_is_rejected()
{
    let (image, offset) = describe(marker_function);
    let err = ImageResolver::default()
        .resolve(&image, &[offset], None, Some("s390x-unknown-linux-gnu"))
        .unwrap_err();
    assert_eq!(err.kind(), ResolveErrorKind::UnrecognizedFormat);
}

#[test]
fn test_descriptors_resolve_in_input_order()
{
    let first = Address::from_ptr(marker_function as *const ());
    let second = Address::from_ptr(second_marker as *const ());
    let mut descriptors = LoadedObjects.describe(&[first, second]);
    descriptors.insert(1, "not a descriptor".to_string());

    let aligned = resolve_descriptors(&ImageResolver::default(), &descriptors);
    assert_eq!(aligned.len(), 3);
    assert!(aligned[0].as_ref().unwrap().function_name().contains("marker_function"));
    assert!(aligned[1].is_none());
    assert!(aligned[2].as_ref().unwrap().function_name().contains("second_marker"));
}
