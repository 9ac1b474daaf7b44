//! Build script for symtrace-core
//!
//! This script checks system requirements before compilation:
//! - Minimum Rust version (1.70.0, for `Option::is_some_and` and `let else`)
//! - Platform support for the native collaborators (descriptor source,
//!   dynamic loader, debug-info service)
//!
//! ## Requirements
//!
//! - **Rust**: 1.70.0 or newer
//! - **Linux/Android**: `dl_iterate_phdr` and `dladdr` from the C library
//! - **Other Unix**: `dladdr` from the C library
//! - **Windows**: DbgHelp (`dbghelp.dll`, shipped with the OS)

fn main()
{
    if let Ok(rustc_version) = rustc_version::version() {
        let min_rust_version = rustc_version::Version::new(1, 70, 0);

        if rustc_version < min_rust_version {
            panic!("symtrace-core requires Rust {min_rust_version} or newer, found {rustc_version}");
        }
    } else {
        // If we can't get version (e.g., in some build environments), just warn
        println!("cargo:warning=could not verify Rust version");
    }

    let family = std::env::var("CARGO_CFG_TARGET_FAMILY").unwrap_or_default();
    if !family.split(',').any(|f| f == "unix" || f == "windows") {
        // Resolution still works through injected collaborators, but
        // `Stacktrace::capture` will only ever produce unresolved frames.
        println!("cargo:warning=symtrace-core has no native symbol sources for target family '{family}'");
    }
}
