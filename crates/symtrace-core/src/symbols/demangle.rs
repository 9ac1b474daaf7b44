//! Symbol demangling utilities.
//!
//! Compilers "mangle" symbol names to encode type information and namespaces.
//! This module turns them back into human-readable form:
//!
//! - **Rust**: legacy (`_ZN...17h<hash>E`) and v0 (`_R...`) schemes via `rustc-demangle`
//! - **C++**: Itanium ABI (`_Z...`) via `cpp_demangle`
//! - **C**: unmangled, returned as-is
//!
//! Demangling never fails a resolution: a name that cannot be demangled is
//! returned unchanged.

use cpp_demangle::{DemangleOptions, ParseOptions, Symbol};
use rustc_demangle::try_demangle;

use super::options::{DemangleStyle, ResolveOptions};

/// Recursion limit used when `no_recurse_limit` is requested.
///
/// `cpp_demangle` rejects zero, so "no limit" is the largest accepted value.
const UNLIMITED_RECURSION: u32 = u32::MAX;

/// Apply the demangling configured in `options` to `raw`.
///
/// Returns `raw` unchanged when demangling is disabled, the style is
/// [`DemangleStyle::None`], or no scheme recognises the name.
pub fn demangle(raw: &str, options: &ResolveOptions) -> String
{
    if !options.demangle || raw.is_empty() {
        return raw.to_string();
    }

    let demangled = match options.demangle_style {
        DemangleStyle::None => None,
        DemangleStyle::Rust => demangle_rust(raw),
        DemangleStyle::GnuV3 => demangle_cpp(raw, options.no_recurse_limit),
        DemangleStyle::Auto => demangle_rust(raw).or_else(|| demangle_cpp(raw, options.no_recurse_limit)),
    };

    demangled.unwrap_or_else(|| raw.to_string())
}

fn demangle_rust(raw: &str) -> Option<String>
{
    // `{:#}` drops the trailing `::h<hash>` disambiguator.
    try_demangle(raw).ok().map(|d| format!("{d:#}"))
}

fn demangle_cpp(raw: &str, no_recurse_limit: bool) -> Option<String>
{
    if !raw.starts_with("_Z") {
        return None;
    }

    let mut parse_options = ParseOptions::default();
    if no_recurse_limit {
        parse_options = parse_options.recursion_limit(UNLIMITED_RECURSION);
    }

    Symbol::new_with_options(raw.as_bytes(), &parse_options)
        .ok()
        .and_then(|symbol| symbol.demangle(&DemangleOptions::default()).ok())
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_demangle_rust_legacy_symbol()
    {
        let options = ResolveOptions::default();
        let name = demangle("_ZN4core3fmt5write17h0123456789abcdefE", &options);
        assert_eq!(name, "core::fmt::write");
    }

    #[test]
    fn test_demangle_cpp_symbol()
    {
        let options = ResolveOptions::default();
        assert_eq!(demangle("_Z3fooi", &options), "foo(int)");
    }

    #[test]
    fn test_demangle_style_restricts_scheme()
    {
        let options = ResolveOptions {
            demangle_style: DemangleStyle::Rust,
            ..ResolveOptions::default()
        };
        assert_eq!(demangle("_Z3fooi", &options), "_Z3fooi");

        let options = ResolveOptions {
            demangle_style: DemangleStyle::None,
            ..ResolveOptions::default()
        };
        assert_eq!(demangle("_Z3fooi", &options), "_Z3fooi");
    }

    #[test]
    fn test_demangle_failure_keeps_raw_name()
    {
        let options = ResolveOptions::default();
        assert_eq!(demangle("main", &options), "main");
        assert_eq!(demangle("_Z!!garbage", &options), "_Z!!garbage");
    }

    #[test]
    fn test_demangle_disabled()
    {
        let options = ResolveOptions::raw_names();
        assert_eq!(
            demangle("_ZN4core3fmt5write17h0123456789abcdefE", &options),
            "_ZN4core3fmt5write17h0123456789abcdefE"
        );
    }
}
