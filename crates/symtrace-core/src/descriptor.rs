//! # Descriptors
//!
//! Parsing and batching of textual backtrace descriptors.
//!
//! A descriptor has the shape emitted by `backtrace_symbols(3)`:
//!
//! ```text
//! /usr/lib/libfoo.so(bar+0x10) [0x7f0000001010]
//! ./app(+0x1a2b) [0x55d4c0001a2b]
//! ```
//!
//! Any field may be missing. Descriptors that cannot be parsed are skipped,
//! never fatal. Accepted descriptors are grouped by image so each image is
//! opened once per request, and every accepted descriptor remembers its slot
//! so results can be put back in the caller's order.

use std::collections::HashMap;

use tracing::debug;

use crate::error::ResolveError;
use crate::symbols::{ImageResolver, ResolutionOutcome};
use crate::types::AddressInfo;

/// Image path and offset text extracted from one descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDescriptor
{
    /// Text before the `(`.
    pub image: String,
    /// Text strictly between the `+` and the `)`, e.g. `0x10`.
    pub offset: String,
}

/// Extract `(image, offset)` from a descriptor.
///
/// Looks for `(`, then `+` after it, then `)` after that. Returns `None` if
/// any of the three is missing.
///
/// ```rust
/// use symtrace_core::descriptor::parse_descriptor;
///
/// let parsed = parse_descriptor("/usr/lib/libfoo.so(bar+0x10) [0x7f0000001010]").unwrap();
/// assert_eq!(parsed.image, "/usr/lib/libfoo.so");
/// assert_eq!(parsed.offset, "0x10");
///
/// assert!(parse_descriptor("/usr/lib/libfoo.so 0x10").is_none());
/// ```
pub fn parse_descriptor(descriptor: &str) -> Option<ParsedDescriptor>
{
    let open = descriptor.find('(')?;
    let plus = open + descriptor[open..].find('+')?;
    let close = plus + descriptor[plus..].find(')')?;

    Some(ParsedDescriptor {
        image: descriptor[..open].to_string(),
        offset: descriptor[plus + 1..close].to_string(),
    })
}

/// Where an accepted descriptor ended up in an [`AddressBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSlot
{
    /// Index of the descriptor in the caller's input.
    pub input: usize,
    /// Image the descriptor was grouped under.
    pub image: String,
    /// Position of its offset in that image's offset list.
    pub position: usize,
}

/// Offsets grouped by image, in encounter order.
#[derive(Debug, Clone, Default)]
pub struct AddressBatch
{
    offsets: HashMap<String, Vec<String>>,
    slots: Vec<BatchSlot>,
}

impl AddressBatch
{
    /// Offsets requested from `image`, in encounter order.
    pub fn offsets(&self, image: &str) -> Option<&[String]>
    {
        self.offsets.get(image).map(Vec::as_slice)
    }

    /// Every image with its offsets. Iteration order between images is
    /// unspecified.
    pub fn images(&self) -> impl Iterator<Item = (&str, &[String])>
    {
        self.offsets
            .iter()
            .map(|(image, offsets)| (image.as_str(), offsets.as_slice()))
    }

    /// One slot per accepted descriptor, in input order.
    pub fn slots(&self) -> &[BatchSlot]
    {
        &self.slots
    }

    /// Number of distinct images.
    pub fn image_count(&self) -> usize
    {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.offsets.is_empty()
    }

    fn push(&mut self, input: usize, parsed: ParsedDescriptor)
    {
        let offsets = self.offsets.entry(parsed.image.clone()).or_default();
        self.slots.push(BatchSlot {
            input,
            image: parsed.image,
            position: offsets.len(),
        });
        offsets.push(parsed.offset);
    }
}

/// Group descriptors by image, skipping the ones that do not parse.
pub fn batch_descriptors<S: AsRef<str>>(descriptors: &[S]) -> AddressBatch
{
    let mut batch = AddressBatch::default();
    for (input, descriptor) in descriptors.iter().enumerate() {
        match parse_descriptor(descriptor.as_ref()) {
            Some(parsed) => batch.push(input, parsed),
            None => debug!(descriptor = descriptor.as_ref(), "skipping unparseable descriptor"),
        }
    }
    batch
}

/// Per-image outcomes of a resolved [`AddressBatch`].
#[derive(Debug, Default)]
pub struct BatchOutcome
{
    results: HashMap<String, ResolutionOutcome>,
}

impl BatchOutcome
{
    pub fn get(&self, image: &str) -> Option<&ResolutionOutcome>
    {
        self.results.get(image)
    }

    /// Resolved record for one slot, if its image resolved.
    pub fn info(&self, slot: &BatchSlot) -> Option<&AddressInfo>
    {
        match self.results.get(&slot.image)? {
            Ok(infos) => infos.get(slot.position),
            Err(_) => None,
        }
    }

    /// Images whose batch failed, with the reason.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &ResolveError)>
    {
        self.results
            .iter()
            .filter_map(|(image, outcome)| outcome.as_ref().err().map(|err| (image.as_str(), err)))
    }

    pub fn len(&self) -> usize
    {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.results.is_empty()
    }
}

/// Resolve every image in `batch` once.
///
/// A failing image only affects its own entry in the outcome.
pub fn resolve_batch(resolver: &ImageResolver, batch: &AddressBatch) -> BatchOutcome
{
    let mut results = HashMap::with_capacity(batch.image_count());
    for (image, offsets) in batch.images() {
        let outcome = resolver.resolve(image, offsets, None, None);
        if let Err(err) = &outcome {
            debug!("image batch failed: {err}");
        }
        results.insert(image.to_string(), outcome);
    }
    BatchOutcome { results }
}

/// Parse, batch and resolve `descriptors`.
///
/// The result is aligned with the input: entry `i` is the record for
/// `descriptors[i]`, or `None` if that descriptor was skipped or its image
/// failed to resolve.
pub fn resolve_descriptors<S: AsRef<str>>(resolver: &ImageResolver, descriptors: &[S]) -> Vec<Option<AddressInfo>>
{
    let batch = batch_descriptors(descriptors);
    let outcome = resolve_batch(resolver, &batch);

    let mut aligned = vec![None; descriptors.len()];
    for slot in batch.slots() {
        aligned[slot.input] = outcome.info(slot).cloned();
    }
    aligned
}

/// Resolve a single descriptor.
///
/// Returns `Ok(None)` when the descriptor does not parse.
///
/// ## Errors
///
/// The [`ResolveError`] of the descriptor's image.
pub fn resolve_descriptor(resolver: &ImageResolver, descriptor: &str) -> Result<Option<AddressInfo>, ResolveError>
{
    let Some(parsed) = parse_descriptor(descriptor) else {
        return Ok(None);
    };
    let mut infos = resolver.resolve(&parsed.image, &[parsed.offset], None, None)?;
    Ok(infos.pop())
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_parse_descriptor_with_symbol()
    {
        let parsed = parse_descriptor("/usr/lib/libfoo.so(bar+0x10) [0x7f0000001010]").unwrap();
        assert_eq!(parsed.image, "/usr/lib/libfoo.so");
        assert_eq!(parsed.offset, "0x10");
    }

    #[test]
    fn test_parse_descriptor_without_symbol()
    {
        let parsed = parse_descriptor("./app(+0x1a2b) [0x55d4c0001a2b]").unwrap();
        assert_eq!(parsed.image, "./app");
        assert_eq!(parsed.offset, "0x1a2b");
    }

    #[test]
    fn test_parse_descriptor_plus_in_path()
    {
        let parsed = parse_descriptor("/usr/lib/libstdc++.so.6(+0x9f) [0x7f00]").unwrap();
        assert_eq!(parsed.image, "/usr/lib/libstdc++.so.6");
        assert_eq!(parsed.offset, "0x9f");
    }

    #[test]
    fn test_parse_descriptor_missing_delimiters()
    {
        assert!(parse_descriptor("/usr/lib/libfoo.so 0x10").is_none());
        assert!(parse_descriptor("[0x7f0000001010]").is_none());
        assert!(parse_descriptor("/usr/lib/libfoo.so(bar) [0x10]").is_none());
        assert!(parse_descriptor("/usr/lib/libfoo.so(bar+0x10").is_none());
        assert!(parse_descriptor("").is_none());
    }

    #[test]
    fn test_batch_groups_by_image_in_encounter_order()
    {
        let descriptors = [
            "/lib/a.so(f+0x1) [0x1]",
            "garbage",
            "/lib/b.so(+0x2) [0x2]",
            "/lib/a.so(g+0x3) [0x3]",
        ];
        let batch = batch_descriptors(&descriptors);

        assert_eq!(batch.image_count(), 2);
        assert_eq!(batch.offsets("/lib/a.so").unwrap(), ["0x1", "0x3"]);
        assert_eq!(batch.offsets("/lib/b.so").unwrap(), ["0x2"]);

        let slots = batch.slots();
        assert_eq!(slots.len(), 3);
        assert_eq!((slots[0].input, slots[0].position), (0, 0));
        assert_eq!((slots[1].input, slots[1].image.as_str()), (2, "/lib/b.so"));
        assert_eq!((slots[2].input, slots[2].position), (3, 1));
    }

    #[test]
    fn test_resolve_descriptors_keeps_alignment_when_images_fail()
    {
        let resolver = ImageResolver::default();
        let descriptors = ["/nonexistent/a.so(f+0x1) [0x1]", "no parens here"];
        let aligned = resolve_descriptors(&resolver, &descriptors);
        assert_eq!(aligned, vec![None, None]);
    }

    #[test]
    fn test_resolve_batch_reports_failures_per_image()
    {
        let resolver = ImageResolver::default();
        let batch = batch_descriptors(&["/nonexistent/a.so(f+0x1) [0x1]"]);
        let outcome = resolve_batch(&resolver, &batch);
        assert_eq!(outcome.len(), 1);
        let failures: Vec<_> = outcome.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "/nonexistent/a.so");
    }

    #[test]
    fn test_resolve_descriptor_unparseable_is_none()
    {
        let resolver = ImageResolver::default();
        assert!(resolve_descriptor(&resolver, "nothing").unwrap().is_none());
    }
}
