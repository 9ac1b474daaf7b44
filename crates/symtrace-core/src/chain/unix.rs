//! Unix fallback chain.
//!
//! For each address, first success wins:
//!
//! 1. The image symbol resolver, fed the address's descriptor. Accepted when
//!    function, full path and base name are all known; the line may be 0.
//! 2. The dynamic loader's nearest exported symbol, demangled.
//! 3. The dynamic loader's owning object, with a hex address label.
//! 4. The raw descriptor.
//!
//! All descriptors of a capture are batched so every image is opened once.

use tracing::debug;

use super::FrameResolver;
use crate::descriptor::{resolve_descriptor, resolve_descriptors};
use crate::error::FrameError;
use crate::frame::Frame;
use crate::platform::{DescriptorSource, DynamicLoader};
use crate::symbols::{demangle, ImageResolver, ResolveOptions};
use crate::types::{Address, AddressInfo};

/// Fallback chain over a descriptor source and a dynamic loader.
#[derive(Debug, Clone)]
pub struct UnixChain<D, L>
{
    descriptors: D,
    loader: L,
    resolver: ImageResolver,
}

#[cfg(unix)]
impl UnixChain<crate::platform::unix::LoadedObjects, crate::platform::unix::Dladdr>
{
    /// Chain over the loaded objects of this process and `dladdr`.
    pub fn system(options: ResolveOptions) -> Self
    {
        Self::new(
            crate::platform::unix::LoadedObjects,
            crate::platform::unix::Dladdr,
            options,
        )
    }
}

impl<D: DescriptorSource, L: DynamicLoader> UnixChain<D, L>
{
    pub fn new(descriptors: D, loader: L, options: ResolveOptions) -> Self
    {
        Self {
            descriptors,
            loader,
            resolver: ImageResolver::new(options),
        }
    }

    pub fn resolver(&self) -> &ImageResolver
    {
        &self.resolver
    }

    /// Resolve one address from its descriptor, without batching.
    pub fn resolve_frame(&self, address: Address, descriptor: &str) -> Frame
    {
        let info = match resolve_descriptor(&self.resolver, descriptor) {
            Ok(info) => info,
            Err(err) => {
                debug!("{err}");
                None
            }
        };
        self.fallback(address, info.as_ref(), descriptor)
    }

    fn fallback(&self, address: Address, info: Option<&AddressInfo>, descriptor: &str) -> Frame
    {
        if let Some(info) = info.filter(|info| info.has_symbol_identity()) {
            return Frame::binary_table(address, info);
        }
        debug!(%address, "binary table lookup failed, asking the dynamic loader");

        let loader = self.loader.lookup(address);
        match (loader.symbol, loader.image) {
            (Some(symbol), image) => {
                let function = demangle(&symbol, self.resolver.options());
                Frame::export_table(address, function, image.unwrap_or_default())
            }
            (None, Some(image)) => Frame::module_only(address, None, image),
            (None, None) => {
                debug!(%address, "no owning object, keeping the raw descriptor");
                let label = if descriptor.is_empty() {
                    address.hex_label()
                } else {
                    descriptor.to_string()
                };
                Frame::unresolved(address, label)
            }
        }
    }
}

impl<D: DescriptorSource, L: DynamicLoader> FrameResolver for UnixChain<D, L>
{
    fn resolve_frames(&self, addresses: &[Address]) -> Vec<Result<Frame, FrameError>>
    {
        let descriptors = self.descriptors.describe(addresses);
        let infos = resolve_descriptors(&self.resolver, &descriptors);

        addresses
            .iter()
            .enumerate()
            .map(|(i, &address)| {
                let descriptor = descriptors.get(i).map_or("", String::as_str);
                let info = infos.get(i).and_then(Option::as_ref);
                Ok(self.fallback(address, info, descriptor))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests
{
    use std::collections::HashMap;

    use super::*;
    use crate::frame::Provenance;
    use crate::platform::LoaderSymbol;

    struct FixedDescriptors(Vec<String>);

    impl DescriptorSource for FixedDescriptors
    {
        fn describe(&self, addresses: &[Address]) -> Vec<String>
        {
            self.0.iter().take(addresses.len()).cloned().collect()
        }
    }

    #[derive(Default)]
    struct FakeLoader(HashMap<u64, LoaderSymbol>);

    impl DynamicLoader for FakeLoader
    {
        fn lookup(&self, address: Address) -> LoaderSymbol
        {
            self.0.get(&address.value()).cloned().unwrap_or_default()
        }
    }

    fn chain(descriptors: &[&str], loader: FakeLoader) -> UnixChain<FixedDescriptors, FakeLoader>
    {
        UnixChain::new(
            FixedDescriptors(descriptors.iter().map(ToString::to_string).collect()),
            loader,
            ResolveOptions::default(),
        )
    }

    #[test]
    fn test_loader_symbol_used_when_image_unreadable()
    {
        let mut loader = FakeLoader::default();
        loader.0.insert(
            0x7f00_0000_1010,
            LoaderSymbol {
                symbol: Some("_Z3fooi".to_string()),
                image: Some("/nonexistent/libfoo.so".to_string()),
            },
        );
        let chain = chain(&["/nonexistent/libfoo.so(_Z3fooi+0x10) [0x7f0000001010]"], loader);

        let frames = chain.resolve_frames(&[Address::new(0x7f00_0000_1010)]);
        let frame = frames[0].as_ref().unwrap();
        assert_eq!(frame.provenance(), Provenance::ExportTable);
        assert_eq!(frame.function(), "foo(int)");
        assert_eq!(frame.full_file_path(), "/nonexistent/libfoo.so");
        assert_eq!(frame.file(), "libfoo.so");
        assert_eq!(frame.line(), 0);
    }

    #[test]
    fn test_owning_object_without_symbol_gets_hex_label()
    {
        let address = Address::new(0x7f00_0000_2000);
        let mut loader = FakeLoader::default();
        loader.0.insert(
            address.value(),
            LoaderSymbol {
                symbol: None,
                image: Some("/nonexistent/libbar.so".to_string()),
            },
        );
        let chain = chain(&["/nonexistent/libbar.so(+0x2000) [0x7f0000002000]"], loader);

        let frame = chain.resolve_frames(&[address]).remove(0).unwrap();
        assert_eq!(frame.provenance(), Provenance::ModuleOnly);
        assert_eq!(frame.function(), address.hex_label());
        assert_eq!(frame.full_file_path(), "/nonexistent/libbar.so");
    }

    #[test]
    fn test_raw_descriptor_is_last_resort()
    {
        let chain = chain(&["[0x10]"], FakeLoader::default());
        let frame = chain.resolve_frames(&[Address::new(0x10)]).remove(0).unwrap();
        assert_eq!(frame.provenance(), Provenance::Unresolved);
        assert_eq!(frame.function(), "[0x10]");
        assert_eq!(frame.line(), 0);
    }

    #[test]
    fn test_missing_descriptor_falls_back_to_hex_label()
    {
        let chain = chain(&[], FakeLoader::default());
        let address = Address::new(0x20);
        let frames = chain.resolve_frames(&[address]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref().unwrap().function(), address.hex_label());
    }

    #[test]
    fn test_single_frame_path_matches_batch()
    {
        let chain = chain(&[], FakeLoader::default());
        let frame = chain.resolve_frame(Address::new(0x30), "/nonexistent/x.so(+0x1) [0x30]");
        assert_eq!(frame.provenance(), Provenance::Unresolved);
        assert_eq!(frame.function(), "/nonexistent/x.so(+0x1) [0x30]");
    }
}
