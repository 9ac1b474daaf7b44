//! Debug-info fallback chain, as used on Windows.
//!
//! 1. Symbol and line from the debug-info service ⇒ `Debug` frame.
//! 2. Otherwise the owning module from the context's module table. With an
//!    owner, the frame is labelled with the service's symbol name if there is
//!    one, else the hex address, and its file is the module name. Without an
//!    owner the frame cannot be built.
//!
//! The chain is decided per address: a service that answers for some
//! addresses and not for others mixes both frame kinds in one capture.

use tracing::debug;

use super::FrameResolver;
use crate::context::DiagnosticContext;
use crate::error::FrameError;
use crate::frame::Frame;
use crate::platform::DebugInfoService;
use crate::types::Address;

/// Fallback chain over a shared [`DiagnosticContext`].
#[derive(Debug)]
pub struct WindowsChain<'a, S>
{
    context: &'a DiagnosticContext<S>,
}

impl<'a, S: DebugInfoService> WindowsChain<'a, S>
{
    pub fn new(context: &'a DiagnosticContext<S>) -> Self
    {
        Self { context }
    }

    /// Resolve one address.
    ///
    /// ## Errors
    ///
    /// [`FrameError::ConstructionFailed`] when no loaded module owns the address.
    pub fn resolve_frame(&self, address: Address) -> Result<Frame, FrameError>
    {
        let service = self.context.service();

        if let Some(service) = service {
            if let (Some(function), Some(location)) = (service.symbol_name(address), service.line_info(address)) {
                return Ok(Frame::debug(address, function, location.file, location.line));
            }
        }
        debug!(%address, "no debug info, falling back to module ownership");

        let module = self
            .context
            .modules()
            .owner(address)
            .ok_or_else(|| FrameError::construction(address, "no loaded module owns the address"))?;
        let symbol = service.and_then(|service| service.symbol_name(address));

        Ok(Frame::module_only(address, symbol, module.name.clone()))
    }
}

impl<S: DebugInfoService> FrameResolver for WindowsChain<'_, S>
{
    fn resolve_frames(&self, addresses: &[Address]) -> Vec<Result<Frame, FrameError>>
    {
        addresses.iter().map(|&address| self.resolve_frame(address)).collect()
    }
}

#[cfg(test)]
mod tests
{
    use std::collections::HashMap;

    use super::*;
    use crate::frame::Provenance;
    use crate::platform::ModuleInfo;
    use crate::types::SourceLocation;

    #[derive(Default)]
    struct FakeService
    {
        symbols: HashMap<u64, String>,
        lines: HashMap<u64, SourceLocation>,
        modules: Vec<ModuleInfo>,
    }

    impl DebugInfoService for FakeService
    {
        fn symbol_name(&self, address: Address) -> Option<String>
        {
            self.symbols.get(&address.value()).cloned()
        }

        fn line_info(&self, address: Address) -> Option<SourceLocation>
        {
            self.lines.get(&address.value()).cloned()
        }

        fn modules(&self) -> Vec<ModuleInfo>
        {
            self.modules.clone()
        }
    }

    fn service() -> FakeService
    {
        let mut service = FakeService {
            modules: vec![
                ModuleInfo {
                    base: Address::new(0x2000),
                    name: "kernel32".to_string(),
                },
                ModuleInfo {
                    base: Address::new(0x1000),
                    name: "app".to_string(),
                },
            ],
            ..FakeService::default()
        };
        service.symbols.insert(0x1010, "main".to_string());
        service
            .lines
            .insert(0x1010, SourceLocation::new(r"C:\src\app\main.cpp", 17));
        service.symbols.insert(0x2020, "BaseThreadInitThunk".to_string());
        service
    }

    #[test]
    fn test_debug_info_frame()
    {
        let context = DiagnosticContext::with_service(service());
        let frame = WindowsChain::new(&context).resolve_frame(Address::new(0x1010)).unwrap();
        assert_eq!(frame.provenance(), Provenance::Debug);
        assert_eq!(frame.file(), "main.cpp");
        assert_eq!(frame.line(), 17);
        assert_eq!(frame.to_string(), "main in main.cpp:17");
    }

    #[test]
    fn test_symbol_without_line_uses_module()
    {
        let context = DiagnosticContext::with_service(service());
        let frame = WindowsChain::new(&context).resolve_frame(Address::new(0x2020)).unwrap();
        assert_eq!(frame.provenance(), Provenance::ModuleOnly);
        assert_eq!(frame.function(), "BaseThreadInitThunk");
        assert_eq!(frame.to_string(), "BaseThreadInitThunk in kernel32");
    }

    #[test]
    fn test_owned_address_without_symbol_gets_hex_label()
    {
        let context = DiagnosticContext::with_service(service());
        let address = Address::new(0x1500);
        let frame = WindowsChain::new(&context).resolve_frame(address).unwrap();
        assert_eq!(frame.function(), address.hex_label());
        assert_eq!(frame.file(), "app");
    }

    #[test]
    fn test_unowned_address_fails_construction()
    {
        let context = DiagnosticContext::with_service(service());
        let chain = WindowsChain::new(&context);
        assert!(chain.resolve_frame(Address::new(0x0800)).is_err());
        // Equal to the base of a module that is not the last one.
        assert!(chain.resolve_frame(Address::new(0x1000)).is_err());
    }

    #[test]
    fn test_disabled_service_fails_every_frame()
    {
        let context = DiagnosticContext::<FakeService>::new(|| None);
        let results = WindowsChain::new(&context).resolve_frames(&[Address::new(0x1010), Address::new(0x2020)]);
        assert!(results.iter().all(Result::is_err));
    }
}
