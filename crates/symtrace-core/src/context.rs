//! # Diagnostic Context
//!
//! Process-wide state of the debug-info fallback chain, made explicit.
//!
//! A [`DiagnosticContext`] owns two lazily built values:
//!
//! - the debug-info service handle, created by the initializer passed to
//!   [`DiagnosticContext::new`] on first use
//! - the module table, enumerated from that service on first use and kept
//!   sorted by base address
//!
//! Both are built at most once, under `once_cell::sync::OnceCell`, so
//! concurrent first use runs the initializer exactly once and every caller
//! observes its result. A failed initialization is remembered: the service
//! stays disabled for the lifetime of the context.

use std::fmt;

use once_cell::sync::OnceCell;
use tracing::{debug, warn};

use crate::platform::{DebugInfoService, ModuleInfo};
use crate::types::Address;

type Initializer<S> = Box<dyn Fn() -> Option<S> + Send + Sync>;

/// Modules of the process sorted by ascending base address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleTable
{
    modules: Vec<ModuleInfo>,
}

impl ModuleTable
{
    pub fn new(mut modules: Vec<ModuleInfo>) -> Self
    {
        modules.sort_by_key(|module| module.base);
        Self { modules }
    }

    pub fn len(&self) -> usize
    {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.modules.is_empty()
    }

    pub fn modules(&self) -> &[ModuleInfo]
    {
        &self.modules
    }

    /// Module owning `address`.
    ///
    /// A module owns the addresses strictly above its base and strictly below
    /// the next module's base. The last module owns everything at or above
    /// its base.
    ///
    /// ```rust
    /// use symtrace_core::context::ModuleTable;
    /// use symtrace_core::platform::ModuleInfo;
    /// use symtrace_core::Address;
    ///
    /// let table = ModuleTable::new(vec![
    ///     ModuleInfo { base: Address::new(0x2000), name: "b.dll".into() },
    ///     ModuleInfo { base: Address::new(0x1000), name: "a.dll".into() },
    /// ]);
    /// assert_eq!(table.owner(Address::new(0x1800)).unwrap().name, "a.dll");
    /// assert!(table.owner(Address::new(0x2000)).is_some());
    /// assert!(table.owner(Address::new(0x1000)).is_none());
    /// ```
    pub fn owner(&self, address: Address) -> Option<&ModuleInfo>
    {
        let idx = self.modules.partition_point(|module| module.base < address);
        match self.modules.get(idx) {
            Some(module) if module.base == address => (idx + 1 == self.modules.len()).then_some(module),
            _ => idx.checked_sub(1).and_then(|prev| self.modules.get(prev)),
        }
    }
}

/// Shared, lazily initialized state for the debug-info fallback chain.
pub struct DiagnosticContext<S>
{
    initializer: Initializer<S>,
    service: OnceCell<Option<S>>,
    modules: OnceCell<ModuleTable>,
}

impl<S: DebugInfoService> DiagnosticContext<S>
{
    /// Context whose service is created by `initializer` on first use.
    ///
    /// `None` from the initializer disables the service for good.
    pub fn new<F>(initializer: F) -> Self
    where
        F: Fn() -> Option<S> + Send + Sync + 'static,
    {
        Self {
            initializer: Box::new(initializer),
            service: OnceCell::new(),
            modules: OnceCell::new(),
        }
    }

    /// Context around an already initialized service.
    pub fn with_service(service: S) -> Self
    {
        Self {
            initializer: Box::new(|| None),
            service: OnceCell::with_value(Some(service)),
            modules: OnceCell::new(),
        }
    }

    /// The debug-info service, initializing it on first call.
    pub fn service(&self) -> Option<&S>
    {
        self.service
            .get_or_init(|| {
                let service = (self.initializer)();
                if service.is_none() {
                    warn!("debug-info service failed to initialize; using module fallback only");
                }
                service
            })
            .as_ref()
    }

    /// The module table, enumerating modules on first call.
    ///
    /// Empty when the service is unavailable.
    pub fn modules(&self) -> &ModuleTable
    {
        self.modules.get_or_init(|| {
            let table = self
                .service()
                .map(|service| ModuleTable::new(service.modules()))
                .unwrap_or_default();
            debug!(count = table.len(), "cached module table");
            table
        })
    }

    /// `true` once initialization has run and failed.
    pub fn is_disabled(&self) -> bool
    {
        matches!(self.service.get(), Some(None))
    }
}

impl<S> fmt::Debug for DiagnosticContext<S>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("DiagnosticContext")
            .field("initialized", &self.service.get().is_some())
            .field("modules", &self.modules.get().map(ModuleTable::len))
            .finish()
    }
}

#[cfg(test)]
mod tests
{
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::types::SourceLocation;

    struct NoModules;

    impl DebugInfoService for NoModules
    {
        fn symbol_name(&self, _address: Address) -> Option<String>
        {
            None
        }

        fn line_info(&self, _address: Address) -> Option<SourceLocation>
        {
            None
        }

        fn modules(&self) -> Vec<ModuleInfo>
        {
            Vec::new()
        }
    }

    fn table(bases: &[u64]) -> ModuleTable
    {
        ModuleTable::new(
            bases
                .iter()
                .map(|&base| ModuleInfo {
                    base: Address::new(base),
                    name: format!("m{base:x}"),
                })
                .collect(),
        )
    }

    fn owner_name(table: &ModuleTable, address: u64) -> Option<&str>
    {
        table.owner(Address::new(address)).map(|module| module.name.as_str())
    }

    #[test]
    fn test_owner_edge_cases()
    {
        let modules = table(&[0x3000, 0x1000, 0x2000]);
        assert_eq!(owner_name(&modules, 0x0fff), None);
        assert_eq!(owner_name(&modules, 0x1000), None);
        assert_eq!(owner_name(&modules, 0x1001), Some("m1000"));
        assert_eq!(owner_name(&modules, 0x2000), None);
        assert_eq!(owner_name(&modules, 0x2fff), Some("m2000"));
        assert_eq!(owner_name(&modules, 0x3000), Some("m3000"));
        assert_eq!(owner_name(&modules, u64::MAX), Some("m3000"));
    }

    #[test]
    fn test_owner_in_empty_table()
    {
        assert_eq!(owner_name(&ModuleTable::default(), 0x1000), None);
    }

    #[test]
    fn test_failed_initializer_runs_once()
    {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let context = DiagnosticContext::<NoModules>::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            None
        });

        assert!(context.service().is_none());
        assert!(context.service().is_none());
        assert!(context.modules().is_empty());
        assert!(context.is_disabled());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_first_use_initializes_once()
    {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let context = Arc::new(DiagnosticContext::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Some(NoModules)
        }));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let context = Arc::clone(&context);
                std::thread::spawn(move || context.service().is_some())
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
