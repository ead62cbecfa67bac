//! Module discovery.
//!
//! The catalog lists module factories in registration order; that order is
//! the discovery order the loader uses everywhere, including which module
//! wins a contested capability.

use std::sync::Arc;

use crate::config::ModulesConfig;
use crate::modules::builtin;
use crate::modules::module::{ModuleKind, RegionModule};

type Factory = Box<dyn Fn() -> Arc<dyn RegionModule> + Send + Sync>;

/// Ordered module factories.
#[derive(Default)]
pub struct ModuleCatalog {
    shared: Vec<Factory>,
    per_region: Vec<Factory>,
}

impl ModuleCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// The modules that ship with the server.
    pub fn with_builtins() -> Self {
        Self::new()
            .shared(builtin::EventQueueModule::new)
            .per_region(builtin::RegionInfoModule::new)
    }

    /// Add a shared module. The factory runs once per discovery.
    pub fn shared<M, F>(mut self, factory: F) -> Self
    where
        M: RegionModule + 'static,
        F: Fn() -> M + Send + Sync + 'static,
    {
        self.shared.push(Box::new(move || Arc::new(factory()) as Arc<dyn RegionModule>));
        self
    }

    /// Add a per-region module. The factory runs for every region.
    pub fn per_region<M, F>(mut self, factory: F) -> Self
    where
        M: RegionModule + 'static,
        F: Fn() -> M + Send + Sync + 'static,
    {
        self.per_region.push(Box::new(move || Arc::new(factory()) as Arc<dyn RegionModule>));
        self
    }

    /// Instantiate every enabled module of `kind`, in registration order.
    pub fn discover(&self, kind: ModuleKind, config: &ModulesConfig) -> Vec<Arc<dyn RegionModule>> {
        let factories = match kind {
            ModuleKind::Shared => &self.shared,
            ModuleKind::PerRegion => &self.per_region,
        };
        factories
            .iter()
            .map(|factory| factory())
            .filter(|module| {
                let disabled = config.is_disabled(module.name());
                if disabled {
                    tracing::debug!(module = module.name(), kind = ?kind, "Module disabled by configuration");
                }
                !disabled
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.shared.len() + self.per_region.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::module::ModuleError;
    use crate::modules::world::World;

    struct Named(&'static str);

    impl RegionModule for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn add_region(&self, _: &Arc<World>) -> Result<(), ModuleError> {
            Ok(())
        }
    }

    #[test]
    fn test_discovery_order_and_disabled() {
        let catalog = ModuleCatalog::new()
            .shared(|| Named("one"))
            .shared(|| Named("two"))
            .shared(|| Named("three"))
            .per_region(|| Named("local"));

        let config = ModulesConfig {
            disabled: vec!["two".to_string()],
            ..Default::default()
        };
        let names: Vec<String> = catalog
            .discover(ModuleKind::Shared, &config)
            .iter()
            .map(|m| m.name().to_string())
            .collect();
        assert_eq!(names, vec!["one", "three"]);
        assert_eq!(catalog.discover(ModuleKind::PerRegion, &config).len(), 1);
        assert_eq!(catalog.len(), 4);
    }

    #[test]
    fn test_builtins() {
        let catalog = ModuleCatalog::with_builtins();
        let config = ModulesConfig::default();
        let shared = catalog.discover(ModuleKind::Shared, &config);
        let local = catalog.discover(ModuleKind::PerRegion, &config);
        assert_eq!(shared[0].name(), builtin::event_queue::MODULE_NAME);
        assert_eq!(local[0].name(), builtin::region_info::MODULE_NAME);
    }
}
