//! Module controller: attaches modules to regions.
//!
//! # Data Flow
//! ```text
//! initialize:  discover shared modules → initialise each
//!
//! add_region_to_modules(world):
//!     shared modules      ── no capability ──▶ attach now
//!                         ── capability C ───▶ C provided? skip : defer
//!     per-region modules  ── no capability ──▶ initialise, attach now
//!                         ── capability C ───▶ C provided? skip : defer
//!     deferred shared     ── claim C ─────────▶ attach        (claim fails → skip)
//!     deferred per-region ── claim C ─────────▶ initialise, attach
//!     region_loaded → every module attached above, shared first, attach order
//!
//! remove_region_from_modules(world):
//!     remove_region on every attached module; close per-region modules
//! ```
//!
//! # Design Decisions
//! - Discovery order decides a contested capability: the first module that
//!   reaches the deferred pass claims it
//! - Every hook runs under panic isolation; a failing module is logged and
//!   skipped and the rest still load, for shared and per-region modules alike
//! - No controller lock is held while a module hook runs

use arc_swap::ArcSwap;
use indexmap::IndexMap;
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;

use crate::config::ModulesConfig;
use crate::modules::catalog::ModuleCatalog;
use crate::modules::module::{guarded, ModuleError, ModuleKind, ModuleState, RegionModule};
use crate::modules::world::World;
use crate::observability::metrics::record_module_event;

/// Snapshot of one module for discovery queries.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleInfo {
    pub name: String,
    pub kind: ModuleKind,
    pub state: ModuleState,
    pub capability: Option<String>,
    /// Regions the module is attached to.
    pub regions: Vec<String>,
}

/// What happened to each module when a region was added.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AttachReport {
    pub region: String,
    /// Attach order.
    pub attached: Vec<String>,
    /// Left out because their capability was already provided.
    pub skipped: Vec<String>,
    /// Failed a hook; the message says which.
    pub failed: Vec<String>,
}

struct SharedSlot {
    module: Arc<dyn RegionModule>,
    state: ModuleState,
}

struct Attached {
    module: Arc<dyn RegionModule>,
    kind: ModuleKind,
    state: ModuleState,
}

struct RegionEntry {
    world: Arc<World>,
    modules: IndexMap<String, Attached>,
}

/// Owns shared modules and the per-region module tables.
pub struct ModuleController {
    catalog: ModuleCatalog,
    settings: ArcSwap<ModulesConfig>,
    shared: RwLock<Vec<SharedSlot>>,
    regions: RwLock<IndexMap<Uuid, RegionEntry>>,
}

impl ModuleController {
    pub fn new(catalog: ModuleCatalog, settings: ModulesConfig) -> Self {
        Self {
            catalog,
            settings: ArcSwap::from_pointee(settings),
            shared: RwLock::new(Vec::new()),
            regions: RwLock::new(IndexMap::new()),
        }
    }

    /// Current module settings.
    pub fn settings(&self) -> Arc<ModulesConfig> {
        self.settings.load_full()
    }

    /// Discover and initialise the shared modules. Modules that fail to
    /// initialise are never attached.
    pub fn initialize(&self) -> Vec<ModuleError> {
        if !self.shared_slots().is_empty() {
            tracing::warn!("Module controller already initialized");
            return Vec::new();
        }

        let settings = self.settings();
        let mut errors = Vec::new();
        let mut slots = Vec::new();
        for module in self.catalog.discover(ModuleKind::Shared, &settings) {
            let state = match initialise(&module, &settings) {
                Ok(()) => ModuleState::Initialized,
                Err(e) => {
                    errors.push(e);
                    ModuleState::Discovered
                }
            };
            slots.push(SharedSlot { module, state });
        }

        tracing::info!(
            shared = slots.len(),
            failed = errors.len(),
            "Shared modules initialized"
        );
        *self.shared.write().unwrap_or_else(PoisonError::into_inner) = slots;
        errors
    }

    /// Tell shared modules that startup has finished.
    pub fn post_start(&self) {
        for module in self.initialized_shared() {
            let name = module.name().to_string();
            let result = guarded(&name, "post_initialise", || {
                module.post_initialise();
                Ok(())
            });
            if let Err(e) = result {
                tracing::error!(module = %name, error = %e, "Module post-initialise failed");
                record_module_event("failed");
            }
        }
    }

    /// Attach every eligible module to `world`, then notify them that the
    /// region has loaded.
    pub fn add_region_to_modules(&self, world: Arc<World>) -> AttachReport {
        let mut report = AttachReport {
            region: world.name().to_string(),
            ..Default::default()
        };
        if self.world(world.id()).is_some() {
            tracing::warn!(region = %world.name(), "Region already has modules attached");
            return report;
        }

        let settings = self.settings();
        let mut table = IndexMap::new();
        let mut loaded_shared = Vec::new();
        let mut loaded_local = Vec::new();

        let mut deferred_shared = Vec::new();
        for module in self.initialized_shared() {
            if let Some(capability) = module.replaceable_capability() {
                if world.has_capability(capability) {
                    skip(&world, &module, capability, &mut report);
                } else {
                    deferred_shared.push(module);
                }
                continue;
            }
            if attach(&world, &module, ModuleKind::Shared, &mut table, &mut report) {
                loaded_shared.push(module);
            }
        }

        let mut immediate_local = Vec::new();
        let mut deferred_local = Vec::new();
        for module in self.catalog.discover(ModuleKind::PerRegion, &settings) {
            if let Some(capability) = module.replaceable_capability() {
                if world.has_capability(capability) {
                    skip(&world, &module, capability, &mut report);
                } else {
                    deferred_local.push(module);
                }
                continue;
            }
            match initialise(&module, &settings) {
                Ok(()) => immediate_local.push(module),
                Err(e) => report.failed.push(e.to_string()),
            }
        }
        for module in immediate_local {
            if attach(&world, &module, ModuleKind::PerRegion, &mut table, &mut report) {
                loaded_local.push(module);
            }
        }

        // Modules attached so far may have registered a capability that a
        // deferred module declares.
        for module in deferred_shared {
            if !claim(&world, &module, &mut report) {
                continue;
            }
            tracing::debug!(region = %world.name(), module = module.name(), "Attaching deferred shared module");
            if attach(&world, &module, ModuleKind::Shared, &mut table, &mut report) {
                loaded_shared.push(module);
            }
        }

        let mut ready_local = Vec::new();
        for module in deferred_local {
            if !claim(&world, &module, &mut report) {
                continue;
            }
            match initialise(&module, &settings) {
                Ok(()) => ready_local.push(module),
                Err(e) => {
                    world.release_capabilities(module.name());
                    report.failed.push(e.to_string());
                }
            }
        }
        for module in ready_local {
            tracing::debug!(region = %world.name(), module = module.name(), "Attaching deferred per-region module");
            if attach(&world, &module, ModuleKind::PerRegion, &mut table, &mut report) {
                loaded_local.push(module);
            }
        }

        for module in loaded_shared.iter().chain(loaded_local.iter()) {
            let name = module.name().to_string();
            let result = guarded(&name, "region_loaded", || {
                module.region_loaded(&world);
                Ok(())
            });
            match result {
                Ok(()) => {
                    if let Some(entry) = table.get_mut(&name) {
                        entry.state = ModuleState::Loaded;
                    }
                }
                Err(e) => {
                    tracing::error!(region = %world.name(), module = %name, error = %e, "Module failed on region loaded");
                    record_module_event("failed");
                    report.failed.push(e.to_string());
                }
            }
        }

        self.mark_shared_loaded(&loaded_shared);
        tracing::info!(
            region = %world.name(),
            attached = report.attached.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Region modules loaded"
        );

        let entry = RegionEntry {
            world: world.clone(),
            modules: table,
        };
        self.regions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(world.id(), entry);
        report
    }

    /// Detach every module from the region. Per-region modules are closed;
    /// shared modules stay open for other regions. Returns false if the
    /// region had no modules attached.
    pub fn remove_region_from_modules(&self, region_id: Uuid) -> bool {
        let entry = self
            .regions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .shift_remove(&region_id);
        let Some(RegionEntry { world, modules }) = entry else {
            return false;
        };

        for (name, attached) in modules {
            tracing::debug!(region = %world.name(), module = %name, "Removing region from module");
            let result = guarded(&name, "remove_region", || {
                attached.module.remove_region(&world);
                Ok(())
            });
            if let Err(e) = result {
                tracing::error!(region = %world.name(), module = %name, error = %e, "Module failed to detach");
                record_module_event("failed");
            }
            world.release_capabilities(&name);

            if attached.kind == ModuleKind::PerRegion {
                close(&attached.module);
            }
        }

        tracing::info!(region = %world.name(), "Region removed from modules");
        true
    }

    /// Every known module: shared modules first, then the per-region modules
    /// of each region.
    pub fn all_modules(&self) -> Vec<ModuleInfo> {
        let regions = self.regions.read().unwrap_or_else(PoisonError::into_inner);
        let shared = self.shared.read().unwrap_or_else(PoisonError::into_inner);

        let mut modules: Vec<ModuleInfo> = shared
            .iter()
            .map(|slot| {
                let name = slot.module.name();
                ModuleInfo {
                    name: name.to_string(),
                    kind: ModuleKind::Shared,
                    state: slot.state,
                    capability: slot.module.replaceable_capability().map(str::to_string),
                    regions: regions
                        .values()
                        .filter(|entry| {
                            entry
                                .modules
                                .get(name)
                                .is_some_and(|attached| attached.kind == ModuleKind::Shared)
                        })
                        .map(|entry| entry.world.name().to_string())
                        .collect(),
                }
            })
            .collect();

        for entry in regions.values() {
            modules.extend(
                entry
                    .modules
                    .values()
                    .filter(|attached| attached.kind == ModuleKind::PerRegion)
                    .map(|attached| info(&entry.world, attached)),
            );
        }
        modules
    }

    /// Modules attached to one region, in attach order.
    pub fn region_modules(&self, region_id: Uuid) -> Vec<ModuleInfo> {
        let regions = self.regions.read().unwrap_or_else(PoisonError::into_inner);
        regions
            .get(&region_id)
            .map(|entry| {
                entry
                    .modules
                    .values()
                    .map(|attached| info(&entry.world, attached))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Region with modules attached.
    pub fn world(&self, region_id: Uuid) -> Option<Arc<World>> {
        let regions = self.regions.read().unwrap_or_else(PoisonError::into_inner);
        regions.get(&region_id).map(|entry| entry.world.clone())
    }

    /// Every region with modules attached, in the order they were added.
    pub fn worlds(&self) -> Vec<Arc<World>> {
        let regions = self.regions.read().unwrap_or_else(PoisonError::into_inner);
        regions.values().map(|entry| entry.world.clone()).collect()
    }

    /// Swap in new settings and re-initialise every live module with them.
    ///
    /// Changes to `disabled` apply to modules discovered from now on.
    pub fn reload_configuration(&self, settings: ModulesConfig) -> Vec<ModuleError> {
        self.settings.store(Arc::new(settings));
        let settings = self.settings();

        let mut modules = self.initialized_shared();
        {
            let regions = self.regions.read().unwrap_or_else(PoisonError::into_inner);
            for entry in regions.values() {
                modules.extend(
                    entry
                        .modules
                        .values()
                        .filter(|attached| attached.kind == ModuleKind::PerRegion)
                        .map(|attached| attached.module.clone()),
                );
            }
        }

        let errors: Vec<ModuleError> = modules
            .iter()
            .filter_map(|module| initialise(module, &settings).err())
            .collect();
        tracing::info!(modules = modules.len(), failed = errors.len(), "Module configuration reloaded");
        errors
    }

    /// Detach every region, then close the shared modules.
    pub fn shutdown(&self) {
        let ids: Vec<Uuid> = {
            let regions = self.regions.read().unwrap_or_else(PoisonError::into_inner);
            regions.keys().copied().collect()
        };
        for id in ids {
            self.remove_region_from_modules(id);
        }

        for module in self.initialized_shared() {
            close(&module);
        }
        let mut shared = self.shared.write().unwrap_or_else(PoisonError::into_inner);
        for slot in shared.iter_mut() {
            slot.state = ModuleState::Closed;
        }
        tracing::info!(shared = shared.len(), "Modules shut down");
    }

    fn shared_slots(&self) -> Vec<Arc<dyn RegionModule>> {
        let shared = self.shared.read().unwrap_or_else(PoisonError::into_inner);
        shared.iter().map(|slot| slot.module.clone()).collect()
    }

    /// Shared modules that initialised and are not closed, in discovery order.
    fn initialized_shared(&self) -> Vec<Arc<dyn RegionModule>> {
        let shared = self.shared.read().unwrap_or_else(PoisonError::into_inner);
        shared
            .iter()
            .filter(|slot| slot.state >= ModuleState::Initialized && slot.state != ModuleState::Closed)
            .map(|slot| slot.module.clone())
            .collect()
    }

    fn mark_shared_loaded(&self, loaded: &[Arc<dyn RegionModule>]) {
        let mut shared = self.shared.write().unwrap_or_else(PoisonError::into_inner);
        for slot in shared.iter_mut() {
            if loaded.iter().any(|module| Arc::ptr_eq(module, &slot.module)) {
                slot.state = slot.state.max(ModuleState::Loaded);
            }
        }
    }
}

fn info(world: &World, attached: &Attached) -> ModuleInfo {
    ModuleInfo {
        name: attached.module.name().to_string(),
        kind: attached.kind,
        state: attached.state,
        capability: attached.module.replaceable_capability().map(str::to_string),
        regions: vec![world.name().to_string()],
    }
}

fn initialise(module: &Arc<dyn RegionModule>, settings: &ModulesConfig) -> Result<(), ModuleError> {
    let name = module.name().to_string();
    let module_settings = settings.settings_for(&name);
    guarded(&name, "initialise", || module.initialise(&module_settings)).inspect_err(|e| {
        tracing::error!(module = %name, error = %e, "Module failed to initialise");
        record_module_event("failed");
    })
}

fn attach(
    world: &Arc<World>,
    module: &Arc<dyn RegionModule>,
    kind: ModuleKind,
    table: &mut IndexMap<String, Attached>,
    report: &mut AttachReport,
) -> bool {
    let name = module.name().to_string();
    if table.contains_key(&name) {
        tracing::warn!(region = %world.name(), module = %name, "A module with this name is already attached");
        report.skipped.push(name);
        record_module_event("skipped");
        return false;
    }

    match guarded(&name, "add_region", || module.add_region(world)) {
        Ok(()) => {
            tracing::debug!(region = %world.name(), module = %name, kind = ?kind, "Module attached");
            record_module_event("attached");
            table.insert(
                name.clone(),
                Attached {
                    module: module.clone(),
                    kind,
                    state: ModuleState::Attached,
                },
            );
            report.attached.push(name);
            true
        }
        Err(e) => {
            tracing::error!(region = %world.name(), module = %name, error = %e, "Module failed to attach");
            record_module_event("failed");
            world.release_capabilities(&name);
            if kind == ModuleKind::PerRegion {
                close(module);
            }
            report.failed.push(e.to_string());
            false
        }
    }
}

fn skip(world: &World, module: &Arc<dyn RegionModule>, capability: &str, report: &mut AttachReport) {
    tracing::debug!(
        region = %world.name(),
        module = module.name(),
        capability,
        provider = ?world.capability_owner(capability),
        "Not loading module because another module provides its capability"
    );
    record_module_event("skipped");
    report.skipped.push(module.name().to_string());
}

/// Claim the module's capability for it, or skip it if someone else got there first.
fn claim(world: &World, module: &Arc<dyn RegionModule>, report: &mut AttachReport) -> bool {
    let Some(capability) = module.replaceable_capability() else {
        return true;
    };
    if world.claim_capability(capability, module.name()) {
        return true;
    }
    skip(world, module, capability, report);
    false
}

fn close(module: &Arc<dyn RegionModule>) {
    let name = module.name().to_string();
    match guarded(&name, "close", || {
        module.close();
        Ok(())
    }) {
        Ok(()) => record_module_event("closed"),
        Err(e) => {
            tracing::error!(module = %name, error = %e, "Module failed to close");
            record_module_event("failed");
        }
    }
}
