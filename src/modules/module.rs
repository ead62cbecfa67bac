//! Region module contract.

use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::panic_message;
use crate::modules::world::World;

/// Whether one module instance serves every region or each region gets its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKind {
    /// Created once at startup and attached to every region.
    Shared,
    /// Created for each region; closed when that region is removed.
    PerRegion,
}

/// Lifecycle state of a module instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
    Discovered,
    Initialized,
    Attached,
    Loaded,
    Closed,
}

/// Failure inside a module hook.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModuleError {
    #[error("module {module} failed to initialise: {message}")]
    Initialise { module: String, message: String },

    #[error("module {module} failed to attach to region {region}: {message}")]
    Attach {
        module: String,
        region: String,
        message: String,
    },

    #[error("module {module} panicked in {hook}: {message}")]
    Panicked {
        module: String,
        hook: &'static str,
        message: String,
    },
}

impl ModuleError {
    pub fn initialise(module: &str, message: impl Into<String>) -> Self {
        ModuleError::Initialise {
            module: module.to_string(),
            message: message.into(),
        }
    }

    pub fn attach(module: &str, world: &World, message: impl Into<String>) -> Self {
        ModuleError::Attach {
            module: module.to_string(),
            region: world.name().to_string(),
            message: message.into(),
        }
    }
}

/// A pluggable behavior attached to regions.
///
/// Hooks take `&self`: shared modules are called for many regions, so any
/// state they keep needs interior mutability.
pub trait RegionModule: Send + Sync {
    /// Unique module name; used for `modules.disabled` and the per-region table.
    fn name(&self) -> &str;

    /// Replaceable capability this module provides, if any. At most one
    /// module per region ends up owning a given capability.
    fn replaceable_capability(&self) -> Option<&str> {
        None
    }

    /// Called with the module's settings before first use and again on
    /// every configuration reload.
    fn initialise(&self, _settings: &toml::Table) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Called once on shared modules after startup has finished.
    fn post_initialise(&self) {}

    /// Attach to a region. Modules register handlers and capabilities here.
    fn add_region(&self, world: &Arc<World>) -> Result<(), ModuleError>;

    /// Every module attached to the region has been attached.
    fn region_loaded(&self, _world: &Arc<World>) {}

    /// Detach from a region, undoing whatever `add_region` registered.
    fn remove_region(&self, _world: &Arc<World>) {}

    /// Release all resources. Per-region modules are closed when their region
    /// goes away; shared modules only at shutdown.
    fn close(&self) {}
}

/// Run one hook, turning a panic into a `ModuleError`.
pub(crate) fn guarded<T>(
    module: &str,
    hook: &'static str,
    f: impl FnOnce() -> Result<T, ModuleError>,
) -> Result<T, ModuleError> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(ModuleError::Panicked {
            module: module.to_string(),
            hook,
            message: panic_message(payload.as_ref()),
        }),
    }
}
