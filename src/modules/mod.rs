//! Region module subsystem.
//!
//! # Data Flow
//! ```text
//! ModuleCatalog (factories, discovery order)
//!     → controller.rs discovers + initialises shared modules at startup
//!     → per region: attach shared and per-region modules, resolve
//!       replaceable capabilities, broadcast region_loaded
//!     → modules register routes in the handler registries via World
//! ```
//!
//! # Design Decisions
//! - Capabilities are looked up through an explicit per-region registry
//! - Module hooks run under panic isolation

pub mod builtin;
pub mod catalog;
pub mod controller;
pub mod module;
pub mod world;

pub use catalog::ModuleCatalog;
pub use controller::{AttachReport, ModuleController, ModuleInfo};
pub use module::{ModuleError, ModuleKind, ModuleState, RegionModule};
pub use world::World;
