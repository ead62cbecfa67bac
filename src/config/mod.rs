//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!     → startup builds listener, poll pool and modules from it
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → module settings are swapped in and modules are told to re-read them
//! ```
//!
//! # Design Decisions
//! - Listener, timeout and poll settings are fixed at startup; only module
//!   settings reload live
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, ErrorPagesConfig, ListenerConfig, ModulesConfig, ObservabilityConfig, PollConfig,
    RegionConfig, ServerConfig, TimeoutConfig,
};
pub use watcher::ConfigWatcher;
