//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Bind listener → Registries + router + poll pool → Modules → Regions → Serve
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Detach regions → Close modules → Stop accepting → Drain → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: listener first, then core, then modules, then traffic
//! - Ordered shutdown: modules first so they can unregister their handlers

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{start, ServerHandle, StartupError};
