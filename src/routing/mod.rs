//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming HttpRequest (method, path, headers)
//!     → router.rs (protocol classification)
//!     → registry.rs (per-protocol handler tables)
//!     → matcher.rs (exact, then longest prefix)
//!     → Return: the dispatcher and handler to run
//! ```
//!
//! # Design Decisions
//! - Tables change at runtime as modules attach and detach
//! - No regex in hot path (prefix matching only)
//! - Deterministic: on equal-length prefixes the earliest registration wins
//! - The root path `/` never acts as a catch-all prefix

pub mod matcher;
pub mod registry;
pub mod router;

pub use registry::{HandlerRegistries, HandlerTable};
pub use router::{Protocol, RequestRouter, Routed};
