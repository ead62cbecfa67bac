//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! ListenerConfig
//!     → listener.rs (parse address, bind TcpListener)
//!     → Hand off to HTTP layer (axum::serve)
//! ```
//!
//! # Design Decisions
//! - A bind failure halts startup; there is nothing useful to do without
//!   inbound connectivity

pub mod listener;

pub use listener::{bind, ListenerError};
