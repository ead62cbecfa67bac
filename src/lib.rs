//! Simulator host front door: one HTTP listener serving streamed, generic
//! HTTP, LLSD and XML-RPC handlers plus long-poll event queues, and the
//! loader that attaches region modules.

// Core subsystems
pub mod codec;
pub mod config;
pub mod dispatch;
pub mod http;
pub mod net;
pub mod routing;

// Extension loading
pub mod admin;
pub mod modules;

// Cross-cutting concerns
pub mod error;
pub mod lifecycle;
pub mod observability;

pub use config::ServerConfig;
pub use error::{HandlerError, RouteError};
pub use http::HttpServer;
pub use lifecycle::{start, ServerHandle, Shutdown};
pub use modules::{ModuleCatalog, ModuleController, RegionModule, World};
pub use routing::HandlerRegistries;
