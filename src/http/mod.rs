//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, body buffering, request ID)
//!     → request.rs (HttpRequest, flattened RequestBag)
//!     → [routing layer classifies and dispatches]
//!     → grunt.rs (response descriptor → HttpResponse, ETag/304)
//!     → pages.rs (404/500 pages)
//!     → response.rs (HttpResponse → wire response)
//!     → Send to client
//! ```

pub mod grunt;
pub mod pages;
pub mod request;
pub mod response;
pub mod server;

pub use request::{HttpRequest, RequestBag, X_REQUEST_ID};
pub use response::{HttpResponse, ResponseDescriptor};
pub use server::HttpServer;
