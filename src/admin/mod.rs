//! Admin endpoints, served as stream handlers on the main listener.

pub mod auth;
pub mod handlers;

use std::sync::{Arc, Weak};

use crate::config::AdminConfig;
use crate::dispatch::stream::StreamHandler;
use crate::error::HandlerError;
use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;
use crate::modules::ModuleController;
use crate::routing::registry::HandlerRegistries;

pub const MODULES_PATH: &str = "/admin/modules";

/// Register the admin handlers. The controller is held weakly; its regions
/// own the registries these handlers live in.
pub fn register_admin_handlers(
    registries: &HandlerRegistries,
    controller: &Arc<ModuleController>,
    config: &AdminConfig,
) -> bool {
    let controller: Weak<ModuleController> = Arc::downgrade(controller);
    let api_key = config.api_key.clone();
    let handler = move |_: &str, request: &HttpRequest, response: &mut HttpResponse| -> Result<Option<Vec<u8>>, HandlerError> {
        handlers::get_modules(&controller, &api_key, request, response)
    };

    let registered = registries.add_stream_handler("GET", MODULES_PATH, StreamHandler::streamed("application/json", handler));
    if registered {
        tracing::info!(path = MODULES_PATH, protected = !config.api_key.is_empty(), "Admin endpoint registered");
    }
    registered
}
