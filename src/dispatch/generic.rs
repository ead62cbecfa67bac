//! Generic HTTP dispatch.
//!
//! Handlers map the flattened request bag to a response descriptor, which
//! grunt work turns into the wire response.

use axum::http::{Method, StatusCode};

use crate::error::{HandlerError, RouteError};
use crate::http::grunt::grunt_work;
use crate::http::pages::ErrorPages;
use crate::http::request::{HttpRequest, RequestBag};
use crate::http::response::{HttpResponse, ResponseDescriptor};
use crate::routing::registry::HandlerRegistries;

/// Handler registered in the generic HTTP table.
pub trait GenericHttpHandler: Send + Sync {
    fn handle(&self, request: &RequestBag) -> Result<ResponseDescriptor, HandlerError>;
}

impl<F> GenericHttpHandler for F
where
    F: Fn(&RequestBag) -> Result<ResponseDescriptor, HandlerError> + Send + Sync,
{
    fn handle(&self, request: &RequestBag) -> Result<ResponseDescriptor, HandlerError> {
        self(request)
    }
}

/// Serve a request from the generic HTTP table.
///
/// `OPTIONS` is answered with an empty 200. A `method` query parameter
/// selects the handler by that name instead of by path. Misses get the 404
/// page.
pub fn dispatch(
    registries: &HandlerRegistries,
    pages: &ErrorPages,
    request: &HttpRequest,
) -> Result<HttpResponse, RouteError> {
    if request.method == Method::OPTIONS {
        return Ok(HttpResponse::new(StatusCode::OK));
    }

    let bag = request.to_bag();
    let (key, handler) = match bag.query.get("method") {
        Some(name) => (name.clone(), registries.http.get_exact(name)),
        None => (request.path.clone(), registries.http.lookup(&request.path)),
    };

    let handler = match handler {
        Some(handler) => handler,
        None => {
            tracing::debug!(key = %key, "No generic HTTP handler");
            return Ok(pages.not_found(request.host()));
        }
    };

    let descriptor = handler.handle(&bag).map_err(|source| RouteError::Handler {
        path: key,
        source,
    })?;
    Ok(grunt_work(descriptor, request)?)
}
