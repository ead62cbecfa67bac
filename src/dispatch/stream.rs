//! Streamed handlers: registered per `(method, path)` and served without any
//! content negotiation.

use std::io::Write;
use std::sync::Arc;

use crate::error::{HandlerError, RouteError};
use crate::http::grunt::grunt_work;
use crate::http::request::{HttpRequest, RequestBag};
use crate::http::response::{HttpResponse, ResponseDescriptor};

/// Handler that returns the whole response body at once.
///
/// Returning `Ok(None)` sends the response head with no body; handlers use
/// it when there is nothing to write.
pub trait StreamedRequestHandler: Send + Sync {
    fn handle(
        &self,
        path: &str,
        request: &HttpRequest,
        response: &mut HttpResponse,
    ) -> Result<Option<Vec<u8>>, HandlerError>;
}

/// Handler that answers with a response descriptor, like a generic HTTP
/// handler, but is bound to one method and path.
pub trait GenericStreamHandler: Send + Sync {
    fn handle(&self, path: &str, request: &RequestBag) -> Result<ResponseDescriptor, HandlerError>;
}

/// Handler that writes raw bytes to an output sink.
pub trait RawStreamHandler: Send + Sync {
    fn handle(
        &self,
        path: &str,
        request: &HttpRequest,
        output: &mut dyn Write,
        response: &mut HttpResponse,
    ) -> Result<(), HandlerError>;
}

/// The three flavors a stream-table entry can take.
#[derive(Clone)]
pub enum StreamHandlerKind {
    Streamed(Arc<dyn StreamedRequestHandler>),
    Generic(Arc<dyn GenericStreamHandler>),
    Raw(Arc<dyn RawStreamHandler>),
}

/// Stream-table entry.
#[derive(Clone)]
pub struct StreamHandler {
    /// Content type the response is given before the handler runs.
    pub content_type: String,
    pub kind: StreamHandlerKind,
}

impl StreamHandler {
    pub fn streamed(content_type: &str, handler: impl StreamedRequestHandler + 'static) -> Self {
        Self {
            content_type: content_type.to_string(),
            kind: StreamHandlerKind::Streamed(Arc::new(handler)),
        }
    }

    pub fn generic(content_type: &str, handler: impl GenericStreamHandler + 'static) -> Self {
        Self {
            content_type: content_type.to_string(),
            kind: StreamHandlerKind::Generic(Arc::new(handler)),
        }
    }

    pub fn raw(content_type: &str, handler: impl RawStreamHandler + 'static) -> Self {
        Self {
            content_type: content_type.to_string(),
            kind: StreamHandlerKind::Raw(Arc::new(handler)),
        }
    }
}

impl std::fmt::Debug for StreamHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            StreamHandlerKind::Streamed(_) => "streamed",
            StreamHandlerKind::Generic(_) => "generic",
            StreamHandlerKind::Raw(_) => "raw",
        };
        f.debug_struct("StreamHandler")
            .field("content_type", &self.content_type)
            .field("kind", &kind)
            .finish()
    }
}

impl<F> StreamedRequestHandler for F
where
    F: Fn(&str, &HttpRequest, &mut HttpResponse) -> Result<Option<Vec<u8>>, HandlerError> + Send + Sync,
{
    fn handle(
        &self,
        path: &str,
        request: &HttpRequest,
        response: &mut HttpResponse,
    ) -> Result<Option<Vec<u8>>, HandlerError> {
        self(path, request, response)
    }
}

/// Run a stream handler and produce the wire response.
///
/// Bodies are written verbatim, except that an empty buffer becomes a single
/// zero byte so the client does not see an empty reply.
pub fn dispatch(handler: &StreamHandler, request: &HttpRequest) -> Result<HttpResponse, RouteError> {
    let path = request.path.as_str();
    let failed = |source: HandlerError| RouteError::Handler {
        path: path.to_string(),
        source,
    };

    let mut response = HttpResponse::new(axum::http::StatusCode::OK);
    response.set_content_type(&handler.content_type);

    let buffer = match &handler.kind {
        StreamHandlerKind::Generic(generic) => {
            let descriptor = generic.handle(path, &request.to_bag()).map_err(failed)?;
            return Ok(grunt_work(descriptor, request)?);
        }
        StreamHandlerKind::Streamed(streamed) => streamed.handle(path, request, &mut response).map_err(failed)?,
        StreamHandlerKind::Raw(raw) => {
            let mut output = Vec::new();
            raw.handle(path, request, &mut output, &mut response).map_err(failed)?;
            Some(output)
        }
    };

    if let Some(mut buffer) = buffer {
        if buffer.is_empty() {
            buffer.push(0);
        }
        response.body = buffer.into();
    }
    Ok(response)
}
