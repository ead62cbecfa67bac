//! Protocol classifier.
//!
//! # Data Flow
//! ```text
//! HttpRequest
//!     → poll table match?            → poll hand-off (deferred response)
//!     → stream table (METHOD:path)?  → stream dispatch
//!     → Accept names LLSD?           → LLSD dispatch
//!     → Content-Type
//!         none / text/html / form    → generic HTTP dispatch
//!         LLSD types                 → LLSD dispatch
//!         anything else              → LLSD path? → HTTP path? → XML-RPC
//! ```
//!
//! # Design Decisions
//! - Classification is synchronous and runs on a blocking thread; only the
//!   poll hand-off produces a response later
//! - Errors and panics from any dispatcher stop here and become the 500 page
//! - Requests slower than the configured threshold are logged, never aborted

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

use crate::dispatch::poll::{PollRequest, PollServiceManager};
use crate::dispatch::{generic, llsd, stream, xmlrpc};
use crate::error::{panic_message, RouteError};
use crate::http::pages::ErrorPages;
use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;
use crate::routing::registry::{stream_key, HandlerRegistries};

/// Which protocol family served a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Poll,
    Stream,
    Llsd,
    Http,
    XmlRpc,
    /// The request failed before a dispatcher produced a response.
    Error,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Poll => "poll",
            Protocol::Stream => "stream",
            Protocol::Llsd => "llsd",
            Protocol::Http => "http",
            Protocol::XmlRpc => "xmlrpc",
            Protocol::Error => "error",
        }
    }
}

/// Outcome of routing one request.
#[derive(Debug)]
pub enum Routed {
    /// The response is ready to send.
    Ready(HttpResponse),
    /// A poll worker will answer on this channel.
    Deferred(oneshot::Receiver<HttpResponse>),
}

/// Classifies requests and dispatches them to the registered handlers.
pub struct RequestRouter {
    registries: Arc<HandlerRegistries>,
    poll: PollServiceManager,
    pages: ErrorPages,
    slow_request: Duration,
}

impl RequestRouter {
    pub fn new(
        registries: Arc<HandlerRegistries>,
        poll: PollServiceManager,
        pages: ErrorPages,
        slow_request: Duration,
    ) -> Self {
        Self {
            registries,
            poll,
            pages,
            slow_request,
        }
    }

    pub fn registries(&self) -> &Arc<HandlerRegistries> {
        &self.registries
    }

    pub fn pages(&self) -> &ErrorPages {
        &self.pages
    }

    /// Route one request.
    pub fn route(&self, request: HttpRequest) -> (Protocol, Routed) {
        let started = Instant::now();
        let id = request.id.clone();
        let method = request.method.clone();
        let url = request.raw_url.clone();

        let outcome = catch_unwind(AssertUnwindSafe(|| self.classify(request)))
            .unwrap_or_else(|payload| Err(RouteError::Panicked(panic_message(payload.as_ref()))));
        let (protocol, routed) = match outcome {
            Ok(routed) => routed,
            Err(e) => {
                tracing::error!(request_id = %id, url = %url, error = %e, "Request failed");
                (Protocol::Error, Routed::Ready(self.pages.server_error()))
            }
        };

        let elapsed = started.elapsed();
        tracing::trace!(
            request_id = %id,
            method = %method,
            url = %url,
            protocol = protocol.as_str(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Request routed"
        );
        if elapsed > self.slow_request {
            tracing::info!(
                request_id = %id,
                method = %method,
                url = %url,
                elapsed_ms = elapsed.as_millis() as u64,
                "Slow request"
            );
        }
        (protocol, routed)
    }

    fn classify(&self, request: HttpRequest) -> Result<(Protocol, Routed), RouteError> {
        let registries = &self.registries;

        if let Some(args) = registries.poll.lookup(&request.path) {
            let (tx, rx) = oneshot::channel();
            let poll = PollRequest::new((*args).clone(), request, tx);
            args.events.on_request(poll.id, &poll.request().to_bag());
            self.poll.enqueue(poll)?;
            return Ok((Protocol::Poll, Routed::Deferred(rx)));
        }

        let key = stream_key(request.method.as_str(), &request.path);
        if let Some(handler) = registries.stream.lookup(&key) {
            let response = stream::dispatch(&handler, &request)?;
            return Ok((Protocol::Stream, Routed::Ready(response)));
        }

        if llsd::accepts_llsd(&request) {
            return Ok((Protocol::Llsd, Routed::Ready(llsd::dispatch(registries, &request)?)));
        }

        let content_type = request.content_type();
        match content_type.as_deref() {
            None | Some("text/html") | Some("application/x-www-form-urlencoded") => {
                let response = generic::dispatch(registries, &self.pages, &request)?;
                Ok((Protocol::Http, Routed::Ready(response)))
            }
            Some(ct) if llsd::LLSD_CONTENT_TYPES.contains(&ct) => {
                Ok((Protocol::Llsd, Routed::Ready(llsd::dispatch(registries, &request)?)))
            }
            Some(_) => {
                // The root path is reserved for XML-RPC login.
                let routable = request.path != "/";
                if routable && registries.llsd.matches(&request.path) {
                    return Ok((Protocol::Llsd, Routed::Ready(llsd::dispatch(registries, &request)?)));
                }
                if routable && registries.http.matches(&request.path) {
                    let response = generic::dispatch(registries, &self.pages, &request)?;
                    return Ok((Protocol::Http, Routed::Ready(response)));
                }
                Ok((Protocol::XmlRpc, Routed::Ready(xmlrpc::dispatch(registries, &request))))
            }
        }
    }
}
