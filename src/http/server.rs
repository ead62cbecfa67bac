//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router: every path falls through to one dispatch handler
//! - Wire up middleware (request ID, tracing, whole-request timeout)
//! - Buffer request bodies and hand them to the protocol classifier
//! - Await deferred (poll) responses
//! - Record request metrics

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderName, Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ServerConfig;
use crate::http::request::{HttpRequest, X_REQUEST_ID};
use crate::http::response::HttpResponse;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::routing::router::{Protocol, RequestRouter, Routed};

/// Application state injected into the dispatch handler.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<RequestRouter>,
    pub max_body_bytes: usize,
}

/// HTTP front door serving every protocol family on one listener.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server dispatching into `request_router`.
    pub fn new(config: &ServerConfig, request_router: Arc<RequestRouter>) -> Self {
        let state = AppState {
            router: request_router,
            max_body_bytes: config.listener.max_body_bytes,
        };
        let router = Self::build_router(config, state);
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ServerConfig, state: AppState) -> Router {
        let request_id = HeaderName::from_static(X_REQUEST_ID);
        Router::new()
            .fallback(dispatch_handler)
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::new(request_id.clone()))
            .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
    }

    /// Serve connections from `listener` until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.wait().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Single entry point for every request.
async fn dispatch_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let started = Instant::now();
    let (parts, body) = request.into_parts();

    let body = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(path = %parts.uri.path(), error = %e, "Failed to read request body");
            metrics::record_request(Protocol::Error, 413, started);
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    };

    let request = HttpRequest::from_parts(&parts, body, addr);
    tracing::debug!(
        request_id = %request.id,
        method = %request.method,
        path = %request.path,
        "Dispatching request"
    );

    let router = state.router.clone();
    let (protocol, routed) = match tokio::task::spawn_blocking(move || router.route(request)).await {
        Ok(routed) => routed,
        Err(e) => {
            tracing::error!(error = %e, "Dispatch task failed");
            (Protocol::Error, Routed::Ready(server_error_page(&state.router).await))
        }
    };

    let response = match routed {
        Routed::Ready(response) => response,
        Routed::Deferred(rx) => match rx.await {
            Ok(response) => response,
            Err(_) => {
                tracing::warn!(path = %parts.uri.path(), "Poll request dropped without a response");
                server_error_page(&state.router).await
            }
        },
    };

    metrics::record_request(protocol, response.status.as_u16(), started);
    response.into_axum()
}

/// The 500 page, read off the async executor.
async fn server_error_page(router: &Arc<RequestRouter>) -> HttpResponse {
    let pages = router.clone();
    match tokio::task::spawn_blocking(move || pages.pages().server_error()).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(error = %e, "Error page task failed");
            router.pages().builtin_server_error()
        }
    }
}
