//! LLSD dispatch.
//!
//! # Data Flow
//! ```text
//! body (empty → canonical get document)
//!     → parse (XML or JSON)          ─ failure/undef ─▶ "no handler" value
//!     → legacy login guard            ─ match ───────▶ "no handler" value
//!     → longest-prefix path lookup    ─ miss ────────▶ "no handler" value
//!     → handler(path, value, peer)
//!     → encode per Accept, then Content-Type, default LLSD-XML
//! ```

use axum::http::StatusCode;
use std::net::SocketAddr;

use crate::codec::llsd::{LlsdEncoding, LlsdValue, CANONICAL_GET_XML};
use crate::error::{HandlerError, RouteError};
use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;
use crate::routing::registry::HandlerRegistries;

/// Field names that together identify a legacy viewer login body.
const LEGACY_LOGIN_FIELDS: [&str; 3] = ["passwd", "mac", "viewer_digest"];

/// Media types that mark a request as LLSD when they appear in `Accept`.
pub const LLSD_ACCEPT_TYPES: &[&str] = &["application/llsd+xml", "application/llsd+json"];

/// Content types the classifier routes straight to this dispatcher.
pub const LLSD_CONTENT_TYPES: &[&str] = &["application/llsd+xml", "application/xml+llsd", "application/llsd+json"];

/// Handler registered in the LLSD table.
pub trait LlsdHandler: Send + Sync {
    fn handle(&self, path: &str, request: &LlsdValue, peer: SocketAddr) -> Result<LlsdValue, HandlerError>;
}

impl<F> LlsdHandler for F
where
    F: Fn(&str, &LlsdValue, SocketAddr) -> Result<LlsdValue, HandlerError> + Send + Sync,
{
    fn handle(&self, path: &str, request: &LlsdValue, peer: SocketAddr) -> Result<LlsdValue, HandlerError> {
        self(path, request, peer)
    }
}

/// Whether any accepted type marks the request as LLSD.
pub fn accepts_llsd(request: &HttpRequest) -> bool {
    request
        .accept_types()
        .iter()
        .any(|t| LLSD_ACCEPT_TYPES.iter().any(|l| t.contains(l)))
}

fn encoding_of(media_type: &str) -> Option<LlsdEncoding> {
    match media_type {
        "application/llsd+xml" | "application/xml" | "text/xml" => Some(LlsdEncoding::Xml),
        "application/llsd+json" | "application/json" => Some(LlsdEncoding::Json),
        _ => None,
    }
}

/// Choose the response encoding and the content type to send with it.
///
/// The first recognized `Accept` type wins, then the request's own
/// `Content-Type`; otherwise LLSD-XML.
pub fn negotiate(request: &HttpRequest) -> (LlsdEncoding, String) {
    let accepted = request.accept_types().into_iter();
    for media_type in accepted.chain(request.content_type()) {
        if let Some(encoding) = encoding_of(&media_type) {
            return (encoding, media_type);
        }
    }
    (LlsdEncoding::Xml, "application/llsd+xml".to_string())
}

fn is_legacy_login(value: &LlsdValue) -> bool {
    value
        .as_map()
        .map(|map| LEGACY_LOGIN_FIELDS.iter().all(|field| map.contains_key(*field)))
        .unwrap_or(false)
}

/// Serve an LLSD request.
///
/// Parse errors and misses answer with the "no handler" value. A handler
/// returning [`HandlerError::NotFound`] gets the plaintext 404; any other
/// handler error propagates and becomes a 500 page.
pub fn dispatch(registries: &HandlerRegistries, request: &HttpRequest) -> Result<HttpResponse, RouteError> {
    let parsed = if request.body.iter().all(u8::is_ascii_whitespace) {
        LlsdValue::parse_xml(CANONICAL_GET_XML)
    } else {
        LlsdValue::parse(&request.body)
    };

    let reply = match parsed {
        Ok(value) if value.is_undefined() => LlsdValue::no_handler_response(),
        Ok(value) if is_legacy_login(&value) => {
            tracing::debug!(path = %request.path, "Legacy login body on LLSD path");
            LlsdValue::no_handler_response()
        }
        Ok(value) => match registries.llsd.lookup(&request.path) {
            Some(handler) => match handler.handle(&request.path, &value, request.remote_addr) {
                Ok(reply) => reply,
                Err(HandlerError::NotFound) => return Ok(HttpResponse::plain_not_found()),
                Err(source) => {
                    return Err(RouteError::Handler {
                        path: request.path.clone(),
                        source,
                    })
                }
            },
            None => LlsdValue::no_handler_response(),
        },
        Err(e) => {
            tracing::debug!(path = %request.path, error = %e, "Unparsable LLSD body");
            LlsdValue::no_handler_response()
        }
    };

    let (encoding, content_type) = negotiate(request);
    let mut response = HttpResponse::with_body(StatusCode::OK, &content_type, reply.encode(encoding));
    response.keep_alive = Some(true);
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;

    fn request(accept: Option<&str>, content_type: Option<&str>) -> HttpRequest {
        let mut req = HttpRequest::new(Method::POST, "/caps/x");
        if let Some(a) = accept {
            req = req.with_header("accept", a);
        }
        if let Some(c) = content_type {
            req = req.with_header("content-type", c);
        }
        req
    }

    #[test]
    fn test_negotiate_prefers_first_recognized_accept() {
        let req = request(Some("text/html, application/llsd+json, application/llsd+xml"), Some("application/xml"));
        assert_eq!(negotiate(&req), (LlsdEncoding::Json, "application/llsd+json".to_string()));
    }

    #[test]
    fn test_negotiate_falls_back_to_content_type() {
        let req = request(Some("text/html"), Some("application/json; charset=utf-8"));
        assert_eq!(negotiate(&req), (LlsdEncoding::Json, "application/json".to_string()));
    }

    #[test]
    fn test_negotiate_defaults_to_llsd_xml() {
        let req = request(None, Some("application/octet-stream"));
        assert_eq!(negotiate(&req), (LlsdEncoding::Xml, "application/llsd+xml".to_string()));
    }

    #[test]
    fn test_accepts_llsd_only_for_llsd_types() {
        assert!(accepts_llsd(&request(Some("application/llsd+xml"), None)));
        assert!(!accepts_llsd(&request(Some("application/xml"), None)));
    }

    #[test]
    fn test_legacy_login_detection() {
        let body = br#"{"passwd":"x","mac":"y","viewer_digest":"z","first":"a"}"#;
        assert!(is_legacy_login(&LlsdValue::parse(body).unwrap()));
        assert!(!is_legacy_login(&LlsdValue::parse(br#"{"passwd":"x"}"#).unwrap()));
    }
}
