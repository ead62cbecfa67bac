//! Outbound response types.
//!
//! # Responsibilities
//! - `ResponseDescriptor`: the abstract response generic handlers return
//! - `HttpResponse`: the concrete response every dispatcher produces, with
//!   the status-text, protocol-version and keep-alive overrides the legacy
//!   clients rely on
//! - Conversion into the listener's response type

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Response, StatusCode, Version};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use hyper::ext::ReasonPhrase;
use serde::{Deserialize, Serialize};

/// Abstract response returned by generic HTTP handlers.
///
/// A descriptor with every field unset is "empty" and is answered with 404.
/// Any non-empty descriptor must carry `status`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseDescriptor {
    pub status: Option<u16>,
    pub content_type: Option<String>,
    /// Text, or base64 when `content_type` names a binary family.
    pub body: Option<String>,
    pub status_text: Option<String>,
    /// `HTTP/1.0` or `HTTP/1.1`.
    pub protocol_version: Option<String>,
    pub keep_alive: Option<bool>,
    pub reuse_context: Option<bool>,
    /// Required when `status` is 301.
    pub redirect_location: Option<String>,
}

impl ResponseDescriptor {
    /// Descriptor with only a status code.
    pub fn status(status: u16) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// 200 response with a text body.
    pub fn text(content_type: &str, body: impl Into<String>) -> Self {
        Self::status(200).with_content_type(content_type).with_body(body)
    }

    /// 200 response carrying binary data, base64-encoded for transport.
    pub fn binary(content_type: &str, bytes: &[u8]) -> Self {
        Self::status(200)
            .with_content_type(content_type)
            .with_body(STANDARD.encode(bytes))
    }

    /// 301 redirect to `location`.
    pub fn redirect(location: impl Into<String>) -> Self {
        Self {
            redirect_location: Some(location.into()),
            ..Self::status(301)
        }
    }

    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = Some(content_type.to_string());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_status_text(mut self, text: impl Into<String>) -> Self {
        self.status_text = Some(text.into());
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = Some(keep_alive);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Concrete response produced by the router.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    /// Overrides the canonical reason phrase.
    pub status_text: Option<String>,
    /// Overrides the protocol version of the status line.
    pub version: Option<Version>,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// `Some(false)` closes the connection after this response.
    pub keep_alive: Option<bool>,
    /// Whether the handler asked for its request context to be reused.
    /// The listener manages connection reuse itself, so this is advisory.
    pub reuse_context: bool,
}

impl HttpResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            status_text: None,
            version: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            keep_alive: None,
            reuse_context: false,
        }
    }

    /// Response with a body and content type.
    pub fn with_body(status: StatusCode, content_type: &str, body: impl Into<Bytes>) -> Self {
        let mut response = Self::new(status);
        response.set_content_type(content_type);
        response.body = body.into();
        response
    }

    /// The plaintext `Not found` answer for unserviceable XML-RPC and LLSD
    /// requests.
    pub fn plain_not_found() -> Self {
        let mut response = Self::with_body(StatusCode::NOT_FOUND, "text/plain", "Not found");
        response.status_text = Some("Not Found".to_string());
        response.version = Some(Version::HTTP_10);
        response.keep_alive = Some(false);
        response
    }

    pub fn set_content_type(&mut self, content_type: &str) {
        if let Ok(value) = HeaderValue::from_str(content_type) {
            self.headers.insert(header::CONTENT_TYPE, value);
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    /// Convert into the listener's response type.
    pub fn into_axum(self) -> Response<Body> {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        if let Some(version) = self.version {
            *response.version_mut() = version;
        }
        if let Some(text) = self.status_text {
            if let Ok(reason) = ReasonPhrase::try_from(text.into_bytes()) {
                response.extensions_mut().insert(reason);
            }
        }
        match self.keep_alive {
            Some(true) => {
                response
                    .headers_mut()
                    .insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
            }
            Some(false) => {
                response
                    .headers_mut()
                    .insert(header::CONNECTION, HeaderValue::from_static("close"));
            }
            None => {}
        }
        response
    }
}

/// Parse a descriptor's protocol version override.
pub(crate) fn parse_version(text: &str) -> Option<Version> {
    match text.trim().to_ascii_uppercase().as_str() {
        "HTTP/1.0" => Some(Version::HTTP_10),
        "HTTP/1.1" => Some(Version::HTTP_11),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_descriptor() {
        assert!(ResponseDescriptor::default().is_empty());
        assert!(!ResponseDescriptor::status(200).is_empty());
        assert!(!ResponseDescriptor::default().with_body("x").is_empty());
    }

    #[test]
    fn test_descriptor_deserializes_partial_table() {
        let descriptor: ResponseDescriptor =
            serde_json::from_str(r#"{"status":301,"redirect_location":"/login"}"#).unwrap();
        assert_eq!(descriptor, ResponseDescriptor::redirect("/login"));
    }

    #[test]
    fn test_plain_not_found_into_axum() {
        let response = HttpResponse::plain_not_found().into_axum();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.version(), Version::HTTP_10);
        assert_eq!(response.headers()[header::CONNECTION], "close");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
        assert_eq!(
            response.extensions().get::<ReasonPhrase>().map(|r| r.as_bytes()),
            Some(&b"Not Found"[..])
        );
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("http/1.0"), Some(Version::HTTP_10));
        assert_eq!(parse_version("HTTP/2"), None);
    }
}
