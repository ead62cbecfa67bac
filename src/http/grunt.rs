//! Response descriptor to wire response translation ("grunt work").
//!
//! # Data Flow
//! ```text
//! ResponseDescriptor
//!     → empty?            → 404 "404"
//!     → status + overrides + default content type
//!     → body: base64-decode for binary families, UTF-8 otherwise
//!     → ETag = sha256(body)
//!     → If-None-Match carries the ETag? → empty 304
//! ```

use axum::http::{header, HeaderValue, StatusCode};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::error::ResponseError;
use crate::http::request::HttpRequest;
use crate::http::response::{parse_version, HttpResponse, ResponseDescriptor};

/// Content-type fragments whose bodies travel base64-encoded.
const BINARY_FAMILIES: &[&str] = &[
    "image",
    "x-shockwave-flash",
    "application/x-oar",
    "application/vnd.ll.mesh",
];

const DEFAULT_CONTENT_TYPE: &str = "text/html";

/// Whether a body of this content type is carried as base64.
pub fn is_binary_content_type(content_type: &str) -> bool {
    BINARY_FAMILIES.iter().any(|family| content_type.contains(family))
}

/// Strong ETag for a response body.
pub fn etag_for(body: &[u8]) -> String {
    format!("\"{:x}\"", Sha256::digest(body))
}

/// Translate a handler's descriptor into a response for `request`.
pub fn grunt_work(descriptor: ResponseDescriptor, request: &HttpRequest) -> Result<HttpResponse, ResponseError> {
    if descriptor.is_empty() {
        return Ok(HttpResponse::with_body(StatusCode::NOT_FOUND, "text/plain", "404"));
    }

    let code = descriptor.status.ok_or(ResponseError::MissingStatus)?;
    let status = StatusCode::from_u16(code).map_err(|_| ResponseError::InvalidStatus(code))?;

    let mut response = HttpResponse::new(status);
    response.status_text = descriptor.status_text;
    response.version = descriptor.protocol_version.as_deref().and_then(parse_version);
    response.keep_alive = descriptor.keep_alive;
    response.reuse_context = descriptor.reuse_context.unwrap_or(false);

    if status == StatusCode::MOVED_PERMANENTLY {
        let location = descriptor
            .redirect_location
            .ok_or(ResponseError::MissingRedirect(code))?;
        let value = HeaderValue::from_str(&location)
            .map_err(|_| ResponseError::InvalidHeader { name: "location" })?;
        response.headers.insert(header::LOCATION, value);
    }

    let content_type = descriptor
        .content_type
        .filter(|ct| !ct.is_empty())
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
    let content_type_value = HeaderValue::from_str(&content_type)
        .map_err(|_| ResponseError::InvalidHeader { name: "content-type" })?;
    response.headers.insert(header::CONTENT_TYPE, content_type_value);

    let text = descriptor.body.unwrap_or_default();
    let body = if is_binary_content_type(&content_type) {
        STANDARD.decode(text.trim())?
    } else {
        text.into_bytes()
    };

    let etag = etag_for(&body);
    let digest = etag.trim_matches('"');
    let not_modified = request
        .headers
        .get_all(header::IF_NONE_MATCH)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.contains(digest));
    let etag_value =
        HeaderValue::from_str(&etag).map_err(|_| ResponseError::InvalidHeader { name: "etag" })?;
    response.headers.insert(header::ETAG, etag_value);

    if not_modified {
        response.status = StatusCode::NOT_MODIFIED;
        response.status_text = Some("Not Modified".to_string());
        return Ok(response);
    }

    response.body = body.into();
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;

    fn get() -> HttpRequest {
        HttpRequest::new(Method::GET, "/caps/texture")
    }

    #[test]
    fn test_empty_descriptor_is_404() {
        let response = grunt_work(ResponseDescriptor::default(), &get()).unwrap();
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(&response.body[..], b"404");
    }

    #[test]
    fn test_missing_status_is_error() {
        let descriptor = ResponseDescriptor::default().with_body("orphan");
        assert!(matches!(
            grunt_work(descriptor, &get()),
            Err(ResponseError::MissingStatus)
        ));
    }

    #[test]
    fn test_defaults_to_text_html() {
        let descriptor = ResponseDescriptor::status(200).with_body("hello");
        let response = grunt_work(descriptor, &get()).unwrap();
        assert_eq!(response.content_type(), Some("text/html"));
        assert_eq!(&response.body[..], b"hello");
        assert_eq!(response.headers[header::ETAG], etag_for(b"hello").as_str());
    }

    #[test]
    fn test_binary_body_is_decoded() {
        let descriptor = ResponseDescriptor::binary("image/x-j2c", &[0xff, 0x4f, 0xff, 0x51]);
        let response = grunt_work(descriptor, &get()).unwrap();
        assert_eq!(&response.body[..], &[0xff, 0x4f, 0xff, 0x51]);
    }

    #[test]
    fn test_invalid_base64_is_error() {
        let descriptor = ResponseDescriptor::text("application/vnd.ll.mesh", "not base64!");
        assert!(matches!(
            grunt_work(descriptor, &get()),
            Err(ResponseError::InvalidBase64(_))
        ));
    }

    #[test]
    fn test_redirect_requires_location() {
        let response = grunt_work(ResponseDescriptor::redirect("/welcome"), &get()).unwrap();
        assert_eq!(response.status, StatusCode::MOVED_PERMANENTLY);
        assert_eq!(response.headers[header::LOCATION], "/welcome");

        assert!(matches!(
            grunt_work(ResponseDescriptor::status(301), &get()),
            Err(ResponseError::MissingRedirect(301))
        ));
    }

    #[test]
    fn test_matching_if_none_match_yields_empty_304() {
        let etag = etag_for(b"cached");
        let request = get().with_header("if-none-match", &etag);
        let response = grunt_work(ResponseDescriptor::text("text/plain", "cached"), &request).unwrap();
        assert_eq!(response.status, StatusCode::NOT_MODIFIED);
        assert!(response.body.is_empty());

        let stale = get().with_header("if-none-match", "\"deadbeef\"");
        let response = grunt_work(ResponseDescriptor::text("text/plain", "cached"), &stale).unwrap();
        assert_eq!(response.status, StatusCode::OK);
    }

    #[test]
    fn test_overrides_applied() {
        let mut descriptor = ResponseDescriptor::text("text/plain", "bye")
            .with_status_text("Gone Fishing")
            .with_keep_alive(false);
        descriptor.protocol_version = Some("HTTP/1.0".into());
        descriptor.reuse_context = Some(true);
        let response = grunt_work(descriptor, &get()).unwrap();
        assert_eq!(response.status_text.as_deref(), Some("Gone Fishing"));
        assert_eq!(response.version, Some(axum::http::Version::HTTP_10));
        assert_eq!(response.keep_alive, Some(false));
        assert!(response.reuse_context);
    }
}
