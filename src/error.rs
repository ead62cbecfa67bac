//! Shared error types for request handlers and the routing layer.
//!
//! # Design Decisions
//! - Handler failures are values, never panics; dispatchers convert them
//!   into protocol-shaped responses (fault envelopes, 500 pages)
//! - Transport write failures are not represented here; they are logged and
//!   swallowed where they occur

use thiserror::Error;

/// Error returned by a registered request handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler has nothing to serve for this request.
    ///
    /// LLSD handlers use this to ask for a plaintext 404 instead of a body.
    #[error("not found")]
    NotFound,

    /// The request was understood but rejected.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The handler failed while processing the request.
    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    /// Convenience constructor for [`HandlerError::Failed`].
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Error translating a response descriptor into an HTTP response.
#[derive(Debug, Error)]
pub enum ResponseError {
    /// A non-empty descriptor did not carry a status code.
    #[error("response descriptor has no status code")]
    MissingStatus,

    /// A 301 descriptor did not carry a redirect location.
    #[error("status {0} requires a redirect location")]
    MissingRedirect(u16),

    /// The status code is outside the valid HTTP range.
    #[error("invalid status code {0}")]
    InvalidStatus(u16),

    /// A binary body was not valid base64.
    #[error("binary body is not valid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    /// A header value could not be encoded.
    #[error("invalid header value for {name}")]
    InvalidHeader { name: &'static str },
}

/// Error raised while classifying or dispatching a request.
///
/// Any of these reaching the top of the router becomes a 500 page.
#[derive(Debug, Error)]
pub enum RouteError {
    /// A generic HTTP handler failed.
    #[error("handler for {path} failed: {source}")]
    Handler {
        path: String,
        #[source]
        source: HandlerError,
    },

    /// The handler's response descriptor was malformed.
    #[error(transparent)]
    Response(#[from] ResponseError),

    /// The poll worker pool is no longer accepting requests.
    #[error("poll service queue is closed")]
    PollQueueClosed,

    /// A handler panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),
}

/// Render a panic payload as text.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_variants() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");

        let payload: Box<dyn std::any::Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
    }

    #[test]
    fn test_route_error_display() {
        let err = RouteError::Handler {
            path: "/caps/seed".into(),
            source: HandlerError::failed("database down"),
        };
        assert_eq!(err.to_string(), "handler for /caps/seed failed: database down");

        let payload: Box<dyn std::any::Any + Send> = Box::new("index out of bounds");
        let err = RouteError::Panicked(panic_message(payload.as_ref()));
        assert_eq!(err.to_string(), "handler panicked: index out of bounds");
    }
}
