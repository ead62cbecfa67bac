//! XML-RPC dispatch.
//!
//! Handler failures never escape: they come back to the caller as fault
//! envelopes. Only well-formed `<methodCall>` documents that start with an
//! XML prolog are considered; everything else gets the plaintext 404.

use axum::http::StatusCode;
use std::net::SocketAddr;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::codec::xmlrpc::{XmlRpcRequest, XmlRpcResponse, XmlRpcValue, INTERNAL_ERROR, METHOD_NOT_FOUND};
use crate::error::{panic_message, HandlerError};
use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;
use crate::routing::registry::HandlerRegistries;

/// Handler registered in the XML-RPC table under a method name.
pub trait XmlRpcMethod: Send + Sync {
    fn call(&self, request: &XmlRpcRequest, peer: SocketAddr) -> Result<XmlRpcResponse, HandlerError>;
}

impl<F> XmlRpcMethod for F
where
    F: Fn(&XmlRpcRequest, SocketAddr) -> Result<XmlRpcResponse, HandlerError> + Send + Sync,
{
    fn call(&self, request: &XmlRpcRequest, peer: SocketAddr) -> Result<XmlRpcResponse, HandlerError> {
        self(request, peer)
    }
}

/// XML-RPC table entry.
pub struct XmlRpcEntry {
    pub method: Box<dyn XmlRpcMethod>,
    /// Keep-alive header value sent with this method's responses.
    pub keep_alive: bool,
}

/// Decode a request body, or `None` when it is not an XML-RPC call.
fn decode(body: &str) -> Option<XmlRpcRequest> {
    let body = body.replace("<base64></base64>", "");
    if !body.starts_with("<?xml") {
        return None;
    }
    match XmlRpcRequest::parse(&body) {
        Ok(request) => Some(request),
        Err(e) => {
            tracing::debug!(error = %e, "Unparsable XML-RPC body");
            None
        }
    }
}

/// Serve an XML-RPC request.
pub fn dispatch(registries: &HandlerRegistries, request: &HttpRequest) -> HttpResponse {
    let mut call = match decode(&request.body_text()) {
        Some(call) => call,
        None => return HttpResponse::plain_not_found(),
    };
    let method_name = match call.method_name.clone() {
        Some(name) => name,
        None => {
            tracing::warn!(url = %request.raw_url, "XML-RPC call without a method name");
            return HttpResponse::plain_not_found();
        }
    };

    let peer = request.remote_addr;
    let mut keep_alive = None;
    let reply = match registries.xmlrpc.get_exact(&method_name) {
        Some(entry) => {
            call.params.push(XmlRpcValue::String(peer.to_string()));
            call.params.push(XmlRpcValue::String(request.url()));
            call.params.push(XmlRpcValue::String(
                request.header("x-forwarded-for").unwrap_or_default().to_string(),
            ));
            keep_alive = Some(entry.keep_alive);

            let outcome = catch_unwind(AssertUnwindSafe(|| entry.method.call(&call, peer)))
                .unwrap_or_else(|payload| Err(HandlerError::Failed(panic_message(payload.as_ref()))));
            match outcome {
                Ok(reply) => reply,
                Err(e) => {
                    let message = format!(
                        "Requested method [{}] from {} threw exception: {}",
                        method_name,
                        peer.ip(),
                        e
                    );
                    tracing::error!(method = %method_name, peer = %peer, error = %e, "XML-RPC method failed");
                    XmlRpcResponse::fault(INTERNAL_ERROR, message)
                }
            }
        }
        None => {
            tracing::debug!(method = %method_name, "XML-RPC method not registered");
            XmlRpcResponse::fault(METHOD_NOT_FOUND, format!("Requested method [{}] not found", method_name))
        }
    };

    let mut response = HttpResponse::with_body(StatusCode::OK, "text/xml", reply.to_xml());
    response.keep_alive = keep_alive;
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_requires_prolog() {
        assert!(decode("<methodCall><methodName>a</methodName></methodCall>").is_none());
        assert!(decode("<?xml version=\"1.0\"?><methodCall><methodName>a</methodName></methodCall>").is_some());
        assert!(decode("<?xml version=\"1.0\"?><methodCall>").is_none());
    }

    #[test]
    fn test_decode_strips_empty_base64() {
        let call = decode(
            "<?xml version=\"1.0\"?><methodCall><methodName>a</methodName><params>\
             <param><value><base64></base64></value></param></params></methodCall>",
        )
        .unwrap();
        assert_eq!(call.params, vec![XmlRpcValue::String(String::new())]);
    }
}
