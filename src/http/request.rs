//! Buffered view of an inbound request.
//!
//! # Responsibilities
//! - Capture method, URL, headers, body and peer address from the listener
//! - Normalize the headers the classifier switches on (Content-Type, Accept)
//! - Flatten a request into the key/value bag generic handlers receive

use axum::http::{request::Parts, HeaderMap, HeaderName, HeaderValue, Method};
use bytes::Bytes;
use indexmap::IndexMap;
use std::borrow::Cow;
use std::net::SocketAddr;

/// Header carrying the per-request correlation id.
pub const X_REQUEST_ID: &str = "x-request-id";

/// A fully buffered request as handed to the router.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Correlation id (from `x-request-id`, or empty).
    pub id: String,
    pub method: Method,
    /// Path plus query string exactly as received.
    pub raw_url: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub remote_addr: SocketAddr,
}

impl HttpRequest {
    /// Build a request for `method` on `url` (a path with optional query).
    pub fn new(method: Method, url: &str) -> Self {
        let (path, query) = match url.split_once('?') {
            Some((p, q)) => (p.to_string(), Some(q.to_string())),
            None => (url.to_string(), None),
        };
        Self {
            id: String::new(),
            method,
            raw_url: url.to_string(),
            path: if path.is_empty() { "/".to_string() } else { path },
            query,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            remote_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        }
    }

    /// Assemble a request from the listener's decoded parts.
    pub fn from_parts(parts: &Parts, body: Bytes, remote_addr: SocketAddr) -> Self {
        let raw_url = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| parts.uri.path().to_string());
        let id = parts
            .headers
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        Self {
            id,
            method: parts.method.clone(),
            raw_url,
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(str::to_string),
            headers: parts.headers.clone(),
            body,
            remote_addr,
        }
    }

    /// `name` must be a lowercase header name.
    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.append(HeaderName::from_static(name), value);
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = addr;
        self
    }

    /// First value of a header, if it is valid text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Media type of the body, lowercased, without parameters.
    pub fn content_type(&self) -> Option<String> {
        self.header("content-type")
            .map(|ct| ct.split(';').next().unwrap_or_default().trim().to_ascii_lowercase())
            .filter(|ct| !ct.is_empty())
    }

    /// Accepted media types in the order the client listed them.
    pub fn accept_types(&self) -> Vec<String> {
        self.headers
            .get_all("accept")
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(|t| t.split(';').next().unwrap_or_default().trim().to_ascii_lowercase())
            .filter(|t| !t.is_empty())
            .collect()
    }

    /// `Host` header, or an empty string.
    pub fn host(&self) -> &str {
        self.header("host").unwrap_or_default()
    }

    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Decoded query parameters; the first occurrence of a key wins.
    pub fn query_pairs(&self) -> IndexMap<String, String> {
        let mut pairs = IndexMap::new();
        if let Some(query) = &self.query {
            for (k, v) in url::form_urlencoded::parse(query.as_bytes()) {
                pairs.entry(k.into_owned()).or_insert_with(|| v.into_owned());
            }
        }
        pairs
    }

    /// Full URL as seen by the client, reconstructed from the Host header.
    pub fn url(&self) -> String {
        match self.header("host") {
            Some(host) => format!("http://{}{}", host, self.raw_url),
            None => self.raw_url.clone(),
        }
    }

    /// Flatten into the bag handed to generic HTTP and poll handlers.
    pub fn to_bag(&self) -> RequestBag {
        let headers = self
            .headers
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        RequestBag {
            body: self.body_text().into_owned(),
            uri: self.raw_url.clone(),
            content_type: self.content_type(),
            http_method: self.method.as_str().to_string(),
            query: self.query_pairs(),
            headers,
        }
    }
}

/// Flattened key/value view of a request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestBag {
    pub body: String,
    pub uri: String,
    pub content_type: Option<String>,
    pub http_method: String,
    pub query: IndexMap<String, String>,
    /// Header names are lowercase.
    pub headers: IndexMap<String, String>,
}

impl RequestBag {
    /// Look up a flattened key: `body`, `uri`, `content-type`, `http-method`,
    /// then query parameters.
    pub fn get(&self, key: &str) -> Option<&str> {
        match key {
            "body" => Some(&self.body),
            "uri" => Some(&self.uri),
            "content-type" => self.content_type.as_deref(),
            "http-method" => Some(&self.http_method),
            _ => self.query.get(key).map(String::as_str),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}
