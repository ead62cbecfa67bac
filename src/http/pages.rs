//! 404 and 500 error pages.
//!
//! Pages are read from `http_404.html` / `http_500.html` in the configured
//! directory on every use, so operators can edit them without a restart.
//! Built-in pages are used when the files are absent.

use axum::http::StatusCode;
use std::path::PathBuf;

use crate::codec::xml::escape;
use crate::config::{ErrorPagesConfig, ListenerConfig};
use crate::http::response::HttpResponse;

const NOT_FOUND_FILE: &str = "http_404.html";
const SERVER_ERROR_FILE: &str = "http_500.html";

/// Source of the HTML error pages.
#[derive(Debug, Clone)]
pub struct ErrorPages {
    directory: PathBuf,
    mask_status: bool,
    default_host: String,
}

impl ErrorPages {
    pub fn new(config: &ErrorPagesConfig) -> Self {
        Self {
            directory: PathBuf::from(&config.directory),
            mask_status: config.mask_status,
            default_host: ListenerConfig::default().host_name,
        }
    }

    /// Host named in the 404 page when the request carries no `Host` header.
    pub fn with_default_host(mut self, host: impl Into<String>) -> Self {
        self.default_host = host.into();
        self
    }

    /// 404 page. `host` is named in the built-in page's login hint.
    pub fn not_found(&self, host: &str) -> HttpResponse {
        let host = if host.is_empty() { self.default_host.as_str() } else { host };
        let html = self
            .read(NOT_FOUND_FILE)
            .unwrap_or_else(|| default_not_found(host));
        self.page(StatusCode::NOT_FOUND, html)
    }

    pub fn server_error(&self) -> HttpResponse {
        let html = self
            .read(SERVER_ERROR_FILE)
            .unwrap_or_else(|| DEFAULT_SERVER_ERROR.to_string());
        self.page(StatusCode::INTERNAL_SERVER_ERROR, html)
    }

    /// 500 page without touching the filesystem.
    pub fn builtin_server_error(&self) -> HttpResponse {
        self.page(StatusCode::INTERNAL_SERVER_ERROR, DEFAULT_SERVER_ERROR.to_string())
    }

    fn page(&self, status: StatusCode, html: String) -> HttpResponse {
        // Older viewers and browsers hide the body of 4xx/5xx pages.
        let status = if self.mask_status { StatusCode::OK } else { status };
        HttpResponse::with_body(status, "text/html", html)
    }

    fn read(&self, file: &str) -> Option<String> {
        let path = self.directory.join(file);
        match std::fs::read_to_string(&path) {
            Ok(html) => Some(html),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read error page");
                None
            }
        }
    }
}

impl Default for ErrorPages {
    fn default() -> Self {
        Self::new(&ErrorPagesConfig::default())
    }
}

fn default_not_found(host: &str) -> String {
    let host = escape(host);
    format!(
        "<html><head><title>404 Page not found</title></head><body>\
         <h1>404 Page not found</h1>\
         <p>Nothing on this simulator answers at that address.</p>\
         <p>Viewers should be started with \
         &quot;-loginpage http://{host}/?method=login -loginuri http://{host}/&quot;.</p>\
         </body></html>"
    )
}

const DEFAULT_SERVER_ERROR: &str = "<html><head><title>500 Internal Server Error</title></head><body>\
     <h1>500 Internal Server Error</h1>\
     <p>The simulator failed while handling this request.</p>\
     </body></html>";
