//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the host.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Root configuration for the simulator host.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Long-poll worker pool.
    pub poll: PollConfig,

    /// 404/500 page templates.
    pub error_pages: ErrorPagesConfig,

    /// Module enablement and per-module settings.
    pub modules: ModulesConfig,

    /// Admin endpoint settings.
    pub admin: AdminConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Regions hosted by this process.
    pub regions: Vec<RegionConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:9000").
    pub bind_address: String,

    /// Host name substituted into the 404 page when a request has no Host header.
    pub host_name: String,

    /// Largest request body accepted, in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:9000".to_string(),
            host_name: "127.0.0.1".to_string(),
            max_body_bytes: 8 * 1024 * 1024,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    /// Must outlast the poll timeout.
    pub request_secs: u64,

    /// Requests slower than this are logged at info level.
    pub slow_request_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 60,
            slow_request_ms: 500,
        }
    }
}

/// Long-poll worker pool configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PollConfig {
    /// Number of poll workers.
    pub workers: usize,

    /// Default time a poll waits for events, in seconds.
    pub timeout_secs: u64,

    /// Delay between checks of the same poll request, in milliseconds.
    pub check_interval_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            timeout_secs: 25,
            check_interval_ms: 100,
        }
    }
}

/// Error page configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ErrorPagesConfig {
    /// Directory holding `http_404.html` and `http_500.html`.
    pub directory: String,

    /// Send error pages with status 200.
    pub mask_status: bool,
}

impl Default for ErrorPagesConfig {
    fn default() -> Self {
        Self {
            directory: ".".to_string(),
            mask_status: false,
        }
    }
}

/// Module configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ModulesConfig {
    /// Module names that are never loaded.
    pub disabled: Vec<String>,

    /// Free-form settings keyed by module name.
    pub settings: BTreeMap<String, toml::Table>,
}

impl ModulesConfig {
    pub fn is_disabled(&self, name: &str) -> bool {
        self.disabled.iter().any(|d| d == name)
    }

    /// Settings for one module; empty when none are configured.
    pub fn settings_for(&self, name: &str) -> toml::Table {
        self.settings.get(name).cloned().unwrap_or_default()
    }
}

/// Observability configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin endpoint configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Register `GET /admin/modules`.
    pub enabled: bool,

    /// Bearer token required by the admin endpoint. Empty disables the check.
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: String::new(),
        }
    }
}

/// One hosted region.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RegionConfig {
    pub name: String,
}
