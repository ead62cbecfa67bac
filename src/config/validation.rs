//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (workers > 0, timeouts > 0, bind address parses)
//! - Check cross-field constraints (request timeout outlasts poll timeout)
//! - Detect duplicate region names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::config::schema::ServerConfig;

/// One failed check.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Check `config`, collecting every problem found.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::new("listener.max_body_bytes", "must be greater than 0"));
    }

    if config.poll.workers == 0 {
        errors.push(ValidationError::new("poll.workers", "must be greater than 0"));
    }
    if config.poll.timeout_secs == 0 {
        errors.push(ValidationError::new("poll.timeout_secs", "must be greater than 0"));
    }
    if config.poll.check_interval_ms == 0 {
        errors.push(ValidationError::new("poll.check_interval_ms", "must be greater than 0"));
    }
    if config.timeouts.request_secs <= config.poll.timeout_secs {
        errors.push(ValidationError::new(
            "timeouts.request_secs",
            format!(
                "must be greater than poll.timeout_secs ({})",
                config.poll.timeout_secs
            ),
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    let mut seen = HashSet::new();
    for (i, region) in config.regions.iter().enumerate() {
        if region.name.trim().is_empty() {
            errors.push(ValidationError::new(format!("regions[{}].name", i), "must not be empty"));
        } else if !seen.insert(region.name.as_str()) {
            errors.push(ValidationError::new(
                format!("regions[{}].name", i),
                format!("duplicate region '{}'", region.name),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::RegionConfig;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&ServerConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = ServerConfig::default();
        config.listener.bind_address = "nowhere".to_string();
        config.poll.workers = 0;
        config.timeouts.request_secs = 10;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["listener.bind_address", "poll.workers", "timeouts.request_secs"]);
    }

    #[test]
    fn test_duplicate_and_empty_regions() {
        let mut config = ServerConfig::default();
        config.regions = vec![
            RegionConfig { name: "Alpha".to_string() },
            RegionConfig { name: " ".to_string() },
            RegionConfig { name: "Alpha".to_string() },
        ];

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].field, "regions[1].name");
        assert!(errors[1].message.contains("duplicate"));
    }
}
