//! TCP listener setup.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Turn bind failures into a startup-fatal error

use std::net::SocketAddr;
use tokio::net::TcpListener;

use crate::config::ListenerConfig;

/// Error type for listener operations.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// The configured address does not parse.
    #[error("Invalid bind address '{address}': {source}")]
    Address {
        address: String,
        #[source]
        source: std::net::AddrParseError,
    },
    /// Failed to bind to address.
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Bind the listener. The server cannot run without it, so callers treat an
/// error as fatal.
pub async fn bind(config: &ListenerConfig) -> Result<TcpListener, ListenerError> {
    let address: SocketAddr = config
        .bind_address
        .parse()
        .map_err(|source| ListenerError::Address {
            address: config.bind_address.clone(),
            source,
        })?;

    let listener = match TcpListener::bind(address).await {
        Ok(listener) => listener,
        Err(source) => {
            if source.kind() == std::io::ErrorKind::PermissionDenied {
                tracing::error!(
                    address = %address,
                    "Permission denied binding the listener; ports below 1024 need elevated privileges"
                );
            }
            return Err(ListenerError::Bind { address, source });
        }
    };

    let local_addr = listener
        .local_addr()
        .map_err(|source| ListenerError::Bind { address, source })?;
    tracing::info!(address = %local_addr, "Listener bound");

    Ok(listener)
}
