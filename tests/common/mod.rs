//! Shared utilities for integration tests.

#![allow(dead_code)]

use simhost::config::{RegionConfig, ServerConfig};
use simhost::{ModuleCatalog, ServerHandle};

/// Config for a test server on an ephemeral port with short poll timeouts.
pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.poll.workers = 2;
    config.poll.timeout_secs = 1;
    config.poll.check_interval_ms = 20;
    config.timeouts.request_secs = 10;
    config
}

/// Start a server with `catalog` and the given regions.
pub async fn start_server(
    catalog: ModuleCatalog,
    regions: &[&str],
    tweak: impl FnOnce(&mut ServerConfig),
) -> ServerHandle {
    let mut config = test_config();
    config.regions = regions
        .iter()
        .map(|name| RegionConfig { name: name.to_string() })
        .collect();
    tweak(&mut config);
    simhost::start(config, catalog).await.unwrap()
}

/// Start a server with no modules.
pub async fn start_bare_server() -> ServerHandle {
    start_server(ModuleCatalog::new(), &[], |_| {}).await
}

pub fn url(handle: &ServerHandle, path: &str) -> String {
    format!("http://{}{}", handle.local_addr(), path)
}

/// A client that does not reuse connections between requests.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .build()
        .unwrap()
}
