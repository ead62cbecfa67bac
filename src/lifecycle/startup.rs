//! Startup orchestration.
//!
//! # Responsibilities
//! - Bind the listener (failure is fatal)
//! - Build handler registries, error pages, the poll pool and the router
//! - Initialise modules and register admin handlers
//! - Create configured regions and attach modules to them
//! - Start serving
//!
//! # Design Decisions
//! - Fail fast: a bind error halts startup
//! - Subsystems initialize in order, not concurrently
//! - Traffic starts only after every configured region has its modules

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::admin::register_admin_handlers;
use crate::config::ServerConfig;
use crate::dispatch::poll::PollServiceManager;
use crate::http::pages::ErrorPages;
use crate::http::server::HttpServer;
use crate::lifecycle::shutdown::Shutdown;
use crate::modules::{AttachReport, ModuleCatalog, ModuleController, World};
use crate::net::listener::{self, ListenerError};
use crate::routing::registry::HandlerRegistries;
use crate::routing::router::RequestRouter;

/// Error type for startup.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("Failed to read listener address: {0}")]
    Io(#[from] std::io::Error),
}

/// A running server.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: Shutdown,
    registries: Arc<HandlerRegistries>,
    modules: Arc<ModuleController>,
    reports: Vec<AttachReport>,
    server: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
}

impl ServerHandle {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registries(&self) -> &Arc<HandlerRegistries> {
        &self.registries
    }

    pub fn modules(&self) -> &Arc<ModuleController> {
        &self.modules
    }

    /// One report per configured region, in configuration order.
    pub fn attach_reports(&self) -> &[AttachReport] {
        &self.reports
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    /// Create a region and attach modules to it.
    pub fn add_region(&self, name: &str) -> (Arc<World>, AttachReport) {
        let world = Arc::new(World::new(name, self.registries.clone()));
        let report = self.modules.add_region_to_modules(world.clone());
        (world, report)
    }

    /// Detach every region, close modules, stop the listener and the poll
    /// workers, and wait for them to finish.
    pub async fn stop(self) {
        self.modules.shutdown();
        self.shutdown.trigger();

        if let Err(e) = self.server.await {
            tracing::error!(error = %e, "HTTP server task failed");
        }
        for worker in self.workers {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "Poll worker task failed");
            }
        }
        tracing::info!("Server stopped");
    }
}

/// Start the server described by `config` with the modules in `catalog`.
pub async fn start(config: ServerConfig, catalog: ModuleCatalog) -> Result<ServerHandle, StartupError> {
    let listener = listener::bind(&config.listener).await?;
    let local_addr = listener.local_addr()?;

    let shutdown = Shutdown::new();
    let registries = Arc::new(HandlerRegistries::new());
    let pages = ErrorPages::new(&config.error_pages).with_default_host(config.listener.host_name.clone());
    let (poll, workers) = PollServiceManager::start(&config.poll, pages.clone(), &shutdown);
    let router = Arc::new(RequestRouter::new(
        registries.clone(),
        poll,
        pages,
        Duration::from_millis(config.timeouts.slow_request_ms),
    ));

    let modules = Arc::new(ModuleController::new(catalog, config.modules.clone()));
    for e in modules.initialize() {
        tracing::warn!(error = %e, "Shared module will not be loaded");
    }
    modules.post_start();

    if config.admin.enabled {
        register_admin_handlers(&registries, &modules, &config.admin);
    }

    let mut reports = Vec::with_capacity(config.regions.len());
    for region in &config.regions {
        let world = Arc::new(World::new(region.name.clone(), registries.clone()));
        tracing::info!(region = %region.name, id = %world.id(), "Adding region");
        reports.push(modules.add_region_to_modules(world));
    }

    let server = HttpServer::new(&config, router);
    let server_shutdown = shutdown.clone();
    let server = tokio::spawn(async move {
        if let Err(e) = server.run(listener, server_shutdown).await {
            tracing::error!(error = %e, "HTTP server failed");
        }
    });

    tracing::info!(address = %local_addr, regions = reports.len(), "Server started");
    Ok(ServerHandle {
        local_addr,
        shutdown,
        registries,
        modules,
        reports,
        server,
        workers,
    })
}
