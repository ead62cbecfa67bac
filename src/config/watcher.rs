//! Hot reload of the `[modules]` section.
//!
//! Only module settings apply to a running server. Edits to any other
//! section are logged and ignored until restart.

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::{ModulesConfig, ServerConfig};

const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Watches a config file and forwards changed module settings.
pub struct ConfigWatcher {
    path: PathBuf,
    current: ServerConfig,
    update_tx: mpsc::UnboundedSender<ModulesConfig>,
}

impl ConfigWatcher {
    /// `current` is the configuration the server started with.
    pub fn new(path: &Path, current: ServerConfig) -> (Self, mpsc::UnboundedReceiver<ModulesConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            current,
            update_tx,
        };
        (watcher, update_rx)
    }

    /// Start watching. The returned watcher must be kept alive for as long
    /// as updates are wanted.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let Self {
            path,
            mut current,
            update_tx,
        } = self;
        let watched = path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => match load_config(&path) {
                    Ok(next) => {
                        if let Some(modules) = apply(&mut current, next) {
                            let _ = update_tx.send(modules);
                        }
                    }
                    Err(e) => {
                        tracing::error!(path = ?path, error = %e, "Failed to reload config, keeping current configuration");
                    }
                },
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(POLL_INTERVAL),
        )?;

        watcher.watch(&watched, RecursiveMode::NonRecursive)?;
        tracing::info!(path = ?watched, "Config watcher started");
        Ok(watcher)
    }
}

/// Fold `next` into `current`, returning the module settings if they changed.
fn apply(current: &mut ServerConfig, next: ServerConfig) -> Option<ModulesConfig> {
    let mut restart_only = next.clone();
    restart_only.modules = current.modules.clone();
    if restart_only != *current {
        tracing::warn!("Config changes outside [modules] take effect on restart");
    }

    if next.modules == current.modules {
        return None;
    }
    tracing::info!("Module settings changed, reloading");
    current.modules = next.modules.clone();
    Some(next.modules)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_module_changes_are_forwarded() {
        let mut current = ServerConfig::default();

        let mut next = current.clone();
        next.poll.workers = 9;
        assert!(apply(&mut current, next).is_none());
        assert_eq!(current.poll.workers, ServerConfig::default().poll.workers);

        let mut next = current.clone();
        next.modules.disabled.push("region_info".to_string());
        let modules = apply(&mut current, next.clone()).unwrap();
        assert_eq!(modules.disabled, vec!["region_info"]);

        // Same file saved again.
        assert!(apply(&mut current, next).is_none());
    }
}
