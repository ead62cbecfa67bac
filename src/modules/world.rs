//! World instances (regions) and their capability registry.
//!
//! A region exposes an explicit registry of replaceable capabilities keyed by
//! tag. Modules query it to find out whether a capability is already
//! provided and register into it when they attach.
//!
//! # Design Decisions
//! - An entry can be *claimed* without a handle: the loader claims a
//!   capability for the module it selects so later contenders are skipped
//!   even if the winner never registers a concrete interface
//! - Handles are stored type-erased and recovered with a checked downcast

use indexmap::IndexMap;
use std::any::Any;
use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;

use crate::routing::registry::HandlerRegistries;

type Handle = Arc<dyn Any + Send + Sync>;

struct CapabilityEntry {
    owner: String,
    handle: Option<Handle>,
}

/// One simulated region.
pub struct World {
    id: Uuid,
    name: String,
    registries: Arc<HandlerRegistries>,
    capabilities: RwLock<IndexMap<String, CapabilityEntry>>,
}

impl World {
    pub fn new(name: impl Into<String>, registries: Arc<HandlerRegistries>) -> Self {
        Self::with_id(Uuid::new_v4(), name, registries)
    }

    pub fn with_id(id: Uuid, name: impl Into<String>, registries: Arc<HandlerRegistries>) -> Self {
        Self {
            id,
            name: name.into(),
            registries,
            capabilities: RwLock::new(IndexMap::new()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handler tables of the server hosting this region.
    pub fn registries(&self) -> &Arc<HandlerRegistries> {
        &self.registries
    }

    /// Reserve `tag` for `owner`. Returns false if someone else holds it.
    pub fn claim_capability(&self, tag: &str, owner: &str) -> bool {
        let mut capabilities = self.capabilities.write().unwrap_or_else(PoisonError::into_inner);
        match capabilities.get(tag) {
            Some(entry) => entry.owner == owner,
            None => {
                capabilities.insert(
                    tag.to_string(),
                    CapabilityEntry {
                        owner: owner.to_string(),
                        handle: None,
                    },
                );
                true
            }
        }
    }

    /// Provide `tag` with a concrete interface. Fails if another owner holds
    /// the tag; the owner may replace its own handle.
    pub fn register_capability<T: Any + Send + Sync>(&self, tag: &str, owner: &str, handle: Arc<T>) -> bool {
        let mut capabilities = self.capabilities.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = capabilities.get(tag) {
            if entry.owner != owner {
                tracing::debug!(region = %self.name, tag, owner, holder = %entry.owner, "Capability already provided");
                return false;
            }
        }
        capabilities.insert(
            tag.to_string(),
            CapabilityEntry {
                owner: owner.to_string(),
                handle: Some(handle),
            },
        );
        tracing::debug!(region = %self.name, tag, owner, "Capability registered");
        true
    }

    /// Whether `tag` is claimed or registered.
    pub fn has_capability(&self, tag: &str) -> bool {
        let capabilities = self.capabilities.read().unwrap_or_else(PoisonError::into_inner);
        capabilities.contains_key(tag)
    }

    /// Name of the module holding `tag`.
    pub fn capability_owner(&self, tag: &str) -> Option<String> {
        let capabilities = self.capabilities.read().unwrap_or_else(PoisonError::into_inner);
        capabilities.get(tag).map(|entry| entry.owner.clone())
    }

    /// The registered interface for `tag`, type-erased. A claim without a
    /// handle yields `None`.
    pub fn try_get_capability(&self, tag: &str) -> Option<Handle> {
        let capabilities = self.capabilities.read().unwrap_or_else(PoisonError::into_inner);
        capabilities.get(tag).and_then(|entry| entry.handle.clone())
    }

    /// The registered interface for `tag` as a `T`.
    pub fn request_interface<T: Any + Send + Sync>(&self, tag: &str) -> Option<Arc<T>> {
        self.try_get_capability(tag)?.downcast::<T>().ok()
    }

    /// Drop every capability held by `owner`. Returns how many were dropped.
    pub fn release_capabilities(&self, owner: &str) -> usize {
        let mut capabilities = self.capabilities.write().unwrap_or_else(PoisonError::into_inner);
        let before = capabilities.len();
        capabilities.retain(|_, entry| entry.owner != owner);
        before - capabilities.len()
    }

    /// Capability tags in registration order.
    pub fn capability_tags(&self) -> Vec<String> {
        let capabilities = self.capabilities.read().unwrap_or_else(PoisonError::into_inner);
        capabilities.keys().cloned().collect()
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("capabilities", &self.capability_tags())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> World {
        World::new("Alpha", Arc::new(HandlerRegistries::new()))
    }

    #[derive(Debug, PartialEq)]
    struct Weather(&'static str);

    #[test]
    fn test_first_owner_keeps_capability() {
        let world = world();
        assert!(world.register_capability("weather", "sunny", Arc::new(Weather("sun"))));
        assert!(!world.register_capability("weather", "rainy", Arc::new(Weather("rain"))));
        assert!(!world.claim_capability("weather", "rainy"));
        assert_eq!(world.capability_owner("weather").as_deref(), Some("sunny"));
    }

    #[test]
    fn test_claim_then_register() {
        let world = world();
        assert!(world.claim_capability("weather", "sunny"));
        assert!(world.has_capability("weather"));
        assert!(world.try_get_capability("weather").is_none());

        assert!(world.register_capability("weather", "sunny", Arc::new(Weather("sun"))));
        assert_eq!(world.request_interface::<Weather>("weather").as_deref(), Some(&Weather("sun")));
    }

    #[test]
    fn test_request_interface_checks_type() {
        let world = world();
        world.register_capability("weather", "sunny", Arc::new(Weather("sun")));
        assert!(world.request_interface::<String>("weather").is_none());
        assert!(world.request_interface::<Weather>("missing").is_none());
    }

    #[test]
    fn test_release_capabilities() {
        let world = world();
        world.claim_capability("a", "one");
        world.claim_capability("b", "two");
        world.claim_capability("c", "one");

        assert_eq!(world.release_capabilities("one"), 2);
        assert_eq!(world.capability_tags(), vec!["b"]);
        assert!(world.claim_capability("a", "two"));
    }
}
