//! Region info module.
//!
//! Per-region module that serves `/region/<name>/info` as JSON.

use std::sync::{Arc, Mutex, PoisonError};

use crate::error::HandlerError;
use crate::http::request::RequestBag;
use crate::http::response::ResponseDescriptor;
use crate::modules::module::{ModuleError, RegionModule};
use crate::modules::world::World;

pub const MODULE_NAME: &str = "region_info";

pub fn info_path(region_name: &str) -> String {
    format!("/region/{}/info", region_name)
}

#[derive(Default)]
pub struct RegionInfoModule {
    path: Mutex<Option<String>>,
}

impl RegionInfoModule {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RegionModule for RegionInfoModule {
    fn name(&self) -> &str {
        MODULE_NAME
    }

    fn add_region(&self, world: &Arc<World>) -> Result<(), ModuleError> {
        let path = info_path(world.name());
        let weak = Arc::downgrade(world);
        let handler = move |_: &RequestBag| -> Result<ResponseDescriptor, HandlerError> {
            let world = weak.upgrade().ok_or(HandlerError::NotFound)?;
            let body = serde_json::json!({
                "id": world.id(),
                "name": world.name(),
                "capabilities": world.capability_tags(),
            });
            Ok(ResponseDescriptor::text("application/json", body.to_string()))
        };

        if !world.registries().add_http_handler(&path, handler) {
            return Err(ModuleError::attach(MODULE_NAME, world, format!("{} is already registered", path)));
        }
        *self.path.lock().unwrap_or_else(PoisonError::into_inner) = Some(path);
        Ok(())
    }

    fn remove_region(&self, world: &Arc<World>) {
        if let Some(path) = self.path.lock().unwrap_or_else(PoisonError::into_inner).take() {
            world.registries().remove_http_handler(&path);
        }
    }
}
