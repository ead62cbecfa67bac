use axum::http::StatusCode;
use serde::Serialize;
use std::sync::{Arc, Weak};

use crate::admin::auth::authorized;
use crate::error::HandlerError;
use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;
use crate::modules::{ModuleController, ModuleInfo};

#[derive(Serialize)]
pub struct RegionSummary {
    pub id: String,
    pub name: String,
}

#[derive(Serialize)]
pub struct ModulesReport {
    pub version: &'static str,
    pub regions: Vec<RegionSummary>,
    pub modules: Vec<ModuleInfo>,
}

/// `GET /admin/modules`.
pub fn get_modules(
    controller: &Weak<ModuleController>,
    api_key: &str,
    request: &HttpRequest,
    response: &mut HttpResponse,
) -> Result<Option<Vec<u8>>, HandlerError> {
    if !authorized(request, api_key) {
        tracing::warn!(peer = %request.remote_addr, "Rejected admin request");
        response.status = StatusCode::UNAUTHORIZED;
        return Ok(Some(br#"{"error":"unauthorized"}"#.to_vec()));
    }

    let controller: Arc<ModuleController> = controller.upgrade().ok_or(HandlerError::NotFound)?;
    let report = ModulesReport {
        version: env!("CARGO_PKG_VERSION"),
        regions: controller
            .worlds()
            .iter()
            .map(|world| RegionSummary {
                id: world.id().to_string(),
                name: world.name().to_string(),
            })
            .collect(),
        modules: controller.all_modules(),
    };
    let body = serde_json::to_vec(&report).map_err(|e| HandlerError::failed(e.to_string()))?;
    Ok(Some(body))
}
