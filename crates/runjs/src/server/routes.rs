//! Request handlers
//!
//! - `POST /api/execute` - run code, `moduleType` selects the flavor
//! - `POST /api/execute/mjs` - run code as an ES module
//! - `POST /api/execute/cjs` - run code as CommonJS
//! - `GET /api/packages` - dependencies installed across workspaces
//! - `GET /health` - liveness, outside the rate limit

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::config::ModuleFlavor;
use crate::server::AppState;
use crate::server::error::ApiError;
use crate::types::{ExecutionRequest, InstalledPackage};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteBody {
    pub code: String,

    #[serde(default)]
    pub module_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResponse {
    pub output: String,
    pub installed_packages: Vec<InstalledPackage>,
    pub module_type: ModuleFlavor,
}

#[derive(Debug, Serialize)]
pub struct PackagesResponse {
    pub packages: Vec<InstalledPackage>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Run code in the flavor named by `moduleType`, ES modules when absent
pub async fn execute(
    State(state): State<AppState>,
    payload: Result<Json<ExecuteBody>, JsonRejection>,
) -> Result<Json<ExecuteResponse>, ApiError> {
    let Json(body) = payload?;
    let flavor = match body.module_type.as_deref() {
        Some(module_type) => module_type.parse()?,
        None => ModuleFlavor::default(),
    };
    run(&state, body.code, flavor).await
}

pub async fn execute_esm(
    State(state): State<AppState>,
    payload: Result<Json<ExecuteBody>, JsonRejection>,
) -> Result<Json<ExecuteResponse>, ApiError> {
    let Json(body) = payload?;
    run(&state, body.code, ModuleFlavor::Esm).await
}

pub async fn execute_cjs(
    State(state): State<AppState>,
    payload: Result<Json<ExecuteBody>, JsonRejection>,
) -> Result<Json<ExecuteResponse>, ApiError> {
    let Json(body) = payload?;
    run(&state, body.code, ModuleFlavor::CommonJs).await
}

pub async fn packages(State(state): State<AppState>) -> Json<PackagesResponse> {
    Json(PackagesResponse {
        packages: state.runner.installed_packages().await,
    })
}

#[instrument(skip(state, code), fields(len = code.len()))]
async fn run(
    state: &AppState,
    code: String,
    flavor: ModuleFlavor,
) -> Result<Json<ExecuteResponse>, ApiError> {
    let request = ExecutionRequest::new(code, flavor);
    let result = state.runner.execute(&request).await.map_err(|e| {
        warn!(kind = %e.kind(), error = %e, "execution request failed");
        ApiError::from(e)
    })?;

    Ok(Json(ExecuteResponse {
        output: result.output,
        installed_packages: result.installed_packages,
        module_type: result.flavor,
    }))
}
