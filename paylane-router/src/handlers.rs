//! Axum route handlers for the router service.

use std::sync::Arc;

use alloy_primitives::Address;
use axum::extract::{Path, Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;

use paylane::model::Permit;

use crate::error::RouterError;
use crate::permits::{
    CreatePermitRequest, PermitResponse, RevokePermitRequest, UpdatePermitRequest,
};
use crate::service::{CallRequest, CallResponse, RouterService};

/// Shared application state.
pub type AppState = Arc<RouterService>;

/// Query parameters for `GET /permits`.
#[derive(Debug, Deserialize)]
pub struct ListPermitsQuery {
    /// Wallet address whose permits to list.
    #[serde(rename = "userAddress")]
    pub user_address: Address,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
}

/// `POST /v1/router/{agent_id}` - one metered API call.
///
/// The body is decoded by hand so malformed JSON maps to the router's own
/// 400 shape instead of the extractor default.
pub async fn post_router_call(
    State(service): State<AppState>,
    Path(agent_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<CallResponse>, RouterError> {
    let request: CallRequest = serde_json::from_value(body)
        .map_err(|e| RouterError::InvalidParameters(e.to_string()))?;
    let response = service
        .handle_call(bearer_token(&headers), &agent_id, request)
        .await?;
    Ok(Json(response))
}

/// `POST /permits` - create, validate, store, and submit a permit.
pub async fn post_permit(
    State(service): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<PermitResponse>, RouterError> {
    let request: CreatePermitRequest = serde_json::from_value(body)
        .map_err(|e| RouterError::InvalidParameters(e.to_string()))?;
    let response = service.create_permit(request).await?;
    Ok(Json(response))
}

/// `GET /permits?userAddress=` - list a user's permits, newest first.
pub async fn get_permits(
    State(service): State<AppState>,
    Query(query): Query<ListPermitsQuery>,
) -> Result<Json<Vec<Permit>>, RouterError> {
    let permits = service.list_permits(query.user_address).await?;
    Ok(Json(permits))
}

/// `PATCH /permits/{id}` - update permit status.
pub async fn patch_permit(
    State(service): State<AppState>,
    Path(permit_id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Permit>, RouterError> {
    let request: UpdatePermitRequest = serde_json::from_value(body)
        .map_err(|e| RouterError::InvalidParameters(e.to_string()))?;
    let permit = service.update_permit_status(&permit_id, request).await?;
    Ok(Json(permit))
}

/// `POST /permits/revoke` - submit a zero-amount revocation permit.
pub async fn post_revoke(
    State(service): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<PermitResponse>, RouterError> {
    let request: RevokePermitRequest = serde_json::from_value(body)
        .map_err(|e| RouterError::InvalidParameters(e.to_string()))?;
    let response = service.revoke_permit(request).await?;
    Ok(Json(response))
}

/// `GET /health` - liveness probe.
pub async fn health() -> Json<Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Builds the full route table over the shared service.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/router/{agent_id}", post(post_router_call))
        .route("/permits", post(post_permit).get(get_permits))
        .route("/permits/{id}", patch(patch_permit))
        .route("/permits/revoke", post(post_revoke))
        .route("/health", get(health))
        .with_state(state)
}
