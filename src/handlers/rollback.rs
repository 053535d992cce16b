use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;
use uuid::Uuid;

use crate::error::ApiError;
use crate::handlers::AppState;
use crate::rollback::types::{RollbackPolicy, RollbackRequest};

/// POST /api/rollback - Roll a failed pipeline's source back to its
/// last-known-good version. Synchronous; the returned record is terminal.
pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<RollbackRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state.coordinator.rollback_failed_pipeline(req).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({"success": true, "data": record})),
    ))
}

/// GET /api/rollback - List rollback records in insertion order
pub async fn list(State(state): State<AppState>) -> impl IntoResponse {
    let records = state.registry.list_rollbacks();
    Json(json!({"success": true, "data": records}))
}

/// GET /api/rollback/:id - Fetch a single rollback record
pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .registry
        .get_rollback(id)
        .ok_or_else(|| ApiError::not_found(format!("Rollback operation not found: {}", id)))?;
    Ok(Json(json!({"success": true, "data": record})))
}

/// GET /api/rollback/config - Current rollback policy
pub async fn config_get(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({"success": true, "data": state.coordinator.policy()}))
}

/// PUT /api/rollback/config - Replace the rollback policy. Takes effect
/// on the next invocation; never alters a rollback already in flight.
pub async fn config_put(
    State(state): State<AppState>,
    Json(policy): Json<RollbackPolicy>,
) -> Result<impl IntoResponse, ApiError> {
    if policy.version_retention == 0 {
        return Err(ApiError::validation_error(
            "version_retention must be at least 1",
        ));
    }
    let updated = state.coordinator.update_policy(policy);
    Ok(Json(json!({"success": true, "data": updated})))
}
