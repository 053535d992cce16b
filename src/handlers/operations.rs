use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::ApiError;
use crate::handlers::AppState;
use crate::operations::types::{CreateOperationRequest, OperationStatus};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Optional status filter, e.g. ?status=running
    pub status: Option<OperationStatus>,
}

/// POST /api/operations - Create a bulk operation (status=pending)
pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<CreateOperationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let op = state.executor.create(req)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({"success": true, "data": op})),
    ))
}

/// GET /api/operations - List operations in insertion order
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    let ops = state.registry.list(query.status);
    Json(json!({"success": true, "data": ops}))
}

/// GET /api/operations/stats - Aggregate counts over the record set
pub async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.registry.statistics();
    Json(json!({"success": true, "data": stats}))
}

/// GET /api/operations/:id - Fetch a single operation record
pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let op = state.registry.get(id)?;
    Ok(Json(json!({"success": true, "data": op})))
}

/// POST /api/operations/:id/execute - Run to completion, return summary
pub async fn execute(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let op = state.executor.execute(id).await?;
    Ok(Json(json!({"success": true, "data": op})))
}

/// POST /api/operations/:id/cancel - Request cancellation
///
/// Boolean result, not an error: false means the operation was not
/// running (unknown, pending, or already terminal).
pub async fn cancel(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    let cancelled = state.cancel.request_cancel(id);
    Json(json!({"success": true, "data": {"cancelled": cancelled}}))
}
