// HTTP surface of the operation engine. State is constructed explicitly
// in main (or a test fixture) and injected through the router; there is
// no hidden global registry.

pub mod operations;
pub mod rollback;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::operations::{BulkExecutor, CancellationController, OperationRegistry};
use crate::rollback::RollbackCoordinator;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<OperationRegistry>,
    pub executor: Arc<BulkExecutor>,
    pub cancel: Arc<CancellationController>,
    pub coordinator: Arc<RollbackCoordinator>,
}

/// Engine routes under /api, plus the liveness endpoint. Banner and
/// middleware layers stay in main.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        // Bulk operations
        .route(
            "/api/operations",
            get(operations::list).post(operations::create),
        )
        .route("/api/operations/stats", get(operations::stats))
        .route("/api/operations/:id", get(operations::get_one))
        .route("/api/operations/:id/execute", post(operations::execute))
        .route("/api/operations/:id/cancel", post(operations::cancel))
        // Pipeline rollback
        .route("/api/rollback", get(rollback::list).post(rollback::create))
        .route(
            "/api/rollback/config",
            get(rollback::config_get).put(rollback::config_put),
        )
        .route("/api/rollback/:id", get(rollback::get_one))
        .with_state(state)
}

/// GET /health - liveness plus current registry totals
async fn health(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> axum::response::Json<serde_json::Value> {
    let stats = state.registry.statistics();
    axum::response::Json(serde_json::json!({
        "success": true,
        "data": {
            "status": "ok",
            "timestamp": chrono::Utc::now(),
            "operations": stats.total_operations
        }
    }))
}
