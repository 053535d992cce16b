use axum::{routing::get, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use lakeview_ops::handlers::{self, AppState};
use lakeview_ops::operations::implementations::{default_handler_registry, MemoryEntityCatalog};
use lakeview_ops::operations::{BulkExecutor, CancellationController, OperationRegistry};
use lakeview_ops::rollback::{RollbackCoordinator, RollbackPolicy};
use lakeview_ops::store::memory::{MemoryExecutionLog, MemoryVersionedStore};

#[tokio::main]
async fn main() {
    // Load .env if present so cargo run picks up APP_ENV, port overrides, etc.
    let _ = dotenvy::dotenv();

    // Initialize configuration (this loads the config singleton)
    let config = lakeview_ops::config::config();

    tracing_subscriber::fmt::init();
    tracing::info!("Starting Lakeview Ops in {:?} mode", config.environment);

    let app = app(build_state());

    // Allow tests or deployments to override port via env
    let port = std::env::var("LAKEVIEW_OPS_PORT")
        .ok()
        .or_else(|| std::env::var("PORT").ok())
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(3000);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {}", bind_addr, e));

    println!("🚀 Lakeview Ops server listening on http://{}", bind_addr);

    axum::serve(listener, app).await.expect("server");
}

/// Wire the engine with the in-process collaborators: entity handlers
/// over the in-memory catalog, memory-backed versioned store, memory
/// execution log. Deployments with real backends swap these at the trait
/// seams.
fn build_state() -> AppState {
    let config = lakeview_ops::config::config();

    let registry = Arc::new(OperationRegistry::new());
    let catalog = Arc::new(MemoryEntityCatalog::new());
    let dispatch = Arc::new(default_handler_registry(Arc::clone(&catalog)));
    let cancel = Arc::new(CancellationController::new(Arc::clone(&registry)));
    let executor = Arc::new(BulkExecutor::new(
        Arc::clone(&registry),
        dispatch,
        Arc::clone(&cancel),
    ));

    let store = Arc::new(MemoryVersionedStore::new());
    let executions = Arc::new(MemoryExecutionLog::new());
    let coordinator = Arc::new(RollbackCoordinator::new(
        Arc::clone(&registry),
        store,
        executions,
        RollbackPolicy {
            auto_rollback: config.rollback.auto_rollback,
            version_retention: config.rollback.version_retention,
        },
    ));

    AppState {
        registry,
        executor,
        cancel,
        coordinator,
    }
}

fn app(state: AppState) -> Router {
    let config = lakeview_ops::config::config();

    let mut app = Router::new()
        // Public
        .route("/", get(root))
        // Engine API (includes /health)
        .merge(handlers::router(state));

    // Global middleware
    if config.api.enable_cors {
        app = app.layer(CorsLayer::permissive());
    }
    if config.api.enable_request_logging {
        app = app.layer(TraceLayer::new_for_http());
    }
    app
}

async fn root() -> axum::response::Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    axum::response::Json(json!({
        "success": true,
        "data": {
            "name": "Lakeview Ops",
            "version": version,
            "description": "Long-running operation engine for the Lakeview data platform",
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "operations": "/api/operations[/:id] (create, list, fetch)",
                "execute": "/api/operations/:id/execute",
                "cancel": "/api/operations/:id/cancel",
                "stats": "/api/operations/stats",
                "rollback": "/api/rollback[/:id]",
                "rollback_config": "/api/rollback/config",
            }
        }
    }))
}
