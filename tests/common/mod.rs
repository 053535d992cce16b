// Shared fixtures: an engine wired with in-memory collaborators and a
// seeded entity catalog.

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::json;

use lakeview_ops::handlers::AppState;
use lakeview_ops::operations::dispatch::HandlerRegistry;
use lakeview_ops::operations::implementations::{default_handler_registry, MemoryEntityCatalog};
use lakeview_ops::operations::types::{
    CreateOperationRequest, EntityType, OperationOptions, OperationType,
};
use lakeview_ops::operations::{BulkExecutor, CancellationController, OperationRegistry};
use lakeview_ops::rollback::{RollbackCoordinator, RollbackPolicy};
use lakeview_ops::store::memory::{MemoryExecutionLog, MemoryVersionedStore};

pub struct TestHarness {
    pub state: AppState,
    pub catalog: Arc<MemoryEntityCatalog>,
    pub store: Arc<MemoryVersionedStore>,
    pub executions: Arc<MemoryExecutionLog>,
}

/// Engine over the default in-memory handlers, catalog seeded with a few
/// jobs and data sources.
pub fn harness() -> TestHarness {
    let catalog = Arc::new(MemoryEntityCatalog::new());
    for id in ["j-1", "j-2", "j-3"] {
        catalog.insert(EntityType::Job, id, json!({"kind": "compaction"}));
    }
    for id in ["ds-1", "ds-2"] {
        catalog.insert(EntityType::DataSource, id, json!({"owner": "ops"}));
    }
    let dispatch = default_handler_registry(Arc::clone(&catalog));
    harness_with(dispatch, catalog)
}

/// Engine over a caller-supplied dispatch table (for scripted handlers).
pub fn harness_with(dispatch: HandlerRegistry, catalog: Arc<MemoryEntityCatalog>) -> TestHarness {
    let registry = Arc::new(OperationRegistry::new());
    let cancel = Arc::new(CancellationController::new(Arc::clone(&registry)));
    let executor = Arc::new(BulkExecutor::new(
        Arc::clone(&registry),
        Arc::new(dispatch),
        Arc::clone(&cancel),
    ));

    let store = Arc::new(MemoryVersionedStore::new());
    let executions = Arc::new(MemoryExecutionLog::new());
    let coordinator = Arc::new(RollbackCoordinator::new(
        Arc::clone(&registry),
        Arc::clone(&store) as Arc<dyn lakeview_ops::store::VersionedStore>,
        Arc::clone(&executions) as Arc<dyn lakeview_ops::store::ExecutionLog>,
        RollbackPolicy {
            auto_rollback: true,
            version_retention: 10,
        },
    ));

    TestHarness {
        state: AppState {
            registry,
            executor,
            cancel,
            coordinator,
        },
        catalog,
        store,
        executions,
    }
}

pub fn tag_request(entity_ids: &[&str]) -> CreateOperationRequest {
    CreateOperationRequest {
        name: "tag stale jobs".to_string(),
        entity_type: EntityType::Job,
        operation_type: OperationType::Tag,
        entity_ids: entity_ids.iter().map(|s| s.to_string()).collect(),
        config: json!({"tag": "stale"}),
        options: OperationOptions::default(),
    }
}
