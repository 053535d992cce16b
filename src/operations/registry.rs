use chrono::Utc;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use crate::operations::types::{
    BulkOperation, CreateOperationRequest, EntityError, OperationStatistics, OperationStatus,
    Progress,
};
use crate::rollback::types::RollbackOperation;

#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Operation not found: {0}")]
    NotFound(Uuid),
    #[error("Operation {id} is not runnable (status: {status})")]
    NotRunnable { id: Uuid, status: OperationStatus },
    #[error("Invalid transition for operation {id}: {from} -> {to}")]
    InvalidTransition {
        id: Uuid,
        from: OperationStatus,
        to: OperationStatus,
    },
}

#[derive(Default)]
struct RegistryInner {
    operations: HashMap<Uuid, BulkOperation>,
    insertion_order: Vec<Uuid>,
    rollbacks: HashMap<Uuid, RollbackOperation>,
    rollback_order: Vec<Uuid>,
}

/// In-memory catalog of all operation records (bulk and rollback), keyed by
/// id. Source of truth for status queries and statistics while the process
/// is alive; retained for the life of the process.
///
/// Mutation discipline: only the executor (or coordinator) that owns a
/// record calls `begin`/`update_progress`/`finish` (or `update_rollback`)
/// for it. Everyone else reads. The lock is never held across an await.
pub struct OperationRegistry {
    inner: RwLock<RegistryInner>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    /// Validate and store a new bulk operation with status=pending.
    ///
    /// Handler-pair validation happens before this call (the executor's
    /// dispatch table is the authority on supported pairs); this method
    /// enforces the structural rules only.
    pub fn create(&self, req: CreateOperationRequest) -> Result<BulkOperation, OperationError> {
        if req.name.trim().is_empty() {
            return Err(OperationError::Validation(
                "operation name must not be empty".to_string(),
            ));
        }
        if req.entity_ids.is_empty() {
            return Err(OperationError::Validation(
                "entity_ids must not be empty".to_string(),
            ));
        }
        let max = crate::config::config().operations.max_entity_ids;
        if req.entity_ids.len() > max {
            return Err(OperationError::Validation(format!(
                "entity_ids exceeds the per-operation limit of {}",
                max
            )));
        }
        if req.options.batch_size == 0 {
            return Err(OperationError::Validation(
                "batch_size must be at least 1".to_string(),
            ));
        }

        let op = BulkOperation {
            id: Uuid::new_v4(),
            name: req.name,
            entity_type: req.entity_type,
            operation_type: req.operation_type,
            entity_ids: req.entity_ids,
            config: req.config,
            options: req.options,
            status: OperationStatus::Pending,
            progress: Progress::default(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            errors: Vec::new(),
        };

        let mut inner = self.inner.write().expect("registry lock poisoned");
        inner.insertion_order.push(op.id);
        inner.operations.insert(op.id, op.clone());
        tracing::info!(
            operation = %op.id,
            name = %op.name,
            entities = op.entity_ids.len(),
            "bulk operation created"
        );
        Ok(op)
    }

    pub fn get(&self, id: Uuid) -> Result<BulkOperation, OperationError> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner
            .operations
            .get(&id)
            .cloned()
            .ok_or(OperationError::NotFound(id))
    }

    /// List operations in insertion order, optionally filtered by status.
    pub fn list(&self, status: Option<OperationStatus>) -> Vec<BulkOperation> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner
            .insertion_order
            .iter()
            .filter_map(|id| inner.operations.get(id))
            .filter(|op| status.map_or(true, |s| op.status == s))
            .cloned()
            .collect()
    }

    /// Aggregate counts computed from the current record set. Snapshot
    /// read; eventually consistent with in-flight updates.
    pub fn statistics(&self) -> OperationStatistics {
        let inner = self.inner.read().expect("registry lock poisoned");
        let mut by_status = HashMap::new();
        let mut by_entity_type = HashMap::new();
        for op in inner.operations.values() {
            *by_status.entry(op.status).or_insert(0) += 1;
            *by_entity_type.entry(op.entity_type).or_insert(0) += 1;
        }
        OperationStatistics {
            total_operations: inner.operations.len(),
            by_status,
            by_entity_type,
        }
    }

    /// Current status without cloning the whole record.
    pub fn status(&self, id: Uuid) -> Option<OperationStatus> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner.operations.get(&id).map(|op| op.status)
    }

    /// Transition pending -> running and stamp `started_at`. Owner-only.
    pub fn begin(&self, id: Uuid) -> Result<BulkOperation, OperationError> {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        let op = inner
            .operations
            .get_mut(&id)
            .ok_or(OperationError::NotFound(id))?;
        match op.status {
            OperationStatus::Pending => {
                op.status = OperationStatus::Running;
                op.started_at = Some(Utc::now());
                Ok(op.clone())
            }
            OperationStatus::Running => Err(OperationError::NotRunnable {
                id,
                status: op.status,
            }),
            from => Err(OperationError::InvalidTransition {
                id,
                from,
                to: OperationStatus::Running,
            }),
        }
    }

    /// Flush a progress snapshot while running. Owner-only.
    pub fn update_progress(
        &self,
        id: Uuid,
        progress: Progress,
        errors: Vec<EntityError>,
    ) -> Result<(), OperationError> {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        let op = inner
            .operations
            .get_mut(&id)
            .ok_or(OperationError::NotFound(id))?;
        if op.status != OperationStatus::Running {
            return Err(OperationError::InvalidTransition {
                id,
                from: op.status,
                to: OperationStatus::Running,
            });
        }
        op.progress = progress;
        op.errors = errors;
        Ok(())
    }

    /// Transition running -> terminal, stamp `completed_at`, store the
    /// final progress and error list. Owner-only; a record already in a
    /// terminal status is left untouched.
    pub fn finish(
        &self,
        id: Uuid,
        status: OperationStatus,
        progress: Progress,
        errors: Vec<EntityError>,
    ) -> Result<BulkOperation, OperationError> {
        debug_assert!(status.is_terminal());
        let mut inner = self.inner.write().expect("registry lock poisoned");
        let op = inner
            .operations
            .get_mut(&id)
            .ok_or(OperationError::NotFound(id))?;
        if op.status.is_terminal() {
            return Err(OperationError::InvalidTransition {
                id,
                from: op.status,
                to: status,
            });
        }
        op.status = status;
        op.progress = progress;
        op.errors = errors;
        op.completed_at = Some(Utc::now());
        tracing::info!(
            operation = %id,
            status = %status,
            processed = op.progress.processed,
            failed = op.progress.failed,
            "bulk operation finished"
        );
        Ok(op.clone())
    }

    // Rollback records share the registry but live in their own keyspace
    // so bulk statistics stay well-typed.

    pub fn insert_rollback(&self, record: RollbackOperation) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        inner.rollback_order.push(record.id);
        inner.rollbacks.insert(record.id, record);
    }

    /// Replace a rollback record in place. Owner (coordinator) only.
    pub fn update_rollback(&self, record: RollbackOperation) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        inner.rollbacks.insert(record.id, record);
    }

    pub fn get_rollback(&self, id: Uuid) -> Option<RollbackOperation> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner.rollbacks.get(&id).cloned()
    }

    pub fn list_rollbacks(&self) -> Vec<RollbackOperation> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner
            .rollback_order
            .iter()
            .filter_map(|id| inner.rollbacks.get(id))
            .cloned()
            .collect()
    }
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::new()
    }
}
