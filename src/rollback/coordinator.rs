use chrono::Utc;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, RwLock};
use uuid::Uuid;

use crate::operations::registry::OperationRegistry;
use crate::rollback::types::{RollbackOperation, RollbackPolicy, RollbackRequest, RollbackStatus};
use crate::store::{ExecutionLog, VersionedStore};

#[derive(Debug, thiserror::Error)]
pub enum RollbackError {
    #[error("Rollback for execution {0} is already in flight")]
    AlreadyInFlight(String),
}

/// Undoes a failed pipeline execution by restoring the affected data
/// source to its last version committed before the execution began.
///
/// Synchronous end-to-end: rollback is small, bounded, and
/// safety-critical, so there is no separate execute step. Everything
/// after admission surfaces as the returned record's terminal status
/// rather than an error. The restore runs on a detached task, so a
/// caller that goes away mid-request neither strands the record in a
/// non-terminal status nor wedges the in-flight entry for its execution.
pub struct RollbackCoordinator {
    registry: Arc<OperationRegistry>,
    store: Arc<dyn VersionedStore>,
    executions: Arc<dyn ExecutionLog>,
    policy: RwLock<RollbackPolicy>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

/// Releases the execution's in-flight entry and, if the restore stopped
/// without reaching a terminal status, stamps the record failed. Runs on
/// every exit from the spawned restore, including unwinding.
struct InFlightGuard {
    registry: Arc<OperationRegistry>,
    in_flight: Arc<Mutex<HashSet<String>>>,
    execution_id: String,
    record_id: Uuid,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Some(mut record) = self.registry.get_rollback(self.record_id) {
            if !record.status.is_terminal() {
                record.status = RollbackStatus::Failed;
                record.error =
                    Some("rollback stopped before reaching a terminal status".to_string());
                record.completed_at = Some(Utc::now());
                self.registry.update_rollback(record);
                tracing::error!(rollback = %self.record_id, "rollback run stopped unexpectedly");
            }
        }
        if let Ok(mut in_flight) = self.in_flight.lock() {
            in_flight.remove(&self.execution_id);
        }
    }
}

impl RollbackCoordinator {
    pub fn new(
        registry: Arc<OperationRegistry>,
        store: Arc<dyn VersionedStore>,
        executions: Arc<dyn ExecutionLog>,
        policy: RollbackPolicy,
    ) -> Self {
        Self {
            registry,
            store,
            executions,
            policy: RwLock::new(policy),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn policy(&self) -> RollbackPolicy {
        self.policy.read().expect("policy lock poisoned").clone()
    }

    /// Replace the process-wide policy. Applies to later invocations
    /// only; an in-flight rollback keeps its snapshot.
    pub fn update_policy(&self, policy: RollbackPolicy) -> RollbackPolicy {
        let mut current = self.policy.write().expect("policy lock poisoned");
        *current = policy;
        tracing::info!(
            auto_rollback = current.auto_rollback,
            version_retention = current.version_retention,
            "rollback policy updated"
        );
        current.clone()
    }

    /// Auto-rollback entry point for pipeline failure events. Returns
    /// `None` when the policy has auto-rollback disabled.
    pub async fn maybe_rollback_on_failure(
        &self,
        req: RollbackRequest,
    ) -> Result<Option<RollbackOperation>, RollbackError> {
        if !self.policy().auto_rollback {
            tracing::info!(
                execution = %req.execution_id,
                "auto-rollback disabled, skipping"
            );
            return Ok(None);
        }
        self.rollback_failed_pipeline(req).await.map(Some)
    }

    /// Restore the source written by `req.execution_id` to its
    /// last-known-good version. Returns the finished record; the only
    /// caller-visible rejection is a second request for an execution
    /// whose rollback is still in flight.
    pub async fn rollback_failed_pipeline(
        &self,
        req: RollbackRequest,
    ) -> Result<RollbackOperation, RollbackError> {
        // Serialized per execution so a retry cannot double-apply.
        {
            let mut in_flight = self.in_flight.lock().expect("in-flight lock poisoned");
            if !in_flight.insert(req.execution_id.clone()) {
                return Err(RollbackError::AlreadyInFlight(req.execution_id));
            }
        }

        // Policy snapshot taken at admission; later updates do not alter
        // this invocation.
        let policy = self.policy();
        let record = RollbackOperation {
            id: Uuid::new_v4(),
            pipeline_id: req.pipeline_id.clone(),
            execution_id: req.execution_id.clone(),
            project_id: req.project_id.clone(),
            reason: req.reason.clone(),
            initiated_by: req.initiated_by.clone(),
            status: RollbackStatus::Pending,
            restored_version: None,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        self.registry.insert_rollback(record.clone());
        tracing::info!(
            rollback = %record.id,
            execution = %req.execution_id,
            pipeline = %req.pipeline_id,
            initiated_by = %req.initiated_by,
            "rollback requested"
        );

        let admitted = record.clone();
        let registry = Arc::clone(&self.registry);
        let store = Arc::clone(&self.store);
        let executions = Arc::clone(&self.executions);
        let in_flight = Arc::clone(&self.in_flight);
        let task = tokio::spawn(async move {
            let _guard = InFlightGuard {
                registry: Arc::clone(&registry),
                in_flight,
                execution_id: record.execution_id.clone(),
                record_id: record.id,
            };
            Self::run(registry, store, executions, policy, req, record).await
        });
        match task.await {
            Ok(record) => Ok(record),
            Err(e) => {
                // The guard inside the task already stamped the terminal
                // status and freed the execution.
                tracing::error!(rollback = %admitted.id, error = %e, "rollback task failed");
                Ok(self.registry.get_rollback(admitted.id).unwrap_or(admitted))
            }
        }
    }

    async fn run(
        registry: Arc<OperationRegistry>,
        store: Arc<dyn VersionedStore>,
        executions: Arc<dyn ExecutionLog>,
        policy: RollbackPolicy,
        req: RollbackRequest,
        mut record: RollbackOperation,
    ) -> RollbackOperation {
        let restored = Self::restore(
            &registry,
            store.as_ref(),
            executions.as_ref(),
            &policy,
            &req,
            &mut record,
        )
        .await;
        match restored {
            Ok(version) => {
                record.status = RollbackStatus::Completed;
                record.restored_version = Some(version);
                tracing::info!(
                    rollback = %record.id,
                    restored_version = version,
                    "rollback completed"
                );
            }
            Err(message) => {
                record.status = RollbackStatus::Failed;
                record.error = Some(message.clone());
                tracing::error!(rollback = %record.id, error = %message, "rollback failed");
            }
        }
        record.completed_at = Some(Utc::now());
        registry.update_rollback(record.clone());
        record
    }

    /// Resolve and re-commit the rollback target. Error strings are kept
    /// verbatim for operator diagnosis.
    async fn restore(
        registry: &OperationRegistry,
        store: &dyn VersionedStore,
        executions: &dyn ExecutionLog,
        policy: &RollbackPolicy,
        req: &RollbackRequest,
        record: &mut RollbackOperation,
    ) -> Result<u64, String> {
        let execution = executions
            .get_execution(&req.execution_id)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("execution not found: {}", req.execution_id))?;

        let mut versions = store
            .list_versions(&execution.source_id)
            .await
            .map_err(|e| e.to_string())?;
        versions.sort_by_key(|v| v.version);

        // Only the newest `version_retention` versions stay eligible; of
        // those, the target is the newest one committed strictly before
        // the failed execution began. Never roll forward.
        let eligible_from = versions.len().saturating_sub(policy.version_retention.max(1));
        let target = versions[eligible_from..]
            .iter()
            .rev()
            .find(|v| v.created_at < execution.started_at)
            .map(|v| v.version)
            .ok_or_else(|| {
                format!(
                    "no version of source {} predates execution {}",
                    execution.source_id, req.execution_id
                )
            })?;

        record.status = RollbackStatus::Running;
        registry.update_rollback(record.clone());

        // Fresh write of the target's contents; subsequent reads of the
        // source head return the target's data.
        let payload = store
            .read_version(&execution.source_id, target)
            .await
            .map_err(|e| e.to_string())?;
        store
            .write_version(&execution.source_id, payload)
            .await
            .map_err(|e| e.to_string())?;

        Ok(target)
    }
}
