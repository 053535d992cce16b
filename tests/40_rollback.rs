mod common;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use lakeview_ops::operations::OperationRegistry;
use lakeview_ops::rollback::{
    RollbackCoordinator, RollbackError, RollbackPolicy, RollbackRequest, RollbackStatus,
};
use lakeview_ops::store::memory::{MemoryExecutionLog, MemoryVersionedStore};
use lakeview_ops::store::{ExecutionRecord, StoreError, VersionInfo, VersionedStore};

fn request(execution_id: &str) -> RollbackRequest {
    RollbackRequest {
        execution_id: execution_id.to_string(),
        pipeline_id: "pl-1".to_string(),
        project_id: "proj-1".to_string(),
        reason: "nightly load wrote malformed rows".to_string(),
        initiated_by: "oncall".to_string(),
    }
}

/// Seed: two good versions before the failed execution started, one bad
/// version written by the failed execution itself.
fn seed_history(h: &common::TestHarness) {
    let started = Utc::now();
    h.store
        .write_version_at("ds-1", json!(["a"]), started - ChronoDuration::hours(2));
    h.store
        .write_version_at("ds-1", json!(["a", "b"]), started - ChronoDuration::hours(1));
    h.store
        .write_version_at("ds-1", json!(["corrupt"]), started + ChronoDuration::minutes(5));
    h.executions.record(ExecutionRecord {
        execution_id: "exec-1".to_string(),
        pipeline_id: "pl-1".to_string(),
        source_id: "ds-1".to_string(),
        started_at: started,
    });
}

#[tokio::test]
async fn rollback_restores_the_last_pre_execution_version() -> Result<()> {
    let h = common::harness();
    seed_history(&h);

    let record = h
        .state
        .coordinator
        .rollback_failed_pipeline(request("exec-1"))
        .await?;

    assert_eq!(record.status, RollbackStatus::Completed);
    assert_eq!(record.restored_version, Some(2));
    assert!(record.error.is_none());
    assert!(record.completed_at.is_some());

    // Restore is a fresh write; reading the head returns the target's data
    assert_eq!(h.store.read_head("ds-1"), Some(json!(["a", "b"])));

    // The record is retained in the registry
    let stored = h.state.registry.get_rollback(record.id).unwrap();
    assert_eq!(stored.status, RollbackStatus::Completed);
    Ok(())
}

#[tokio::test]
async fn rollback_without_a_prior_version_fails_with_no_restored_version() -> Result<()> {
    let h = common::harness();
    let started = Utc::now();
    // Only version postdates the execution start
    h.store
        .write_version_at("ds-1", json!(["late"]), started + ChronoDuration::minutes(1));
    h.executions.record(ExecutionRecord {
        execution_id: "exec-1".to_string(),
        pipeline_id: "pl-1".to_string(),
        source_id: "ds-1".to_string(),
        started_at: started,
    });

    let record = h
        .state
        .coordinator
        .rollback_failed_pipeline(request("exec-1"))
        .await?;

    assert_eq!(record.status, RollbackStatus::Failed);
    assert!(record.restored_version.is_none());
    assert!(record.error.as_deref().unwrap().contains("no version"));
    Ok(())
}

#[tokio::test]
async fn rollback_for_an_unknown_execution_fails_as_a_record() -> Result<()> {
    let h = common::harness();
    let record = h
        .state
        .coordinator
        .rollback_failed_pipeline(request("exec-missing"))
        .await?;
    assert_eq!(record.status, RollbackStatus::Failed);
    assert!(record
        .error
        .as_deref()
        .unwrap()
        .contains("execution not found"));
    Ok(())
}

#[tokio::test]
async fn retention_window_limits_eligible_targets() -> Result<()> {
    let h = common::harness();
    seed_history(&h);

    // Only the newest version stays eligible, and it postdates the
    // execution start
    h.state.coordinator.update_policy(RollbackPolicy {
        auto_rollback: true,
        version_retention: 1,
    });
    let record = h
        .state
        .coordinator
        .rollback_failed_pipeline(request("exec-1"))
        .await?;
    assert_eq!(record.status, RollbackStatus::Failed);

    // Widening the window applies to the next invocation
    h.state.coordinator.update_policy(RollbackPolicy {
        auto_rollback: true,
        version_retention: 10,
    });
    let record = h
        .state
        .coordinator
        .rollback_failed_pipeline(request("exec-1"))
        .await?;
    assert_eq!(record.status, RollbackStatus::Completed);
    assert_eq!(record.restored_version, Some(2));
    Ok(())
}

#[tokio::test]
async fn auto_rollback_toggle_skips_when_disabled() -> Result<()> {
    let h = common::harness();
    seed_history(&h);

    h.state.coordinator.update_policy(RollbackPolicy {
        auto_rollback: false,
        version_retention: 10,
    });
    let skipped = h
        .state
        .coordinator
        .maybe_rollback_on_failure(request("exec-1"))
        .await?;
    assert!(skipped.is_none());
    assert!(h.state.registry.list_rollbacks().is_empty());

    h.state.coordinator.update_policy(RollbackPolicy {
        auto_rollback: true,
        version_retention: 10,
    });
    let ran = h
        .state
        .coordinator
        .maybe_rollback_on_failure(request("exec-1"))
        .await?;
    assert_eq!(ran.unwrap().status, RollbackStatus::Completed);
    Ok(())
}

/// Store wrapper that parks every write until released, to hold a
/// rollback in its running state.
struct GatedStore {
    inner: Arc<MemoryVersionedStore>,
    gate: Arc<tokio::sync::Semaphore>,
}

#[async_trait]
impl VersionedStore for GatedStore {
    async fn list_versions(&self, source_id: &str) -> Result<Vec<VersionInfo>, StoreError> {
        self.inner.list_versions(source_id).await
    }

    async fn read_version(&self, source_id: &str, version: u64) -> Result<Value, StoreError> {
        self.inner.read_version(source_id, version).await
    }

    async fn write_version(&self, source_id: &str, payload: Value) -> Result<u64, StoreError> {
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;
        permit.forget();
        self.inner.write_version(source_id, payload).await
    }
}

/// Coordinator over a gated store with one restorable version of ds-1
/// committed before exec-1 started.
fn gated_setup() -> (
    Arc<OperationRegistry>,
    Arc<RollbackCoordinator>,
    Arc<tokio::sync::Semaphore>,
) {
    let inner = Arc::new(MemoryVersionedStore::new());
    let executions = Arc::new(MemoryExecutionLog::new());
    let registry = Arc::new(OperationRegistry::new());

    let started = Utc::now();
    inner.write_version_at("ds-1", json!(["good"]), started - ChronoDuration::hours(1));
    executions.record(ExecutionRecord {
        execution_id: "exec-1".to_string(),
        pipeline_id: "pl-1".to_string(),
        source_id: "ds-1".to_string(),
        started_at: started,
    });

    let gate = Arc::new(tokio::sync::Semaphore::new(0));
    let coordinator = Arc::new(RollbackCoordinator::new(
        Arc::clone(&registry),
        Arc::new(GatedStore {
            inner,
            gate: Arc::clone(&gate),
        }),
        executions,
        RollbackPolicy {
            auto_rollback: true,
            version_retention: 10,
        },
    ));
    (registry, coordinator, gate)
}

/// Poll until some rollback record reaches the wanted status.
async fn wait_for_status(
    registry: &OperationRegistry,
    status: RollbackStatus,
) -> Result<lakeview_ops::rollback::RollbackOperation> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(record) = registry
            .list_rollbacks()
            .into_iter()
            .find(|r| r.status == status)
        {
            return Ok(record);
        }
        anyhow::ensure!(
            tokio::time::Instant::now() < deadline,
            "no rollback reached {:?}",
            status
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn concurrent_rollback_for_the_same_execution_is_rejected() -> Result<()> {
    let (registry, coordinator, gate) = gated_setup();

    let first = Arc::clone(&coordinator);
    let task = tokio::spawn(async move { first.rollback_failed_pipeline(request("exec-1")).await });

    // Wait for the first rollback to reach its write (status running)
    wait_for_status(&registry, RollbackStatus::Running).await?;

    let second = coordinator.rollback_failed_pipeline(request("exec-1")).await;
    assert!(matches!(second, Err(RollbackError::AlreadyInFlight(_))));

    gate.add_permits(10);
    let record = task.await??;
    assert_eq!(record.status, RollbackStatus::Completed);

    // Once finished, a retry is admitted again
    let retry = coordinator.rollback_failed_pipeline(request("exec-1")).await?;
    assert_eq!(retry.status, RollbackStatus::Completed);
    Ok(())
}

#[tokio::test]
async fn dropped_rollback_caller_still_finishes_and_releases_the_execution() -> Result<()> {
    let (registry, coordinator, gate) = gated_setup();

    let detached = Arc::clone(&coordinator);
    let caller =
        tokio::spawn(async move { detached.rollback_failed_pipeline(request("exec-1")).await });

    wait_for_status(&registry, RollbackStatus::Running).await?;

    // The caller goes away mid-restore; the rollback itself must not
    caller.abort();
    let _ = caller.await;

    gate.add_permits(10);
    let record = wait_for_status(&registry, RollbackStatus::Completed).await?;
    assert_eq!(record.restored_version, Some(1));

    // The execution is no longer held in flight, so a retry is admitted
    let retry = coordinator.rollback_failed_pipeline(request("exec-1")).await?;
    assert_eq!(retry.status, RollbackStatus::Completed);
    Ok(())
}
