mod common;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use lakeview_ops::operations::dispatch::{EntityHandler, HandlerError, HandlerRegistry};
use lakeview_ops::operations::implementations::MemoryEntityCatalog;
use lakeview_ops::operations::types::{EntityType, OperationStatus, OperationType};
use serde_json::Value;
use tokio::sync::Semaphore;

/// Handler that blocks each unit of work until the test releases a permit.
struct GatedHandler {
    gate: Arc<Semaphore>,
}

#[async_trait]
impl EntityHandler for GatedHandler {
    fn name(&self) -> &'static str {
        "gated"
    }

    async fn apply(&self, _entity_id: &str, _config: &Value) -> Result<(), HandlerError> {
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| HandlerError::new(e.to_string()))?;
        permit.forget();
        Ok(())
    }
}

fn gated_harness(gate: Arc<Semaphore>) -> common::TestHarness {
    let dispatch = HandlerRegistry::new().register(
        EntityType::Job,
        OperationType::Tag,
        Arc::new(GatedHandler { gate }),
    );
    common::harness_with(dispatch, Arc::new(MemoryEntityCatalog::new()))
}

#[tokio::test]
async fn cancel_before_execution_returns_false_and_stays_pending() -> Result<()> {
    let h = common::harness();
    let op = h.state.executor.create(common::tag_request(&["j-1"]))?;

    assert!(!h.state.cancel.request_cancel(op.id));
    assert_eq!(
        h.state.registry.get(op.id)?.status,
        OperationStatus::Pending
    );
    Ok(())
}

#[tokio::test]
async fn cancel_after_completion_returns_false() -> Result<()> {
    let h = common::harness();
    let op = h.state.executor.create(common::tag_request(&["j-1"]))?;
    h.state.executor.execute(op.id).await?;

    assert!(!h.state.cancel.request_cancel(op.id));
    assert_eq!(
        h.state.registry.get(op.id)?.status,
        OperationStatus::Completed
    );
    Ok(())
}

#[tokio::test]
async fn cancel_of_unknown_id_returns_false() {
    let h = common::harness();
    assert!(!h.state.cancel.request_cancel(uuid::Uuid::new_v4()));
}

#[tokio::test]
async fn cancelling_a_running_operation_stops_at_the_next_boundary() -> Result<()> {
    let gate = Arc::new(Semaphore::new(0));
    let h = gated_harness(Arc::clone(&gate));

    let mut req = common::tag_request(&["j-1", "j-2", "j-3"]);
    // Flush progress after every entity so the test can observe it
    req.options.batch_size = 1;
    let op = h.state.executor.create(req)?;

    let executor = Arc::clone(&h.state.executor);
    let task = tokio::spawn(async move { executor.execute(op.id).await });

    // Let exactly the first unit of work through, then wait for its
    // progress flush to land in the registry.
    gate.add_permits(1);
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if h.state.registry.get(op.id)?.progress.processed >= 1 {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "first unit never landed");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    // Operation is running; cancellation must be accepted
    assert!(h.state.cancel.request_cancel(op.id));

    // Unblock anything already past the flag check and let the executor
    // observe the flag at the next boundary
    gate.add_permits(8);
    let finished = task.await??;

    assert_eq!(finished.status, OperationStatus::Cancelled);
    assert!(finished.progress.processed >= 1);
    assert!(finished.progress.processed < 3);
    assert!(finished.completed_at.is_some());

    // Terminal, so a second cancel is refused
    assert!(!h.state.cancel.request_cancel(op.id));
    Ok(())
}

#[tokio::test]
async fn dropped_caller_does_not_strand_a_running_operation() -> Result<()> {
    let gate = Arc::new(Semaphore::new(0));
    let h = gated_harness(Arc::clone(&gate));

    let mut req = common::tag_request(&["j-1", "j-2", "j-3"]);
    req.options.batch_size = 1;
    let op = h.state.executor.create(req)?;

    let executor = Arc::clone(&h.state.executor);
    let caller = tokio::spawn(async move { executor.execute(op.id).await });

    // Let the first unit through and wait for its progress flush
    gate.add_permits(1);
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if h.state.registry.get(op.id)?.progress.processed >= 1 {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "first unit never landed");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    // The caller goes away mid-run, as when a client disconnects and
    // the request future is dropped
    caller.abort();
    let _ = caller.await;

    // The detached run keeps going and still reaches a terminal status
    gate.add_permits(8);
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let finished = loop {
        let current = h.state.registry.get(op.id)?;
        if current.status.is_terminal() {
            break current;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "operation stranded in {:?}",
            current.status
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    };

    assert_eq!(finished.status, OperationStatus::Completed);
    assert_eq!(finished.progress.processed, 3);
    assert!(finished.completed_at.is_some());
    Ok(())
}
