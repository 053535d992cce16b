use std::sync::atomic::Ordering;
use std::sync::Arc;
use uuid::Uuid;

use crate::operations::cancel::CancellationController;
use crate::operations::dispatch::HandlerRegistry;
use crate::operations::registry::{OperationError, OperationRegistry};
use crate::operations::types::{
    BulkOperation, CreateOperationRequest, EntityError, OperationStatus, Progress,
};

/// Runs one bulk operation's unit-of-work loop over its target entities,
/// reporting progress and honoring cancellation at batch boundaries.
///
/// Single-writer discipline: for a given operation id, only the `execute`
/// call that owns it mutates status, progress, and errors. All other
/// callers read the registry or set the cancellation flag.
pub struct BulkExecutor {
    registry: Arc<OperationRegistry>,
    handlers: Arc<HandlerRegistry>,
    cancel: Arc<CancellationController>,
}

/// Stamps a failed terminal status if the loop stopped without reaching
/// one, then discards the operation's cancellation flag. Runs on every
/// exit from the spawned loop, including unwinding.
struct RunGuard {
    registry: Arc<OperationRegistry>,
    cancel: Arc<CancellationController>,
    id: Uuid,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if let Ok(op) = self.registry.get(self.id) {
            if !op.status.is_terminal() {
                let mut errors = op.errors;
                errors.push(EntityError {
                    entity_id: String::new(),
                    message: "executor stopped before reaching a terminal status".to_string(),
                });
                let _ = self
                    .registry
                    .finish(self.id, OperationStatus::Failed, op.progress, errors);
                tracing::error!(operation = %self.id, "bulk operation run stopped unexpectedly");
            }
        }
        self.cancel.clear(self.id);
    }
}

impl BulkExecutor {
    pub fn new(
        registry: Arc<OperationRegistry>,
        handlers: Arc<HandlerRegistry>,
        cancel: Arc<CancellationController>,
    ) -> Self {
        Self {
            registry,
            handlers,
            cancel,
        }
    }

    /// Validate a create request against the dispatch table and store the
    /// pending record. Unsupported pairs are rejected here so execution
    /// can assume a handler exists.
    pub fn create(&self, req: CreateOperationRequest) -> Result<BulkOperation, OperationError> {
        if !self.handlers.supports(req.entity_type, req.operation_type) {
            return Err(OperationError::Validation(format!(
                "no handler registered for {:?}/{:?}",
                req.entity_type, req.operation_type
            )));
        }
        self.registry.create(req)
    }

    /// Run a pending operation to a terminal status and return the final
    /// record. Synchronous from the caller's point of view; internally
    /// proceeds entity by entity, polling the cancellation flag before
    /// each unit of work.
    ///
    /// The loop runs on a detached task: dropping this future (a caller
    /// that disconnects mid-request) does not stop the work, and the
    /// record still reaches a terminal status.
    pub async fn execute(&self, id: Uuid) -> Result<BulkOperation, OperationError> {
        let op = self.registry.begin(id)?;
        tracing::info!(
            operation = %id,
            name = %op.name,
            entity_type = ?op.entity_type,
            operation_type = ?op.operation_type,
            entities = op.entity_ids.len(),
            dry_run = op.options.dry_run,
            "bulk operation started"
        );

        let task = tokio::spawn(Self::run(
            Arc::clone(&self.registry),
            Arc::clone(&self.handlers),
            Arc::clone(&self.cancel),
            op,
        ));
        match task.await {
            Ok(result) => result,
            Err(e) => {
                // The guard inside the task already stamped the terminal
                // status; report whatever the registry holds now.
                tracing::error!(operation = %id, error = %e, "bulk operation task failed");
                self.registry.get(id)
            }
        }
    }

    async fn run(
        registry: Arc<OperationRegistry>,
        handlers: Arc<HandlerRegistry>,
        cancel: Arc<CancellationController>,
        op: BulkOperation,
    ) -> Result<BulkOperation, OperationError> {
        let _guard = RunGuard {
            registry: Arc::clone(&registry),
            cancel: Arc::clone(&cancel),
            id: op.id,
        };
        Self::run_inner(&registry, &handlers, &cancel, &op).await
    }

    async fn run_inner(
        registry: &OperationRegistry,
        handlers: &HandlerRegistry,
        cancel: &CancellationController,
        op: &BulkOperation,
    ) -> Result<BulkOperation, OperationError> {
        let id = op.id;
        let handler = match handlers.resolve(op.entity_type, op.operation_type) {
            Some(h) => h,
            None => {
                // Pairs are validated at create time; a miss here means the
                // table changed underneath us. Fail terminally rather than
                // leave the record running.
                let errors = vec![EntityError {
                    entity_id: String::new(),
                    message: format!(
                        "handler for {:?}/{:?} disappeared from the dispatch table",
                        op.entity_type, op.operation_type
                    ),
                }];
                return registry.finish(id, OperationStatus::Failed, Progress::default(), errors);
            }
        };

        let flag = cancel.flag_for(id);
        let log_every = crate::config::config().operations.log_progress_every;
        let mut progress = Progress::default();
        let mut errors: Vec<EntityError> = Vec::new();
        let mut halted = false;

        for (index, entity_id) in op.entity_ids.iter().enumerate() {
            // Polled only at the unit-of-work boundary; an in-flight
            // handler call always finishes before cancellation lands.
            if flag.load(Ordering::SeqCst) {
                tracing::info!(
                    operation = %id,
                    processed = progress.processed,
                    "bulk operation cancelled at batch boundary"
                );
                return registry.finish(id, OperationStatus::Cancelled, progress, errors);
            }

            if op.options.dry_run {
                progress.processed += 1;
                progress.skipped += 1;
            } else {
                match handler.apply(entity_id, &op.config).await {
                    Ok(()) => {
                        progress.processed += 1;
                        progress.succeeded += 1;
                    }
                    Err(e) => {
                        progress.processed += 1;
                        progress.failed += 1;
                        tracing::warn!(
                            operation = %id,
                            entity = %entity_id,
                            handler = handler.name(),
                            error = %e,
                            "entity failed"
                        );
                        errors.push(EntityError {
                            entity_id: entity_id.clone(),
                            message: e.to_string(),
                        });
                        if !op.options.continue_on_error {
                            halted = true;
                        }
                    }
                }
            }

            if halted {
                break;
            }

            let boundary = (index + 1) % op.options.batch_size == 0;
            if boundary {
                registry.update_progress(id, progress.clone(), errors.clone())?;
            }
            if log_every > 0 && (index + 1) % log_every == 0 {
                tracing::info!(
                    operation = %id,
                    processed = progress.processed,
                    failed = progress.failed,
                    "bulk operation progress"
                );
            }
        }

        // Completion reflects the worst outcome among processed entities,
        // not merely that the loop ran to the end.
        let status = if progress.failed == 0 {
            OperationStatus::Completed
        } else {
            OperationStatus::Failed
        };
        registry.finish(id, status, progress, errors)
    }
}
