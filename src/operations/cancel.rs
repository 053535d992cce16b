use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use crate::operations::registry::OperationRegistry;
use crate::operations::types::OperationStatus;

/// Per-operation cancellation signal.
///
/// One boolean flag per operation id, set at most once and read-only
/// thereafter. The executor polls the flag at unit-of-work boundaries, so
/// a cancellation takes effect after the in-flight entity's handler
/// finishes and is never preemptive. Flags are dropped again once the
/// operation reaches a terminal status; the record itself stays in the
/// registry.
pub struct CancellationController {
    registry: Arc<OperationRegistry>,
    flags: RwLock<HashMap<Uuid, Arc<AtomicBool>>>,
}

impl CancellationController {
    pub fn new(registry: Arc<OperationRegistry>) -> Self {
        Self {
            registry,
            flags: RwLock::new(HashMap::new()),
        }
    }

    /// Request cancellation. Returns true only when the operation is
    /// currently running; unknown, pending, and terminal operations
    /// return false (no record is changed).
    pub fn request_cancel(&self, id: Uuid) -> bool {
        match self.registry.status(id) {
            Some(OperationStatus::Running) => {
                self.flag_for(id).store(true, Ordering::SeqCst);
                tracing::info!(operation = %id, "cancellation requested");
                true
            }
            _ => false,
        }
    }

    /// Shared flag for an operation id, created on demand so a cancel
    /// racing the executor's startup lands on the same atomic.
    pub fn flag_for(&self, id: Uuid) -> Arc<AtomicBool> {
        if let Some(flag) = self.flags.read().expect("cancel lock poisoned").get(&id) {
            return Arc::clone(flag);
        }
        let mut flags = self.flags.write().expect("cancel lock poisoned");
        Arc::clone(flags.entry(id).or_default())
    }

    /// Discard the flag for a finished operation. A terminal operation
    /// can never be cancelled again, so the signal has no readers left.
    pub fn clear(&self, id: Uuid) {
        self.flags.write().expect("cancel lock poisoned").remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::types::{
        CreateOperationRequest, EntityType, OperationOptions, OperationType,
    };

    fn pending_op(registry: &OperationRegistry) -> Uuid {
        registry
            .create(CreateOperationRequest {
                name: "cancel test".to_string(),
                entity_type: EntityType::Pipeline,
                operation_type: OperationType::Delete,
                entity_ids: vec!["p-1".to_string()],
                config: serde_json::Value::Null,
                options: OperationOptions::default(),
            })
            .unwrap()
            .id
    }

    #[test]
    fn cancel_before_start_is_refused() {
        let registry = Arc::new(OperationRegistry::new());
        let controller = CancellationController::new(Arc::clone(&registry));
        let id = pending_op(&registry);
        assert!(!controller.request_cancel(id));
        assert_eq!(registry.status(id), Some(OperationStatus::Pending));
    }

    #[test]
    fn cancel_unknown_id_is_refused() {
        let registry = Arc::new(OperationRegistry::new());
        let controller = CancellationController::new(registry);
        assert!(!controller.request_cancel(Uuid::new_v4()));
    }

    #[test]
    fn cancel_running_sets_the_shared_flag() {
        let registry = Arc::new(OperationRegistry::new());
        let controller = CancellationController::new(Arc::clone(&registry));
        let id = pending_op(&registry);
        registry.begin(id).unwrap();

        let flag = controller.flag_for(id);
        assert!(!flag.load(Ordering::SeqCst));
        assert!(controller.request_cancel(id));
        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn clear_discards_the_flag() {
        let registry = Arc::new(OperationRegistry::new());
        let controller = CancellationController::new(Arc::clone(&registry));
        let id = pending_op(&registry);
        registry.begin(id).unwrap();

        controller.flag_for(id).store(true, Ordering::SeqCst);
        controller.clear(id);
        // A fresh flag starts unset
        assert!(!controller.flag_for(id).load(Ordering::SeqCst));
    }
}
