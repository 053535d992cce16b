use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::operations::types::{EntityType, OperationType};

#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
    pub message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// One unit of work: apply a single operation to a single entity.
///
/// Handlers own the actual mutation; the executor only sequences calls
/// and aggregates results. The engine takes no cross-operation locks, so
/// concurrent operations over overlapping entity ids race at this
/// boundary; whether that is acceptable depends on the handler being
/// idempotent.
#[async_trait]
pub trait EntityHandler: Send + Sync {
    /// Handler name for logging
    fn name(&self) -> &'static str;

    async fn apply(&self, entity_id: &str, config: &Value) -> Result<(), HandlerError>;
}

/// Lookup table mapping `(entity_type, operation_type)` to a handler.
/// Built once at startup; unsupported pairs are rejected at create time
/// rather than at execution time.
pub struct HandlerRegistry {
    handlers: HashMap<(EntityType, OperationType), Arc<dyn EntityHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(
        mut self,
        entity_type: EntityType,
        operation_type: OperationType,
        handler: Arc<dyn EntityHandler>,
    ) -> Self {
        self.handlers.insert((entity_type, operation_type), handler);
        self
    }

    pub fn supports(&self, entity_type: EntityType, operation_type: OperationType) -> bool {
        self.handlers.contains_key(&(entity_type, operation_type))
    }

    pub fn resolve(
        &self,
        entity_type: EntityType,
        operation_type: OperationType,
    ) -> Option<Arc<dyn EntityHandler>> {
        self.handlers.get(&(entity_type, operation_type)).cloned()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
