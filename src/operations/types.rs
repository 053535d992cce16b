use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Entity domains a bulk operation may target. Closed set defined by the
/// host application; unknown values are rejected during deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityType {
    DataSource,
    Pipeline,
    Job,
}

/// Actions a bulk operation may apply to each target entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Delete,
    Tag,
    Export,
    Transform,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl OperationStatus {
    /// Terminal statuses never change again once reached.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationStatus::Completed | OperationStatus::Failed | OperationStatus::Cancelled
        )
    }
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OperationStatus::Pending => "pending",
            OperationStatus::Running => "running",
            OperationStatus::Completed => "completed",
            OperationStatus::Failed => "failed",
            OperationStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Per-entity counters, monotonically non-decreasing while running.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// One per-entity failure, in processing order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityError {
    pub entity_id: String,
    pub message: String,
}

/// Execution tuning supplied at create time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationOptions {
    /// Progress is flushed to the registry at every batch boundary
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// When false, the first per-entity failure halts the loop
    #[serde(default = "default_true")]
    pub continue_on_error: bool,
    /// When true, entities are counted as skipped and no handler runs
    #[serde(default)]
    pub dry_run: bool,
}

fn default_batch_size() -> usize {
    crate::config::config().operations.default_batch_size
}

fn default_true() -> bool {
    true
}

impl Default for OperationOptions {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            continue_on_error: true,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkOperation {
    pub id: Uuid,
    pub name: String,
    pub entity_type: EntityType,
    pub operation_type: OperationType,
    /// Target identifiers; defines the unit-of-work sequence
    pub entity_ids: Vec<String>,
    /// Opaque parameters interpreted by the entity handler
    pub config: Value,
    pub options: OperationOptions,
    pub status: OperationStatus,
    pub progress: Progress,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub errors: Vec<EntityError>,
}

/// Create request for a bulk operation.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOperationRequest {
    pub name: String,
    pub entity_type: EntityType,
    pub operation_type: OperationType,
    pub entity_ids: Vec<String>,
    #[serde(default)]
    pub config: Value,
    #[serde(default)]
    pub options: OperationOptions,
}

/// Aggregate counts over the current record set, computed on demand.
#[derive(Debug, Clone, Serialize)]
pub struct OperationStatistics {
    pub total_operations: usize,
    pub by_status: HashMap<OperationStatus, usize>,
    pub by_entity_type: HashMap<EntityType, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(!OperationStatus::Pending.is_terminal());
        assert!(!OperationStatus::Running.is_terminal());
        assert!(OperationStatus::Completed.is_terminal());
        assert!(OperationStatus::Failed.is_terminal());
        assert!(OperationStatus::Cancelled.is_terminal());
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let opts: OperationOptions = serde_json::from_str("{}").unwrap();
        assert!(opts.continue_on_error);
        assert!(!opts.dry_run);
        assert!(opts.batch_size > 0);
    }

    #[test]
    fn entity_type_wire_names() {
        let t: EntityType = serde_json::from_str("\"data-source\"").unwrap();
        assert_eq!(t, EntityType::DataSource);
        assert!(serde_json::from_str::<EntityType>("\"warehouse\"").is_err());
    }
}
