use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RollbackStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RollbackStatus {
    /// Terminal statuses never change again once reached.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RollbackStatus::Completed | RollbackStatus::Failed)
    }
}

/// Corrective action restoring a data source to a version committed
/// before a failed pipeline execution began. Modeled as an operation with
/// its own status vocabulary; synchronous end-to-end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackOperation {
    pub id: Uuid,
    pub pipeline_id: String,
    pub execution_id: String,
    pub project_id: String,
    pub reason: String,
    pub initiated_by: String,
    pub status: RollbackStatus,
    /// The version whose data the source was restored to
    pub restored_version: Option<u64>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RollbackRequest {
    pub execution_id: String,
    pub pipeline_id: String,
    pub project_id: String,
    pub reason: String,
    pub initiated_by: String,
}

/// Process-wide rollback policy. Changes take effect on the next
/// invocation only; an in-flight rollback keeps the snapshot it started
/// with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackPolicy {
    /// Whether pipeline failures trigger rollback without an operator
    pub auto_rollback: bool,
    /// How many of the newest versions remain eligible as targets
    pub version_retention: usize,
}
