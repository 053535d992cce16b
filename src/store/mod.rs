// Narrow interfaces to the persistence collaborators the engine calls.
// The engine owns none of their internals; the in-memory implementations
// in `memory` back the server binary and the test suite.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Source not found: {0}")]
    SourceNotFound(String),
    #[error("Version {version} not found for source {source_id}")]
    VersionNotFound { source_id: String, version: u64 },
    #[error("Store I/O error: {0}")]
    Io(String),
}

/// One committed snapshot of a data source.
#[derive(Debug, Clone, Serialize)]
pub struct VersionInfo {
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub record_count: usize,
    pub schema: Value,
}

/// Immutable, monotonically numbered snapshots per data source.
#[async_trait]
pub trait VersionedStore: Send + Sync {
    /// Committed versions of a source, oldest first.
    async fn list_versions(&self, source_id: &str) -> Result<Vec<VersionInfo>, StoreError>;

    async fn read_version(&self, source_id: &str, version: u64) -> Result<Value, StoreError>;

    /// Append a new version holding `payload`; returns its number.
    async fn write_version(&self, source_id: &str, payload: Value) -> Result<u64, StoreError>;
}

/// What the coordinator needs to know about a pipeline execution to pick
/// a rollback target: which source it wrote and when it started.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRecord {
    pub execution_id: String,
    pub pipeline_id: String,
    pub source_id: String,
    pub started_at: DateTime<Utc>,
}

#[async_trait]
pub trait ExecutionLog: Send + Sync {
    async fn get_execution(&self, execution_id: &str)
        -> Result<Option<ExecutionRecord>, StoreError>;
}
