use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;

use super::{ExecutionLog, ExecutionRecord, StoreError, VersionInfo, VersionedStore};

struct StoredVersion {
    info: VersionInfo,
    payload: Value,
}

/// In-memory versioned store. Version numbers are monotonic per source,
/// starting at 1; versions are never mutated after commit.
pub struct MemoryVersionedStore {
    sources: RwLock<HashMap<String, Vec<StoredVersion>>>,
}

impl MemoryVersionedStore {
    pub fn new() -> Self {
        Self {
            sources: RwLock::new(HashMap::new()),
        }
    }

    /// Commit a version with an explicit timestamp. Test fixtures use
    /// this to build histories around a failed execution's start time.
    pub fn write_version_at(
        &self,
        source_id: &str,
        payload: Value,
        created_at: DateTime<Utc>,
    ) -> u64 {
        let mut sources = self.sources.write().expect("store lock poisoned");
        let versions = sources.entry(source_id.to_string()).or_default();
        let version = versions.last().map(|v| v.info.version + 1).unwrap_or(1);
        let record_count = payload.as_array().map(Vec::len).unwrap_or(1);
        versions.push(StoredVersion {
            info: VersionInfo {
                version,
                created_at,
                record_count,
                schema: Value::Null,
            },
            payload,
        });
        version
    }

    /// Latest committed payload, if any.
    pub fn read_head(&self, source_id: &str) -> Option<Value> {
        let sources = self.sources.read().expect("store lock poisoned");
        sources
            .get(source_id)
            .and_then(|versions| versions.last())
            .map(|v| v.payload.clone())
    }
}

impl Default for MemoryVersionedStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VersionedStore for MemoryVersionedStore {
    async fn list_versions(&self, source_id: &str) -> Result<Vec<VersionInfo>, StoreError> {
        let sources = self.sources.read().expect("store lock poisoned");
        let versions = sources
            .get(source_id)
            .ok_or_else(|| StoreError::SourceNotFound(source_id.to_string()))?;
        Ok(versions.iter().map(|v| v.info.clone()).collect())
    }

    async fn read_version(&self, source_id: &str, version: u64) -> Result<Value, StoreError> {
        let sources = self.sources.read().expect("store lock poisoned");
        let versions = sources
            .get(source_id)
            .ok_or_else(|| StoreError::SourceNotFound(source_id.to_string()))?;
        versions
            .iter()
            .find(|v| v.info.version == version)
            .map(|v| v.payload.clone())
            .ok_or(StoreError::VersionNotFound {
                source_id: source_id.to_string(),
                version,
            })
    }

    async fn write_version(&self, source_id: &str, payload: Value) -> Result<u64, StoreError> {
        Ok(self.write_version_at(source_id, payload, Utc::now()))
    }
}

/// In-memory execution log keyed by execution id.
pub struct MemoryExecutionLog {
    executions: RwLock<HashMap<String, ExecutionRecord>>,
}

impl MemoryExecutionLog {
    pub fn new() -> Self {
        Self {
            executions: RwLock::new(HashMap::new()),
        }
    }

    pub fn record(&self, execution: ExecutionRecord) {
        self.executions
            .write()
            .expect("execution log lock poisoned")
            .insert(execution.execution_id.clone(), execution);
    }
}

impl Default for MemoryExecutionLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutionLog for MemoryExecutionLog {
    async fn get_execution(
        &self,
        execution_id: &str,
    ) -> Result<Option<ExecutionRecord>, StoreError> {
        let executions = self.executions.read().expect("execution log lock poisoned");
        Ok(executions.get(execution_id).cloned())
    }
}
