// In-process entity handlers backed by an in-memory catalog. The server
// binary registers these as its default dispatch table; deployments with
// real backends supply their own EntityHandler implementations instead.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::operations::dispatch::{EntityHandler, HandlerError, HandlerRegistry};
use crate::operations::types::{EntityType, OperationType};

#[derive(Debug, Clone, Serialize)]
pub struct EntityRecord {
    pub id: String,
    pub entity_type: EntityType,
    pub tags: Vec<String>,
    pub attributes: Value,
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportArtifact {
    pub entity_id: String,
    pub payload: Value,
    pub exported_at: DateTime<Utc>,
}

/// Catalog of platform entities the default handlers mutate.
pub struct MemoryEntityCatalog {
    entities: RwLock<HashMap<(EntityType, String), EntityRecord>>,
    exports: RwLock<Vec<ExportArtifact>>,
}

impl MemoryEntityCatalog {
    pub fn new() -> Self {
        Self {
            entities: RwLock::new(HashMap::new()),
            exports: RwLock::new(Vec::new()),
        }
    }

    pub fn insert(&self, entity_type: EntityType, id: impl Into<String>, attributes: Value) {
        let id = id.into();
        let record = EntityRecord {
            id: id.clone(),
            entity_type,
            tags: Vec::new(),
            attributes,
            deleted: false,
        };
        self.entities
            .write()
            .expect("catalog lock poisoned")
            .insert((entity_type, id), record);
    }

    pub fn get(&self, entity_type: EntityType, id: &str) -> Option<EntityRecord> {
        self.entities
            .read()
            .expect("catalog lock poisoned")
            .get(&(entity_type, id.to_string()))
            .cloned()
    }

    pub fn exports(&self) -> Vec<ExportArtifact> {
        self.exports.read().expect("catalog lock poisoned").clone()
    }

    fn with_entity<T>(
        &self,
        entity_type: EntityType,
        id: &str,
        f: impl FnOnce(&mut EntityRecord) -> T,
    ) -> Result<T, HandlerError> {
        let mut entities = self.entities.write().expect("catalog lock poisoned");
        let record = entities
            .get_mut(&(entity_type, id.to_string()))
            .ok_or_else(|| HandlerError::new(format!("entity not found: {}", id)))?;
        Ok(f(record))
    }
}

impl Default for MemoryEntityCatalog {
    fn default() -> Self {
        Self::new()
    }
}

/// Soft-deletes the target entity.
pub struct DeleteHandler {
    pub catalog: Arc<MemoryEntityCatalog>,
    pub entity_type: EntityType,
}

#[async_trait]
impl EntityHandler for DeleteHandler {
    fn name(&self) -> &'static str {
        "delete"
    }

    async fn apply(&self, entity_id: &str, _config: &Value) -> Result<(), HandlerError> {
        self.catalog.with_entity(self.entity_type, entity_id, |record| {
            record.deleted = true;
        })
    }
}

/// Appends `config.tag` to the entity's tag list (idempotent).
pub struct TagHandler {
    pub catalog: Arc<MemoryEntityCatalog>,
    pub entity_type: EntityType,
}

#[async_trait]
impl EntityHandler for TagHandler {
    fn name(&self) -> &'static str {
        "tag"
    }

    async fn apply(&self, entity_id: &str, config: &Value) -> Result<(), HandlerError> {
        let tag = config
            .get("tag")
            .and_then(Value::as_str)
            .ok_or_else(|| HandlerError::new("config.tag is required"))?
            .to_string();
        self.catalog.with_entity(self.entity_type, entity_id, |record| {
            if !record.tags.contains(&tag) {
                record.tags.push(tag);
            }
        })
    }
}

/// Snapshots the entity's attributes into the export list.
pub struct ExportHandler {
    pub catalog: Arc<MemoryEntityCatalog>,
    pub entity_type: EntityType,
}

#[async_trait]
impl EntityHandler for ExportHandler {
    fn name(&self) -> &'static str {
        "export"
    }

    async fn apply(&self, entity_id: &str, _config: &Value) -> Result<(), HandlerError> {
        let record = self
            .catalog
            .get(self.entity_type, entity_id)
            .ok_or_else(|| HandlerError::new(format!("entity not found: {}", entity_id)))?;
        self.catalog
            .exports
            .write()
            .expect("catalog lock poisoned")
            .push(ExportArtifact {
                entity_id: record.id,
                payload: record.attributes,
                exported_at: Utc::now(),
            });
        Ok(())
    }
}

/// Merges the `config.set` object into the entity's attributes.
pub struct TransformHandler {
    pub catalog: Arc<MemoryEntityCatalog>,
    pub entity_type: EntityType,
}

#[async_trait]
impl EntityHandler for TransformHandler {
    fn name(&self) -> &'static str {
        "transform"
    }

    async fn apply(&self, entity_id: &str, config: &Value) -> Result<(), HandlerError> {
        let patch = config
            .get("set")
            .and_then(Value::as_object)
            .ok_or_else(|| HandlerError::new("config.set must be an object"))?
            .clone();
        self.catalog.with_entity(self.entity_type, entity_id, |record| {
            if !record.attributes.is_object() {
                record.attributes = Value::Object(Default::default());
            }
            if let Value::Object(attrs) = &mut record.attributes {
                for (key, value) in patch {
                    attrs.insert(key, value);
                }
            }
        })
    }
}

/// Full dispatch table over the in-memory catalog: every entity type
/// supports delete, tag, export, and transform.
pub fn default_handler_registry(catalog: Arc<MemoryEntityCatalog>) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    for entity_type in [EntityType::DataSource, EntityType::Pipeline, EntityType::Job] {
        registry = registry
            .register(
                entity_type,
                OperationType::Delete,
                Arc::new(DeleteHandler {
                    catalog: Arc::clone(&catalog),
                    entity_type,
                }),
            )
            .register(
                entity_type,
                OperationType::Tag,
                Arc::new(TagHandler {
                    catalog: Arc::clone(&catalog),
                    entity_type,
                }),
            )
            .register(
                entity_type,
                OperationType::Export,
                Arc::new(ExportHandler {
                    catalog: Arc::clone(&catalog),
                    entity_type,
                }),
            )
            .register(
                entity_type,
                OperationType::Transform,
                Arc::new(TransformHandler {
                    catalog: Arc::clone(&catalog),
                    entity_type,
                }),
            );
    }
    registry
}
