//! In-memory processor: a non-transactional backend for tests and for
//! deployments without a database. Commit/rollback on its batches are the
//! harmless no-op stubs.

use crate::context::AppContext;
use crate::error::ApiError;
use crate::operation::Operation;
use crate::paginator::fetch_window;
use crate::processor::filter::{compare_values, filter_matches, loosely_equal, parse_filter_value};
use crate::processor::OperationProcessor;
use crate::resource::{Relationship, RelationshipData, Resource};
use crate::schema::{ResourceRegistry, ResourceSchema};
use crate::serializer::{foreign_key_column, Serializer};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Shared record store, cloneable across processors.
#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<RwLock<HashMap<String, Vec<Resource>>>>,
    next_id: Arc<AtomicU64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, resource_type: impl Into<String>, records: Vec<Resource>) {
        let mut guard = self.records.write().expect("store lock poisoned");
        guard.entry(resource_type.into()).or_default().extend(records);
    }

    pub fn all(&self, resource_type: &str) -> Vec<Resource> {
        self.records
            .read()
            .expect("store lock poisoned")
            .get(resource_type)
            .cloned()
            .unwrap_or_default()
    }

    fn generate_id(&self) -> String {
        (self.next_id.fetch_add(1, Ordering::Relaxed) + 1).to_string()
    }
}

pub struct MemoryProcessor {
    resource_type: String,
    schema: Arc<ResourceSchema>,
    serializer: Arc<dyn Serializer>,
    registry: Arc<ResourceRegistry>,
    store: MemoryStore,
}

impl MemoryProcessor {
    pub fn new(
        resource_type: impl Into<String>,
        schema: Arc<ResourceSchema>,
        serializer: Arc<dyn Serializer>,
        registry: Arc<ResourceRegistry>,
        store: MemoryStore,
    ) -> Self {
        MemoryProcessor {
            resource_type: resource_type.into(),
            schema,
            serializer,
            registry,
            store,
        }
    }

    fn attribute_of(&self, record: &Resource, key: &str) -> Option<Value> {
        if key == self.schema.primary_key {
            return record.id.clone().map(Value::String);
        }
        record.attributes.get(key).cloned()
    }

    fn matches(&self, record: &Resource, filters: &HashMap<String, Value>) -> bool {
        filters.iter().all(|(key, raw)| {
            let parsed = parse_filter_value(raw);
            let actual = self.attribute_of(record, key);
            filter_matches(&parsed, actual.as_ref())
        })
    }

    fn sort_records(&self, records: &mut [Resource], sort: &[String]) {
        if sort.is_empty() {
            return;
        }
        records.sort_by(|a, b| {
            for criteria in sort {
                let (field, descending) = match criteria.strip_prefix('-') {
                    Some(f) => (f, true),
                    None => (criteria.as_str(), false),
                };
                let left = self.attribute_of(a, field).unwrap_or(Value::Null);
                let right = self.attribute_of(b, field).unwrap_or(Value::Null);
                let ord = compare_values(&left, &right).unwrap_or(std::cmp::Ordering::Equal);
                let ord = if descending { ord.reverse() } else { ord };
                if ord != std::cmp::Ordering::Equal {
                    return ord;
                }
            }
            std::cmp::Ordering::Equal
        });
    }

    fn eager_load(&self, records: &mut [Resource], include: &[String]) {
        for name in include {
            let Some(descriptor) = self.schema.relationships.get(name) else {
                tracing::warn!(relationship = %name, resource_type = %self.resource_type, "unknown include");
                continue;
            };
            let Some(related_schema) = self.registry.schema_for(&descriptor.related_type) else {
                continue;
            };
            let related_records = self.store.all(&descriptor.related_type);

            if descriptor.is_belongs_to() {
                let fk = foreign_key_column(
                    self.serializer.as_ref(),
                    name,
                    descriptor,
                    &self.registry,
                );
                for record in records.iter_mut() {
                    let Some(fk_value) = record.attributes.get(&fk).cloned() else {
                        continue;
                    };
                    if fk_value.is_null() {
                        continue;
                    }
                    let related = related_records.iter().find(|r| {
                        r.id.as_ref()
                            .map(|id| loosely_equal(&Value::String(id.clone()), &fk_value))
                            .unwrap_or(false)
                    });
                    if let Some(related) = related {
                        record.relationships.insert(
                            name.clone(),
                            Relationship {
                                data: Some(RelationshipData::One(Box::new(related.clone()))),
                            },
                        );
                    }
                }
            } else {
                let Some((back_name, back_descriptor)) =
                    related_schema.belongs_to_pointing_at(&self.resource_type)
                else {
                    continue;
                };
                let fk = foreign_key_column(
                    self.serializer.as_ref(),
                    back_name,
                    back_descriptor,
                    &self.registry,
                );
                for record in records.iter_mut() {
                    let Some(id) = record.id.clone() else { continue };
                    let id_value = Value::String(id);
                    let related: Vec<Resource> = related_records
                        .iter()
                        .filter(|r| {
                            r.attributes
                                .get(&fk)
                                .map(|v| loosely_equal(v, &id_value))
                                .unwrap_or(false)
                        })
                        .cloned()
                        .collect();
                    record.relationships.insert(
                        name.clone(),
                        Relationship {
                            data: Some(RelationshipData::Many(related)),
                        },
                    );
                }
            }
        }
    }
}

#[async_trait]
impl OperationProcessor for MemoryProcessor {
    fn resource_type(&self) -> &str {
        &self.resource_type
    }

    fn schema(&self) -> &ResourceSchema {
        &self.schema
    }

    async fn get(&self, op: &Operation, _ctx: &AppContext) -> Result<Vec<Resource>, ApiError> {
        let mut filters = op.params.filter.clone();
        if let Some(id) = &op.target.id {
            filters
                .entry(self.schema.primary_key.clone())
                .or_insert_with(|| Value::String(id.clone()));
        }

        let mut records: Vec<Resource> = self
            .store
            .all(&self.resource_type)
            .into_iter()
            .filter(|r| self.matches(r, &filters))
            .collect();
        self.sort_records(&mut records, &op.params.sort);

        if let Some(page) = &op.params.page {
            let (offset, limit) = fetch_window(page);
            records = records
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .collect();
        }

        if let Some(fields) = op.params.fields.get(&self.resource_type) {
            let keep: Vec<String> = self
                .schema
                .relationships
                .iter()
                .filter(|(_, d)| d.is_belongs_to())
                .map(|(name, d)| {
                    foreign_key_column(self.serializer.as_ref(), name, d, &self.registry)
                })
                .collect();
            for record in &mut records {
                record
                    .attributes
                    .retain(|name, _| fields.contains(name) || keep.contains(name));
            }
        }

        if !op.params.include.is_empty() && !records.is_empty() {
            self.eager_load(&mut records, &op.params.include);
        }
        Ok(records)
    }

    async fn add(&self, op: &Operation, _ctx: &AppContext) -> Result<Resource, ApiError> {
        let data = op
            .data
            .as_ref()
            .ok_or_else(|| ApiError::BadRequest("add requires data".into()))?;
        let mut record = data.clone();
        if record.id.is_none() {
            record.id = Some(self.store.generate_id());
        }
        record.relationships.clear();
        self.store.seed(self.resource_type.clone(), vec![record.clone()]);
        Ok(record)
    }

    async fn update(&self, op: &Operation, _ctx: &AppContext) -> Result<Resource, ApiError> {
        let id = op
            .target
            .id
            .as_ref()
            .ok_or_else(|| ApiError::BadRequest("update requires ref.id".into()))?;
        let attributes = op.data.as_ref().map(|d| d.attributes.clone()).unwrap_or_default();
        let mut guard = self.store.records.write().expect("store lock poisoned");
        let records = guard.get_mut(&self.resource_type).ok_or(ApiError::RecordNotFound)?;
        let record = records
            .iter_mut()
            .find(|r| r.id.as_deref() == Some(id.as_str()))
            .ok_or(ApiError::RecordNotFound)?;
        record.attributes.extend(attributes);
        Ok(record.clone())
    }

    async fn remove(&self, op: &Operation, _ctx: &AppContext) -> Result<(), ApiError> {
        let id = op
            .target
            .id
            .as_ref()
            .ok_or_else(|| ApiError::BadRequest("remove requires ref.id".into()))?;
        let mut guard = self.store.records.write().expect("store lock poisoned");
        let records = guard.get_mut(&self.resource_type).ok_or(ApiError::RecordNotFound)?;
        let position = records
            .iter()
            .position(|r| r.id.as_deref() == Some(id.as_str()))
            .ok_or(ApiError::RecordNotFound)?;
        records.remove(position);
        Ok(())
    }
}
