//! Default processor: CRUD against PostgreSQL through the batch transaction.

use crate::context::AppContext;
use crate::error::ApiError;
use crate::operation::Operation;
use crate::paginator::fetch_window;
use crate::processor::OperationProcessor;
use crate::resource::{Relationship, RelationshipData, Resource};
use crate::schema::{AttributeKind, ResourceRegistry, ResourceSchema};
use crate::serializer::{foreign_key_column, Serializer};
use crate::sql::{self, BindValue, QueryBuf, SqlTarget};
use crate::transaction::Transaction;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgConnection, PgRow};
use std::collections::HashMap;
use std::sync::Arc;

pub struct SqlProcessor {
    resource_type: String,
    schema: Arc<ResourceSchema>,
    serializer: Arc<dyn Serializer>,
    registry: Arc<ResourceRegistry>,
}

impl SqlProcessor {
    pub fn new(
        resource_type: impl Into<String>,
        schema: Arc<ResourceSchema>,
        serializer: Arc<dyn Serializer>,
        registry: Arc<ResourceRegistry>,
    ) -> Self {
        SqlProcessor {
            resource_type: resource_type.into(),
            schema,
            serializer,
            registry,
        }
    }

    fn target(&self) -> SqlTarget<'_> {
        SqlTarget {
            resource_type: &self.resource_type,
            schema: &self.schema,
            serializer: self.serializer.as_ref(),
            registry: &self.registry,
        }
    }

    fn target_for<'a>(
        &'a self,
        resource_type: &'a str,
        schema: &'a ResourceSchema,
    ) -> SqlTarget<'a> {
        SqlTarget {
            resource_type,
            schema,
            serializer: self.serializer.as_ref(),
            registry: &self.registry,
        }
    }

    async fn fetch_all(
        conn: &mut PgConnection,
        q: &QueryBuf,
    ) -> Result<Vec<PgRow>, ApiError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(BindValue::from(p));
        }
        Ok(query.fetch_all(&mut *conn).await?)
    }

    async fn fetch_optional(
        conn: &mut PgConnection,
        q: &QueryBuf,
    ) -> Result<Option<PgRow>, ApiError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(BindValue::from(p));
        }
        Ok(query.fetch_optional(&mut *conn).await?)
    }

    async fn execute_sql(conn: &mut PgConnection, q: &QueryBuf) -> Result<(), ApiError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(BindValue::from(p));
        }
        query.execute(&mut *conn).await?;
        Ok(())
    }

    /// The record must exist before update/remove mutate anything.
    async fn ensure_exists(&self, conn: &mut PgConnection, id: &Value) -> Result<(), ApiError> {
        let q = sql::select_pk(&self.target(), id);
        match Self::fetch_optional(conn, &q).await? {
            Some(_) => Ok(()),
            None => Err(ApiError::RecordNotFound),
        }
    }

    fn row_to_resource(&self, row: &PgRow) -> Resource {
        row_to_resource(row, &self.resource_type, &self.schema)
    }

    /// Object/array attributes are stored as encoded text; encode on the way
    /// in, everything else passes through unchanged.
    fn coerce_attributes(&self, attributes: &HashMap<String, Value>) -> HashMap<String, Value> {
        attributes
            .iter()
            .map(|(name, value)| {
                let coerced = match self.schema.attributes.get(name) {
                    Some(AttributeKind::Object) | Some(AttributeKind::Array)
                        if !value.is_null() =>
                    {
                        Value::String(value.to_string())
                    }
                    _ => value.clone(),
                };
                (name.clone(), coerced)
            })
            .collect()
    }

    /// Batch-fetches each requested include with a column-IN query and embeds
    /// the related records on their owners. One relationship level deep.
    async fn eager_load(
        &self,
        conn: &mut PgConnection,
        records: &mut [Resource],
        include: &[String],
    ) -> Result<(), ApiError> {
        for name in include {
            let Some(descriptor) = self.schema.relationships.get(name) else {
                tracing::warn!(relationship = %name, resource_type = %self.resource_type, "unknown include");
                continue;
            };
            let Some(related_schema) = self.registry.schema_for(&descriptor.related_type) else {
                tracing::warn!(related = %descriptor.related_type, "include targets unregistered type");
                continue;
            };
            let related_target = self.target_for(&descriptor.related_type, &related_schema);

            if descriptor.is_belongs_to() {
                let fk = foreign_key_column(
                    self.serializer.as_ref(),
                    name,
                    descriptor,
                    &self.registry,
                );
                let mut values: Vec<Value> = Vec::new();
                for record in records.iter() {
                    if let Some(v) = record.attributes.get(&fk) {
                        if !v.is_null() && !values.contains(v) {
                            values.push(v.clone());
                        }
                    }
                }
                let q = sql::select_where_in(&related_target, &related_schema.primary_key, &values);
                let rows = Self::fetch_all(conn, &q).await?;
                let mut by_id: HashMap<String, Resource> = HashMap::new();
                for row in &rows {
                    let related =
                        row_to_resource(row, &descriptor.related_type, &related_schema);
                    if let Some(id) = related.id.clone() {
                        by_id.insert(id, related);
                    }
                }
                for record in records.iter_mut() {
                    let Some(fk_value) = record.attributes.get(&fk) else {
                        continue;
                    };
                    if let Some(related) = by_id.get(&id_text(fk_value)) {
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
                    tracing::warn!(
                        relationship = %name,
                        related = %descriptor.related_type,
                        "no belongs-to pointing back at origin"
                    );
                    continue;
                };
                let fk = foreign_key_column(
                    self.serializer.as_ref(),
                    back_name,
                    back_descriptor,
                    &self.registry,
                );
                let values: Vec<Value> = records
                    .iter()
                    .filter_map(|r| r.id.as_deref().map(id_value))
                    .collect();
                let q = sql::select_where_in(&related_target, &fk, &values);
                let rows = Self::fetch_all(conn, &q).await?;
                let mut grouped: HashMap<String, Vec<Resource>> = HashMap::new();
                for row in &rows {
                    let related =
                        row_to_resource(row, &descriptor.related_type, &related_schema);
                    if let Some(owner) = related.attributes.get(&fk) {
                        grouped
                            .entry(id_text(owner))
                            .or_default()
                            .push(related);
                    }
                }
                for record in records.iter_mut() {
                    let Some(id) = record.id.clone() else { continue };
                    let related = grouped.remove(&id).unwrap_or_default();
                    record.relationships.insert(
                        name.clone(),
                        Relationship {
                            data: Some(RelationshipData::Many(related)),
                        },
                    );
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl OperationProcessor for SqlProcessor {
    fn resource_type(&self) -> &str {
        &self.resource_type
    }

    fn schema(&self) -> &ResourceSchema {
        &self.schema
    }

    async fn get(&self, op: &Operation, ctx: &AppContext) -> Result<Vec<Resource>, ApiError> {
        let mut guard = ctx.lock_transaction().await;
        let conn = require_connection(guard.as_mut())?;

        let mut filters = op.params.filter.clone();
        if let Some(id) = &op.target.id {
            filters
                .entry(self.schema.primary_key.clone())
                .or_insert_with(|| Value::String(id.clone()));
        }
        let window = op.params.page.as_ref().map(fetch_window);
        let fields = op.params.fields.get(&self.resource_type).map(|v| v.as_slice());
        let q = sql::select(&self.target(), &filters, &op.params.sort, window, fields);
        let rows = Self::fetch_all(conn, &q).await?;
        let mut records: Vec<Resource> = rows.iter().map(|r| self.row_to_resource(r)).collect();

        if !op.params.include.is_empty() && !records.is_empty() {
            self.eager_load(conn, &mut records, &op.params.include).await?;
        }
        Ok(records)
    }

    async fn add(&self, op: &Operation, ctx: &AppContext) -> Result<Resource, ApiError> {
        let mut guard = ctx.lock_transaction().await;
        let conn = require_connection(guard.as_mut())?;
        let data = op
            .data
            .as_ref()
            .ok_or_else(|| ApiError::BadRequest("add requires data".into()))?;
        let attributes = self.coerce_attributes(&data.attributes);
        let q = sql::insert(&self.target(), &attributes);
        let row = Self::fetch_optional(conn, &q)
            .await?
            .ok_or(ApiError::Db(sqlx::Error::RowNotFound))?;
        Ok(self.row_to_resource(&row))
    }

    async fn update(&self, op: &Operation, ctx: &AppContext) -> Result<Resource, ApiError> {
        let mut guard = ctx.lock_transaction().await;
        let conn = require_connection(guard.as_mut())?;
        let id = op
            .target
            .id
            .as_ref()
            .ok_or_else(|| ApiError::BadRequest("update requires ref.id".into()))?;
        let id = Value::String(id.clone());
        self.ensure_exists(conn, &id).await?;

        let attributes = match op.data.as_ref() {
            Some(data) if !data.attributes.is_empty() => self.coerce_attributes(&data.attributes),
            _ => {
                // Nothing to set; hand back the current record.
                let mut filters = HashMap::new();
                filters.insert(self.schema.primary_key.clone(), id.clone());
                let q = sql::select(&self.target(), &filters, &[], None, None);
                let row = Self::fetch_optional(conn, &q)
                    .await?
                    .ok_or(ApiError::RecordNotFound)?;
                return Ok(self.row_to_resource(&row));
            }
        };
        let q = sql::update(&self.target(), &id, &attributes);
        let row = Self::fetch_optional(conn, &q)
            .await?
            .ok_or(ApiError::RecordNotFound)?;
        Ok(self.row_to_resource(&row))
    }

    async fn remove(&self, op: &Operation, ctx: &AppContext) -> Result<(), ApiError> {
        let mut guard = ctx.lock_transaction().await;
        let conn = require_connection(guard.as_mut())?;
        let id = op
            .target
            .id
            .as_ref()
            .ok_or_else(|| ApiError::BadRequest("remove requires ref.id".into()))?;
        let id = Value::String(id.clone());
        self.ensure_exists(conn, &id).await?;
        let q = sql::delete(&self.target(), &id);
        Self::execute_sql(conn, &q).await
    }
}

fn require_connection(
    transaction: Option<&mut Transaction>,
) -> Result<&mut PgConnection, ApiError> {
    transaction
        .and_then(Transaction::connection)
        .ok_or_else(|| ApiError::Internal("sql processor requires an active database transaction".into()))
}

/// Primary-key text for matching related rows to their owners.
fn id_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Bind value for an id that may be numeric or textual.
fn id_value(id: &str) -> Value {
    id.parse::<i64>().map(Value::from).unwrap_or_else(|_| Value::String(id.to_string()))
}

fn row_to_resource(row: &PgRow, resource_type: &str, schema: &ResourceSchema) -> Resource {
    use sqlx::Column;
    use sqlx::Row;
    let mut attributes = HashMap::new();
    for col in row.columns() {
        let name = col.name();
        let mut value = cell_to_value(row, name);
        // Reverse the object/array text coercion applied on write.
        if let Some(AttributeKind::Object | AttributeKind::Array) = schema.attributes.get(name) {
            if let Value::String(text) = &value {
                if let Ok(decoded) = serde_json::from_str::<Value>(text) {
                    value = decoded;
                }
            }
        }
        attributes.insert(name.to_string(), value);
    }
    let id = attributes.remove(&schema.primary_key).map(|v| id_text(&v));
    Resource {
        resource_type: resource_type.to_string(),
        id,
        attributes,
        ..Default::default()
    }
}

fn cell_to_value(row: &PgRow, name: &str) -> Value {
    use sqlx::Row;
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(name) {
        return Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(name) {
        return j;
    }
    Value::Null
}
