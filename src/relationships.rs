//! Relationship traversal: rewrites an operation targeting `ref.relationship`
//! into a derived `get` on the related type.

use crate::context::AppContext;
use crate::error::ApiError;
use crate::operation::{OpKind, Operation, Ref};
use crate::processor::OperationProcessor;
use crate::response::PrimaryData;
use crate::schema::ResourceRegistry;
use crate::serializer::{foreign_key_column, value_to_id, Serializer};
use serde_json::Value;

/// Outcome of interpreting a relationship operation. A missing descriptor, an
/// unregistered related type, or a null foreign key fall through to
/// `NoRelatedData` (a null-data response) rather than raising.
pub(crate) enum ResolvedRelationship {
    Derived {
        resource_type: String,
        operation: Operation,
    },
    NoRelatedData,
}

pub(crate) async fn resolve_relationship_operation(
    op: &Operation,
    origin_processor: &dyn OperationProcessor,
    serializer: &dyn Serializer,
    registry: &ResourceRegistry,
    ctx: &AppContext,
) -> Result<ResolvedRelationship, ApiError> {
    let Some(relationship_name) = op.target.relationship.as_deref() else {
        return Err(ApiError::Internal(
            "relationship resolution invoked without ref.relationship".into(),
        ));
    };
    let origin_id = op.target.id.as_deref().ok_or_else(|| {
        ApiError::BadRequest("relationship operations require ref.id".into())
    })?;
    let origin_schema = origin_processor.schema();

    let Some(descriptor) = origin_schema.relationships.get(relationship_name) else {
        tracing::warn!(
            relationship = %relationship_name,
            resource_type = %op.target.resource_type,
            "relationship not declared; responding with no related data"
        );
        return Ok(ResolvedRelationship::NoRelatedData);
    };
    let Some(related_schema) = registry.schema_for(&descriptor.related_type) else {
        tracing::warn!(related = %descriptor.related_type, "related type not registered");
        return Ok(ResolvedRelationship::NoRelatedData);
    };

    if descriptor.is_has_many() {
        // The foreign key lives on the related type: its belongs-to pointing
        // back at the origin names the column.
        let Some((back_name, back_descriptor)) =
            related_schema.belongs_to_pointing_at(&op.target.resource_type)
        else {
            tracing::warn!(
                relationship = %relationship_name,
                related = %descriptor.related_type,
                "no belongs-to pointing back at origin"
            );
            return Ok(ResolvedRelationship::NoRelatedData);
        };
        let foreign_key = foreign_key_column(serializer, back_name, back_descriptor, registry);

        let mut params = op.params.clone();
        // The origin filter wins over a caller filter of the same name.
        params
            .filter
            .insert(foreign_key, Value::String(origin_id.to_string()));

        Ok(ResolvedRelationship::Derived {
            resource_type: descriptor.related_type.clone(),
            operation: Operation {
                op: OpKind::Get,
                target: Ref {
                    resource_type: descriptor.related_type.clone(),
                    id: None,
                    relationship: None,
                },
                data: None,
                params,
            },
        })
    } else {
        // Fetch the origin record to read its foreign-key value.
        let origin_op = Operation::get_by_id(op.target.resource_type.clone(), origin_id);
        let origin = match origin_processor.execute(&origin_op, ctx).await? {
            PrimaryData::One(record) => record,
            _ => return Err(ApiError::RecordNotFound),
        };
        let foreign_key =
            foreign_key_column(serializer, relationship_name, descriptor, registry);
        let related_id = match origin.attributes.get(&foreign_key) {
            Some(value) if !value.is_null() => value_to_id(value),
            _ => return Ok(ResolvedRelationship::NoRelatedData),
        };

        Ok(ResolvedRelationship::Derived {
            resource_type: descriptor.related_type.clone(),
            operation: Operation {
                op: OpKind::Get,
                target: Ref {
                    resource_type: descriptor.related_type.clone(),
                    id: Some(related_id),
                    relationship: None,
                },
                data: None,
                params: op.params.clone(),
            },
        })
    }
}
