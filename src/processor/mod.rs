//! Operation processors: one per resource type, executing CRUD against a
//! storage backend through the batch's shared transaction.

pub mod filter;
pub mod memory;
pub mod sql;

pub use memory::{MemoryProcessor, MemoryStore};
pub use sql::SqlProcessor;

use crate::context::AppContext;
use crate::error::ApiError;
use crate::operation::{OpKind, Operation};
use crate::resource::Resource;
use crate::response::PrimaryData;
use crate::schema::ResourceSchema;
use async_trait::async_trait;

/// The contract every processor implements. All operations are scoped to the
/// transaction on the supplied context; a processor never opens its own.
///
/// `get` must honor the filter grammar of [`filter`], multi-key sort with a
/// leading `-` for descending, offset/limit paging (fetching one row past the
/// page so the engine can tell whether a next page exists), sparse fieldsets,
/// and one level of eager loading for requested includes.
#[async_trait]
pub trait OperationProcessor: Send + Sync {
    fn resource_type(&self) -> &str;

    fn schema(&self) -> &ResourceSchema;

    /// Capability check used during processor resolution. Custom processors
    /// may claim types by name or any other predicate.
    fn handles(&self, resource_type: &str) -> bool {
        self.resource_type() == resource_type
    }

    async fn get(&self, op: &Operation, ctx: &AppContext) -> Result<Vec<Resource>, ApiError>;

    async fn add(&self, op: &Operation, ctx: &AppContext) -> Result<Resource, ApiError>;

    async fn update(&self, op: &Operation, ctx: &AppContext) -> Result<Resource, ApiError>;

    async fn remove(&self, op: &Operation, ctx: &AppContext) -> Result<(), ApiError>;

    /// Dispatches on the operation kind. A `get` addressing one record yields
    /// that record or `RecordNotFound`; `identify` is the same lookup but
    /// yields null data when nothing matches, for authentication flows.
    async fn execute(&self, op: &Operation, ctx: &AppContext) -> Result<PrimaryData, ApiError> {
        match op.op {
            OpKind::Get | OpKind::Identify => {
                let records = self.get(op, ctx).await?;
                if op.target.id.is_some() && op.target.relationship.is_none() {
                    match records.into_iter().next() {
                        Some(record) => Ok(PrimaryData::One(record)),
                        None if op.op == OpKind::Identify => Ok(PrimaryData::Null),
                        None => Err(ApiError::RecordNotFound),
                    }
                } else {
                    Ok(PrimaryData::Many(records))
                }
            }
            OpKind::Add => Ok(PrimaryData::One(self.add(op, ctx).await?)),
            OpKind::Update => Ok(PrimaryData::One(self.update(op, ctx).await?)),
            OpKind::Remove => {
                self.remove(op, ctx).await?;
                Ok(PrimaryData::Null)
            }
        }
    }
}
