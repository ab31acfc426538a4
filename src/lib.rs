//! JSON:API operations engine with pluggable storage backends.
//!
//! Batches of get/add/update/remove operations execute concurrently inside a
//! single all-or-nothing transaction, with relationship traversal, eager
//! loading, authorization-filtered includes, and paginated link sets.

pub mod app;
pub mod auth;
pub mod context;
pub mod error;
pub mod inflect;
pub mod operation;
pub mod paginator;
pub mod processor;
pub mod resource;
pub mod response;
pub mod schema;
pub mod serializer;
pub mod sql;
pub mod transaction;
pub mod transport;

mod relationships;

pub use app::{App, AppSettings, DefaultProcessor, TokenClaimsFn};
pub use auth::{AllowAll, Authorizer};
pub use context::AppContext;
pub use error::ApiError;
pub use operation::{OpKind, Operation, Page, Params, Ref};
pub use paginator::{PageRel, PageSpec, Paginator, PaginatorConfig};
pub use processor::{MemoryProcessor, MemoryStore, OperationProcessor, SqlProcessor};
pub use resource::{Attributes, Relationship, RelationshipData, Resource, ResourceIdentifier};
pub use response::{Links, OperationOutcome, OperationResponse, PrimaryData};
pub use schema::{
    AttributeKind, RelationshipCardinality, RelationshipDescriptor, ResourceRegistry,
    ResourceSchema, DEFAULT_PRIMARY_KEY,
};
pub use serializer::{DefaultSerializer, LinkBuilder, Serializer};
pub use transaction::Transaction;
pub use transport::api_routes;
