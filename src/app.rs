//! The execution engine: transaction lifecycle, concurrent operation fan-out,
//! relationship routing, and response assembly.

use crate::auth::{AllowAll, Authorizer};
use crate::context::AppContext;
use crate::error::ApiError;
use crate::operation::{Operation, Params};
use crate::paginator::{PageRel, Paginator, PaginatorConfig};
use crate::processor::{MemoryProcessor, MemoryStore, OperationProcessor, SqlProcessor};
use crate::relationships::{resolve_relationship_operation, ResolvedRelationship};
use crate::resource::Resource;
use crate::response::{Links, OperationOutcome, OperationResponse, PrimaryData};
use crate::schema::{ResourceRegistry, ResourceSchema};
use crate::serializer::{value_to_id, DefaultSerializer, LinkBuilder, Serializer};
use futures::future::join_all;
use serde_json::Value;
use sqlx::PgPool;
use std::collections::HashSet;
use std::sync::Arc;

/// Decodes a token into its claims. Returning `None` means the token is
/// undecodable and maps to the invalid-token condition.
pub type TokenClaimsFn = Arc<dyn Fn(&str) -> Option<Value> + Send + Sync>;

/// Engine configuration: explicit, typed slots instead of an ambient service
/// bag. Everything here is fixed at construction.
#[derive(Clone, Default)]
pub struct AppSettings {
    /// Transactional store. Absent means batches run under the no-op
    /// transaction and the in-memory default processor.
    pub pool: Option<PgPool>,
    /// Base URL for links, e.g. "https://api.example.com". Links are
    /// root-relative without it.
    pub base_url: Option<String>,
    /// Path namespace for links, e.g. "v1".
    pub namespace: String,
    pub default_page_size: Option<u64>,
    pub maximum_page_size: Option<u64>,
    /// Resource type resolved by token identification.
    pub user_type: Option<String>,
    /// Token decoding hook used by `user_from_token`.
    pub token_claims: Option<TokenClaimsFn>,
}

/// The closed set of fallback processors. One of these serves every
/// registered type that no custom processor claims.
#[derive(Clone)]
pub enum DefaultProcessor {
    Sql,
    Memory(MemoryStore),
}

pub struct App {
    registry: Arc<ResourceRegistry>,
    processors: Vec<Arc<dyn OperationProcessor>>,
    default_processor: DefaultProcessor,
    serializer: Arc<dyn Serializer>,
    authorizer: Arc<dyn Authorizer>,
    paginator_config: PaginatorConfig,
    pool: Option<PgPool>,
    user_type: String,
    token_claims: Option<TokenClaimsFn>,
}

impl App {
    pub fn new(registry: ResourceRegistry, settings: AppSettings) -> Self {
        let links = LinkBuilder::new(settings.base_url.as_deref(), &settings.namespace);
        let defaults = PaginatorConfig::default();
        let default_processor = if settings.pool.is_some() {
            DefaultProcessor::Sql
        } else {
            DefaultProcessor::Memory(MemoryStore::new())
        };
        App {
            registry: Arc::new(registry),
            processors: Vec::new(),
            default_processor,
            serializer: Arc::new(DefaultSerializer::new(links)),
            authorizer: Arc::new(AllowAll),
            paginator_config: PaginatorConfig {
                default_page_size: settings.default_page_size.unwrap_or(defaults.default_page_size),
                maximum_page_size: settings.maximum_page_size.unwrap_or(defaults.maximum_page_size),
            },
            pool: settings.pool,
            user_type: settings.user_type.unwrap_or_else(|| "user".to_string()),
            token_claims: settings.token_claims,
        }
    }

    /// Registers a custom processor. Resolution asks each registration in
    /// order; the first one claiming the type wins.
    pub fn with_processor(mut self, processor: Arc<dyn OperationProcessor>) -> Self {
        self.processors.push(processor);
        self
    }

    pub fn with_default_processor(mut self, default_processor: DefaultProcessor) -> Self {
        self.default_processor = default_processor;
        self
    }

    pub fn with_serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    pub fn registry(&self) -> &Arc<ResourceRegistry> {
        &self.registry
    }

    pub fn serializer(&self) -> &Arc<dyn Serializer> {
        &self.serializer
    }

    /// Schema lookup; `None` when the type is unregistered.
    pub fn resource_for(&self, resource_type: &str) -> Option<Arc<ResourceSchema>> {
        self.registry.schema_for(resource_type)
    }

    /// Resolves the processor for a type: first custom registration claiming
    /// it wins, else the default processor bound to the type's schema. `None`
    /// only when the type itself is unregistered.
    pub fn processor_for(&self, resource_type: &str) -> Option<Arc<dyn OperationProcessor>> {
        let schema = self.registry.schema_for(resource_type)?;
        for processor in &self.processors {
            if processor.handles(resource_type) {
                return Some(Arc::clone(processor));
            }
        }
        Some(match &self.default_processor {
            DefaultProcessor::Sql => Arc::new(SqlProcessor::new(
                resource_type,
                schema,
                Arc::clone(&self.serializer),
                Arc::clone(&self.registry),
            )),
            DefaultProcessor::Memory(store) => Arc::new(MemoryProcessor::new(
                resource_type,
                schema,
                Arc::clone(&self.serializer),
                Arc::clone(&self.registry),
                store.clone(),
            )),
        })
    }

    /// Executes a batch under a fresh per-call context.
    pub async fn execute_operations(
        &self,
        ops: Vec<Operation>,
    ) -> Result<Vec<OperationOutcome>, ApiError> {
        let ctx = AppContext::new();
        self.execute_operations_in(ops, &ctx).await
    }

    /// Executes a batch of operations inside one transaction. Operations are
    /// dispatched concurrently; the outcome list matches the input list in
    /// length and order. Any failure rolls the whole batch back and
    /// re-raises; the context's transaction handle is cleared on every exit
    /// path.
    pub async fn execute_operations_in(
        &self,
        ops: Vec<Operation>,
        ctx: &AppContext,
    ) -> Result<Vec<OperationOutcome>, ApiError> {
        ctx.begin(self.pool.as_ref()).await?;
        let results = join_all(ops.iter().map(|op| self.dispatch(op, ctx))).await;
        match results.into_iter().collect::<Result<Vec<_>, ApiError>>() {
            Ok(outcomes) => {
                ctx.commit().await?;
                Ok(outcomes)
            }
            Err(error) => {
                ctx.rollback(&error).await;
                Err(error)
            }
        }
    }

    async fn dispatch(
        &self,
        op: &Operation,
        ctx: &AppContext,
    ) -> Result<OperationOutcome, ApiError> {
        let Some(processor) = self.processor_for(&op.target.resource_type) else {
            tracing::warn!(resource_type = %op.target.resource_type, "no processor for type");
            return Ok(OperationOutcome::NoProcessor {
                resource_type: op.target.resource_type.clone(),
            });
        };
        let op = self.normalize(op);
        let response = self.execute_operation(&op, processor.as_ref(), ctx).await?;
        Ok(OperationOutcome::Performed(response))
    }

    /// Clamps the requested page to the configured maximum before processors
    /// see it, so fetched windows and advertised links agree.
    fn normalize(&self, op: &Operation) -> Operation {
        let mut op = op.clone();
        if let Some(page) = &op.params.page {
            let normalized = Paginator::new(self.paginator_config, Some(page)).current();
            op.params.page = Some(normalized.to_page());
        }
        op
    }

    async fn execute_operation(
        &self,
        op: &Operation,
        processor: &dyn OperationProcessor,
        ctx: &AppContext,
    ) -> Result<OperationResponse, ApiError> {
        if op.target.relationship.is_some() {
            return match resolve_relationship_operation(
                op,
                processor,
                self.serializer.as_ref(),
                &self.registry,
                ctx,
            )
            .await?
            {
                ResolvedRelationship::Derived {
                    resource_type,
                    operation,
                } => {
                    // Re-resolve: the related type may have its own processor.
                    let related_processor = self.processor_for(&resource_type).ok_or_else(|| {
                        ApiError::Internal(format!("no processor for related type '{}'", resource_type))
                    })?;
                    let operation = self.serializer.deserialize_resource(
                        operation,
                        related_processor.schema(),
                        &self.registry,
                    )?;
                    let data = related_processor.execute(&operation, ctx).await?;
                    self.build_operation_response(data, ctx, &op.params).await
                }
                ResolvedRelationship::NoRelatedData => Ok(OperationResponse::null()),
            };
        }

        let operation =
            self.serializer
                .deserialize_resource(op.clone(), processor.schema(), &self.registry)?;
        let data = processor.execute(&operation, ctx).await?;
        self.build_operation_response(data, ctx, &op.params).await
    }

    /// Assembles one response: overshoot trimming, include walk with
    /// deduplication and authorization filtering, then primary-data
    /// serialization with self and pagination links.
    async fn build_operation_response(
        &self,
        data: PrimaryData,
        ctx: &AppContext,
        params: &Params,
    ) -> Result<OperationResponse, ApiError> {
        let paginator = Paginator::new(self.paginator_config, params.page.as_ref());

        // Processors fetch one row past the page; remember the raw count and
        // trim before anything downstream sees the overshoot.
        let (data, raw_count) = match data {
            PrimaryData::Many(mut records) => {
                let raw_count = records.len();
                let limit = paginator.limit() as usize;
                records.truncate(limit);
                (PrimaryData::Many(records), raw_count)
            }
            other => (other, 0),
        };

        let included = self.included_resources(&data, ctx).await;

        let response = match data {
            PrimaryData::Null => OperationResponse::null(),
            PrimaryData::One(record) => {
                let resource_type = record.resource_type.clone();
                let serialized = match self.registry.schema_for(&resource_type) {
                    Some(schema) => {
                        self.serializer
                            .serialize_resource(record, &schema, &self.registry)
                    }
                    None => record,
                };
                let self_link = serialized.id.as_ref().map(|id| {
                    self.serializer
                        .link_builder()
                        .self_link(&resource_type, id, params)
                });
                OperationResponse {
                    data: PrimaryData::One(serialized),
                    included: None,
                    links: Links {
                        self_link,
                        ..Default::default()
                    },
                }
            }
            PrimaryData::Many(records) => {
                let Some(resource_type) = records
                    .first()
                    .map(|r| r.resource_type.clone())
                else {
                    return Ok(OperationResponse {
                        data: PrimaryData::Many(Vec::new()),
                        included: None,
                        links: Links::default(),
                    });
                };
                let schema = self.registry.schema_for(&resource_type);
                let serialized: Vec<Resource> = records
                    .into_iter()
                    .filter(|r| !r.prevent_serialization)
                    .map(|r| match &schema {
                        Some(schema) => {
                            self.serializer
                                .serialize_resource(r, schema, &self.registry)
                        }
                        None => r,
                    })
                    .collect();

                let link_builder = self.serializer.link_builder();
                let mut links = Links {
                    self_link: Some(link_builder.collection_link(&resource_type, params)),
                    ..Default::default()
                };
                for (rel, page) in paginator.links_page_params(raw_count) {
                    let link = link_builder.page_link(&resource_type, params, page.to_page());
                    match rel {
                        PageRel::First => links.first = Some(link),
                        PageRel::Prev => links.prev = Some(link),
                        PageRel::Next => links.next = Some(link),
                        PageRel::Last => links.last = Some(link),
                    }
                }
                OperationResponse {
                    data: PrimaryData::Many(serialized),
                    included: None,
                    links,
                }
            }
        };

        Ok(OperationResponse {
            included: (!included.is_empty()).then_some(included),
            ..response
        })
    }

    /// Flattens eager-loaded related records, deduplicates by type and id,
    /// and keeps only those the authorization gate admits. Denial excludes
    /// silently; it never fails the response.
    async fn included_resources(&self, data: &PrimaryData, ctx: &AppContext) -> Vec<Resource> {
        let Some(resource_type) = data.resource_type() else {
            return Vec::new();
        };
        let Some(schema) = self.registry.schema_for(resource_type) else {
            return Vec::new();
        };
        let candidates =
            self.serializer
                .serialize_included_resources(data, &schema, &self.registry);
        let mut seen = HashSet::new();
        let mut included = Vec::new();
        for candidate in candidates {
            if !seen.insert(candidate.dedupe_key()) {
                continue;
            }
            if self
                .authorizer
                .can_access_resource(&candidate, "get", ctx)
                .await
            {
                included.push(candidate);
            }
        }
        included
    }

    /// Resolves the user a token identifies, stores it on the context, and
    /// returns it. An undecodable token, a missing id claim, or no matching
    /// record all surface the invalid-token condition.
    pub async fn user_from_token(
        &self,
        token: &str,
        ctx: &AppContext,
    ) -> Result<Resource, ApiError> {
        let decode = self
            .token_claims
            .as_ref()
            .ok_or_else(|| ApiError::Internal("no token decoder configured".into()))?;
        let claims = decode(token).ok_or(ApiError::InvalidToken)?;
        let user_id = claims
            .get("id")
            .map(value_to_id)
            .filter(|id| !id.is_empty())
            .ok_or(ApiError::InvalidToken)?;

        let op = Operation::identify(self.user_type.clone(), user_id);
        let outcomes = self.execute_operations(vec![op]).await?;
        let mut user = outcomes
            .into_iter()
            .next()
            .and_then(OperationOutcome::into_response)
            .and_then(|response| match response.data {
                PrimaryData::One(user) => Some(user),
                _ => None,
            })
            .ok_or(ApiError::InvalidToken)?;
        user.prevent_serialization = true;
        ctx.set_user(user.clone());
        Ok(user)
    }
}
