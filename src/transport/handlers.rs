//! HTTP handlers translating requests into operations and engine results
//! into JSON:API documents.

use crate::app::App;
use crate::error::ApiError;
use crate::operation::{OpKind, Operation, Ref};
use crate::resource::Resource;
use crate::response::{OperationOutcome, OperationResponse};
use crate::transport::query::params_from_query;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Wire document for the batch endpoint.
#[derive(Deserialize)]
pub struct OperationsRequest {
    pub operations: Vec<Operation>,
}

#[derive(Serialize)]
pub struct OperationsResponse {
    pub operations: Vec<OperationResponse>,
}

/// Wire document wrapping a single resource payload.
#[derive(Deserialize)]
pub struct ResourceDocument {
    pub data: Resource,
}

fn require_registered(app: &App, resource_type: &str) -> Result<(), ApiError> {
    if app.resource_for(resource_type).is_none() {
        return Err(ApiError::UnknownType(resource_type.to_string()));
    }
    Ok(())
}

fn sole_response(outcomes: Vec<OperationOutcome>) -> Result<OperationResponse, ApiError> {
    outcomes
        .into_iter()
        .next()
        .and_then(OperationOutcome::into_response)
        .ok_or_else(|| ApiError::Internal("engine returned no outcome".into()))
}

/// POST /operations: the batch endpoint.
pub async fn execute_operations(
    State(app): State<Arc<App>>,
    Json(request): Json<OperationsRequest>,
) -> Result<Json<OperationsResponse>, ApiError> {
    for op in &request.operations {
        require_registered(&app, &op.target.resource_type)?;
    }
    let outcomes = app.execute_operations(request.operations).await?;
    let operations = outcomes
        .into_iter()
        .map(|outcome| {
            outcome
                .into_response()
                .ok_or_else(|| ApiError::Internal("unhandled operation in batch".into()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(OperationsResponse { operations }))
}

/// GET /:type
pub async fn list(
    State(app): State<Arc<App>>,
    Path(resource_type): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<OperationResponse>, ApiError> {
    require_registered(&app, &resource_type)?;
    let mut op = Operation::get(resource_type);
    op.params = params_from_query(&query);
    let outcomes = app.execute_operations(vec![op]).await?;
    Ok(Json(sole_response(outcomes)?))
}

/// GET /:type/:id
pub async fn read(
    State(app): State<Arc<App>>,
    Path((resource_type, id)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<OperationResponse>, ApiError> {
    require_registered(&app, &resource_type)?;
    let mut op = Operation::get_by_id(resource_type, id);
    op.params = params_from_query(&query);
    let outcomes = app.execute_operations(vec![op]).await?;
    Ok(Json(sole_response(outcomes)?))
}

/// GET /:type/:id/:relationship: related data as if the related type were
/// the primary subject.
pub async fn read_related(
    State(app): State<Arc<App>>,
    Path((resource_type, id, relationship)): Path<(String, String, String)>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<OperationResponse>, ApiError> {
    require_registered(&app, &resource_type)?;
    let mut op = Operation::get_by_id(resource_type, id);
    op.target.relationship = Some(relationship);
    op.params = params_from_query(&query);
    let outcomes = app.execute_operations(vec![op]).await?;
    Ok(Json(sole_response(outcomes)?))
}

/// POST /:type
pub async fn create(
    State(app): State<Arc<App>>,
    Path(resource_type): Path<String>,
    Json(document): Json<ResourceDocument>,
) -> Result<(StatusCode, Json<OperationResponse>), ApiError> {
    require_registered(&app, &resource_type)?;
    let mut resource = document.data;
    resource.resource_type = resource_type;
    let outcomes = app.execute_operations(vec![Operation::add(resource)]).await?;
    Ok((StatusCode::CREATED, Json(sole_response(outcomes)?)))
}

/// PATCH /:type/:id
pub async fn update(
    State(app): State<Arc<App>>,
    Path((resource_type, id)): Path<(String, String)>,
    Json(document): Json<ResourceDocument>,
) -> Result<Json<OperationResponse>, ApiError> {
    require_registered(&app, &resource_type)?;
    let mut resource = document.data;
    resource.resource_type = resource_type;
    let outcomes = app
        .execute_operations(vec![Operation::update(id, resource)])
        .await?;
    Ok(Json(sole_response(outcomes)?))
}

/// DELETE /:type/:id
pub async fn delete(
    State(app): State<Arc<App>>,
    Path((resource_type, id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    require_registered(&app, &resource_type)?;
    let op = Operation {
        op: OpKind::Remove,
        target: Ref {
            resource_type,
            id: Some(id),
            relationship: None,
        },
        data: None,
        params: Default::default(),
    };
    app.execute_operations(vec![op]).await?;
    Ok(StatusCode::NO_CONTENT)
}
