//! HTTP transport: routes mapping JSON:API requests onto engine operations.

pub mod handlers;
pub mod query;

pub use query::params_from_query;

use crate::app::App;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;

/// Request bodies beyond this are rejected before deserialization.
const BODY_LIMIT_BYTES: usize = 1024 * 1024;

/// The full JSON:API surface: a batch endpoint plus per-type CRUD and
/// relationship reads.
pub fn api_routes(app: Arc<App>) -> Router {
    Router::new()
        .route("/operations", post(handlers::execute_operations))
        .route("/:resource_type", get(handlers::list).post(handlers::create))
        .route(
            "/:resource_type/:id",
            get(handlers::read)
                .patch(handlers::update)
                .delete(handlers::delete),
        )
        .route(
            "/:resource_type/:id/:relationship",
            get(handlers::read_related),
        )
        .layer(ServiceBuilder::new().layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES)))
        .with_state(app)
}
