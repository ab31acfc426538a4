//! Example consumer: a blog API (users, articles, comments) served by the
//! operations engine.
//!
//! With DATABASE_URL set, operations run against PostgreSQL inside real
//! transactions. Without it, a seeded in-memory store backs the same API.
//!
//! Run from repo root: `cargo run -p example-consumer`

use jsonapi_ops::{
    api_routes, App, AppSettings, AttributeKind, DefaultProcessor, MemoryStore, Resource,
    ResourceRegistry, ResourceSchema,
};
use std::sync::Arc;
use tokio::net::TcpListener;

fn registry() -> ResourceRegistry {
    ResourceRegistry::new()
        .register(
            "user",
            ResourceSchema::new()
                .attribute("name", AttributeKind::String)
                .attribute("email", AttributeKind::String)
                .attribute("passwordHash", AttributeKind::Password)
                .has_many("articles", "article"),
        )
        .register(
            "article",
            ResourceSchema::new()
                .attribute("title", AttributeKind::String)
                .attribute("body", AttributeKind::String)
                .attribute("tags", AttributeKind::Array)
                .attribute("viewCount", AttributeKind::Number)
                .belongs_to("author", "user")
                .has_many("comments", "comment"),
        )
        .register(
            "comment",
            ResourceSchema::new()
                .attribute("body", AttributeKind::String)
                .belongs_to("article", "article")
                .belongs_to("author", "user"),
        )
}

fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.seed(
        "user",
        vec![Resource::new("user")
            .with_id("1")
            .with_attribute("name", "Ada")
            .with_attribute("email", "ada@example.com")],
    );
    store.seed(
        "article",
        vec![
            Resource::new("article")
                .with_id("1")
                .with_attribute("title", "Hello, world")
                .with_attribute("body", "First post.")
                .with_attribute("viewCount", 7)
                .with_attribute("author_id", "1"),
            Resource::new("article")
                .with_id("2")
                .with_attribute("title", "Operations in practice")
                .with_attribute("body", "Batches, transactions, includes.")
                .with_attribute("viewCount", 42)
                .with_attribute("author_id", "1"),
        ],
    );
    store.seed(
        "comment",
        vec![Resource::new("comment")
            .with_id("1")
            .with_attribute("body", "Nice one")
            .with_attribute("article_id", "1")
            .with_attribute("author_id", "1")],
    );
    store
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("jsonapi_ops=info")),
        )
        .init();

    let mut settings = AppSettings {
        namespace: "api/v1".to_string(),
        ..Default::default()
    };

    let backend = match std::env::var("DATABASE_URL") {
        Ok(database_url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(5)
                .connect(&database_url)
                .await?;
            settings.pool = Some(pool);
            "postgres"
        }
        Err(_) => "memory",
    };

    let mut app = App::new(registry(), settings);
    if backend == "memory" {
        app = app.with_default_processor(DefaultProcessor::Memory(seeded_store()));
    }

    let router = axum::Router::new().nest("/api/v1", api_routes(Arc::new(app)));

    let listener = TcpListener::bind("127.0.0.1:3000").await?;
    tracing::info!(backend, "listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router).await?;
    Ok(())
}
