//! Engine-level tests over the in-memory backend: processor resolution,
//! relationship traversal, includes, authorization filtering, pagination,
//! and input-order response mapping.

use async_trait::async_trait;
use jsonapi_ops::{
    AllowAll, ApiError, App, AppContext, AppSettings, Authorizer, AttributeKind,
    DefaultProcessor, MemoryStore, Operation, OperationOutcome, OperationProcessor, Page,
    PrimaryData, RelationshipData, Resource, ResourceRegistry, ResourceSchema,
};
use serde_json::json;
use std::sync::Arc;

fn blog_registry() -> ResourceRegistry {
    ResourceRegistry::new()
        .register(
            "user",
            ResourceSchema::new()
                .attribute("name", AttributeKind::String)
                .attribute("passwordHash", AttributeKind::Password),
        )
        .register(
            "article",
            ResourceSchema::new()
                .attribute("title", AttributeKind::String)
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
            .with_attribute("passwordHash", "secret")],
    );
    store.seed(
        "article",
        vec![
            Resource::new("article")
                .with_id("1")
                .with_attribute("title", "First")
                .with_attribute("viewCount", 7)
                .with_attribute("author_id", "1"),
            Resource::new("article")
                .with_id("2")
                .with_attribute("title", "Second")
                .with_attribute("viewCount", 42),
        ],
    );
    store.seed(
        "comment",
        vec![
            Resource::new("comment")
                .with_id("10")
                .with_attribute("body", "nice")
                .with_attribute("article_id", "1")
                .with_attribute("author_id", "1"),
            Resource::new("comment")
                .with_id("11")
                .with_attribute("body", "agreed")
                .with_attribute("article_id", "1")
                .with_attribute("author_id", "1"),
            Resource::new("comment")
                .with_id("12")
                .with_attribute("body", "elsewhere")
                .with_attribute("article_id", "2")
                .with_attribute("author_id", "1"),
        ],
    );
    store
}

fn blog_app(store: MemoryStore) -> App {
    App::new(blog_registry(), AppSettings::default())
        .with_default_processor(DefaultProcessor::Memory(store))
}

fn response(outcome: OperationOutcome) -> jsonapi_ops::OperationResponse {
    outcome.into_response().expect("operation should have been performed")
}

#[tokio::test]
async fn default_processor_serves_every_registered_type() {
    let app = blog_app(seeded_store());
    for resource_type in ["user", "article", "comment"] {
        let processor = app.processor_for(resource_type).expect("registered type");
        assert_eq!(processor.resource_type(), resource_type);
    }
    assert!(app.processor_for("widget").is_none());
}

#[tokio::test]
async fn unregistered_type_yields_explicit_no_processor_outcome() {
    let app = blog_app(seeded_store());
    let outcomes = app
        .execute_operations(vec![Operation::get("widget"), Operation::get("article")])
        .await
        .unwrap();
    assert_eq!(outcomes.len(), 2);
    assert_eq!(
        outcomes[0],
        OperationOutcome::NoProcessor {
            resource_type: "widget".into()
        }
    );
    assert!(outcomes[1].response().is_some());
}

/// A processor claiming a type by predicate, ahead of the default.
struct CannedUserProcessor {
    schema: Arc<ResourceSchema>,
}

#[async_trait]
impl OperationProcessor for CannedUserProcessor {
    fn resource_type(&self) -> &str {
        "user"
    }

    fn schema(&self) -> &ResourceSchema {
        &self.schema
    }

    async fn get(&self, _op: &Operation, _ctx: &AppContext) -> Result<Vec<Resource>, ApiError> {
        Ok(vec![Resource::new("user")
            .with_id("canned")
            .with_attribute("name", "From custom processor")])
    }

    async fn add(&self, _op: &Operation, _ctx: &AppContext) -> Result<Resource, ApiError> {
        Err(ApiError::BadRequest("read-only processor".into()))
    }

    async fn update(&self, _op: &Operation, _ctx: &AppContext) -> Result<Resource, ApiError> {
        Err(ApiError::BadRequest("read-only processor".into()))
    }

    async fn remove(&self, _op: &Operation, _ctx: &AppContext) -> Result<(), ApiError> {
        Err(ApiError::BadRequest("read-only processor".into()))
    }
}

#[tokio::test]
async fn custom_processor_wins_over_default_for_its_type() {
    let registry = blog_registry();
    let user_schema = registry.schema_for("user").unwrap();
    let app = blog_app(seeded_store()).with_processor(Arc::new(CannedUserProcessor {
        schema: user_schema,
    }));

    let outcomes = app.execute_operations(vec![Operation::get("user")]).await.unwrap();
    let resp = response(outcomes.into_iter().next().unwrap());
    match resp.data {
        PrimaryData::Many(records) => {
            assert_eq!(records[0].id.as_deref(), Some("canned"));
        }
        other => panic!("unexpected data: {:?}", other),
    }

    // Other types still resolve to the default processor.
    let outcomes = app.execute_operations(vec![Operation::get("article")]).await.unwrap();
    let resp = response(outcomes.into_iter().next().unwrap());
    match resp.data {
        PrimaryData::Many(records) => assert_eq!(records.len(), 2),
        other => panic!("unexpected data: {:?}", other),
    }
}

#[tokio::test]
async fn has_many_traversal_filters_by_foreign_key() {
    let app = blog_app(seeded_store());
    let mut op = Operation::get_by_id("article", "1");
    op.target.relationship = Some("comments".into());
    let outcomes = app.execute_operations(vec![op]).await.unwrap();
    let resp = response(outcomes.into_iter().next().unwrap());
    match &resp.data {
        PrimaryData::Many(records) => {
            let mut ids: Vec<_> = records.iter().map(|r| r.id.as_deref().unwrap()).collect();
            ids.sort();
            assert_eq!(ids, vec!["10", "11"]);
            assert!(records.iter().all(|r| r.resource_type == "comment"));
        }
        other => panic!("unexpected data: {:?}", other),
    }
    // The response is built as if the related type were the primary subject.
    assert_eq!(resp.links.self_link.as_deref(), Some("/comment"));
}

#[tokio::test]
async fn has_many_origin_filter_wins_over_caller_filter() {
    let app = blog_app(seeded_store());
    let mut op = Operation::get_by_id("article", "1");
    op.target.relationship = Some("comments".into());
    op.params.filter.insert("article_id".into(), json!("2"));
    let outcomes = app.execute_operations(vec![op]).await.unwrap();
    let resp = response(outcomes.into_iter().next().unwrap());
    match &resp.data {
        PrimaryData::Many(records) => {
            assert!(records.iter().all(|r| r.id.as_deref() != Some("12")));
            assert_eq!(records.len(), 2);
        }
        other => panic!("unexpected data: {:?}", other),
    }
}

#[tokio::test]
async fn belongs_to_traversal_follows_the_origin_foreign_key() {
    let app = blog_app(seeded_store());
    let mut op = Operation::get_by_id("comment", "10");
    op.target.relationship = Some("author".into());
    let outcomes = app.execute_operations(vec![op]).await.unwrap();
    let resp = response(outcomes.into_iter().next().unwrap());
    match &resp.data {
        PrimaryData::One(record) => {
            assert_eq!(record.resource_type, "user");
            assert_eq!(record.id.as_deref(), Some("1"));
            // Password attributes never serialize.
            assert!(!record.attributes.contains_key("passwordHash"));
        }
        other => panic!("unexpected data: {:?}", other),
    }
}

#[tokio::test]
async fn belongs_to_with_null_foreign_key_yields_null_data() {
    let app = blog_app(seeded_store());
    // Article 2 has no author_id.
    let mut op = Operation::get_by_id("article", "2");
    op.target.relationship = Some("author".into());
    let outcomes = app.execute_operations(vec![op]).await.unwrap();
    let resp = response(outcomes.into_iter().next().unwrap());
    assert_eq!(resp.data, PrimaryData::Null);
}

#[tokio::test]
async fn undeclared_relationship_yields_null_data_not_an_error() {
    let app = blog_app(seeded_store());
    let mut op = Operation::get_by_id("article", "1");
    op.target.relationship = Some("subscribers".into());
    let outcomes = app.execute_operations(vec![op]).await.unwrap();
    let resp = response(outcomes.into_iter().next().unwrap());
    assert_eq!(resp.data, PrimaryData::Null);
}

#[tokio::test]
async fn includes_are_deduplicated_by_type_and_id() {
    let app = blog_app(seeded_store());
    let mut op = Operation::get_by_id("article", "1");
    op.params.include = vec!["comments".into(), "author".into()];
    let outcomes = app.execute_operations(vec![op]).await.unwrap();
    let resp = response(outcomes.into_iter().next().unwrap());
    let included = resp.included.expect("includes requested");
    let users: Vec<_> = included.iter().filter(|r| r.resource_type == "user").collect();
    let comments: Vec<_> = included.iter().filter(|r| r.resource_type == "comment").collect();
    assert_eq!(users.len(), 1);
    assert_eq!(comments.len(), 2);
    // Primary data carries identifier linkage only.
    match &resp.data {
        PrimaryData::One(article) => match &article.relationships["comments"].data {
            Some(RelationshipData::Many(linked)) => {
                assert!(linked.iter().all(|l| l.attributes.is_empty()));
            }
            other => panic!("unexpected linkage: {:?}", other),
        },
        other => panic!("unexpected data: {:?}", other),
    }
}

/// Denies access to user resources; everything else is visible.
struct HideUsers;

#[async_trait]
impl Authorizer for HideUsers {
    async fn can_access_resource(&self, resource: &Resource, action: &str, _: &AppContext) -> bool {
        !(action == "get" && resource.resource_type == "user")
    }
}

#[tokio::test]
async fn unauthorized_includes_are_dropped_silently() {
    let app = blog_app(seeded_store()).with_authorizer(Arc::new(HideUsers));
    let mut op = Operation::get_by_id("article", "1");
    op.params.include = vec!["comments".into(), "author".into()];
    let outcomes = app.execute_operations(vec![op]).await.unwrap();
    let resp = response(outcomes.into_iter().next().unwrap());
    let included = resp.included.expect("comments still included");
    assert!(included.iter().all(|r| r.resource_type != "user"));
    assert_eq!(included.len(), 2);
}

#[tokio::test]
async fn pagination_links_over_seven_records() {
    let store = MemoryStore::new();
    let articles: Vec<Resource> = (1..=7)
        .map(|n| {
            Resource::new("article")
                .with_id(n.to_string())
                .with_attribute("title", format!("a{}", n))
        })
        .collect();
    store.seed("article", articles);
    let app = blog_app(store);

    let mut op = Operation::get("article");
    op.params.page = Some(Page {
        offset: Some(0),
        limit: Some(1),
        ..Default::default()
    });
    let resp = response(
        app.execute_operations(vec![op]).await.unwrap().into_iter().next().unwrap(),
    );
    match &resp.data {
        PrimaryData::Many(records) => assert_eq!(records.len(), 1),
        other => panic!("unexpected data: {:?}", other),
    }
    assert!(resp.links.self_link.as_deref().unwrap().contains("page[offset]=0"));
    assert!(resp.links.next.is_some());
    assert!(resp.links.prev.is_none());

    let mut op = Operation::get("article");
    op.params.page = Some(Page {
        offset: Some(6),
        limit: Some(1),
        ..Default::default()
    });
    let resp = response(
        app.execute_operations(vec![op]).await.unwrap().into_iter().next().unwrap(),
    );
    assert!(resp.links.next.is_none());
    assert!(resp.links.prev.is_some());
}

#[tokio::test]
async fn remove_twice_surfaces_record_not_found() {
    let app = blog_app(seeded_store());
    let outcomes = app
        .execute_operations(vec![Operation::remove("comment", "12")])
        .await
        .unwrap();
    assert!(outcomes[0].response().is_some());

    let err = app
        .execute_operations(vec![Operation::remove("comment", "12")])
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::RecordNotFound));
}

#[tokio::test]
async fn any_failure_aborts_the_whole_batch() {
    let app = blog_app(seeded_store());
    let ok = Operation::add(Resource::new("comment").with_attribute("body", "fine"));
    let bad = Operation::add(Resource::new("comment").with_attribute("bogus", "nope"));
    let err = app.execute_operations(vec![ok, bad]).await.unwrap_err();
    assert!(matches!(err, ApiError::BadRequest(_)));
}

/// Completes slowly so input order and completion order diverge.
struct SlowProcessor {
    schema: Arc<ResourceSchema>,
}

#[async_trait]
impl OperationProcessor for SlowProcessor {
    fn resource_type(&self) -> &str {
        "slow"
    }

    fn schema(&self) -> &ResourceSchema {
        &self.schema
    }

    async fn get(&self, _op: &Operation, _ctx: &AppContext) -> Result<Vec<Resource>, ApiError> {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        Ok(vec![Resource::new("slow")
            .with_id("s1")
            .with_attribute("label", "finished last")])
    }

    async fn add(&self, _op: &Operation, _ctx: &AppContext) -> Result<Resource, ApiError> {
        Err(ApiError::BadRequest("read-only processor".into()))
    }

    async fn update(&self, _op: &Operation, _ctx: &AppContext) -> Result<Resource, ApiError> {
        Err(ApiError::BadRequest("read-only processor".into()))
    }

    async fn remove(&self, _op: &Operation, _ctx: &AppContext) -> Result<(), ApiError> {
        Err(ApiError::BadRequest("read-only processor".into()))
    }
}

#[tokio::test]
async fn responses_preserve_input_order_regardless_of_completion() {
    let registry = blog_registry()
        .register("slow", ResourceSchema::new().attribute("label", AttributeKind::String));
    let store = seeded_store();
    let slow_schema = registry.schema_for("slow").unwrap();
    let app = App::new(registry, AppSettings::default())
        .with_default_processor(DefaultProcessor::Memory(store))
        .with_processor(Arc::new(SlowProcessor { schema: slow_schema }));

    let outcomes = app
        .execute_operations(vec![Operation::get("slow"), Operation::get("article")])
        .await
        .unwrap();
    let first = response(outcomes[0].clone());
    let second = response(outcomes[1].clone());
    assert_eq!(first.data.resource_type(), Some("slow"));
    assert_eq!(second.data.resource_type(), Some("article"));
}

#[tokio::test]
async fn user_from_token_identifies_and_stores_the_user() {
    let settings = AppSettings {
        token_claims: Some(Arc::new(|token: &str| match token {
            "good" => Some(json!({ "id": "1" })),
            "noid" => Some(json!({})),
            "ghost" => Some(json!({ "id": "404" })),
            _ => None,
        })),
        ..Default::default()
    };
    let app = App::new(blog_registry(), settings)
        .with_default_processor(DefaultProcessor::Memory(seeded_store()));

    let ctx = AppContext::new();
    let user = app.user_from_token("good", &ctx).await.unwrap();
    assert_eq!(user.id.as_deref(), Some("1"));
    assert!(!user.attributes.contains_key("passwordHash"));
    assert_eq!(ctx.user().unwrap().id.as_deref(), Some("1"));

    for bad in ["garbage", "noid", "ghost"] {
        let ctx = AppContext::new();
        let err = app.user_from_token(bad, &ctx).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidToken), "token {:?}", bad);
    }
}

#[tokio::test]
async fn get_by_id_returns_one_or_record_not_found() {
    let app = blog_app(seeded_store());
    let outcomes = app
        .execute_operations(vec![Operation::get_by_id("article", "1")])
        .await
        .unwrap();
    let resp = response(outcomes.into_iter().next().unwrap());
    match &resp.data {
        PrimaryData::One(record) => {
            assert_eq!(record.id.as_deref(), Some("1"));
            assert_eq!(resp.links.self_link.as_deref(), Some("/article/1"));
        }
        other => panic!("unexpected data: {:?}", other),
    }

    let err = app
        .execute_operations(vec![Operation::get_by_id("article", "999")])
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::RecordNotFound));

    // Identify is the lenient variant used by authentication flows.
    let outcomes = app
        .execute_operations(vec![Operation::identify("article", "999")])
        .await
        .unwrap();
    let resp = response(outcomes.into_iter().next().unwrap());
    assert_eq!(resp.data, PrimaryData::Null);
}

#[tokio::test]
async fn allow_all_is_the_default_gate() {
    let gate = AllowAll;
    let ctx = AppContext::new();
    assert!(gate.can_access_resource(&Resource::new("user"), "get", &ctx).await);
}
