//! Serializer contract: the boundary between wire representation and
//! storage-neutral attribute/relationship naming.

mod links;

pub use links::LinkBuilder;

use crate::error::ApiError;
use crate::inflect::{pluralize, to_camel_case, to_snake_case};
use crate::operation::{OpKind, Operation};
use crate::resource::{Relationship, RelationshipData, Resource};
use crate::response::PrimaryData;
use crate::schema::{
    AttributeKind, RelationshipDescriptor, ResourceRegistry, ResourceSchema, DEFAULT_PRIMARY_KEY,
};
use serde_json::Value;

/// Converts between wire resources and the processor-facing shape, and maps
/// names between the two sides: attribute names as declared on schemas, column
/// and table names as storage sees them. Two resources with different naming
/// conventions interoperate without the engine knowing column names.
pub trait Serializer: Send + Sync {
    fn resource_type_to_table_name(&self, resource_type: &str) -> String;
    fn attribute_to_column(&self, attribute: &str) -> String;
    fn column_to_attribute(&self, column: &str) -> String;
    fn relationship_to_column(&self, relationship: &str, primary_key: &str) -> String;
    fn column_to_relationship(&self, column: &str, primary_key: &str) -> String;
    fn foreign_resource_to_foreign_table_name(&self, foreign_type: &str) -> String;

    /// Validates and transforms an incoming operation: declared attributes
    /// only, and to-one relationship linkage folded into the foreign-key
    /// attribute the processor writes.
    fn deserialize_resource(
        &self,
        op: Operation,
        schema: &ResourceSchema,
        registry: &ResourceRegistry,
    ) -> Result<Operation, ApiError>;

    /// Shapes a stored record for the wire: primary key hoisted to `id`,
    /// foreign keys folded into relationship linkage, password attributes
    /// stripped, embedded eager-loaded records downgraded to identifiers.
    fn serialize_resource(
        &self,
        resource: Resource,
        schema: &ResourceSchema,
        registry: &ResourceRegistry,
    ) -> Resource;

    /// Walks the schema's relationships depth-first from the result and
    /// returns every eager-loaded related record, serialized. Deduplication
    /// and authorization happen in the engine.
    fn serialize_included_resources(
        &self,
        data: &PrimaryData,
        schema: &ResourceSchema,
        registry: &ResourceRegistry,
    ) -> Vec<Resource>;

    fn link_builder(&self) -> &LinkBuilder;
}

/// Foreign-key column for a relationship: the explicit override when
/// declared, else the serializer convention of relationship name plus the
/// related type's primary-key suffix.
pub fn foreign_key_column(
    serializer: &dyn Serializer,
    relationship_name: &str,
    descriptor: &RelationshipDescriptor,
    registry: &ResourceRegistry,
) -> String {
    if let Some(explicit) = &descriptor.foreign_key_name {
        return explicit.clone();
    }
    let primary_key = registry
        .schema_for(&descriptor.related_type)
        .map(|s| s.primary_key.clone())
        .unwrap_or_else(|| DEFAULT_PRIMARY_KEY.to_string());
    serializer.relationship_to_column(relationship_name, &primary_key)
}

/// Default convention pair: camelCase attributes on the wire, snake_case
/// columns and pluralized snake_case table names in storage.
#[derive(Debug, Default)]
pub struct DefaultSerializer {
    links: LinkBuilder,
}

impl DefaultSerializer {
    pub fn new(links: LinkBuilder) -> Self {
        DefaultSerializer { links }
    }
}

impl Serializer for DefaultSerializer {
    fn resource_type_to_table_name(&self, resource_type: &str) -> String {
        pluralize(&to_snake_case(resource_type))
    }

    fn attribute_to_column(&self, attribute: &str) -> String {
        to_snake_case(attribute)
    }

    fn column_to_attribute(&self, column: &str) -> String {
        to_camel_case(column)
    }

    fn relationship_to_column(&self, relationship: &str, primary_key: &str) -> String {
        format!("{}_{}", to_snake_case(relationship), primary_key)
    }

    fn column_to_relationship(&self, column: &str, primary_key: &str) -> String {
        let suffix = format!("_{}", primary_key);
        match column.strip_suffix(&suffix) {
            Some(stem) => to_camel_case(stem),
            None => to_camel_case(column),
        }
    }

    fn foreign_resource_to_foreign_table_name(&self, foreign_type: &str) -> String {
        format!("belonging_{}", self.resource_type_to_table_name(foreign_type))
    }

    fn deserialize_resource(
        &self,
        mut op: Operation,
        schema: &ResourceSchema,
        registry: &ResourceRegistry,
    ) -> Result<Operation, ApiError> {
        let Some(data) = op.data.as_mut() else {
            return Ok(op);
        };
        if matches!(op.op, OpKind::Add | OpKind::Update) {
            for name in data.attributes.keys() {
                if !schema.attributes.contains_key(name) {
                    return Err(ApiError::BadRequest(format!(
                        "unknown attribute '{}' for type '{}'",
                        name, data.resource_type
                    )));
                }
            }
        }
        let mut foreign_keys: Vec<(String, Value)> = Vec::new();
        for (name, relationship) in &data.relationships {
            let Some(descriptor) = schema.relationships.get(name) else {
                return Err(ApiError::BadRequest(format!(
                    "unknown relationship '{}' for type '{}'",
                    name, data.resource_type
                )));
            };
            if !descriptor.is_belongs_to() {
                continue;
            }
            if let Some(RelationshipData::One(linked)) = &relationship.data {
                if let Some(id) = &linked.id {
                    let column = foreign_key_column(self, name, descriptor, registry);
                    foreign_keys.push((column, Value::String(id.clone())));
                }
            }
        }
        for (column, id) in foreign_keys {
            data.attributes.insert(column, id);
        }
        Ok(op)
    }

    fn serialize_resource(
        &self,
        mut resource: Resource,
        schema: &ResourceSchema,
        registry: &ResourceRegistry,
    ) -> Resource {
        // Hoist the primary key out of the attribute map.
        if let Some(pk_value) = resource.attributes.remove(&schema.primary_key) {
            if resource.id.is_none() {
                resource.id = Some(value_to_id(&pk_value));
            }
        }

        // Fold foreign-key columns into to-one linkage.
        for (name, descriptor) in &schema.relationships {
            if !descriptor.is_belongs_to() {
                continue;
            }
            let column = foreign_key_column(self, name, descriptor, registry);
            if let Some(value) = resource.attributes.remove(&column) {
                if !value.is_null() {
                    resource
                        .relationships
                        .entry(name.clone())
                        .or_insert_with(|| Relationship {
                            data: Some(RelationshipData::One(Box::new(Resource {
                                resource_type: descriptor.related_type.clone(),
                                id: Some(value_to_id(&value)),
                                ..Default::default()
                            }))),
                        });
                }
            }
        }

        // Only declared, non-password attributes go out.
        resource.attributes.retain(|name, _| {
            schema
                .attributes
                .get(name)
                .map(|kind| *kind != AttributeKind::Password)
                .unwrap_or(false)
        });

        // Embedded eager-loaded records become identifier linkage.
        for relationship in resource.relationships.values_mut() {
            if let Some(data) = relationship.data.as_mut() {
                let downgraded = match &*data {
                    RelationshipData::One(r) => RelationshipData::One(Box::new(r.to_linkage())),
                    RelationshipData::Many(rs) => {
                        RelationshipData::Many(rs.iter().map(Resource::to_linkage).collect())
                    }
                };
                *data = downgraded;
            }
        }

        resource
    }

    fn serialize_included_resources(
        &self,
        data: &PrimaryData,
        schema: &ResourceSchema,
        registry: &ResourceRegistry,
    ) -> Vec<Resource> {
        let mut out = Vec::new();
        for resource in data.resources() {
            collect_embedded(self, resource, schema, registry, &mut out);
        }
        out
    }

    fn link_builder(&self) -> &LinkBuilder {
        &self.links
    }
}

fn collect_embedded(
    serializer: &dyn Serializer,
    resource: &Resource,
    schema: &ResourceSchema,
    registry: &ResourceRegistry,
    out: &mut Vec<Resource>,
) {
    for (name, descriptor) in &schema.relationships {
        let Some(relationship) = resource.relationships.get(name) else {
            continue;
        };
        let Some(data) = &relationship.data else {
            continue;
        };
        let Some(related_schema) = registry.schema_for(&descriptor.related_type) else {
            continue;
        };
        for embedded in data.embedded() {
            // Identifier-only linkage carries no attributes and is not an include.
            if embedded.attributes.is_empty() && embedded.relationships.is_empty() {
                continue;
            }
            collect_embedded(serializer, embedded, &related_schema, registry, out);
            out.push(serializer.serialize_resource(
                embedded.clone(),
                &related_schema,
                registry,
            ));
        }
    }
}

/// Primary-key and foreign-key values become opaque string ids on the wire.
pub(crate) fn value_to_id(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::Operation;
    use serde_json::json;

    fn registry() -> ResourceRegistry {
        ResourceRegistry::new()
            .register(
                "article",
                ResourceSchema::new()
                    .attribute("title", AttributeKind::String)
                    .attribute("tags", AttributeKind::Array)
                    .belongs_to("author", "user")
                    .has_many("comments", "comment"),
            )
            .register(
                "user",
                ResourceSchema::new()
                    .attribute("name", AttributeKind::String)
                    .attribute("passwordHash", AttributeKind::Password),
            )
            .register(
                "comment",
                ResourceSchema::new()
                    .attribute("body", AttributeKind::String)
                    .belongs_to("article", "article")
                    .belongs_to("author", "user"),
            )
    }

    fn serializer() -> DefaultSerializer {
        DefaultSerializer::new(LinkBuilder::new(None, ""))
    }

    #[test]
    fn naming_conventions() {
        let s = serializer();
        assert_eq!(s.resource_type_to_table_name("blogPost"), "blog_posts");
        assert_eq!(s.attribute_to_column("createdAt"), "created_at");
        assert_eq!(s.column_to_attribute("created_at"), "createdAt");
        assert_eq!(s.relationship_to_column("author", "id"), "author_id");
        assert_eq!(s.column_to_relationship("author_id", "id"), "author");
        assert_eq!(s.foreign_resource_to_foreign_table_name("user"), "belonging_users");
    }

    #[test]
    fn deserialize_folds_to_one_linkage_into_foreign_key() {
        let s = serializer();
        let registry = registry();
        let wire: Resource = serde_json::from_value(json!({
            "type": "comment",
            "attributes": { "body": "nice" },
            "relationships": { "author": { "data": { "type": "user", "id": "9" } } }
        }))
        .unwrap();
        let op = s
            .deserialize_resource(Operation::add(wire), &registry.schema_for("comment").unwrap(), &registry)
            .unwrap();
        let data = op.data.unwrap();
        assert_eq!(data.attributes["author_id"], json!("9"));
    }

    #[test]
    fn deserialize_rejects_undeclared_attributes() {
        let s = serializer();
        let registry = registry();
        let wire = Resource::new("article").with_attribute("bogus", "x");
        let err = s
            .deserialize_resource(Operation::add(wire), &registry.schema_for("article").unwrap(), &registry)
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn serialize_hoists_pk_and_extracts_linkage() {
        let s = serializer();
        let registry = registry();
        let stored = Resource::new("comment")
            .with_attribute("id", "3")
            .with_attribute("body", "hello")
            .with_attribute("author_id", "9")
            .with_attribute("article_id", "1");
        let wire = s.serialize_resource(stored, &registry.schema_for("comment").unwrap(), &registry);
        assert_eq!(wire.id.as_deref(), Some("3"));
        assert_eq!(wire.attributes.get("id"), None);
        assert_eq!(wire.attributes["body"], json!("hello"));
        match &wire.relationships["author"].data {
            Some(RelationshipData::One(linked)) => {
                assert_eq!(linked.resource_type, "user");
                assert_eq!(linked.id.as_deref(), Some("9"));
            }
            other => panic!("unexpected linkage: {:?}", other),
        }
    }

    #[test]
    fn serialize_strips_password_attributes() {
        let s = serializer();
        let registry = registry();
        let stored = Resource::new("user")
            .with_attribute("id", "9")
            .with_attribute("name", "ada")
            .with_attribute("passwordHash", "secret");
        let wire = s.serialize_resource(stored, &registry.schema_for("user").unwrap(), &registry);
        assert_eq!(wire.attributes.get("passwordHash"), None);
        assert_eq!(wire.attributes["name"], json!("ada"));
    }

    #[test]
    fn round_trip_preserves_declared_fields() {
        let s = serializer();
        let registry = registry();
        let schema = registry.schema_for("comment").unwrap();
        let stored = Resource::new("comment")
            .with_attribute("id", "3")
            .with_attribute("body", "hello")
            .with_attribute("author_id", "9");
        let wire = s.serialize_resource(stored, &schema, &registry);
        let op = s
            .deserialize_resource(Operation::update("3", wire.clone()), &schema, &registry)
            .unwrap();
        let back = op.data.unwrap();
        assert_eq!(back.attributes["body"], json!("hello"));
        assert_eq!(back.attributes["author_id"], json!("9"));
    }

    #[test]
    fn included_walk_flattens_embedded_records() {
        let s = serializer();
        let registry = registry();
        let mut article = Resource::new("article")
            .with_id("1")
            .with_attribute("title", "Hi");
        article.relationships.insert(
            "comments".into(),
            Relationship {
                data: Some(RelationshipData::Many(vec![Resource::new("comment")
                    .with_id("3")
                    .with_attribute("body", "hello")
                    .with_attribute("author_id", "9")])),
            },
        );
        let data = PrimaryData::One(article);
        let included = s.serialize_included_resources(
            &data,
            &registry.schema_for("article").unwrap(),
            &registry,
        );
        assert_eq!(included.len(), 1);
        assert_eq!(included[0].resource_type, "comment");
        assert_eq!(included[0].id.as_deref(), Some("3"));
        // Serialized form: the fk became linkage.
        assert!(included[0].relationships.contains_key("author"));
    }
}
