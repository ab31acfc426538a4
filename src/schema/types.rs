//! Resource schemas: declared attribute kinds, relationships, primary key.

use std::collections::BTreeMap;

pub const DEFAULT_PRIMARY_KEY: &str = "id";

/// Value kind of a declared attribute. `Password` attributes are stored but
/// never serialized into responses. `Array`/`Object` attributes are coerced to
/// an encoded text form on write and decoded on read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttributeKind {
    String,
    Number,
    Boolean,
    Array,
    Object,
    Password,
}

/// Cardinality of a relationship. Exactly one direction per relationship; the
/// enum makes a descriptor with neither (or both) unrepresentable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelationshipCardinality {
    BelongsTo,
    HasMany,
}

/// One declared relationship. The related type is held by name and resolved
/// against the registry at execution time, so mutually referencing schemas
/// register cleanly.
#[derive(Clone, Debug)]
pub struct RelationshipDescriptor {
    pub related_type: String,
    pub cardinality: RelationshipCardinality,
    /// Explicit foreign-key column. When absent the serializer convention
    /// (relationship name + primary-key suffix) applies.
    pub foreign_key_name: Option<String>,
}

impl RelationshipDescriptor {
    pub fn is_belongs_to(&self) -> bool {
        self.cardinality == RelationshipCardinality::BelongsTo
    }

    pub fn is_has_many(&self) -> bool {
        self.cardinality == RelationshipCardinality::HasMany
    }
}

/// The declared shape of a resource type. Immutable once registered.
#[derive(Clone, Debug)]
pub struct ResourceSchema {
    pub primary_key: String,
    pub attributes: BTreeMap<String, AttributeKind>,
    pub relationships: BTreeMap<String, RelationshipDescriptor>,
}

impl Default for ResourceSchema {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceSchema {
    pub fn new() -> Self {
        ResourceSchema {
            primary_key: DEFAULT_PRIMARY_KEY.to_string(),
            attributes: BTreeMap::new(),
            relationships: BTreeMap::new(),
        }
    }

    pub fn primary_key(mut self, name: impl Into<String>) -> Self {
        self.primary_key = name.into();
        self
    }

    pub fn attribute(mut self, name: impl Into<String>, kind: AttributeKind) -> Self {
        self.attributes.insert(name.into(), kind);
        self
    }

    pub fn belongs_to(mut self, name: impl Into<String>, related_type: impl Into<String>) -> Self {
        self.relationships.insert(
            name.into(),
            RelationshipDescriptor {
                related_type: related_type.into(),
                cardinality: RelationshipCardinality::BelongsTo,
                foreign_key_name: None,
            },
        );
        self
    }

    pub fn belongs_to_via(
        mut self,
        name: impl Into<String>,
        related_type: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.relationships.insert(
            name.into(),
            RelationshipDescriptor {
                related_type: related_type.into(),
                cardinality: RelationshipCardinality::BelongsTo,
                foreign_key_name: Some(foreign_key.into()),
            },
        );
        self
    }

    pub fn has_many(mut self, name: impl Into<String>, related_type: impl Into<String>) -> Self {
        self.relationships.insert(
            name.into(),
            RelationshipDescriptor {
                related_type: related_type.into(),
                cardinality: RelationshipCardinality::HasMany,
                foreign_key_name: None,
            },
        );
        self
    }

    /// The belongs-to relationship on this schema pointing at `origin_type`,
    /// if any. Used to locate the foreign key behind a has-many traversal.
    pub fn belongs_to_pointing_at(
        &self,
        origin_type: &str,
    ) -> Option<(&str, &RelationshipDescriptor)> {
        self.relationships
            .iter()
            .find(|(_, d)| d.is_belongs_to() && d.related_type == origin_type)
            .map(|(name, d)| (name.as_str(), d))
    }
}
