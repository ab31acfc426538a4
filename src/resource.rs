//! Wire and in-memory representation of typed resources.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

pub type Attributes = HashMap<String, Value>;

/// A typed entity instance. `id` is absent for not-yet-created records.
///
/// Relationship values carry full records internally right after an eager
/// load; serialization downgrades them to `{type, id}` linkage, which is the
/// only form that appears on the wire.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: Attributes,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub relationships: HashMap<String, Relationship>,
    /// Records carrying credentials or session material set this so collection
    /// serialization skips them.
    #[serde(skip)]
    pub prevent_serialization: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceIdentifier {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub id: String,
}

/// One relationship entry on a resource.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<RelationshipData>,
}

/// To-one or to-many linkage. The embedded `Resource` values are full records
/// between eager load and serialization; on the wire they are identifier-only
/// (`attributes` empty, which serde omits).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelationshipData {
    Many(Vec<Resource>),
    One(Box<Resource>),
}

impl Resource {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Resource {
            resource_type: resource_type.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn identifier(&self) -> Option<ResourceIdentifier> {
        self.id.as_ref().map(|id| ResourceIdentifier {
            resource_type: self.resource_type.clone(),
            id: id.clone(),
        })
    }

    /// Identifier-only copy used as wire linkage.
    pub fn to_linkage(&self) -> Resource {
        Resource {
            resource_type: self.resource_type.clone(),
            id: self.id.clone(),
            ..Default::default()
        }
    }

    /// Deduplication key for the `included` section.
    pub fn dedupe_key(&self) -> String {
        format!("{}:{}", self.resource_type, self.id.as_deref().unwrap_or(""))
    }
}

impl RelationshipData {
    /// Full records attached by an eager load, flattened.
    pub fn embedded(&self) -> Vec<&Resource> {
        match self {
            RelationshipData::One(r) => vec![r.as_ref()],
            RelationshipData::Many(rs) => rs.iter().collect(),
        }
    }
}
