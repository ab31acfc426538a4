//! Operations: the unit of work submitted by clients, one batch per request.

use crate::resource::Resource;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// The requested action. `Identify` is an internal-only lookup-by-id variant
/// used by authentication flows; it behaves like `Get` but yields null data
/// instead of an error when nothing matches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Get,
    Add,
    Update,
    Remove,
    Identify,
}

/// What the operation points at: a type, optionally a record, optionally one
/// of its relationships.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Ref {
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship: Option<String>,
}

/// Requested page, either offset/limit or number/size keyed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// Query parameters attached to an operation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Params {
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub filter: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<Page>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub fields: HashMap<String, Vec<String>>,
}

impl Params {
    pub fn is_empty(&self) -> bool {
        self.filter.is_empty()
            && self.sort.is_empty()
            && self.page.is_none()
            && self.include.is_empty()
            && self.fields.is_empty()
    }
}

/// A single requested action. Constructed at the boundary, consumed exactly
/// once by the engine. Relationship rewriting produces a new derived
/// operation; the original is never mutated after dispatch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub op: OpKind,
    #[serde(rename = "ref")]
    pub target: Ref,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Resource>,
    #[serde(default, skip_serializing_if = "Params::is_empty")]
    pub params: Params,
}

impl Operation {
    pub fn get(resource_type: impl Into<String>) -> Self {
        Operation {
            op: OpKind::Get,
            target: Ref {
                resource_type: resource_type.into(),
                ..Default::default()
            },
            data: None,
            params: Params::default(),
        }
    }

    pub fn get_by_id(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        let mut op = Self::get(resource_type);
        op.target.id = Some(id.into());
        op
    }

    pub fn add(resource: Resource) -> Self {
        Operation {
            op: OpKind::Add,
            target: Ref {
                resource_type: resource.resource_type.clone(),
                ..Default::default()
            },
            data: Some(resource),
            params: Params::default(),
        }
    }

    pub fn update(id: impl Into<String>, resource: Resource) -> Self {
        Operation {
            op: OpKind::Update,
            target: Ref {
                resource_type: resource.resource_type.clone(),
                id: Some(id.into()),
                ..Default::default()
            },
            data: Some(resource),
            params: Params::default(),
        }
    }

    pub fn remove(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Operation {
            op: OpKind::Remove,
            target: Ref {
                resource_type: resource_type.into(),
                id: Some(id.into()),
                ..Default::default()
            },
            data: None,
            params: Params::default(),
        }
    }

    pub fn identify(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        let mut op = Self::get_by_id(resource_type, id);
        op.op = OpKind::Identify;
        op
    }
}
