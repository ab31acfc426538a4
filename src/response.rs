//! Operation responses: primary data, access-filtered includes, links.

use crate::resource::Resource;
use serde::{Deserialize, Serialize};

/// Primary data of a response: a single record, a collection, or null.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryData {
    Many(Vec<Resource>),
    One(Resource),
    Null,
}

impl PrimaryData {
    pub fn resources(&self) -> Vec<&Resource> {
        match self {
            PrimaryData::Many(rs) => rs.iter().collect(),
            PrimaryData::One(r) => vec![r],
            PrimaryData::Null => Vec::new(),
        }
    }

    /// The resource type of the data, when it has one.
    pub fn resource_type(&self) -> Option<&str> {
        match self {
            PrimaryData::Many(rs) => rs.first().map(|r| r.resource_type.as_str()),
            PrimaryData::One(r) => Some(r.resource_type.as_str()),
            PrimaryData::Null => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Links {
    #[serde(rename = "self", default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last: Option<String>,
}

impl Links {
    pub fn is_empty(&self) -> bool {
        self.self_link.is_none()
            && self.first.is_none()
            && self.prev.is_none()
            && self.next.is_none()
            && self.last.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperationResponse {
    pub data: PrimaryData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub included: Option<Vec<Resource>>,
    #[serde(default, skip_serializing_if = "Links::is_empty")]
    pub links: Links,
}

impl OperationResponse {
    pub fn null() -> Self {
        OperationResponse {
            data: PrimaryData::Null,
            included: None,
            links: Links::default(),
        }
    }
}

/// Result of dispatching one operation of a batch. The result list always has
/// the same length and order as the input list; an operation whose type has no
/// registered processor is reported explicitly instead of being dropped.
#[derive(Clone, Debug, PartialEq)]
pub enum OperationOutcome {
    Performed(OperationResponse),
    NoProcessor { resource_type: String },
}

impl OperationOutcome {
    pub fn response(&self) -> Option<&OperationResponse> {
        match self {
            OperationOutcome::Performed(r) => Some(r),
            OperationOutcome::NoProcessor { .. } => None,
        }
    }

    pub fn into_response(self) -> Option<OperationResponse> {
        match self {
            OperationOutcome::Performed(r) => Some(r),
            OperationOutcome::NoProcessor { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_data_serializes_as_json_null() {
        let resp = OperationResponse::null();
        assert_eq!(serde_json::to_value(&resp).unwrap(), json!({ "data": null }));
    }

    #[test]
    fn collection_round_trips() {
        let resp = OperationResponse {
            data: PrimaryData::Many(vec![Resource::new("article").with_id("1")]),
            included: None,
            links: Links {
                self_link: Some("/articles".into()),
                next: Some("/articles?page[offset]=1&page[limit]=1".into()),
                ..Default::default()
            },
        };
        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(v["links"]["self"], json!("/articles"));
        let back: OperationResponse = serde_json::from_value(v).unwrap();
        assert_eq!(back, resp);
    }
}
