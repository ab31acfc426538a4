//! Self, collection, and pagination link formatting.

use crate::operation::{Page, Params};
use std::collections::BTreeMap;

/// Builds absolute or root-relative links from a base URL and namespace,
/// both optional. With neither configured, links are root-relative paths.
#[derive(Clone, Debug, Default)]
pub struct LinkBuilder {
    prefix: String,
}

impl LinkBuilder {
    pub fn new(base_url: Option<&str>, namespace: &str) -> Self {
        let mut prefix = String::new();
        if let Some(base) = base_url {
            prefix.push_str(base.trim_end_matches('/'));
        }
        let ns = namespace.trim_matches('/');
        if !ns.is_empty() {
            prefix.push('/');
            prefix.push_str(ns);
        }
        LinkBuilder { prefix }
    }

    /// Link to a collection, with the full query string.
    pub fn collection_link(&self, resource_type: &str, params: &Params) -> String {
        let query = format_query(params);
        format!("{}/{}{}", self.prefix, resource_type, query)
    }

    /// Link to a single record.
    pub fn self_link(&self, resource_type: &str, id: &str, params: &Params) -> String {
        let query = format_query(params);
        format!("{}/{}/{}{}", self.prefix, resource_type, id, query)
    }

    /// Collection link with the page replaced, for first/prev/next/last.
    pub fn page_link(&self, resource_type: &str, params: &Params, page: Page) -> String {
        let mut params = params.clone();
        params.page = Some(page);
        self.collection_link(resource_type, &params)
    }
}

/// Formats params as a query string with deterministic key order:
/// filter, sort, page, include, fields.
fn format_query(params: &Params) -> String {
    let mut pairs: Vec<(String, String)> = Vec::new();

    let filters: BTreeMap<_, _> = params.filter.iter().collect();
    for (name, value) in filters {
        let text = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        pairs.push((format!("filter[{}]", name), text));
    }
    if !params.sort.is_empty() {
        pairs.push(("sort".into(), params.sort.join(",")));
    }
    if let Some(page) = &params.page {
        if let Some(n) = page.offset {
            pairs.push(("page[offset]".into(), n.to_string()));
        }
        if let Some(n) = page.limit {
            pairs.push(("page[limit]".into(), n.to_string()));
        }
        if let Some(n) = page.number {
            pairs.push(("page[number]".into(), n.to_string()));
        }
        if let Some(n) = page.size {
            pairs.push(("page[size]".into(), n.to_string()));
        }
    }
    if !params.include.is_empty() {
        pairs.push(("include".into(), params.include.join(",")));
    }
    let fields: BTreeMap<_, _> = params.fields.iter().collect();
    for (resource_type, names) in fields {
        pairs.push((format!("fields[{}]", resource_type), names.join(",")));
    }

    if pairs.is_empty() {
        return String::new();
    }
    let joined = pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    format!("?{}", joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_links_with_namespace_and_query() {
        let links = LinkBuilder::new(Some("https://api.example.com"), "v1");
        let mut params = Params::default();
        params.filter.insert("state".into(), json!("published"));
        params.sort = vec!["-createdAt".into()];
        assert_eq!(
            links.collection_link("article", &params),
            "https://api.example.com/v1/article?filter[state]=published&sort=-createdAt"
        );
        assert_eq!(
            links.self_link("article", "7", &Params::default()),
            "https://api.example.com/v1/article/7"
        );
    }

    #[test]
    fn page_link_replaces_the_requested_page() {
        let links = LinkBuilder::new(None, "");
        let mut params = Params::default();
        params.page = Some(Page {
            offset: Some(0),
            limit: Some(1),
            ..Default::default()
        });
        let next = links.page_link(
            "article",
            &params,
            Page {
                offset: Some(1),
                limit: Some(1),
                ..Default::default()
            },
        );
        assert_eq!(next, "/article?page[offset]=1&page[limit]=1");
    }
}
