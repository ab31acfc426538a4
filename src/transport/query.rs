//! Query-string interpretation: `filter[...]`, `sort`, `page[...]`,
//! `include`, `fields[...]` into operation params.

use crate::operation::{Page, Params};
use serde_json::Value;
use std::collections::HashMap;

/// Interprets decoded query pairs. Unknown keys are ignored so transport
/// middleware can ride along extra parameters.
pub fn params_from_query(query: &HashMap<String, String>) -> Params {
    let mut params = Params::default();
    let mut page = Page::default();
    let mut page_set = false;

    for (key, value) in query {
        match key.as_str() {
            "sort" => {
                params.sort = value
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
            }
            "include" => {
                params.include = value
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
            }
            _ => {
                if let Some(name) = bracket_key(key, "filter") {
                    params
                        .filter
                        .insert(name.to_string(), Value::String(value.clone()));
                } else if let Some(name) = bracket_key(key, "fields") {
                    params.fields.insert(
                        name.to_string(),
                        value.split(',').map(|s| s.trim().to_string()).collect(),
                    );
                } else if let Some(name) = bracket_key(key, "page") {
                    if let Ok(n) = value.parse::<u64>() {
                        match name {
                            "offset" => page.offset = Some(n),
                            "limit" => page.limit = Some(n),
                            "number" => page.number = Some(n),
                            "size" => page.size = Some(n),
                            _ => continue,
                        }
                        page_set = true;
                    }
                }
            }
        }
    }
    if page_set {
        params.page = Some(page);
    }
    params
}

/// `filter[title]` with prefix `filter` yields `title`.
fn bracket_key<'a>(key: &'a str, prefix: &str) -> Option<&'a str> {
    key.strip_prefix(prefix)?
        .strip_prefix('[')?
        .strip_suffix(']')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_jsonapi_query_keys() {
        let mut query = HashMap::new();
        query.insert("filter[state]".to_string(), "published".to_string());
        query.insert("filter[viewCount]".to_string(), "ge:10".to_string());
        query.insert("sort".to_string(), "-createdAt,title".to_string());
        query.insert("page[offset]".to_string(), "0".to_string());
        query.insert("page[limit]".to_string(), "25".to_string());
        query.insert("include".to_string(), "author,comments".to_string());
        query.insert("fields[article]".to_string(), "title".to_string());
        query.insert("unrelated".to_string(), "x".to_string());

        let params = params_from_query(&query);
        assert_eq!(params.filter["state"], json!("published"));
        assert_eq!(params.sort, vec!["-createdAt", "title"]);
        assert_eq!(params.page.unwrap().limit, Some(25));
        assert_eq!(params.include, vec!["author", "comments"]);
        assert_eq!(params.fields["article"], vec!["title"]);
    }

    #[test]
    fn no_page_keys_means_no_page() {
        let params = params_from_query(&HashMap::new());
        assert!(params.page.is_none());
        assert!(params.is_empty());
    }
}
