//! Static catalog of resource types, built before the engine starts.

use crate::schema::types::ResourceSchema;
use std::collections::HashMap;
use std::sync::Arc;

/// Maps resource type names to their schemas. Lookup of an unregistered type
/// returns `None`; callers must check rather than assume.
#[derive(Clone, Debug, Default)]
pub struct ResourceRegistry {
    types: HashMap<String, Arc<ResourceSchema>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, resource_type: impl Into<String>, schema: ResourceSchema) -> Self {
        self.types.insert(resource_type.into(), Arc::new(schema));
        self
    }

    pub fn schema_for(&self, resource_type: &str) -> Option<Arc<ResourceSchema>> {
        self.types.get(resource_type).cloned()
    }

    pub fn contains(&self, resource_type: &str) -> bool {
        self.types.contains_key(resource_type)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::AttributeKind;

    #[test]
    fn lookup_of_unregistered_type_is_none() {
        let registry = ResourceRegistry::new()
            .register("article", ResourceSchema::new().attribute("title", AttributeKind::String));
        assert!(registry.schema_for("article").is_some());
        assert!(registry.schema_for("widget").is_none());
        assert!(!registry.contains("widget"));
    }
}
