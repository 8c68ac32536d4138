//! Transforms available by name.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde_json::Value;

use super::{
    BundleTransform, CommonJsTransform, JsonTransform, LowerTransform, MinifyTransform, Transform, TransformError,
    TransformRef, UrlTransform,
};
use crate::mode::Gate;

/// Name to transform lookup used when targets come from configuration.
#[derive(Debug, Clone, Default)]
pub struct TransformRegistry {
    transforms: FxHashMap<String, Arc<dyn Transform>>,
}

impl TransformRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `json`, `commonjs`, `url`, `lower`, `bundle` and `minify`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(JsonTransform);
        registry.register(CommonJsTransform);
        registry.register(UrlTransform);
        registry.register(LowerTransform);
        registry.register(BundleTransform);
        registry.register(MinifyTransform);
        registry
    }

    /// Add a transform, replacing any transform with the same name.
    pub fn register(&mut self, transform: impl Transform + 'static) {
        self.register_arc(Arc::new(transform));
    }

    pub fn register_arc(&mut self, transform: Arc<dyn Transform>) {
        self.transforms.insert(transform.name().to_string(), transform);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Transform>> {
        self.transforms.get(name).cloned()
    }

    /// Build a chain entry for `name`, validating its options.
    pub fn instantiate(&self, name: &str, config: Value, enabled: Gate) -> Result<TransformRef, TransformError> {
        let transform = self
            .get(name)
            .ok_or_else(|| TransformError::invalid_config(name, "no transform registered under this name"))?;
        transform.validate_config(&config)?;
        Ok(TransformRef::from_arc(transform).with_config(config).enabled_when(enabled))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.transforms.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Get the number of registered transforms
    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builtins_are_registered() {
        let registry = TransformRegistry::with_builtins();
        assert_eq!(registry.names(), ["bundle", "commonjs", "json", "lower", "minify", "url"]);
        assert_eq!(registry.len(), 6);
        assert!(TransformRegistry::new().is_empty());
    }

    #[test]
    fn instantiate_validates_options() {
        let registry = TransformRegistry::with_builtins();
        let minify = registry
            .instantiate("minify", Value::Null, Gate::parse("!dev").unwrap())
            .unwrap();
        assert_eq!(minify.name(), "minify");
        assert_eq!(minify.enabled.as_str(), "!dev");

        assert!(registry.instantiate("url", json!({ "public_path": "/" }), Gate::always()).is_err());
        assert!(registry.instantiate("sass", Value::Null, Gate::always()).is_err());
    }
}
