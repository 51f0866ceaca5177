//! The shared compiled-template cache.
//!
//! Explicitly constructed and injected into whichever behaviours want it,
//! never a process-wide static. This is the one component expected to be
//! shared and mutated across concurrent contexts.

use std::any::Any;
use std::sync::Arc;

use dashmap::DashMap;

/// A concurrent cache of compiled templates, keyed by a namespaced string.
#[derive(Default)]
pub struct TemplateCache {
    entries: DashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cache key for a template: `"<kind>::<templateName>"`.
    pub fn key(kind: &str, template: &str) -> String {
        format!("{kind}::{template}")
    }

    /// Looks up a compiled template of the expected type.
    pub fn get<T: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<T>> {
        let entry = self.entries.get(key)?;
        entry.value().clone().downcast::<T>().ok()
    }

    /// Stores a compiled template, replacing any previous entry.
    pub fn insert<T: Send + Sync + 'static>(&self, key: String, value: Arc<T>) {
        self.entries.insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced_by_kind() {
        assert_eq!(TemplateCache::key("text", "shop/default.tpl"), "text::shop/default.tpl");
    }

    #[test]
    fn entries_round_trip_by_type() {
        let cache = TemplateCache::new();
        cache.insert(TemplateCache::key("text", "a.tpl"), Arc::new("compiled".to_string()));

        let hit: Arc<String> = cache.get(&TemplateCache::key("text", "a.tpl")).unwrap();
        assert_eq!(hit.as_str(), "compiled");
        assert!(cache.get::<u32>(&TemplateCache::key("text", "a.tpl")).is_none());
        assert!(cache.get::<String>("text::missing").is_none());
    }
}
