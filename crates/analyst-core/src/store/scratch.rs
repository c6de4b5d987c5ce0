//! ScratchStore - per-run artifact arena
//!
//! Every plan step writes its outputs here under the storage keys the plan
//! declared, and later steps resolve `global_dict.<key>` references against
//! it. Insertion order is tracked so run summaries list artifacts in the
//! order they were produced.

use std::collections::HashMap;

use crate::types::Artifact;

/// In-memory key/artifact arena scoped to one plan run.
#[derive(Debug, Clone, Default)]
pub struct ScratchStore {
    entries: HashMap<String, Artifact>,
    order: Vec<String>,
}

impl ScratchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an artifact. Re-inserting a key overwrites the value but keeps
    /// its original position, which matters when a step is redone in place.
    pub fn insert(&mut self, key: impl Into<String>, artifact: Artifact) {
        let key = key.into();
        if !self.entries.contains_key(&key) {
            self.order.push(key.clone());
        }
        self.entries.insert(key, artifact);
    }

    pub fn get(&self, key: &str) -> Option<&Artifact> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Artifact> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.order.retain(|k| k != key);
        }
        removed
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insertion_order_survives_overwrite() {
        let mut store = ScratchStore::new();
        store.insert("a", Artifact::scalar(1));
        store.insert("b", Artifact::scalar(2));
        store.insert("a", Artifact::scalar(3));

        let keys: Vec<&str> = store.keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(
            store.get("a").and_then(Artifact::as_scalar),
            Some(&serde_json::json!(3))
        );
    }

    #[test]
    fn test_remove_drops_key_from_order() {
        let mut store = ScratchStore::new();
        store.insert("a", Artifact::scalar(1));
        store.insert("b", Artifact::scalar(2));
        assert!(store.remove("a").is_some());
        assert!(store.remove("a").is_none());
        let keys: Vec<&str> = store.keys().collect();
        assert_eq!(keys, vec!["b"]);
        assert_eq!(store.len(), 1);
    }
}
