use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// A single layer of modifications and deletions over a key space.
///
/// A key is never both modified and deleted within the same patch.
#[derive(Clone, Debug)]
pub struct Patch<K, V> {
    modified: HashMap<K, V>,
    deleted: HashSet<K>,
}

impl<K, V> Default for Patch<K, V> {
    fn default() -> Self {
        Self {
            modified: HashMap::new(),
            deleted: HashSet::new(),
        }
    }
}

impl<K: Eq + Hash, V> Patch<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a patch that treats every entry of `source` as already modified.
    pub fn from_map(source: Option<HashMap<K, V>>) -> Self {
        Self {
            modified: source.unwrap_or_default(),
            deleted: HashSet::new(),
        }
    }

    pub fn set(&mut self, key: K, value: V) {
        self.deleted.remove(&key);
        self.modified.insert(key, value);
    }

    pub fn delete(&mut self, key: K) {
        self.modified.remove(&key);
        self.deleted.insert(key);
    }

    /// Get the value modified in this layer, deletions are not consulted.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.modified.get(key)
    }

    pub fn is_deleted(&self, key: &K) -> bool {
        self.deleted.contains(key)
    }

    /// Overlay `other` onto this patch, `other` wins for every key it mentions.
    pub fn merge(&mut self, other: Patch<K, V>) -> &mut Self {
        for (key, value) in other.modified {
            self.set(key, value);
        }
        for key in other.deleted {
            self.delete(key);
        }
        self
    }

    pub fn modified(&self) -> &HashMap<K, V> {
        &self.modified
    }

    pub fn deleted(&self) -> &HashSet<K> {
        &self.deleted
    }

    pub fn is_empty(&self) -> bool {
        self.modified.is_empty() && self.deleted.is_empty()
    }

    /// Copy this patch using the given functions for keys and values.
    pub fn clone_with(&self, clone_key: impl Fn(&K) -> K, clone_value: impl Fn(&V) -> V) -> Self {
        Self {
            modified: self
                .modified
                .iter()
                .map(|(k, v)| (clone_key(k), clone_value(v)))
                .collect(),
            deleted: self.deleted.iter().map(&clone_key).collect(),
        }
    }
}

impl<K: Eq + Hash, V: PartialEq> PartialEq for Patch<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.modified == other.modified && self.deleted == other.deleted
    }
}

impl<K: Eq + Hash, V: Eq> Eq for Patch<K, V> {}

impl<K: Eq + Hash, V> From<HashMap<K, V>> for Patch<K, V> {
    fn from(value: HashMap<K, V>) -> Self {
        Self::from_map(Some(value))
    }
}
