use std::collections::HashMap;
use std::hash::Hash;

use super::patch::Patch;

/// A stack of [`Patch`] layers presenting one transactional view.
///
/// Index 0 is the base layer and the last patch is the current one. The effective value for a key
/// comes from the topmost layer that either sets or deletes it.
///
/// Reads are cached. A `Some` cache entry is a known value and a `None` entry is a known absence. A
/// missing entry means the layers have to be walked. `cache_in_sync` is only true when the cache
/// holds exactly the effective key/value set, which only [`PatchSet::as_map`] establishes.
///
/// Not internally synchronized, each simulation should own its own instance.
#[derive(Debug)]
pub struct PatchSet<K, V> {
    patches: Vec<Patch<K, V>>,
    cache: HashMap<K, Option<V>>,
    cache_in_sync: bool,
}

impl<K, V> Default for PatchSet<K, V> {
    fn default() -> Self {
        Self {
            patches: Vec::new(),
            cache: HashMap::new(),
            cache_in_sync: false,
        }
    }
}

impl<K, V> PatchSet<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(patches: impl IntoIterator<Item = Patch<K, V>>) -> Self {
        Self {
            patches: patches.into_iter().collect(),
            ..Default::default()
        }
    }

    /// Start a new, empty layer on top of the stack.
    pub fn fork(&mut self) {
        self.patches.push(Patch::new());
    }

    /// Fold the current layer into the one below it.
    ///
    /// Effective values do not change so the cache stays valid.
    pub fn commit(&mut self) {
        if self.patches.len() < 2 {
            return;
        }
        if let Some(current) = self.patches.pop() {
            if let Some(below) = self.patches.last_mut() {
                below.merge(current);
            }
        }
    }

    /// Discard the current layer.
    pub fn revert(&mut self) {
        if self.patches.len() <= 1 {
            return;
        }
        if let Some(current) = self.patches.pop() {
            for key in current.modified().keys() {
                self.cache.remove(key);
            }
            for key in current.deleted() {
                self.cache.remove(key);
            }
            // lower layers may hold values for keys the cache never saw
            self.cache_in_sync = false;
        }
    }

    /// Find the effective value for `key`, caching the outcome.
    pub fn find_value(&mut self, key: &K) -> Option<V> {
        if let Some(cached) = self.cache.get(key) {
            return cached.clone();
        }

        let value = self.lookup(key);
        self.cache.insert(key.clone(), value.clone());
        value
    }

    fn lookup(&self, key: &K) -> Option<V> {
        for patch in self.patches.iter().rev() {
            if patch.is_deleted(key) {
                return None;
            }
            if let Some(value) = patch.get(key) {
                return Some(value.clone());
            }
        }
        None
    }

    /// Materialize the effective key/value set.
    pub fn as_map(&mut self) -> HashMap<K, V> {
        if self.cache_in_sync {
            return self
                .cache
                .iter()
                .filter_map(|(k, v)| v.as_ref().map(|v| (k.clone(), v.clone())))
                .collect();
        }

        let mut merged = HashMap::new();
        for patch in &self.patches {
            for (key, value) in patch.modified() {
                merged.insert(key.clone(), value.clone());
            }
            for key in patch.deleted() {
                merged.remove(key);
            }
        }

        self.cache = merged
            .iter()
            .map(|(k, v)| (k.clone(), Some(v.clone())))
            .collect();
        self.cache_in_sync = true;
        merged
    }

    /// Set `key` in the current layer.
    pub fn set_current(&mut self, key: K, value: V) {
        let current = self.current_mut();
        current.set(key.clone(), value.clone());
        self.cache.insert(key, Some(value));
    }

    /// Delete `key` in the current layer, deleting an absent key is a no-op on the view.
    pub fn delete_current(&mut self, key: K) {
        let current = self.current_mut();
        current.delete(key.clone());
        self.cache.insert(key, None);
    }

    /// Whether the current layer itself modifies `key`.
    pub fn in_current_patch(&self, key: &K) -> bool {
        self.patches
            .last()
            .map_or(false, |p| p.get(key).is_some())
    }

    fn current_mut(&mut self) -> &mut Patch<K, V> {
        if self.patches.is_empty() {
            self.fork();
        }
        let last = self.patches.len() - 1;
        &mut self.patches[last]
    }

    /// The number of layers.
    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    /// Copy every layer with the given functions, the copy starts with a cold cache.
    pub fn clone_with(
        &self,
        clone_key: impl Fn(&K) -> K,
        clone_value: impl Fn(&V) -> V,
    ) -> Self {
        Self {
            patches: self
                .patches
                .iter()
                .map(|p| p.clone_with(&clone_key, &clone_value))
                .collect(),
            ..Default::default()
        }
    }

    #[cfg(test)]
    pub(crate) fn cache(&self) -> &HashMap<K, Option<V>> {
        &self.cache
    }

    #[cfg(test)]
    pub(crate) fn cache_in_sync(&self) -> bool {
        self.cache_in_sync
    }
}

impl<K, V> Clone for PatchSet<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn clone(&self) -> Self {
        self.clone_with(K::clone, V::clone)
    }
}

#[cfg(test)]
mod tests {
    use maplit::hashmap;

    use super::*;

    /// Build a patch set from layers where `None` marks a deletion.
    fn build(layers: Vec<HashMap<&'static str, Option<i32>>>) -> PatchSet<&'static str, i32> {
        PatchSet::new(layers.into_iter().map(|layer| {
            let mut patch = Patch::new();
            for (k, v) in layer {
                match v {
                    Some(v) => patch.set(k, v),
                    None => patch.delete(k),
                }
            }
            patch
        }))
    }

    macro_rules! as_map_table {
        { $($name:ident: [$($layer:expr),*] => $want:expr,)+ } => {
            $(
                #[test]
                fn $name() {
                    let mut ps = build(vec![$($layer),*]);
                    assert_eq!(ps.as_map(), $want);
                }
            )+
        };
    }

    as_map_table! {
        as_map_empty: [] => HashMap::new(),
        as_map_single_layer: [hashmap! {"a" => Some(1), "b" => Some(2)}]
            => hashmap! {"a" => 1, "b" => 2},
        as_map_only_deletions: [hashmap! {"a" => None, "b" => None}] => HashMap::new(),
        as_map_overwrite: [
            hashmap! {"a" => Some(1), "b" => Some(2)},
            hashmap! {"b" => Some(22), "c" => Some(3)}
        ] => hashmap! {"a" => 1, "b" => 22, "c" => 3},
        as_map_with_deletions: [
            hashmap! {"a" => Some(1), "b" => None, "x" => Some(100)},
            hashmap! {"c" => Some(3), "x" => Some(101), "a" => None}
        ] => hashmap! {"c" => 3, "x" => 101},
        as_map_add_after_delete: [
            hashmap! {"a" => None},
            hashmap! {"a" => Some(11), "b" => Some(2)}
        ] => hashmap! {"a" => 11, "b" => 2},
        as_map_all_in_one: [
            hashmap! {"k1" => Some(1), "k2" => Some(2)},
            hashmap! {"k2" => Some(22), "k3" => Some(3), "k1" => None},
            hashmap! {"k1" => Some(111), "k3" => Some(33), "k4" => Some(4), "deleted" => None}
        ] => hashmap! {"k2" => 22, "k3" => 33, "k4" => 4, "k1" => 111},
    }

    #[test]
    fn find_value_scans_top_down() {
        let mut ps = build(vec![
            hashmap! {"a" => Some(1)},
            hashmap! {"a" => None},
            hashmap! {"a" => Some(111), "b" => Some(2)},
        ]);
        assert_eq!(ps.find_value(&"a"), Some(111));
        assert_eq!(ps.find_value(&"b"), Some(2));
        assert_eq!(ps.find_value(&"x"), None);

        let mut ps = build(vec![
            hashmap! {"a" => Some(1)},
            hashmap! {"a" => None, "b" => Some(2)},
            hashmap! {"c" => Some(3)},
        ]);
        assert_eq!(ps.find_value(&"a"), None);
    }

    #[test]
    fn find_value_on_empty_set() {
        let mut ps = PatchSet::<&str, i32>::default();
        assert_eq!(ps.find_value(&"a"), None);
    }

    #[test]
    fn commit_keeps_view_and_drops_a_layer() {
        let mut ps = build(vec![
            hashmap! {"x" => Some(10)},
            hashmap! {"x" => None},
            hashmap! {"x" => Some(30)},
            hashmap! {"y" => Some(40), "x" => None},
        ]);
        let want = hashmap! {"y" => 40};
        assert_eq!(ps.as_map(), want);
        for layers in (1..4).rev() {
            ps.commit();
            assert_eq!(ps.len(), layers);
            assert_eq!(ps.as_map(), want);
        }
        ps.commit();
        assert_eq!(ps.len(), 1);
        assert_eq!(ps.as_map(), want);
    }

    #[test]
    fn commit_and_revert_on_empty_set_are_noops() {
        let mut ps = PatchSet::<&str, i32>::default();
        ps.commit();
        ps.revert();
        assert_eq!(ps.len(), 0);
        assert!(ps.as_map().is_empty());
    }

    #[test]
    fn revert_peels_layers() {
        let mut ps = build(vec![
            hashmap! {"a" => Some(1), "b" => Some(2), "z" => Some(100)},
            hashmap! {"b" => Some(22), "c" => Some(3), "a" => None},
            hashmap! {
                "c" => Some(33),
                "d" => Some(4),
                "a" => Some(111),
                "b" => None,
                "deleted" => None,
            },
        ]);
        assert_eq!(
            ps.as_map(),
            hashmap! {"z" => 100, "c" => 33, "d" => 4, "a" => 111}
        );
        ps.revert();
        assert_eq!(ps.as_map(), hashmap! {"z" => 100, "b" => 22, "c" => 3});
        ps.revert();
        assert_eq!(ps.as_map(), hashmap! {"a" => 1, "b" => 2, "z" => 100});
        // the base layer is never reverted
        ps.revert();
        assert_eq!(ps.len(), 1);
        assert_eq!(ps.as_map(), hashmap! {"a" => 1, "b" => 2, "z" => 100});
    }

    #[test]
    fn fork_mutate_revert() {
        let mut ps = PatchSet::new([Patch::<&str, i32>::new()]);
        ps.fork();
        assert_eq!(ps.len(), 2);
        ps.set_current("a", 1);
        ps.set_current("b", 2);
        ps.delete_current("a");
        ps.revert();
        assert_eq!(ps.len(), 1);
        assert!(ps.as_map().is_empty());
    }

    #[test]
    fn fork_fork_commit_revert() {
        let mut ps = PatchSet::new([Patch::<&str, i32>::new()]);
        ps.fork();
        ps.fork();
        ps.set_current("a", 1);
        ps.set_current("b", 2);
        ps.delete_current("a");
        ps.commit();
        assert_eq!(ps.len(), 2);
        assert_eq!(ps.as_map(), hashmap! {"b" => 2});
        ps.revert();
        assert_eq!(ps.len(), 1);
        assert!(ps.as_map().is_empty());
    }

    #[test]
    fn fork_commit_matches_direct_set() {
        let mut forked = build(vec![hashmap! {"a" => Some(1), "b" => None}]);
        forked.fork();
        forked.set_current("b", 2);
        forked.commit();

        let mut direct = build(vec![hashmap! {"a" => Some(1), "b" => None}]);
        direct.set_current("b", 2);

        assert_eq!(forked.as_map(), direct.as_map());
        assert_eq!(forked.len(), direct.len());
    }

    #[test]
    fn mutations_self_heal_empty_set() {
        let mut ps = PatchSet::<&str, i32>::default();
        ps.set_current("a", 1);
        assert_eq!(ps.len(), 1);
        assert_eq!(ps.find_value(&"a"), Some(1));

        let mut ps = PatchSet::<&str, i32>::default();
        ps.delete_current("a");
        assert_eq!(ps.len(), 1);
        assert_eq!(ps.find_value(&"a"), None);
    }

    #[test]
    fn delete_current_twice() {
        let mut ps = build(vec![hashmap! {"a" => Some(1)}]);
        ps.delete_current("a");
        assert_eq!(ps.find_value(&"a"), None);
        ps.delete_current("a");
        assert_eq!(ps.find_value(&"a"), None);
        ps.delete_current("never");
        assert_eq!(ps.find_value(&"never"), None);
    }

    #[test]
    fn in_current_patch_only_sees_top_modifications() {
        let mut ps = build(vec![hashmap! {"a" => Some(1)}]);
        ps.fork();
        assert!(!ps.in_current_patch(&"a"));
        ps.set_current("b", 2);
        assert!(ps.in_current_patch(&"b"));
        ps.delete_current("b");
        assert!(!ps.in_current_patch(&"b"));
        assert!(!PatchSet::<&str, i32>::default().in_current_patch(&"a"));
    }

    #[test]
    fn find_value_populates_cache() {
        let mut ps = build(vec![hashmap! {"a" => None, "b" => Some(2)}]);
        ps.find_value(&"a");
        ps.find_value(&"b");
        assert_eq!(ps.cache(), &hashmap! {"a" => None, "b" => Some(2)});
        assert!(!ps.cache_in_sync());
    }

    #[test]
    fn as_map_syncs_cache_without_tombstones() {
        let mut ps = build(vec![hashmap! {"a" => Some(1), "b" => None, "c" => Some(3)}]);
        ps.as_map();
        assert_eq!(ps.cache(), &hashmap! {"a" => Some(1), "c" => Some(3)});
        assert!(ps.cache_in_sync());
    }

    #[test]
    fn current_mutations_write_through_cache() {
        let mut ps = build(vec![hashmap! {"x" => Some(5)}]);
        ps.find_value(&"x");
        ps.set_current("x", 10);
        assert_eq!(ps.cache(), &hashmap! {"x" => Some(10)});
        ps.delete_current("x");
        assert_eq!(ps.cache(), &hashmap! {"x" => None});
        assert!(!ps.cache_in_sync());
    }

    #[test]
    fn revert_evicts_touched_keys() {
        let mut ps = build(vec![
            hashmap! {"a" => Some(1)},
            hashmap! {"b" => Some(2), "a" => Some(11)},
        ]);
        ps.find_value(&"a");
        ps.find_value(&"b");
        ps.revert();
        assert!(ps.cache().is_empty());
        assert!(!ps.cache_in_sync());

        let mut ps = build(vec![hashmap! {"a" => Some(1)}, hashmap! {"b" => Some(2)}]);
        ps.as_map();
        ps.revert();
        assert_eq!(ps.cache(), &hashmap! {"a" => Some(1)});
        assert!(!ps.cache_in_sync());
    }

    #[test]
    fn fork_and_commit_keep_sync() {
        let mut ps = build(vec![hashmap! {"a" => Some(1)}, hashmap! {"b" => Some(2)}]);
        ps.as_map();
        ps.fork();
        assert!(ps.cache_in_sync());
        ps.commit();
        ps.commit();
        assert!(ps.cache_in_sync());
        assert_eq!(ps.cache(), &hashmap! {"a" => Some(1), "b" => Some(2)});
    }

    #[test]
    fn cache_never_diverges_from_layers() {
        let mut ps = build(vec![hashmap! {"a" => Some(1), "b" => Some(2)}]);
        assert_eq!(ps.as_map(), hashmap! {"a" => 1, "b" => 2});

        ps.fork();
        ps.set_current("a", 10);
        ps.delete_current("b");
        assert_eq!(ps.find_value(&"a"), Some(10));
        assert_eq!(ps.find_value(&"b"), None);

        ps.revert();
        // a warm and a cold read agree after the revert
        let cold = ps.clone().find_value(&"a");
        assert_eq!(ps.find_value(&"a"), cold);
        assert_eq!(ps.find_value(&"a"), Some(1));
        assert_eq!(ps.find_value(&"b"), Some(2));
        assert_eq!(ps.as_map(), hashmap! {"a" => 1, "b" => 2});
    }

    #[test]
    fn clone_with_is_independent() {
        let mut original = build(vec![hashmap! {"a" => Some(1)}, hashmap! {"b" => None}]);
        let mut copy = original.clone_with(|k| *k, |v| v * 10);
        copy.set_current("c", 3);
        assert_eq!(copy.len(), 2);
        assert_eq!(copy.as_map(), hashmap! {"a" => 10, "c" => 3});
        assert_eq!(original.as_map(), hashmap! {"a" => 1});
    }
}
