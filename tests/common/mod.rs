#![allow(dead_code, unused_imports, unused_macros)]

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use cluster_snapshot::csi::Snapshot;
use cluster_snapshot::resources::{CsiNode, Meta};
use cluster_snapshot::state::PatchSet;
use cluster_snapshot::utils;

pub const EBS: &str = "ebs.csi.aws.com";
pub const PD: &str = "pd.csi.google.com";

/// Generates one test per named script, each checking a [`PatchSet`] against [`Layers`].
macro_rules! script_table {
    { $prefix:ident, $($name:ident: [$($op:expr),* $(,)?],)+ } => {
        $(
            paste::item! {
                #[test_log::test]
                fn [< $prefix _ $name >]() {
                    common::check_script(&[$($op),*]);
                }
            }
        )+
    };
}

pub(crate) use script_table;

#[derive(Clone, Copy, Debug)]
pub enum Op {
    Fork,
    Commit,
    Revert,
    Set(&'static str, i32),
    Delete(&'static str),
    Find(&'static str),
    AsMap,
}

/// The layering rules spelled out directly, without caching or merging.
#[derive(Debug)]
pub struct Layers<K, V> {
    layers: Vec<HashMap<K, Option<V>>>,
}

impl<K: Eq + Hash + Clone, V: Clone> Layers<K, V> {
    pub fn new() -> Self {
        Self {
            layers: vec![HashMap::new()],
        }
    }

    pub fn fork(&mut self) {
        self.layers.push(HashMap::new());
    }

    pub fn commit(&mut self) {
        if self.layers.len() < 2 {
            return;
        }
        if let Some(top) = self.layers.pop() {
            if let Some(below) = self.layers.last_mut() {
                below.extend(top);
            }
        }
    }

    pub fn revert(&mut self) {
        if self.layers.len() >= 2 {
            self.layers.pop();
        }
    }

    pub fn set(&mut self, key: K, value: V) {
        if self.layers.is_empty() {
            self.fork();
        }
        if let Some(top) = self.layers.last_mut() {
            top.insert(key, Some(value));
        }
    }

    pub fn delete(&mut self, key: K) {
        if self.layers.is_empty() {
            self.fork();
        }
        if let Some(top) = self.layers.last_mut() {
            top.insert(key, None);
        }
    }

    pub fn find(&self, key: &K) -> Option<V> {
        self.layers
            .iter()
            .rev()
            .find_map(|layer| layer.get(key))
            .cloned()
            .flatten()
    }

    pub fn as_map(&self) -> HashMap<K, V> {
        let mut out = HashMap::new();
        for layer in &self.layers {
            for (k, v) in layer {
                match v {
                    Some(v) => {
                        out.insert(k.clone(), v.clone());
                    }
                    None => {
                        out.remove(k);
                    }
                }
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }
}

/// Run `ops` against a fresh patch set and the plain layer model, comparing every read.
pub fn check_script(ops: &[Op]) {
    let mut patchset = PatchSet::<&'static str, i32>::new([Default::default()]);
    let mut layers = Layers::new();
    for (i, op) in ops.iter().enumerate() {
        match *op {
            Op::Fork => {
                patchset.fork();
                layers.fork();
            }
            Op::Commit => {
                patchset.commit();
                layers.commit();
            }
            Op::Revert => {
                patchset.revert();
                layers.revert();
            }
            Op::Set(k, v) => {
                patchset.set_current(k, v);
                layers.set(k, v);
            }
            Op::Delete(k) => {
                patchset.delete_current(k);
                layers.delete(k);
            }
            Op::Find(k) => {
                assert_eq!(patchset.find_value(&k), layers.find(&k), "step {i}: {op:?}");
            }
            Op::AsMap => {
                assert_eq!(patchset.as_map(), layers.as_map(), "step {i}: {op:?}");
            }
        }
        assert_eq!(patchset.len(), layers.len(), "step {i}: {op:?}");
    }
    // whatever was cached along the way, the final view must still agree
    assert_eq!(patchset.as_map(), layers.as_map());
}

pub fn csi_node(name: &str, driver: &str, count: u32) -> CsiNode {
    utils::csi_node(name, driver, count)
}

pub fn snapshot_of(csi_nodes: &[&CsiNode]) -> Snapshot {
    Snapshot::new(
        csi_nodes
            .iter()
            .map(|c| (c.name().to_owned(), (*c).clone()))
            .collect(),
    )
}

/// The snapshot's current view, sorted by name.
pub fn view(snapshot: &mut Snapshot) -> Vec<Arc<CsiNode>> {
    let mut csi_nodes = snapshot.list();
    csi_nodes.sort_by(|a, b| a.name().cmp(b.name()));
    csi_nodes
}

pub fn names(snapshot: &mut Snapshot) -> Vec<String> {
    view(snapshot)
        .iter()
        .map(|c| c.name().to_owned())
        .collect()
}

/// Compare what two snapshots show, ignoring how their layers are arranged.
pub fn assert_same_view(want: &mut Snapshot, got: &mut Snapshot, msg: &str) {
    assert_eq!(view(want), view(got), "{msg}");
}
