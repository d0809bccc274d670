use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use crate::error::{SnapshotError, SnapshotResult};
use crate::framework::NodeInfo;
use crate::resources::{CsiNode, Meta};
use crate::state::{Patch, PatchSet};

const KIND: &str = "CSINode";

/// CSINodes of the cluster at a point in time, modifiable through forkable layers.
///
/// Names are unique: adding a CSINode whose name is already present is an error and leaves the
/// snapshot untouched.
#[derive(Clone, Debug)]
pub struct Snapshot {
    csi_nodes: PatchSet<String, Arc<CsiNode>>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty()
    }
}

impl Snapshot {
    /// Create a snapshot whose base layer holds the given CSINodes, keyed by name.
    pub fn new(csi_nodes: HashMap<String, CsiNode>) -> Self {
        let base = csi_nodes
            .into_iter()
            .map(|(name, csi_node)| (name, Arc::new(csi_node)))
            .collect::<HashMap<_, _>>();
        Self {
            csi_nodes: PatchSet::new([Patch::from(base)]),
        }
    }

    pub fn empty() -> Self {
        Self {
            csi_nodes: PatchSet::new([Patch::new()]),
        }
    }

    /// Lister for the scheduling framework.
    ///
    /// It never writes CSINodes, but borrows mutably because reads fill the lookup cache.
    pub fn csi_nodes(&mut self) -> CsiNodeLister<'_> {
        CsiNodeLister { snapshot: self }
    }

    pub fn get(&mut self, name: &str) -> SnapshotResult<Arc<CsiNode>> {
        self.csi_nodes
            .find_value(&name.to_owned())
            .ok_or_else(|| SnapshotError::NotFound {
                kind: KIND,
                name: name.to_owned(),
            })
    }

    /// All CSINodes in the current view, in no particular order.
    pub fn list(&mut self) -> Vec<Arc<CsiNode>> {
        self.csi_nodes.as_map().into_values().collect()
    }

    pub fn add_csi_node(&mut self, csi_node: CsiNode) -> SnapshotResult<()> {
        let name = csi_node.name().to_owned();
        if self.csi_nodes.find_value(&name).is_some() {
            return Err(already_exists(name));
        }
        self.csi_nodes.set_current(name, Arc::new(csi_node));
        Ok(())
    }

    /// Add all the given CSINodes or none of them.
    ///
    /// Fails when any name is already present or appears twice in the batch.
    pub fn add_csi_nodes(&mut self, csi_nodes: Vec<CsiNode>) -> SnapshotResult<()> {
        let mut seen = HashSet::with_capacity(csi_nodes.len());
        for csi_node in &csi_nodes {
            let name = csi_node.name().to_owned();
            if !seen.insert(name.clone()) || self.csi_nodes.find_value(&name).is_some() {
                debug!(name, batch = csi_nodes.len(), "Rejecting CSINode batch");
                return Err(already_exists(name));
            }
        }
        for csi_node in csi_nodes {
            self.csi_nodes
                .set_current(csi_node.name().to_owned(), Arc::new(csi_node));
        }
        Ok(())
    }

    /// Remove the CSINode with the given name, absent names are ignored.
    pub fn remove_csi_node(&mut self, name: &str) {
        self.csi_nodes.delete_current(name.to_owned());
    }

    /// Attach the CSINode sharing the node's name to the node info.
    pub fn add_csi_node_info_to_node_info(
        &mut self,
        mut node_info: NodeInfo,
    ) -> SnapshotResult<NodeInfo> {
        let csi_node = self.get(node_info.name())?;
        node_info.set_csi_node(csi_node);
        Ok(node_info)
    }

    /// Start a new layer, later changes are recorded there until commit or revert.
    pub fn fork(&mut self) {
        self.csi_nodes.fork();
    }

    /// Persist the current layer into the one below it.
    pub fn commit(&mut self) {
        self.csi_nodes.commit();
    }

    /// Drop the current layer and everything recorded in it.
    pub fn revert(&mut self) {
        self.csi_nodes.revert();
    }

    /// The number of layers, the base layer included.
    pub fn depth(&self) -> usize {
        self.csi_nodes.len()
    }

    /// Copy every layer, including fresh copies of the CSINodes themselves.
    pub fn deep_clone(&self) -> Self {
        Self {
            csi_nodes: self
                .csi_nodes
                .clone_with(String::clone, |c| Arc::new(CsiNode::clone(c))),
        }
    }
}

fn already_exists(name: String) -> SnapshotError {
    SnapshotError::AlreadyExists { kind: KIND, name }
}

/// Lists and gets CSINodes from a [`Snapshot`].
pub struct CsiNodeLister<'a> {
    snapshot: &'a mut Snapshot,
}

impl CsiNodeLister<'_> {
    pub fn get(&mut self, name: &str) -> SnapshotResult<Arc<CsiNode>> {
        self.snapshot.get(name)
    }

    pub fn list(&mut self) -> Vec<Arc<CsiNode>> {
        self.snapshot.list()
    }
}
