use std::sync::Arc;

use crate::resources::{CsiNode, Meta, Node};

/// Everything the simulation knows about a single node.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeInfo {
    pub node: Node,
    pub csi_node: Option<Arc<CsiNode>>,
}

impl NodeInfo {
    pub fn new(node: Node) -> Self {
        Self {
            node,
            csi_node: None,
        }
    }

    pub fn with_csi_node(mut self, csi_node: Arc<CsiNode>) -> Self {
        self.set_csi_node(csi_node);
        self
    }

    pub fn set_csi_node(&mut self, csi_node: Arc<CsiNode>) -> &mut Self {
        self.csi_node = Some(csi_node);
        self
    }

    pub fn name(&self) -> &str {
        self.node.name()
    }
}
