//! The capability interface infrastructure backends implement for the autoscaler.
//!
//! Each backend provides one [`CloudProvider`] implementation selected at startup. Node groups are
//! addressed by id through their provider rather than holding references back to it.

use std::collections::BTreeMap;
use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use crate::error::CloudProviderResult;
use crate::framework::NodeInfo;
use crate::resources::Node;

pub mod static_provider;

pub use static_provider::{StaticCloudProvider, StaticNodeGroup};

/// A cloud instance backing (or about to back) a node.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Instance {
    /// Provider id, the node name once it has registered.
    pub id: String,
    pub state: InstanceState,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum InstanceState {
    Running,
    Creating,
    Deleting,
}

/// A set of nodes sharing the same template that can be scaled together.
pub trait NodeGroup: Debug {
    fn id(&self) -> &str;

    fn max_size(&self) -> usize;

    fn min_size(&self) -> usize;

    /// The requested number of nodes, which may differ from the number of registered nodes.
    fn target_size(&self) -> CloudProviderResult<usize>;

    /// Request `delta` more nodes. Must not exceed the max size.
    fn increase_size(&mut self, delta: i64) -> CloudProviderResult<()>;

    /// Remove the given nodes, decreasing the target size accordingly.
    fn delete_nodes(&mut self, nodes: &[Node]) -> CloudProviderResult<()>;

    /// Lower the target size without deleting registered nodes.
    fn decrease_target_size(&mut self, delta: i64) -> CloudProviderResult<()>;

    fn nodes(&self) -> CloudProviderResult<Vec<Instance>>;

    /// What a new node of this group would look like.
    fn template_node_info(&self) -> CloudProviderResult<NodeInfo>;

    fn exist(&self) -> bool;

    fn debug(&self) -> String;
}

/// Prices nodes for expander decisions.
pub trait PricingModel {
    fn node_price(&self, node: &Node, hours: f64) -> CloudProviderResult<f64>;
}

pub trait CloudProvider {
    fn name(&self) -> &str;

    fn node_groups(&self) -> Vec<&dyn NodeGroup>;

    /// The node group the node belongs to, `None` for nodes the autoscaler should ignore.
    fn node_group_for_node(&self, node: &Node) -> CloudProviderResult<Option<&dyn NodeGroup>>;

    fn node_group_mut(&mut self, id: &str) -> Option<&mut dyn NodeGroup>;

    fn pricing(&self) -> CloudProviderResult<&dyn PricingModel>;

    fn get_resource_limiter(&self) -> CloudProviderResult<ResourceLimiter>;

    fn refresh(&mut self) -> CloudProviderResult<()>;

    fn cleanup(&mut self) -> CloudProviderResult<()>;
}

/// Cluster-wide minimum and maximum totals per resource name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimiter {
    #[serde(default)]
    pub min: BTreeMap<String, u64>,
    #[serde(default)]
    pub max: BTreeMap<String, u64>,
}

impl ResourceLimiter {
    pub fn max(&self, resource: &str) -> u64 {
        self.max.get(resource).copied().unwrap_or(u64::MAX)
    }

    /// The maximum in thousandths of a unit, comparable with [`Quantity::to_milli`].
    ///
    /// [`Quantity::to_milli`]: crate::resources::Quantity::to_milli
    pub fn max_milli(&self, resource: &str) -> u128 {
        u128::from(self.max(resource)).saturating_mul(1000)
    }

    /// Resources whose `total`, in thousandths of a unit, is over the limit.
    pub fn exceeded<'a>(&'a self, total: &'a BTreeMap<String, u128>) -> Vec<&'a str> {
        total
            .iter()
            .filter(|(res, v)| **v > self.max_milli(res))
            .map(|(res, _)| res.as_str())
            .collect()
    }
}
