use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::config::NodeGroupConfig;
use crate::error::{CloudProviderError, CloudProviderResult};
use crate::framework::NodeInfo;
use crate::resources::{Meta, Node};
use crate::utils;

use super::{CloudProvider, Instance, InstanceState, NodeGroup, PricingModel, ResourceLimiter};

/// An in-memory provider whose node groups come from a scenario file.
#[derive(Clone, Debug, Default)]
pub struct StaticCloudProvider {
    groups: Vec<StaticNodeGroup>,
    limiter: ResourceLimiter,
}

impl StaticCloudProvider {
    pub fn new(
        groups: impl IntoIterator<Item = StaticNodeGroup>,
        limiter: ResourceLimiter,
    ) -> Self {
        Self {
            groups: groups.into_iter().collect(),
            limiter,
        }
    }

    pub fn from_config(groups: &[NodeGroupConfig], limiter: ResourceLimiter) -> Self {
        Self::new(groups.iter().map(StaticNodeGroup::from_config), limiter)
    }

    pub fn group(&self, id: &str) -> Option<&StaticNodeGroup> {
        self.groups.iter().find(|g| g.id == id)
    }
}

impl CloudProvider for StaticCloudProvider {
    fn name(&self) -> &str {
        "static"
    }

    fn node_groups(&self) -> Vec<&dyn NodeGroup> {
        self.groups.iter().map(|g| g as &dyn NodeGroup).collect()
    }

    fn node_group_for_node(&self, node: &Node) -> CloudProviderResult<Option<&dyn NodeGroup>> {
        Ok(self
            .groups
            .iter()
            .find(|g| g.registered.iter().any(|n| n == node.name()))
            .map(|g| g as &dyn NodeGroup))
    }

    fn node_group_mut(&mut self, id: &str) -> Option<&mut dyn NodeGroup> {
        self.groups
            .iter_mut()
            .find(|g| g.id == id)
            .map(|g| g as &mut dyn NodeGroup)
    }

    fn pricing(&self) -> CloudProviderResult<&dyn PricingModel> {
        Err(CloudProviderError::NotImplemented)
    }

    fn get_resource_limiter(&self) -> CloudProviderResult<ResourceLimiter> {
        Ok(self.limiter.clone())
    }

    fn refresh(&mut self) -> CloudProviderResult<()> {
        debug!(groups = self.groups.len(), "Refreshing static cloud provider");
        Ok(())
    }

    fn cleanup(&mut self) -> CloudProviderResult<()> {
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct StaticNodeGroup {
    id: String,
    min_size: usize,
    max_size: usize,
    target_size: usize,
    template: NodeInfo,
    /// Names of the nodes that have joined the cluster.
    registered: Vec<String>,
}

impl StaticNodeGroup {
    pub fn new(id: &str, min_size: usize, max_size: usize, template: NodeInfo) -> Self {
        Self {
            id: id.to_owned(),
            min_size,
            max_size,
            target_size: min_size,
            template,
            registered: Vec::new(),
        }
    }

    pub fn with_registered(mut self, nodes: impl IntoIterator<Item = String>) -> Self {
        self.registered.extend(nodes);
        self.target_size = self.target_size.max(self.registered.len());
        self
    }

    pub fn with_target_size(mut self, target_size: usize) -> Self {
        self.target_size = target_size;
        self
    }

    pub fn from_config(config: &NodeGroupConfig) -> Self {
        let name = &config.template.node.metadata.name;
        let node = utils::node_from_template(&config.template.node, name);
        let mut template = NodeInfo::new(node);
        if let Some(csi_node) = &config.template.csi_node {
            template.set_csi_node(utils::csi_node_from_template(csi_node, template.name()));
        }
        let group = Self::new(&config.id, config.min_size, config.max_size, template)
            .with_registered(config.nodes.iter().cloned());
        match config.target_size {
            Some(target) => group.with_target_size(target),
            None => group,
        }
    }

    fn out_of_range(&self, size: i64) -> CloudProviderError {
        CloudProviderError::SizeOutOfRange {
            group: self.id.clone(),
            size,
            min: self.min_size,
            max: self.max_size,
        }
    }
}

impl NodeGroup for StaticNodeGroup {
    fn id(&self) -> &str {
        &self.id
    }

    fn max_size(&self) -> usize {
        self.max_size
    }

    fn min_size(&self) -> usize {
        self.min_size
    }

    fn target_size(&self) -> CloudProviderResult<usize> {
        Ok(self.target_size)
    }

    fn increase_size(&mut self, delta: i64) -> CloudProviderResult<()> {
        if delta <= 0 {
            return Err(CloudProviderError::InvalidDelta(delta));
        }
        let new_size = (self.target_size as i64)
            .checked_add(delta)
            .ok_or(CloudProviderError::InvalidDelta(delta))?;
        if new_size > self.max_size as i64 {
            return Err(self.out_of_range(new_size));
        }
        info!(
            group = self.id,
            from = self.target_size,
            to = new_size,
            "Increasing node group size"
        );
        self.target_size = new_size as usize;
        Ok(())
    }

    fn delete_nodes(&mut self, nodes: &[Node]) -> CloudProviderResult<()> {
        let names: BTreeSet<&str> = nodes.iter().map(|n| n.name()).collect();
        for name in &names {
            if !self.registered.iter().any(|n| n == name) {
                return Err(CloudProviderError::NodeNotInGroup {
                    node: (*name).to_owned(),
                    group: self.id.clone(),
                });
            }
        }
        let new_size = self.target_size as i64 - names.len() as i64;
        if new_size < self.min_size as i64 {
            return Err(self.out_of_range(new_size));
        }
        self.registered.retain(|n| !names.contains(n.as_str()));
        info!(
            group = self.id,
            deleted = names.len(),
            "Deleted nodes from node group"
        );
        self.target_size = new_size as usize;
        Ok(())
    }

    fn decrease_target_size(&mut self, delta: i64) -> CloudProviderResult<()> {
        if delta <= 0 {
            return Err(CloudProviderError::InvalidDelta(delta));
        }
        let new_size = self.target_size as i64 - delta;
        // only capacity that has not registered yet can be given back
        if new_size < self.registered.len() as i64 {
            return Err(self.out_of_range(new_size));
        }
        self.target_size = new_size as usize;
        Ok(())
    }

    fn nodes(&self) -> CloudProviderResult<Vec<Instance>> {
        let running = self.registered.iter().map(|name| Instance {
            id: name.clone(),
            state: InstanceState::Running,
        });
        let creating = (self.registered.len()..self.target_size).map(|i| Instance {
            id: format!("{}-creating-{}", self.id, i),
            state: InstanceState::Creating,
        });
        Ok(running.chain(creating).collect())
    }

    fn template_node_info(&self) -> CloudProviderResult<NodeInfo> {
        Ok(self.template.clone())
    }

    fn exist(&self) -> bool {
        true
    }

    fn debug(&self) -> String {
        format!(
            "{} (min: {}, max: {}, target: {})",
            self.id, self.min_size, self.max_size, self.target_size
        )
    }
}
