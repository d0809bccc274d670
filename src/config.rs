//! Scenario files describing a cluster, its node groups and pending demand.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cloudprovider::ResourceLimiter;
use crate::csi::Snapshot;
use crate::error::{ConfigError, ConfigResult};
use crate::estimator::VolumeDemand;
use crate::resources::{CsiNode, Meta, Node};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub csi_nodes: Vec<CsiNode>,
    #[serde(default)]
    pub node_groups: Vec<NodeGroupConfig>,
    #[serde(default)]
    pub resource_limits: ResourceLimiter,
    /// Pods waiting for volumes to be attached somewhere.
    #[serde(default)]
    pub pending: Vec<VolumeDemand>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeGroupConfig {
    pub id: String,
    #[serde(default)]
    pub min_size: usize,
    pub max_size: usize,
    /// Defaults to the larger of the min size and the number of registered nodes.
    #[serde(default)]
    pub target_size: Option<usize>,
    /// Names of the registered nodes in this group.
    #[serde(default)]
    pub nodes: Vec<String>,
    pub template: NodeTemplate,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTemplate {
    pub node: Node,
    #[serde(default)]
    pub csi_node: Option<CsiNode>,
}

/// A single step of a what-if exploration replayed against a snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum ScriptOp {
    Fork,
    Commit,
    Revert,
    #[serde(rename_all = "camelCase")]
    Add { csi_node: CsiNode },
    #[serde(rename_all = "camelCase")]
    AddBatch { csi_nodes: Vec<CsiNode> },
    Remove { name: String },
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub ops: Vec<ScriptOp>,
}

fn read_yaml<T: for<'de> Deserialize<'de>>(path: &Path) -> ConfigResult<T> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_owned(),
        source,
    })?;
    let parsed = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_owned(),
        source,
    })?;
    debug!(?path, "Loaded scenario file");
    Ok(parsed)
}

impl ClusterConfig {
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let config: Self = read_yaml(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let mut ids = BTreeSet::new();
        for group in &self.node_groups {
            if !ids.insert(group.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate node group {:?}",
                    group.id
                )));
            }
            if group.min_size > group.max_size {
                return Err(ConfigError::Invalid(format!(
                    "node group {:?} has min size {} above max size {}",
                    group.id, group.min_size, group.max_size
                )));
            }
            if group.template.node.metadata.name.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "node group {:?} template node has no name",
                    group.id
                )));
            }
        }
        for (resource, min) in &self.resource_limits.min {
            let max = self.resource_limits.max(resource);
            if *min > max {
                return Err(ConfigError::Invalid(format!(
                    "resource {resource:?} has min limit {min} above max limit {max}"
                )));
            }
        }
        let mut names = BTreeSet::new();
        for csi_node in &self.csi_nodes {
            if !names.insert(csi_node.name()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate CSINode {:?}",
                    csi_node.name()
                )));
            }
        }
        Ok(())
    }

    /// Build the CSINode snapshot for the cluster described by this config.
    pub fn csi_snapshot(&self) -> Snapshot {
        let csi_nodes: HashMap<_, _> = self
            .csi_nodes
            .iter()
            .map(|c| (c.name().to_owned(), c.clone()))
            .collect();
        Snapshot::new(csi_nodes)
    }
}

impl Script {
    pub fn load(path: &Path) -> ConfigResult<Self> {
        read_yaml(path)
    }
}
