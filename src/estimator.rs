//! Estimates how many nodes a node group needs to attach the volumes of pending pods.
//!
//! Estimation runs inside a forked [`Snapshot`]: template CSINodes are added as if the node group
//! had been scaled up, and the fork is reverted afterwards so the snapshot is left untouched.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cloudprovider::{CloudProvider, NodeGroup, ResourceLimiter};
use crate::csi::Snapshot;
use crate::error::{CloudProviderError, CloudProviderResult, EstimatorResult};
use crate::resources::{CsiNode, Node, ResourceQuantities};
use crate::utils;

/// The CSI volumes a pending pod needs attached to whatever node it lands on.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VolumeDemand {
    pub name: String,
    pub driver: String,
    pub volumes: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Estimate {
    /// New nodes that ended up with at least one pod.
    pub node_count: usize,
    pub scheduled: Vec<String>,
    pub unschedulable: Vec<String>,
}

pub type DemandOrderer = Box<dyn Fn(&VolumeDemand, &VolumeDemand) -> Ordering + Send + Sync>;

/// Packs demands onto template nodes, largest first unless told otherwise.
#[derive(derivative::Derivative)]
#[derivative(Debug)]
pub struct VolumeBinpackingEstimator {
    /// Upper bound on nodes added by a single estimation, 0 means no bound.
    pub max_nodes_per_estimation: usize,
    #[derivative(Debug = "ignore")]
    orderer: DemandOrderer,
}

impl Default for VolumeBinpackingEstimator {
    fn default() -> Self {
        Self {
            max_nodes_per_estimation: 0,
            orderer: Box::new(|a, b| b.volumes.cmp(&a.volumes).then_with(|| a.name.cmp(&b.name))),
        }
    }
}

/// A node added during the estimation and the attachments it has left per driver.
struct NewNode {
    name: String,
    used: HashMap<String, u32>,
}

impl VolumeBinpackingEstimator {
    pub fn with_max_nodes(mut self, max_nodes: usize) -> Self {
        self.max_nodes_per_estimation = max_nodes;
        self
    }

    pub fn with_orderer(mut self, orderer: DemandOrderer) -> Self {
        self.orderer = orderer;
        self
    }

    /// Estimate the nodes of `node_group` needed for `demands`, adding at most `limit` nodes.
    pub fn estimate(
        &self,
        snapshot: &mut Snapshot,
        demands: &[VolumeDemand],
        node_group: &dyn NodeGroup,
        limit: usize,
    ) -> EstimatorResult<Estimate> {
        let template = node_group.template_node_info()?;
        let limit = match self.max_nodes_per_estimation {
            0 => limit,
            max => limit.min(max),
        };

        let mut demands = demands.to_vec();
        demands.sort_by(|a, b| (self.orderer)(a, b));

        let Some(template_csi) = template.csi_node else {
            debug!(group = node_group.id(), "Node group template has no CSINode");
            return Ok(Estimate {
                unschedulable: demands.into_iter().map(|d| d.name).collect(),
                ..Default::default()
            });
        };

        snapshot.fork();
        let result = self.binpack(snapshot, &demands, &template_csi, node_group.id(), limit);
        snapshot.revert();
        result
    }

    fn binpack(
        &self,
        snapshot: &mut Snapshot,
        demands: &[VolumeDemand],
        template: &CsiNode,
        group: &str,
        limit: usize,
    ) -> EstimatorResult<Estimate> {
        let mut estimate = Estimate::default();
        let mut nodes: Vec<NewNode> = Vec::new();
        let mut name_index = 0;

        for demand in demands {
            let fits_template = template
                .driver_allocatable(&demand.driver)
                .map_or(false, |count| count >= demand.volumes);
            if !fits_template {
                debug!(pod = demand.name, driver = demand.driver, "Template can never fit pod");
                estimate.unschedulable.push(demand.name.clone());
                continue;
            }

            let mut placed = false;
            for node in &mut nodes {
                if try_place(snapshot, node, demand)? {
                    placed = true;
                    break;
                }
            }
            if !placed && nodes.len() < limit {
                let name = loop {
                    let candidate = format!("template-{}-{}", group, name_index);
                    name_index += 1;
                    if snapshot.get(&candidate).is_err() {
                        break candidate;
                    }
                };
                snapshot.add_csi_node((*utils::csi_node_from_template(template, &name)).clone())?;
                let mut node = NewNode {
                    name,
                    used: HashMap::new(),
                };
                placed = try_place(snapshot, &mut node, demand)?;
                nodes.push(node);
            }

            if placed {
                estimate.scheduled.push(demand.name.clone());
            } else {
                estimate.unschedulable.push(demand.name.clone());
            }
        }

        estimate.node_count = nodes.iter().filter(|n| !n.used.is_empty()).count();
        debug!(
            group,
            nodes = estimate.node_count,
            scheduled = estimate.scheduled.len(),
            unschedulable = estimate.unschedulable.len(),
            "Finished binpacking estimation"
        );
        Ok(estimate)
    }
}

fn try_place(
    snapshot: &mut Snapshot,
    node: &mut NewNode,
    demand: &VolumeDemand,
) -> EstimatorResult<bool> {
    let csi_node = snapshot.get(&node.name)?;
    let allocatable = csi_node.driver_allocatable(&demand.driver).unwrap_or(0);
    let used = node.used.get(&demand.driver).copied().unwrap_or(0);
    if allocatable.saturating_sub(used) < demand.volumes {
        return Ok(false);
    }
    *node.used.entry(demand.driver.clone()).or_default() += demand.volumes;
    Ok(true)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScaleUpOption {
    pub node_group: String,
    pub node_count: usize,
    pub scheduled: Vec<String>,
    pub unschedulable: Vec<String>,
}

/// Chooses which node group to grow for the pending demand.
#[derive(Debug, Default)]
pub struct ScaleUpPlanner {
    estimator: VolumeBinpackingEstimator,
    /// Capacity totals of the nodes already in the cluster, in thousandths of a unit.
    totals: BTreeMap<String, u128>,
}

impl ScaleUpPlanner {
    pub fn new(estimator: VolumeBinpackingEstimator, nodes: &[Node]) -> Self {
        Self {
            estimator,
            totals: resource_totals(nodes.iter().map(|n| &n.status.capacity)),
        }
    }

    /// Estimate every node group that can still grow.
    pub fn options(
        &self,
        provider: &dyn CloudProvider,
        snapshot: &mut Snapshot,
        demands: &[VolumeDemand],
    ) -> EstimatorResult<Vec<ScaleUpOption>> {
        let limiter = provider.get_resource_limiter()?;
        let exceeded = limiter.exceeded(&self.totals);
        if !exceeded.is_empty() {
            warn!(?exceeded, "Cluster is already over its resource limits");
        }
        let mut options = Vec::new();

        for group in provider.node_groups() {
            if !group.exist() {
                continue;
            }
            let headroom = group.max_size().saturating_sub(group.target_size()?);
            let template = group.template_node_info()?;
            let limit = headroom.min(self.nodes_within_limits(&limiter, &template.node));
            if limit == 0 {
                debug!(group = group.id(), "Node group cannot grow");
                continue;
            }

            let estimate = self.estimator.estimate(snapshot, demands, group, limit)?;
            let option = ScaleUpOption {
                node_group: group.id().to_owned(),
                node_count: estimate.node_count,
                scheduled: estimate.scheduled,
                unschedulable: estimate.unschedulable,
            };
            info!(
                group = option.node_group,
                nodes = option.node_count,
                scheduled = option.scheduled.len(),
                "Computed scale-up option"
            );
            options.push(option);
        }
        Ok(options)
    }

    /// Pick the option scheduling the most demand.
    ///
    /// Ties go to fewer new nodes, then to the lowest node group id.
    pub fn best_option(
        &self,
        provider: &dyn CloudProvider,
        snapshot: &mut Snapshot,
        demands: &[VolumeDemand],
    ) -> EstimatorResult<Option<ScaleUpOption>> {
        let mut best: Option<ScaleUpOption> = None;
        for option in self.options(provider, snapshot, demands)? {
            if option.node_count == 0 {
                continue;
            }
            if best.as_ref().map_or(true, |b| better(&option, b)) {
                best = Some(option);
            }
        }
        Ok(best)
    }

    /// How many copies of `template` fit under the resource limits.
    fn nodes_within_limits(&self, limiter: &ResourceLimiter, template: &Node) -> usize {
        let mut allowed = usize::MAX;
        for (resource, quantity) in &template.status.capacity.others {
            let Some(per_node) = quantity.to_milli() else {
                warn!(resource, %quantity, "Ignoring unparseable template quantity");
                continue;
            };
            if per_node == 0 {
                continue;
            }
            let current = self.totals.get(resource).copied().unwrap_or(0);
            let left = limiter.max_milli(resource).saturating_sub(current);
            allowed = allowed.min(usize::try_from(left / per_node).unwrap_or(usize::MAX));
        }
        allowed
    }

    /// Ask the provider to grow the chosen node group.
    pub fn execute(
        &self,
        provider: &mut dyn CloudProvider,
        option: &ScaleUpOption,
    ) -> CloudProviderResult<()> {
        let group = provider
            .node_group_mut(&option.node_group)
            .ok_or_else(|| CloudProviderError::NodeGroupNotFound(option.node_group.clone()))?;
        group.increase_size(option.node_count as i64)
    }
}

fn better(candidate: &ScaleUpOption, current: &ScaleUpOption) -> bool {
    candidate
        .scheduled
        .len()
        .cmp(&current.scheduled.len())
        .then_with(|| current.node_count.cmp(&candidate.node_count))
        .then_with(|| current.node_group.cmp(&candidate.node_group))
        == Ordering::Greater
}

/// Sum quantities per resource name in thousandths of a unit.
///
/// Quantities that do not parse are skipped.
pub fn resource_totals<'a>(
    quantities: impl Iterator<Item = &'a ResourceQuantities>,
) -> BTreeMap<String, u128> {
    let total: ResourceQuantities = quantities.sum();
    total.milli_values()
}
