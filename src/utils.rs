use std::sync::Arc;

use time::OffsetDateTime;

use crate::resources::{
    CsiNode, CsiNodeDriver, CsiNodeSpec, Metadata, Node, Time, VolumeNodeResources,
};

pub fn new_uid() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

pub fn metadata(name: String) -> Metadata {
    Metadata {
        name,
        creation_timestamp: Some(Time(now())),
        uid: new_uid(),
        ..Default::default()
    }
}

/// Copy a template node under a new name, giving it a fresh identity.
pub fn node_from_template(template: &Node, name: &str) -> Node {
    let mut node = template.clone();
    node.metadata = Metadata {
        labels: template.metadata.labels.clone(),
        annotations: template.metadata.annotations.clone(),
        ..metadata(name.to_owned())
    };
    node
}

/// Copy a template CSINode under a new node name, rewriting the per-driver node ids.
pub fn csi_node_from_template(template: &CsiNode, name: &str) -> Arc<CsiNode> {
    let mut csi_node = template.clone();
    csi_node.metadata = Metadata {
        labels: template.metadata.labels.clone(),
        annotations: template.metadata.annotations.clone(),
        ..metadata(name.to_owned())
    };
    for driver in &mut csi_node.spec.drivers {
        driver.node_id = name.to_owned();
    }
    Arc::new(csi_node)
}

/// Build a CSINode with a single driver and attachment limit.
pub fn csi_node(name: &str, driver: &str, count: u32) -> CsiNode {
    CsiNode {
        metadata: metadata(name.to_owned()),
        spec: CsiNodeSpec {
            drivers: vec![CsiNodeDriver {
                name: driver.to_owned(),
                node_id: name.to_owned(),
                allocatable: Some(VolumeNodeResources { count: Some(count) }),
                ..Default::default()
            }],
        },
    }
}
