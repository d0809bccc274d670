use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign},
};

pub trait Meta {
    fn metadata(&self) -> &Metadata;

    fn name(&self) -> &str {
        &self.metadata().name
    }
}

macro_rules! impl_meta {
    ($r:ident) => {
        impl Meta for $r {
            fn metadata(&self) -> &Metadata {
                &self.metadata
            }
        }
    };
}

impl_meta!(Node);
impl_meta!(CsiNode);

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    // Name must be unique within a namespace. Cluster scoped resources such as nodes and CSI nodes
    // are unique across the cluster.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<Time>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    // UID is the unique in time and space value for this object.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
}

#[derive(Clone, Default, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Node {
    pub metadata: Metadata,
    #[serde(default)]
    pub status: NodeStatus,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeStatus {
    /// The total resources of the node.
    #[serde(default)]
    pub capacity: ResourceQuantities,
}

/// Per-node information about the CSI drivers installed on it.
///
/// A CSINode shares its name with the node it describes.
#[derive(Clone, Default, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CsiNode {
    pub metadata: Metadata,
    #[serde(default)]
    pub spec: CsiNodeSpec,
}

impl CsiNode {
    pub fn driver(&self, name: &str) -> Option<&CsiNodeDriver> {
        self.spec.drivers.iter().find(|d| d.name == name)
    }

    /// The number of volumes of the given driver that can be attached to the node.
    ///
    /// `None` when the driver is missing or does not report a limit.
    pub fn driver_allocatable(&self, name: &str) -> Option<u32> {
        self.driver(name)
            .and_then(|d| d.allocatable.as_ref())
            .and_then(|a| a.count)
    }
}

#[derive(Clone, Default, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CsiNodeSpec {
    #[serde(default)]
    pub drivers: Vec<CsiNodeDriver>,
}

#[derive(Clone, Default, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsiNodeDriver {
    pub name: String,
    #[serde(rename = "nodeID")]
    pub node_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topology_keys: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allocatable: Option<VolumeNodeResources>,
}

#[derive(Clone, Default, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VolumeNodeResources {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceQuantities {
    #[serde(flatten)]
    pub others: BTreeMap<String, Quantity>,
}

impl ResourceQuantities {
    /// Every parseable quantity in thousandths of its unit.
    pub fn milli_values(&self) -> BTreeMap<String, u128> {
        self.others
            .iter()
            .filter_map(|(res, q)| q.to_milli().map(|m| (res.clone(), m)))
            .collect()
    }
}

impl Add<ResourceQuantities> for ResourceQuantities {
    type Output = ResourceQuantities;

    fn add(self, rhs: ResourceQuantities) -> Self::Output {
        let mut others = self.others;
        for (res, q) in rhs.others {
            *others.entry(res).or_default() += q;
        }
        Self { others }
    }
}

impl<'a> Sum<&'a ResourceQuantities> for ResourceQuantities {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.fold(ResourceQuantities::default(), |acc, v| acc + v.clone())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Quantity {
    Str(String),
    Num(u64),
}

impl Default for Quantity {
    fn default() -> Self {
        Self::Num(0)
    }
}

/// The size of one unit of each suffix, in thousandths.
fn suffix_scale(suffix: &str) -> Option<u128> {
    const KI: u128 = 1 << 10;
    let scale = match suffix {
        "m" => 1,
        "" => 1_000,
        "k" => 1_000_000,
        "M" => 1_000_000_000,
        "G" => 1_000_000_000_000,
        "T" => 1_000_000_000_000_000,
        "P" => 1_000_000_000_000_000_000,
        "E" => 1_000_000_000_000_000_000_000,
        "Ki" => KI * 1_000,
        "Mi" => KI.pow(2) * 1_000,
        "Gi" => KI.pow(3) * 1_000,
        "Ti" => KI.pow(4) * 1_000,
        "Pi" => KI.pow(5) * 1_000,
        "Ei" => KI.pow(6) * 1_000,
        _ => return None,
    };
    Some(scale)
}

fn parse_milli(s: &str) -> Option<u128> {
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, suffix) = s.split_at(split);
    let scale = suffix_scale(suffix)?;
    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }

    let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut milli = whole.checked_mul(scale)?;
    if !fraction.is_empty() {
        // precision past 15 decimals is dropped
        let digits = &fraction[..fraction.len().min(15)];
        let numerator: u128 = digits.parse().ok()?;
        let denominator = 10u128.pow(digits.len() as u32);
        milli = milli.checked_add(numerator.checked_mul(scale)? / denominator)?;
    }
    Some(milli)
}

impl Quantity {
    /// The quantity in thousandths of its unit, so `"1500m"` is 1500 and `"2Ki"` is 2048000.
    ///
    /// `None` for unparseable strings, negative values or unknown suffixes.
    pub fn to_milli(&self) -> Option<u128> {
        match self {
            Quantity::Str(s) => parse_milli(s.trim()),
            Quantity::Num(n) => Some(u128::from(*n) * 1_000),
        }
    }

    fn from_milli(milli: u128) -> Self {
        match u64::try_from(milli / 1_000) {
            Ok(n) if milli % 1_000 == 0 => Quantity::Num(n),
            _ => Quantity::Str(format!("{milli}m")),
        }
    }
}

impl Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Quantity::Str(s) => f.write_str(s),
            Quantity::Num(n) => write!(f, "{n}"),
        }
    }
}

impl From<u32> for Quantity {
    fn from(value: u32) -> Self {
        Quantity::Num(value.into())
    }
}

impl From<u64> for Quantity {
    fn from(value: u64) -> Self {
        Quantity::Num(value)
    }
}

impl Add<Quantity> for Quantity {
    type Output = Quantity;
    fn add(self, rhs: Quantity) -> Self::Output {
        // unparseable quantities count as zero
        let lhs = self.to_milli().unwrap_or_default();
        let rhs = rhs.to_milli().unwrap_or_default();
        Quantity::from_milli(lhs.saturating_add(rhs))
    }
}

impl AddAssign<Quantity> for Quantity {
    fn add_assign(&mut self, rhs: Quantity) {
        *self = self.clone() + rhs;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Time(#[serde(with = "time::serde::rfc3339")] pub time::OffsetDateTime);
