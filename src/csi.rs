//! CSI node information tracked during scheduling simulations.

pub mod snapshot;

pub use snapshot::{CsiNodeLister, Snapshot};
