//! Layered, copy-on-write state used to model speculative changes to the cluster.
//!
//! A [`PatchSet`] is forked to start a what-if exploration, mutated through the current layer, and
//! then either committed into its parent or reverted.

pub mod patch;
pub mod patchset;

pub use patch::Patch;
pub use patchset::PatchSet;
