use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
pub struct Opts {
    #[clap(subcommand)]
    pub command: SubCmd,

    /// Path to the cluster scenario file.
    #[clap(long, short, global = true, default_value = "cluster.yaml")]
    pub cluster: PathBuf,

    /// Also write the rows of the report to this CSV file.
    #[clap(long, global = true)]
    pub csv: Option<PathBuf>,

    /// Print rows as JSON lines instead of text.
    #[clap(long, global = true)]
    pub json: bool,

    /// Cap on the nodes a single estimation may add, 0 is no limit.
    #[clap(long, global = true, default_value = "0")]
    pub max_nodes_per_estimation: usize,
}

#[derive(clap::Subcommand, Debug)]
pub enum SubCmd {
    /// List the CSINodes in the cluster.
    List,
    /// Replay a script of snapshot operations against the cluster.
    Replay {
        /// Path to the script file.
        script: PathBuf,
    },
    /// Estimate the nodes each node group needs for the pending demand.
    Estimate,
    /// Grow the best node group for the pending demand.
    ScaleUp,
}
