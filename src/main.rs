use std::process::ExitCode;

use clap::Parser;
use cluster_snapshot::cloudprovider::{CloudProvider, StaticCloudProvider};
use cluster_snapshot::config::{ClusterConfig, Script, ScriptOp};
use cluster_snapshot::csi::Snapshot;
use cluster_snapshot::error::SnapshotResult;
use cluster_snapshot::estimator::{ScaleUpPlanner, VolumeBinpackingEstimator};
use cluster_snapshot::report::{
    CSVReporter, CsiNodeRow, JointReporter, JsonReporter, OptionRow, Reporter, StdoutReporter,
    StepRow,
};
use serde::Serialize;
use std::fmt::Display;
use tracing::metadata::LevelFilter;
use tracing::{error, info};
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub mod opts;

type BoxError = Box<dyn std::error::Error>;

fn main() -> ExitCode {
    let opts = opts::Opts::parse();

    let log_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(fmt::layer().with_ansi(true).with_writer(std::io::stderr))
        .with(log_filter)
        .init();

    match run(opts) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "Command failed");
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn build_reporter<R>(opts: &opts::Opts) -> Result<JointReporter<R>, BoxError>
where
    R: Serialize + Display + 'static,
{
    let mut reporters: Vec<Box<dyn Reporter<R>>> = Vec::new();
    if opts.json {
        reporters.push(Box::new(JsonReporter::new(std::io::stdout())));
    } else {
        reporters.push(Box::new(StdoutReporter::default()));
    }
    if let Some(path) = &opts.csv {
        reporters.push(Box::new(CSVReporter::new(path)?));
    }
    Ok(JointReporter { reporters })
}

fn run(opts: opts::Opts) -> Result<(), BoxError> {
    let config = ClusterConfig::load(&opts.cluster)?;
    info!(
        csi_nodes = config.csi_nodes.len(),
        node_groups = config.node_groups.len(),
        pending = config.pending.len(),
        "Loaded cluster"
    );
    let mut snapshot = config.csi_snapshot();
    let estimator =
        VolumeBinpackingEstimator::default().with_max_nodes(opts.max_nodes_per_estimation);
    let planner = ScaleUpPlanner::new(estimator, &config.nodes);
    let mut provider =
        StaticCloudProvider::from_config(&config.node_groups, config.resource_limits.clone());

    match &opts.command {
        opts::SubCmd::List => {
            let mut reporter = build_reporter::<CsiNodeRow>(&opts)?;
            let mut csi_nodes = snapshot.list();
            csi_nodes.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
            for csi_node in csi_nodes {
                reporter.report(&CsiNodeRow::from(csi_node.as_ref()))?;
            }
            reporter.finish()?;
        }
        opts::SubCmd::Replay { script } => {
            let script = Script::load(script)?;
            let mut reporter = build_reporter::<StepRow>(&opts)?;
            for (step, op) in script.ops.into_iter().enumerate() {
                let row = replay(&mut snapshot, step, op);
                reporter.report(&row)?;
            }
            reporter.finish()?;
        }
        opts::SubCmd::Estimate => {
            let mut reporter = build_reporter::<OptionRow>(&opts)?;
            for option in planner.options(&provider, &mut snapshot, &config.pending)? {
                reporter.report(&OptionRow::from(&option))?;
            }
            reporter.finish()?;
        }
        opts::SubCmd::ScaleUp => {
            provider.refresh()?;
            let mut reporter = build_reporter::<OptionRow>(&opts)?;
            match planner.best_option(&provider, &mut snapshot, &config.pending)? {
                Some(option) => {
                    planner.execute(&mut provider, &option)?;
                    reporter.report(&OptionRow::from(&option))?;
                }
                None => info!("No node group can help the pending demand"),
            }
            reporter.finish()?;
            provider.cleanup()?;
        }
    }
    Ok(())
}

/// Apply a script step, keeping going after errors so they show up in the report.
fn replay(snapshot: &mut Snapshot, step: usize, op: ScriptOp) -> StepRow {
    let (name, result): (&str, SnapshotResult<()>) = match op {
        ScriptOp::Fork => {
            snapshot.fork();
            ("fork", Ok(()))
        }
        ScriptOp::Commit => {
            snapshot.commit();
            ("commit", Ok(()))
        }
        ScriptOp::Revert => {
            snapshot.revert();
            ("revert", Ok(()))
        }
        ScriptOp::Add { csi_node } => ("add", snapshot.add_csi_node(csi_node)),
        ScriptOp::AddBatch { csi_nodes } => ("addBatch", snapshot.add_csi_nodes(csi_nodes)),
        ScriptOp::Remove { name } => {
            snapshot.remove_csi_node(&name);
            ("remove", Ok(()))
        }
    };
    StepRow {
        step,
        op: name.to_owned(),
        depth: snapshot.depth(),
        csi_nodes: snapshot.list().len(),
        error: result.err().map(|e| e.to_string()),
    }
}
