use std::fmt::Display;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::error::ReportResult;
use crate::estimator::ScaleUpOption;
use crate::resources::{CsiNode, Meta};

/// Something that wants to hear about each row a command produces.
pub trait Reporter<R> {
    fn report(&mut self, row: &R) -> ReportResult<()>;

    fn finish(&mut self) -> ReportResult<()> {
        Ok(())
    }
}

pub struct JointReporter<R> {
    pub reporters: Vec<Box<dyn Reporter<R>>>,
}

impl<R> Reporter<R> for JointReporter<R> {
    fn report(&mut self, row: &R) -> ReportResult<()> {
        for r in &mut self.reporters {
            r.report(row)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> ReportResult<()> {
        for r in &mut self.reporters {
            r.finish()?;
        }
        Ok(())
    }
}

/// Prints rows in their human readable form.
#[derive(Debug, Default)]
pub struct StdoutReporter {
    rows: usize,
}

impl<R: Display> Reporter<R> for StdoutReporter {
    fn report(&mut self, row: &R) -> ReportResult<()> {
        println!("{}", row);
        self.rows += 1;
        Ok(())
    }

    fn finish(&mut self) -> ReportResult<()> {
        println!("Reported {} rows", self.rows);
        Ok(())
    }
}

/// Writes one JSON object per row.
pub struct JsonReporter<W: Write> {
    writer: W,
}

impl<W: Write> JsonReporter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<R: Serialize, W: Write> Reporter<R> for JsonReporter<W> {
    fn report(&mut self, row: &R) -> ReportResult<()> {
        serde_json::to_writer(&mut self.writer, row)?;
        writeln!(self.writer)?;
        Ok(())
    }

    fn finish(&mut self) -> ReportResult<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Writes rows to a CSV file, with a header taken from the row's fields.
pub struct CSVReporter {
    writer: csv::Writer<File>,
}

impl CSVReporter {
    pub fn new(path: &Path) -> ReportResult<Self> {
        Ok(Self {
            writer: csv::Writer::from_path(path)?,
        })
    }
}

impl<R: Serialize> Reporter<R> for CSVReporter {
    fn report(&mut self, row: &R) -> ReportResult<()> {
        self.writer.serialize(row)?;
        Ok(())
    }

    fn finish(&mut self) -> ReportResult<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CsiNodeRow {
    pub name: String,
    /// `driver=count` pairs separated by `;`, `-` marks an unknown attach limit.
    pub drivers: String,
}

impl From<&CsiNode> for CsiNodeRow {
    fn from(csi_node: &CsiNode) -> Self {
        let drivers = csi_node
            .spec
            .drivers
            .iter()
            .map(|d| match d.allocatable.as_ref().and_then(|a| a.count) {
                Some(count) => format!("{}={}", d.name, count),
                None => format!("{}=-", d.name),
            })
            .collect::<Vec<_>>()
            .join(";");
        Self {
            name: csi_node.name().to_owned(),
            drivers,
        }
    }
}

impl Display for CsiNodeRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{: <30} {}", self.name, self.drivers)
    }
}

/// The outcome of replaying one step of a script.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StepRow {
    pub step: usize,
    pub op: String,
    pub depth: usize,
    pub csi_nodes: usize,
    pub error: Option<String>,
}

impl Display for StepRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "step={: >4} op={: <10} depth={: >3} csi_nodes={: >5}",
            self.step, self.op, self.depth, self.csi_nodes
        )?;
        if let Some(error) = &self.error {
            write!(f, " error={:?}", error)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OptionRow {
    pub node_group: String,
    pub node_count: usize,
    pub scheduled: usize,
    pub unschedulable: usize,
}

impl From<&ScaleUpOption> for OptionRow {
    fn from(option: &ScaleUpOption) -> Self {
        Self {
            node_group: option.node_group.clone(),
            node_count: option.node_count,
            scheduled: option.scheduled.len(),
            unschedulable: option.unschedulable.len(),
        }
    }
}

impl Display for OptionRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "node_group={: <20} nodes={: >4} scheduled={: >5} unschedulable={: >5}",
            self.node_group, self.node_count, self.scheduled, self.unschedulable
        )
    }
}
