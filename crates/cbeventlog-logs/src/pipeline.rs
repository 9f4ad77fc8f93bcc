use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, warn};

use crate::error::{FilterError, ParserFailure, PipelineError, UsageError};
use crate::filter::{EventFilter, FilterOutcome};
use crate::merge::merge;
use crate::parser::Registry;
use crate::runner::{UnitArtifact, run_units};
use cbeventlog_source::{Timeouts, resolve};
use cbeventlog_types::{SourceDescriptor, event_log_name};

/// Settings shared by every node of one invocation
#[derive(Clone, Debug)]
pub struct PipelineOptions {
    /// Directory the event logs are written to, created if missing
    pub output_dir: PathBuf,

    /// Upper bound on concurrently running units per node
    pub workers: usize,

    pub timeouts: Timeouts,

    pub filter: Option<EventFilter>,
}

impl PipelineOptions {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            workers: 4,
            timeouts: Timeouts::default(),
            filter: None,
        }
    }
}

/// What happened while building one node's event log
#[derive(Debug)]
pub struct NodeReport {
    pub node_name: String,
    pub log_path: PathBuf,
    pub artifacts: Vec<UnitArtifact>,
    pub failures: Vec<ParserFailure>,
    pub skipped: Vec<&'static str>,
    /// Counts from the filter pass, if one ran
    pub filtered: Option<FilterOutcome>,
    /// Filter failure; the unfiltered log is still at `log_path`
    pub filter_error: Option<FilterError>,
}

impl NodeReport {
    /// Events written by the units, before filtering
    pub fn events(&self) -> usize {
        self.artifacts.iter().map(|a| a.events).sum()
    }
}

/// Reject node lists that would collide on output names
///
/// Names are compared by the file they write, so names that only differ in
/// characters replaced during sanitizing are rejected too.
pub fn validate_nodes(descriptors: &[SourceDescriptor]) -> Result<(), UsageError> {
    let mut seen: HashMap<String, &str> = HashMap::new();
    for descriptor in descriptors {
        let name = descriptor.node_name();
        if name.trim().is_empty() {
            return Err(UsageError::EmptyNodeName);
        }
        let file = event_log_name(name);
        if let Some(first) = seen.insert(file.clone(), name) {
            if first == name {
                return Err(UsageError::DuplicateNodeName(name.to_string()));
            }
            return Err(UsageError::CollidingNodeNames {
                first: first.to_string(),
                second: name.to_string(),
                file,
            });
        }
    }
    Ok(())
}

/// Resolve, run, merge and filter for a single node
pub async fn run_node(
    descriptor: &SourceDescriptor,
    registry: &Registry,
    options: &PipelineOptions,
) -> Result<NodeReport, PipelineError> {
    let node_name = descriptor.node_name().to_string();
    if node_name.trim().is_empty() {
        return Err(UsageError::EmptyNodeName.into());
    }

    info!(node = %node_name, mode = %descriptor.mode(), "Event log creation started");

    tokio::fs::create_dir_all(&options.output_dir)
        .await
        .map_err(|source| PipelineError::OutputDir {
            path: options.output_dir.clone(),
            source,
        })?;

    let source = resolve(descriptor, options.timeouts)
        .await
        .map_err(|source| PipelineError::SourceUnavailable {
            node: node_name.clone(),
            source,
        })?;

    let summary = run_units(
        Arc::new(source),
        registry,
        &node_name,
        &options.output_dir,
        options.workers,
    )
    .await;

    let log_path = {
        let node = node_name.clone();
        let dir = options.output_dir.clone();
        let artifacts = summary.artifacts.clone();
        tokio::task::spawn_blocking(move || merge(&node, &dir, &artifacts))
            .await
            .map_err(|source| PipelineError::Interrupted {
                node: node_name.clone(),
                stage: "merge",
                source,
            })?
            .map_err(|source| PipelineError::Merge {
                node: node_name.clone(),
                source,
            })?
    };

    let mut report = NodeReport {
        node_name,
        log_path,
        artifacts: summary.artifacts,
        failures: summary.failures,
        skipped: summary.skipped,
        filtered: None,
        filter_error: None,
    };

    if let Some(filter) = options.filter.clone().filter(|f| !f.is_empty()) {
        let path = report.log_path.clone();
        let result = tokio::task::spawn_blocking(move || filter.apply(&path))
            .await
            .map_err(|source| PipelineError::Interrupted {
                node: report.node_name.clone(),
                stage: "filter",
                source,
            })?;

        match result {
            Ok(outcome) => report.filtered = Some(outcome),
            Err(e) => {
                warn!(node = %report.node_name, error = %e, "Could not filter event log, leaving it unfiltered");
                report.filter_error = Some(e);
            }
        }
    }

    info!(
        node = %report.node_name,
        path = %report.log_path.display(),
        events = report.events(),
        failed_units = report.failures.len(),
        "Event log creation finished"
    );
    Ok(report)
}

/// Run the pipeline for several nodes concurrently
///
/// Results come back in the order of `descriptors`. One node failing does not
/// affect the others.
pub async fn run_nodes(
    descriptors: &[SourceDescriptor],
    registry: &Registry,
    options: &PipelineOptions,
) -> Result<Vec<Result<NodeReport, PipelineError>>, UsageError> {
    validate_nodes(descriptors)?;

    Ok(join_all(
        descriptors
            .iter()
            .map(|descriptor| run_node(descriptor, registry, options)),
    )
    .await)
}
