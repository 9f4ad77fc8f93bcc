use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::{ParserFailure, UnitError};
use crate::parser::{ParserUnit, Registry};
use cbeventlog_source::SourceHandle;
use cbeventlog_types::intermediate_name;

/// Intermediate output of one successful unit
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnitArtifact {
    /// Position of the unit in the registry, the merge tie-breaker
    pub order: usize,
    pub unit: &'static str,
    pub path: PathBuf,
    pub events: usize,
}

/// Outcome of running the registry against one source
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Successful units, in registry order
    pub artifacts: Vec<UnitArtifact>,
    /// Failed units, in registry order
    pub failures: Vec<ParserFailure>,
    /// Units that do not support the source mode
    pub skipped: Vec<&'static str>,
}

/// Run every eligible unit once on a bounded pool of workers
///
/// Returns only after every spawned unit has finished. Unit failures, panics
/// included, are logged and collected; they never fail the run.
pub async fn run_units(
    source: Arc<SourceHandle>,
    registry: &Registry,
    node_name: &str,
    output_dir: &Path,
    workers: usize,
) -> RunSummary {
    let permits = Arc::new(Semaphore::new(workers.max(1)));
    let mut tasks = JoinSet::new();
    let mut summary = RunSummary::default();
    // Spawned units that have not reported back yet
    let mut pending = BTreeMap::new();

    for (order, unit) in registry.iter().enumerate() {
        if !unit.supports(source.mode()) {
            info!(unit = unit.name(), mode = %source.mode(), "Skipping parser for source mode");
            summary.skipped.push(unit.name());
            continue;
        }

        let unit = Arc::clone(unit);
        let source = Arc::clone(&source);
        let permits = Arc::clone(&permits);
        let path = output_dir.join(intermediate_name(node_name, unit.name()));
        pending.insert(order, unit.name());

        tasks.spawn(async move {
            let name = unit.name();
            let result = AssertUnwindSafe(async {
                let _permit = permits.acquire_owned().await;
                run_unit(unit.as_ref(), &source, &path).await
            })
            .catch_unwind()
            .await
            .unwrap_or(Err(UnitError::Panicked));
            (order, name, path, result)
        });
    }

    let mut failures = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        if let Ok((order, ..)) = &joined {
            pending.remove(order);
        }
        match joined {
            Ok((order, unit, path, Ok(events))) => {
                debug!(unit, events, path = %path.display(), "Parser finished");
                summary.artifacts.push(UnitArtifact {
                    order,
                    unit,
                    path,
                    events,
                });
            }
            Ok((order, unit, _, Err(error))) => {
                warn!(unit, error = %error, "Failed to run parser on log");
                failures.push((order, ParserFailure { unit, error }));
            }
            Err(e) => warn!(error = %e, "Parser task was cancelled"),
        }
    }
    failures.extend(unfinished(pending));

    summary.artifacts.sort_by_key(|a| a.order);
    failures.sort_by_key(|(order, _)| *order);
    summary.failures = failures.into_iter().map(|(_, f)| f).collect();
    summary
}

/// Failures for units whose task ended without reporting a result
fn unfinished(
    pending: BTreeMap<usize, &'static str>,
) -> impl Iterator<Item = (usize, ParserFailure)> {
    pending.into_iter().map(|(order, unit)| {
        warn!(unit, "Parser did not complete");
        (
            order,
            ParserFailure {
                unit,
                error: UnitError::Interrupted,
            },
        )
    })
}

/// Fetch, extract and persist one unit's events
async fn run_unit(
    unit: &dyn ParserUnit,
    source: &SourceHandle,
    path: &Path,
) -> Result<usize, UnitError> {
    let raw = source.fetch(&unit.log()).await?;
    let events = unit.extract(&raw)?;

    let mut body = String::new();
    for event in &events {
        body.push_str(&serde_json::to_string(event)?);
        body.push('\n');
    }

    if let Err(source) = tokio::fs::write(path, body).await {
        let _ = tokio::fs::remove_file(path).await;
        return Err(UnitError::Write {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(events.len())
}
