use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::MergeError;
use crate::runner::UnitArtifact;
use cbeventlog_types::{Event, Timestamp, event_log_name};

/// One intermediate artifact, stably ordered by timestamp
struct Run {
    order: usize,
    lines: Vec<(Timestamp, String)>,
}

/// Heap entry; field order is the merge order
#[derive(PartialEq, Eq, PartialOrd, Ord)]
struct Cursor {
    timestamp: Timestamp,
    order: usize,
    position: usize,
    run: usize,
}

/// Merge a node's intermediate artifacts into `<node>_events.log`
///
/// Events come out in timestamp order; equal timestamps keep registry order, then
/// emission order within the unit. Lines are copied verbatim, so merging the same
/// inputs twice gives byte-identical output. The intermediates are deleted only
/// after the merged log is in place.
pub fn merge(
    node_name: &str,
    output_dir: &Path,
    artifacts: &[UnitArtifact],
) -> Result<PathBuf, MergeError> {
    let runs = artifacts
        .iter()
        .map(|artifact| {
            Ok(Run {
                order: artifact.order,
                lines: read_run(&artifact.path)?,
            })
        })
        .collect::<Result<Vec<_>, MergeError>>()?;

    let target = output_dir.join(event_log_name(node_name));
    let write_err = |source| MergeError::Write {
        path: target.clone(),
        source,
    };

    let staging = NamedTempFile::new_in(output_dir).map_err(write_err)?;
    let mut writer = BufWriter::new(staging);
    let written = write_merged(&runs, &mut writer).map_err(write_err)?;
    let staging = writer.into_inner().map_err(|e| write_err(e.into_error()))?;
    staging.persist(&target).map_err(|e| write_err(e.error))?;
    debug!(path = %target.display(), events = written, "Merged event log");

    for artifact in artifacts {
        if let Err(e) = fs::remove_file(&artifact.path) {
            warn!(path = %artifact.path.display(), error = %e, "Could not remove intermediate log");
        }
    }

    Ok(target)
}

fn read_run(path: &Path) -> Result<Vec<(Timestamp, String)>, MergeError> {
    let content = fs::read_to_string(path).map_err(|source| MergeError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let mut lines = Vec::new();
    for (index, line) in content.lines().enumerate() {
        if line.is_empty() {
            continue;
        }
        let event: Event = serde_json::from_str(line).map_err(|source| MergeError::Corrupt {
            path: path.to_path_buf(),
            line: index + 1,
            source,
        })?;
        lines.push((event.timestamp, line.to_string()));
    }

    // Stable: equal timestamps keep emission order
    lines.sort_by_key(|(timestamp, _)| *timestamp);
    Ok(lines)
}

/// k-way merge of sorted runs
fn write_merged(runs: &[Run], out: &mut impl Write) -> std::io::Result<usize> {
    let mut heap = BinaryHeap::with_capacity(runs.len());
    for (run, r) in runs.iter().enumerate() {
        if let Some((timestamp, _)) = r.lines.first() {
            heap.push(Reverse(Cursor {
                timestamp: *timestamp,
                order: r.order,
                position: 0,
                run,
            }));
        }
    }

    let mut written = 0;
    while let Some(Reverse(cursor)) = heap.pop() {
        let lines = &runs[cursor.run].lines;
        out.write_all(lines[cursor.position].1.as_bytes())?;
        out.write_all(b"\n")?;
        written += 1;

        let next = cursor.position + 1;
        if let Some((timestamp, _)) = lines.get(next) {
            heap.push(Reverse(Cursor {
                timestamp: *timestamp,
                position: next,
                ..cursor
            }));
        }
    }
    out.flush()?;
    Ok(written)
}
