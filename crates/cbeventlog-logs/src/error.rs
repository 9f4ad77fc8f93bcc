use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::parser::ExtractError;
use cbeventlog_source::SourceError;
use cbeventlog_types::UnknownEventType;

/// Why one parser unit produced nothing
#[derive(Error, Debug)]
pub enum UnitError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error("could not serialize event: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("could not write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unit panicked")]
    Panicked,
    #[error("unit task did not complete")]
    Interrupted,
}

/// A unit failure, absorbed by the runner
#[derive(Error, Debug)]
#[error("parser '{unit}' failed: {error}")]
pub struct ParserFailure {
    pub unit: &'static str,
    #[source]
    pub error: UnitError,
}

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("could not read intermediate log {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("corrupt event at {}:{line}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("could not write event log {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Error, Debug)]
pub enum FilterError {
    #[error("could not read event log {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("corrupt event at {}:{line}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("could not write filtered log {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Invalid invocation, rejected before any stage runs
#[derive(Error, Debug, PartialEq, Eq)]
pub enum UsageError {
    #[error("cannot give both include-events and exclude-events")]
    ConflictingFilters,
    #[error(transparent)]
    UnknownEventType(#[from] UnknownEventType),
    #[error("node name must not be empty")]
    EmptyNodeName,
    #[error("node name '{0}' given more than once")]
    DuplicateNodeName(String),
    #[error("node names '{first}' and '{second}' would both write {file}")]
    CollidingNodeNames {
        first: String,
        second: String,
        file: String,
    },
    #[error("{paths} bundle paths given for {names} node names")]
    MismatchedBundles { paths: usize, names: usize },
}

/// Failure that stops log production for one node
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("source unavailable for node '{node}': {source}")]
    SourceUnavailable {
        node: String,
        #[source]
        source: SourceError,
    },
    #[error("could not prepare output directory {}: {source}", path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("merge failed for node '{node}': {source}")]
    Merge {
        node: String,
        #[source]
        source: MergeError,
    },
    #[error("{stage} for node '{node}' did not complete: {source}")]
    Interrupted {
        node: String,
        stage: &'static str,
        #[source]
        source: tokio::task::JoinError,
    },
    #[error(transparent)]
    Usage(#[from] UsageError),
}
