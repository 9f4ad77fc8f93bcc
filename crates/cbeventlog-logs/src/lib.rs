//! Event extraction for cbeventlog
//!
//! This crate runs the parser units against a resolved source, merges their output
//! into one chronological event log per node, and filters it by event category.

mod error;
mod filter;
mod merge;
mod parser;
mod pipeline;
mod runner;

pub use error::{
    FilterError, MergeError, ParserFailure, PipelineError, UnitError, UsageError,
};
pub use filter::{EventFilter, FilterMode, FilterOutcome, parse_event_list};
pub use merge::merge;
pub use parser::{
    AuditParser, BOTH_MODES, BUNDLE_ONLY, ExtractError, LineFormat, LineParser, ParserUnit,
    Registry, Rule, default_registry, parse_timestamp,
};
pub use pipeline::{NodeReport, PipelineOptions, run_node, run_nodes, validate_nodes};
pub use runner::{RunSummary, UnitArtifact, run_units};

// Re-export types used in our public API
pub use cbeventlog_source::{SourceError, Timeouts};
pub use cbeventlog_types::{Event, EventType, SourceDescriptor};
