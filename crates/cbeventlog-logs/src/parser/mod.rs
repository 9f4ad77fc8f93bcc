//! Parser registry
//!
//! Each unit turns one raw Couchbase log into normalized events. Units are stateless
//! and independent, so the runner may invoke them concurrently.

mod audit;
mod line;
mod ns_server;
mod services;

use std::sync::Arc;

use thiserror::Error;

use cbeventlog_source::LogFile;
use cbeventlog_types::{Event, SourceMode};

pub use audit::AuditParser;
pub use line::{LineFormat, LineParser, Rule, parse_timestamp};

/// Modes served over REST and present in a bundle
pub const BOTH_MODES: &[SourceMode] = &[SourceMode::LiveNode, SourceMode::Bundle];

/// Modes for logs only found in a bundle
pub const BUNDLE_ONLY: &[SourceMode] = &[SourceMode::Bundle];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("none of the {lines} lines had a recognizable format")]
    UnrecognizedFormat { lines: usize },
}

/// An extraction routine bound to one log category
pub trait ParserUnit: Send + Sync {
    /// Stable unit name, used in intermediate artifact names and warnings
    fn name(&self) -> &'static str;

    /// The raw log this unit reads
    fn log(&self) -> LogFile;

    fn supported_modes(&self) -> &'static [SourceMode];

    /// Extract events in the order they appear in the raw log
    fn extract(&self, raw: &str) -> Result<Vec<Event>, ExtractError>;

    fn supports(&self, mode: SourceMode) -> bool {
        self.supported_modes().contains(&mode)
    }
}

/// Ordered table of parser units
pub type Registry = Vec<Arc<dyn ParserUnit>>;

/// The built-in units, in invocation order
pub fn default_registry() -> Registry {
    vec![
        Arc::new(ns_server::rebalance()),
        Arc::new(ns_server::failover()),
        Arc::new(ns_server::cluster_membership()),
        Arc::new(ns_server::bucket()),
        Arc::new(ns_server::service_crash()),
        Arc::new(ns_server::dropped_ticks()),
        Arc::new(services::index()),
        Arc::new(services::eventing()),
        Arc::new(services::fts()),
        Arc::new(services::analytics()),
        Arc::new(services::xdcr()),
        Arc::new(services::backup_service()),
        Arc::new(AuditParser),
    ]
}
