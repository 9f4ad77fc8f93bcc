//! Raw log access for cbeventlog
//!
//! This crate resolves a source descriptor into a handle that can pull raw Couchbase
//! log files, either over the REST interface of a live node or out of a cbcollect
//! bundle.

mod bundle;
mod catalog;
mod error;
mod live;

pub use bundle::Bundle;
pub use catalog::LogFile;
pub use error::SourceError;
pub use live::{LiveNode, Timeouts};

// Re-export types that are used in our public API
pub use cbeventlog_types::{Credentials, SourceDescriptor, SourceMode};

use tracing::info;

/// Handle to the raw log material of one node
#[derive(Debug)]
pub enum SourceHandle {
    Live(LiveNode),
    Bundle(Bundle),
}

impl SourceHandle {
    pub fn mode(&self) -> SourceMode {
        match self {
            Self::Live(_) => SourceMode::LiveNode,
            Self::Bundle(_) => SourceMode::Bundle,
        }
    }

    /// Pull the raw text of one log file
    pub async fn fetch(&self, log: &LogFile) -> Result<String, SourceError> {
        match self {
            Self::Live(node) => node.fetch(log).await,
            Self::Bundle(bundle) => bundle.fetch(log).await,
        }
    }
}

/// Resolve a descriptor into a usable handle
///
/// This is the only step where a failure is fatal for the node: nothing can be
/// extracted without a source.
pub async fn resolve(
    descriptor: &SourceDescriptor,
    timeouts: Timeouts,
) -> Result<SourceHandle, SourceError> {
    match descriptor {
        SourceDescriptor::LiveNode {
            address,
            credentials,
            node_name,
        } => {
            let node = LiveNode::connect(address, credentials.clone(), timeouts).await?;
            info!(node = %node_name, address = %node.base_url(), "Connected to live node");
            Ok(SourceHandle::Live(node))
        }
        SourceDescriptor::Bundle {
            archive_path,
            node_name,
        } => {
            let bundle = Bundle::open(archive_path).await?;
            info!(node = %node_name, root = %bundle.root().display(), "Opened cbcollect bundle");
            Ok(SourceHandle::Bundle(bundle))
        }
    }
}
