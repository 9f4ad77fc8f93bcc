//! Shared types for cbeventlog
//!
//! This crate contains the event model and source descriptors used across the
//! cbeventlog crates.

use chrono::{DateTime, FixedOffset};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Event Types
// ============================================================================

/// Timestamp as written by the source, offset included
pub type Timestamp = DateTime<FixedOffset>;

/// Category of a normalized event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    RebalanceStart,
    RebalanceFinish,
    FailoverStart,
    GracefulFailoverStart,
    FailoverEnd,
    NodeJoined,
    NodeLeft,
    NodeWentDown,
    NodeCameUp,
    BucketCreated,
    BucketDeleted,
    BucketUpdated,
    BucketFlushed,
    BucketLoaded,
    ServiceCrashed,
    MemcachedCrashed,
    DroppedTicks,
    IndexCreated,
    IndexDeleted,
    IndexBuilt,
    EventingFunctionDeployed,
    EventingFunctionUndeployed,
    EventingFunctionPaused,
    EventingFunctionResumed,
    FtsIndexCreated,
    FtsIndexDeleted,
    DatasetCreated,
    DatasetDropped,
    XdcrReplicationCreated,
    XdcrReplicationRemoved,
    XdcrReplicationPaused,
    XdcrReplicationResumed,
    BackupRepositoryCreated,
    BackupRepositoryDeleted,
    BackupRepositoryArchived,
    BackupPlanCreated,
    BackupPlanDeleted,
    BackupStarted,
    BackupFinished,
    BackupRemoved,
    MergeStarted,
    MergeFinished,
    RestoreStarted,
    RestoreFinished,
    UserAdded,
    UserDeleted,
    GroupAdded,
    GroupDeleted,
    SettingsChanged,
}

impl EventType {
    /// Every category, in declaration order
    pub const ALL: [EventType; 49] = [
        Self::RebalanceStart,
        Self::RebalanceFinish,
        Self::FailoverStart,
        Self::GracefulFailoverStart,
        Self::FailoverEnd,
        Self::NodeJoined,
        Self::NodeLeft,
        Self::NodeWentDown,
        Self::NodeCameUp,
        Self::BucketCreated,
        Self::BucketDeleted,
        Self::BucketUpdated,
        Self::BucketFlushed,
        Self::BucketLoaded,
        Self::ServiceCrashed,
        Self::MemcachedCrashed,
        Self::DroppedTicks,
        Self::IndexCreated,
        Self::IndexDeleted,
        Self::IndexBuilt,
        Self::EventingFunctionDeployed,
        Self::EventingFunctionUndeployed,
        Self::EventingFunctionPaused,
        Self::EventingFunctionResumed,
        Self::FtsIndexCreated,
        Self::FtsIndexDeleted,
        Self::DatasetCreated,
        Self::DatasetDropped,
        Self::XdcrReplicationCreated,
        Self::XdcrReplicationRemoved,
        Self::XdcrReplicationPaused,
        Self::XdcrReplicationResumed,
        Self::BackupRepositoryCreated,
        Self::BackupRepositoryDeleted,
        Self::BackupRepositoryArchived,
        Self::BackupPlanCreated,
        Self::BackupPlanDeleted,
        Self::BackupStarted,
        Self::BackupFinished,
        Self::BackupRemoved,
        Self::MergeStarted,
        Self::MergeFinished,
        Self::RestoreStarted,
        Self::RestoreFinished,
        Self::UserAdded,
        Self::UserDeleted,
        Self::GroupAdded,
        Self::GroupDeleted,
        Self::SettingsChanged,
    ];

    /// Wire name, identical to the serialized form
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RebalanceStart => "rebalance_start",
            Self::RebalanceFinish => "rebalance_finish",
            Self::FailoverStart => "failover_start",
            Self::GracefulFailoverStart => "graceful_failover_start",
            Self::FailoverEnd => "failover_end",
            Self::NodeJoined => "node_joined",
            Self::NodeLeft => "node_left",
            Self::NodeWentDown => "node_went_down",
            Self::NodeCameUp => "node_came_up",
            Self::BucketCreated => "bucket_created",
            Self::BucketDeleted => "bucket_deleted",
            Self::BucketUpdated => "bucket_updated",
            Self::BucketFlushed => "bucket_flushed",
            Self::BucketLoaded => "bucket_loaded",
            Self::ServiceCrashed => "service_crashed",
            Self::MemcachedCrashed => "memcached_crashed",
            Self::DroppedTicks => "dropped_ticks",
            Self::IndexCreated => "index_created",
            Self::IndexDeleted => "index_deleted",
            Self::IndexBuilt => "index_built",
            Self::EventingFunctionDeployed => "eventing_function_deployed",
            Self::EventingFunctionUndeployed => "eventing_function_undeployed",
            Self::EventingFunctionPaused => "eventing_function_paused",
            Self::EventingFunctionResumed => "eventing_function_resumed",
            Self::FtsIndexCreated => "fts_index_created",
            Self::FtsIndexDeleted => "fts_index_deleted",
            Self::DatasetCreated => "dataset_created",
            Self::DatasetDropped => "dataset_dropped",
            Self::XdcrReplicationCreated => "xdcr_replication_created",
            Self::XdcrReplicationRemoved => "xdcr_replication_removed",
            Self::XdcrReplicationPaused => "xdcr_replication_paused",
            Self::XdcrReplicationResumed => "xdcr_replication_resumed",
            Self::BackupRepositoryCreated => "backup_repository_created",
            Self::BackupRepositoryDeleted => "backup_repository_deleted",
            Self::BackupRepositoryArchived => "backup_repository_archived",
            Self::BackupPlanCreated => "backup_plan_created",
            Self::BackupPlanDeleted => "backup_plan_deleted",
            Self::BackupStarted => "backup_started",
            Self::BackupFinished => "backup_finished",
            Self::BackupRemoved => "backup_removed",
            Self::MergeStarted => "merge_started",
            Self::MergeFinished => "merge_finished",
            Self::RestoreStarted => "restore_started",
            Self::RestoreFinished => "restore_finished",
            Self::UserAdded => "user_added",
            Self::UserDeleted => "user_deleted",
            Self::GroupAdded => "group_added",
            Self::GroupDeleted => "group_deleted",
            Self::SettingsChanged => "settings_changed",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a name does not match any event category
#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[error("unknown event type '{0}'")]
pub struct UnknownEventType(pub String);

impl FromStr for EventType {
    type Err = UnknownEventType;

    /// Case-insensitive, surrounding whitespace ignored
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| UnknownEventType(s.trim().to_string()))
    }
}

/// Named, category-dependent attributes an event may carry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    Bucket,
    BucketType,
    Node,
    Service,
    Dataset,
    Index,
    Function,
    #[serde(rename = "task_name")]
    Task,
    Group,
    Groups,
    SourceBucket,
    TargetBucket,
    Cluster,
    DroppedTicks,
    Reason,
    NodesIn,
    NodesOut,
    #[serde(rename = "backup_repository")]
    Repository,
    #[serde(rename = "backup_name")]
    Backup,
    User,
    PercentDataLost,
    Plan,
    OldRepository,
    NewRepository,
    OperationId,
    Settings,
}

/// Value of an event attribute
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Count(i64),
    Text(String),
    List(Vec<String>),
    Map(BTreeMap<String, String>),
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for AttrValue {
    fn from(n: i64) -> Self {
        Self::Count(n)
    }
}

impl From<Vec<String>> for AttrValue {
    fn from(items: Vec<String>) -> Self {
        Self::List(items)
    }
}

impl From<BTreeMap<String, String>> for AttrValue {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self::Map(map)
    }
}

/// A single normalized event
///
/// Serialized as one JSON object: `timestamp`, `event_type`, `successful`, then the
/// present attributes flattened in `Attribute` order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: Timestamp,
    pub event_type: EventType,
    pub successful: bool,
    #[serde(flatten)]
    pub attributes: BTreeMap<Attribute, AttrValue>,
}

impl Event {
    /// Create a successful event with no attributes
    pub fn new(timestamp: Timestamp, event_type: EventType) -> Self {
        Self {
            timestamp,
            event_type,
            successful: true,
            attributes: BTreeMap::new(),
        }
    }

    /// Attach an attribute
    pub fn with(mut self, attribute: Attribute, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(attribute, value.into());
        self
    }

    /// Attach an attribute only when a value is present
    pub fn with_opt<V: Into<AttrValue>>(self, attribute: Attribute, value: Option<V>) -> Self {
        match value {
            Some(value) => self.with(attribute, value),
            None => self,
        }
    }

    /// Mark the event as a failure
    pub fn failed(mut self) -> Self {
        self.successful = false;
        self
    }

    pub fn get(&self, attribute: Attribute) -> Option<&AttrValue> {
        self.attributes.get(&attribute)
    }

    /// Text value of an attribute, if it holds text
    pub fn text(&self, attribute: Attribute) -> Option<&str> {
        match self.attributes.get(&attribute) {
            Some(AttrValue::Text(s)) => Some(s),
            _ => None,
        }
    }
}

// ============================================================================
// Source Types
// ============================================================================

/// Where raw log material comes from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SourceMode {
    LiveNode,
    Bundle,
}

impl SourceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LiveNode => "live-node",
            Self::Bundle => "bundle",
        }
    }
}

impl fmt::Display for SourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cluster credentials for live-node mode
#[derive(Clone, Debug)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::new(password.into()),
        }
    }
}

/// Resolved description of one node's raw log material
#[derive(Clone, Debug)]
pub enum SourceDescriptor {
    LiveNode {
        address: String,
        node_name: String,
        credentials: Credentials,
    },
    Bundle {
        archive_path: PathBuf,
        node_name: String,
    },
}

impl SourceDescriptor {
    /// Caller-supplied label the output artifact is named after
    pub fn node_name(&self) -> &str {
        match self {
            Self::LiveNode { node_name, .. } | Self::Bundle { node_name, .. } => node_name,
        }
    }

    pub fn mode(&self) -> SourceMode {
        match self {
            Self::LiveNode { .. } => SourceMode::LiveNode,
            Self::Bundle { .. } => SourceMode::Bundle,
        }
    }
}

// ============================================================================
// Artifact Naming
// ============================================================================

/// File-name-safe form of a node name
///
/// Anything outside `[A-Za-z0-9._@-]` becomes `_`.
pub fn artifact_stem(node_name: &str) -> String {
    node_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '@' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// File name of a node's merged event log
pub fn event_log_name(node_name: &str) -> String {
    format!("{}_events.log", artifact_stem(node_name))
}

/// File name of one unit's intermediate output for a node
pub fn intermediate_name(node_name: &str, unit: &str) -> String {
    format!("{}_{}.events.part", artifact_stem(node_name), unit)
}
