use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::Deserialize;
use tempfile::NamedTempFile;

use crate::error::{FilterError, UsageError};
use cbeventlog_types::EventType;

/// Whether listed categories are kept or dropped
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterMode {
    Include,
    Exclude,
}

/// Post-merge filter over event categories
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventFilter {
    /// Categories named by the caller (empty = no-op)
    event_types: HashSet<EventType>,

    mode: FilterMode,
}

/// Counts from one filter pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FilterOutcome {
    pub kept: usize,
    pub dropped: usize,
}

/// Only the field the filter needs
#[derive(Deserialize)]
struct Category {
    event_type: EventType,
}

impl EventFilter {
    pub fn include(event_types: HashSet<EventType>) -> Self {
        Self {
            event_types,
            mode: FilterMode::Include,
        }
    }

    pub fn exclude(event_types: HashSet<EventType>) -> Self {
        Self {
            event_types,
            mode: FilterMode::Exclude,
        }
    }

    /// Build a filter from the raw include/exclude options
    ///
    /// Blank lists count as absent. Giving both lists is a usage error.
    pub fn from_lists(
        include: Option<&str>,
        exclude: Option<&str>,
    ) -> Result<Option<Self>, UsageError> {
        let include = include.filter(|s| !s.trim().is_empty());
        let exclude = exclude.filter(|s| !s.trim().is_empty());

        match (include, exclude) {
            (Some(_), Some(_)) => Err(UsageError::ConflictingFilters),
            (Some(list), None) => Ok(Some(Self::include(parse_event_list(list)?))),
            (None, Some(list)) => Ok(Some(Self::exclude(parse_event_list(list)?))),
            (None, None) => Ok(None),
        }
    }

    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    pub fn event_types(&self) -> &HashSet<EventType> {
        &self.event_types
    }

    /// Check if filter is empty (leaves the log untouched)
    pub fn is_empty(&self) -> bool {
        self.event_types.is_empty()
    }

    /// Check if an event of this category survives the filter
    pub fn matches(&self, event_type: EventType) -> bool {
        if self.is_empty() {
            return true;
        }
        let listed = self.event_types.contains(&event_type);
        match self.mode {
            FilterMode::Include => listed,
            FilterMode::Exclude => !listed,
        }
    }

    /// Rewrite an event log in place, keeping matching lines in their order
    ///
    /// The result is staged next to the log and renamed over it, so on failure the
    /// unfiltered log is left as it was.
    pub fn apply(&self, log_path: &Path) -> Result<FilterOutcome, FilterError> {
        if self.is_empty() {
            return Ok(FilterOutcome::default());
        }

        let read_err = |source| FilterError::Read {
            path: log_path.to_path_buf(),
            source,
        };
        let write_err = |source| FilterError::Write {
            path: log_path.to_path_buf(),
            source,
        };

        let reader = BufReader::new(File::open(log_path).map_err(read_err)?);
        let dir = log_path.parent().unwrap_or_else(|| Path::new("."));
        let mut writer = BufWriter::new(NamedTempFile::new_in(dir).map_err(write_err)?);
        let mut outcome = FilterOutcome::default();

        for (index, line) in reader.lines().enumerate() {
            let line = line.map_err(read_err)?;
            if line.is_empty() {
                continue;
            }
            let category: Category =
                serde_json::from_str(&line).map_err(|source| FilterError::Corrupt {
                    path: log_path.to_path_buf(),
                    line: index + 1,
                    source,
                })?;

            if self.matches(category.event_type) {
                writer.write_all(line.as_bytes()).map_err(write_err)?;
                writer.write_all(b"\n").map_err(write_err)?;
                outcome.kept += 1;
            } else {
                outcome.dropped += 1;
            }
        }

        writer.flush().map_err(write_err)?;
        let staging = writer.into_inner().map_err(|e| write_err(e.into_error()))?;
        staging.persist(log_path).map_err(|e| write_err(e.error))?;
        Ok(outcome)
    }
}

/// Parse a comma separated list of event type names
pub fn parse_event_list(list: &str) -> Result<HashSet<EventType>, UsageError> {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| name.parse::<EventType>().map_err(UsageError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cbeventlog_types::UnknownEventType;
    use pretty_assertions::assert_eq;
    use std::fs;

    const LOG: &str = concat!(
        r#"{"timestamp":"1970-01-01T00:00:10+00:00","event_type":"rebalance_start","successful":true}"#,
        "\n",
        r#"{"timestamp":"1970-01-01T00:00:20+00:00","event_type":"backup_started","successful":true,"backup_repository":"r"}"#,
        "\n",
        r#"{"timestamp":"1970-01-01T00:00:30+00:00","event_type":"rebalance_finish","successful":true}"#,
        "\n",
    );

    fn set(types: &[EventType]) -> HashSet<EventType> {
        types.iter().copied().collect()
    }

    fn log_file() -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node1_events.log");
        fs::write(&path, LOG).unwrap();
        (dir, path)
    }

    fn types_in(path: &Path) -> Vec<EventType> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str::<Category>(l).unwrap().event_type)
            .collect()
    }

    #[test]
    fn test_include_keeps_listed_in_order() {
        let (_dir, path) = log_file();
        let filter = EventFilter::include(set(&[EventType::RebalanceStart, EventType::RebalanceFinish]));

        let outcome = filter.apply(&path).unwrap();
        assert_eq!(outcome, FilterOutcome { kept: 2, dropped: 1 });
        assert_eq!(
            types_in(&path),
            vec![EventType::RebalanceStart, EventType::RebalanceFinish]
        );
    }

    #[test]
    fn test_exclude_drops_listed() {
        let (_dir, path) = log_file();
        let filter = EventFilter::exclude(set(&[EventType::RebalanceStart]));

        filter.apply(&path).unwrap();
        assert_eq!(
            types_in(&path),
            vec![EventType::BackupStarted, EventType::RebalanceFinish]
        );
        // surviving lines are untouched
        assert_eq!(fs::read_to_string(&path).unwrap(), LOG.lines().skip(1).map(|l| format!("{l}\n")).collect::<String>());
    }

    #[test]
    fn test_empty_set_is_a_no_op() {
        let (_dir, path) = log_file();
        for filter in [EventFilter::include(HashSet::new()), EventFilter::exclude(HashSet::new())] {
            assert_eq!(filter.apply(&path).unwrap(), FilterOutcome::default());
            assert_eq!(fs::read_to_string(&path).unwrap(), LOG);
        }
    }

    #[test]
    fn test_corrupt_log_is_left_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node1_events.log");
        let content = format!("{}garbage\n", LOG);
        fs::write(&path, &content).unwrap();

        let filter = EventFilter::include(set(&[EventType::RebalanceStart]));
        let err = filter.apply(&path).unwrap_err();
        assert!(matches!(err, FilterError::Corrupt { line: 4, .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), content);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_from_lists() {
        assert_eq!(
            EventFilter::from_lists(Some("rebalance_start"), Some("backup_started")),
            Err(UsageError::ConflictingFilters)
        );
        assert_eq!(EventFilter::from_lists(None, Some("  ")), Ok(None));
        assert_eq!(
            EventFilter::from_lists(Some("rebalance_start, Backup_Started,"), None),
            Ok(Some(EventFilter::include(set(&[
                EventType::RebalanceStart,
                EventType::BackupStarted
            ]))))
        );
        assert_eq!(
            EventFilter::from_lists(None, Some("rebalance_start,bogus")),
            Err(UsageError::UnknownEventType(UnknownEventType("bogus".to_string())))
        );
    }

    #[test]
    fn test_matches() {
        let include = EventFilter::include(set(&[EventType::UserAdded]));
        assert!(include.matches(EventType::UserAdded));
        assert!(!include.matches(EventType::UserDeleted));

        let exclude = EventFilter::exclude(set(&[EventType::UserAdded]));
        assert!(!exclude.matches(EventType::UserAdded));
        assert!(exclude.matches(EventType::UserDeleted));
    }
}
