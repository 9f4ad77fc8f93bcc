//! Units reading the Go and Java service logs

use regex::Captures;

use cbeventlog_source::LogFile;
use cbeventlog_types::{Attribute, Event, EventType, Timestamp};

use super::BOTH_MODES;
use super::line::{LineFormat, LineParser, Rule, cap};

pub fn index() -> LineParser {
    LineParser::new(
        "index",
        LogFile::INDEXER,
        BOTH_MODES,
        LineFormat::Prefixed,
        vec![
            Rule::new(
                r"Failed to build index (?P<index>[^\s,]+) on bucket (?P<bucket>[^\s,:]+): (?P<reason>.+)$",
                |ts, c| Some(index_event(ts, c, EventType::IndexBuilt).failed().with_opt(Attribute::Reason, cap(c, "reason"))),
            ),
            Rule::new(r"Created index (?P<index>[^\s,]+) on bucket (?P<bucket>[^\s,]+)", |ts, c| {
                Some(index_event(ts, c, EventType::IndexCreated))
            }),
            Rule::new(r"Dropped index (?P<index>[^\s,]+) on bucket (?P<bucket>[^\s,]+)", |ts, c| {
                Some(index_event(ts, c, EventType::IndexDeleted))
            }),
            Rule::new(r"Built index (?P<index>[^\s,]+) on bucket (?P<bucket>[^\s,]+)", |ts, c| {
                Some(index_event(ts, c, EventType::IndexBuilt))
            }),
        ],
    )
}

fn index_event(ts: Timestamp, c: &Captures<'_>, event_type: EventType) -> Event {
    Event::new(ts, event_type)
        .with_opt(Attribute::Bucket, cap(c, "bucket"))
        .with_opt(Attribute::Index, cap(c, "index"))
}

pub fn eventing() -> LineParser {
    LineParser::new(
        "eventing",
        LogFile::EVENTING,
        BOTH_MODES,
        LineFormat::Prefixed,
        vec![
            Rule::new(
                r"Function: (?P<function>[\w.-]+) deployment failed: (?P<reason>.+)$",
                |ts, c| {
                    Some(
                        Event::new(ts, EventType::EventingFunctionDeployed)
                            .failed()
                            .with_opt(Attribute::Function, cap(c, "function"))
                            .with_opt(Attribute::Reason, cap(c, "reason")),
                    )
                },
            ),
            Rule::new(
                r"Function: (?P<function>[\w.-]+) (?P<action>deployed|undeployed|paused|resumed)\b",
                |ts, c| {
                    let event_type = match cap(c, "action")? {
                        "deployed" => EventType::EventingFunctionDeployed,
                        "undeployed" => EventType::EventingFunctionUndeployed,
                        "paused" => EventType::EventingFunctionPaused,
                        "resumed" => EventType::EventingFunctionResumed,
                        _ => return None,
                    };
                    Some(Event::new(ts, event_type).with_opt(Attribute::Function, cap(c, "function")))
                },
            ),
        ],
    )
}

pub fn fts() -> LineParser {
    LineParser::new(
        "fts",
        LogFile::FTS,
        BOTH_MODES,
        LineFormat::Prefixed,
        vec![
            Rule::new(r"index definition created, name: (?P<index>[\w.-]+)", |ts, c| {
                Some(Event::new(ts, EventType::FtsIndexCreated).with_opt(Attribute::Index, cap(c, "index")))
            }),
            Rule::new(r"index definition deleted, name: (?P<index>[\w.-]+)", |ts, c| {
                Some(Event::new(ts, EventType::FtsIndexDeleted).with_opt(Attribute::Index, cap(c, "index")))
            }),
        ],
    )
}

pub fn analytics() -> LineParser {
    LineParser::new(
        "analytics",
        LogFile::ANALYTICS,
        BOTH_MODES,
        LineFormat::Prefixed,
        vec![
            Rule::new(r"(?i)created dataset (?P<dataset>[\w.`-]+)", |ts, c| {
                Some(Event::new(ts, EventType::DatasetCreated).with_opt(Attribute::Dataset, dataset(c)))
            }),
            Rule::new(r"(?i)dropped dataset (?P<dataset>[\w.`-]+)", |ts, c| {
                Some(Event::new(ts, EventType::DatasetDropped).with_opt(Attribute::Dataset, dataset(c)))
            }),
        ],
    )
}

fn dataset(c: &Captures<'_>) -> Option<String> {
    cap(c, "dataset")
        .map(|d| d.replace('`', ""))
        .filter(|d| !d.is_empty())
}

pub fn xdcr() -> LineParser {
    LineParser::new(
        "xdcr",
        LogFile::GOXDCR,
        BOTH_MODES,
        LineFormat::Prefixed,
        vec![
            Rule::new(
                r"Creating replication - sourceBucket=(?P<source>[^,\s]+), targetClusterRef=(?P<cluster>[^,\s]+), targetBucket=(?P<target>[^,\s]+)",
                |ts, c| Some(replication_event(ts, c, EventType::XdcrReplicationCreated)),
            ),
            Rule::new(
                r"Deleting replication (?P<cluster>[^/\s]+)/(?P<source>[^/\s]+)/(?P<target>[^/\s]+)",
                |ts, c| Some(replication_event(ts, c, EventType::XdcrReplicationRemoved)),
            ),
            Rule::new(
                r"Pausing replication (?P<cluster>[^/\s]+)/(?P<source>[^/\s]+)/(?P<target>[^/\s]+)",
                |ts, c| Some(replication_event(ts, c, EventType::XdcrReplicationPaused)),
            ),
            Rule::new(
                r"Resuming replication (?P<cluster>[^/\s]+)/(?P<source>[^/\s]+)/(?P<target>[^/\s]+)",
                |ts, c| Some(replication_event(ts, c, EventType::XdcrReplicationResumed)),
            ),
        ],
    )
}

fn replication_event(ts: Timestamp, c: &Captures<'_>, event_type: EventType) -> Event {
    Event::new(ts, event_type)
        .with_opt(Attribute::SourceBucket, cap(c, "source"))
        .with_opt(Attribute::TargetBucket, cap(c, "target"))
        .with_opt(Attribute::Cluster, cap(c, "cluster"))
}

pub fn backup_service() -> LineParser {
    LineParser::new(
        "backup_service",
        LogFile::BACKUP,
        BOTH_MODES,
        LineFormat::Prefixed,
        vec![
            Rule::new(
                r"Added repository (?P<repo>\S+) with plan (?P<plan>\S+)",
                |ts, c| {
                    Some(
                        Event::new(ts, EventType::BackupRepositoryCreated)
                            .with_opt(Attribute::Repository, cap(c, "repo"))
                            .with_opt(Attribute::Plan, cap(c, "plan")),
                    )
                },
            ),
            Rule::new(r"Deleted repository (?P<repo>\S+)", |ts, c| {
                Some(
                    Event::new(ts, EventType::BackupRepositoryDeleted)
                        .with_opt(Attribute::Repository, cap(c, "repo")),
                )
            }),
            Rule::new(r"Archived repository (?P<old>\S+) as (?P<new>\S+)", |ts, c| {
                Some(
                    Event::new(ts, EventType::BackupRepositoryArchived)
                        .with_opt(Attribute::OldRepository, cap(c, "old"))
                        .with_opt(Attribute::NewRepository, cap(c, "new")),
                )
            }),
            Rule::new(r"Added plan (?P<plan>\S+)", |ts, c| {
                Some(Event::new(ts, EventType::BackupPlanCreated).with_opt(Attribute::Plan, cap(c, "plan")))
            }),
            Rule::new(r"Deleted plan (?P<plan>\S+)", |ts, c| {
                Some(Event::new(ts, EventType::BackupPlanDeleted).with_opt(Attribute::Plan, cap(c, "plan")))
            }),
            Rule::new(
                r"Running task (?P<task>\S+) of type (?P<kind>BACKUP|MERGE|RESTORE) for repository (?P<repo>\S+)",
                |ts, c| {
                    let event_type = match cap(c, "kind")? {
                        "BACKUP" => EventType::BackupStarted,
                        "MERGE" => EventType::MergeStarted,
                        "RESTORE" => EventType::RestoreStarted,
                        _ => return None,
                    };
                    Some(task_event(ts, c, event_type))
                },
            ),
            Rule::new(
                r"Task (?P<task>\S+) of type (?P<kind>BACKUP|MERGE|RESTORE) for repository (?P<repo>\S+) (?P<status>finished|failed)(?: with backup (?P<backup>[^\s:]+))?(?:: (?P<reason>.+))?$",
                |ts, c| {
                    let event_type = match cap(c, "kind")? {
                        "BACKUP" => EventType::BackupFinished,
                        "MERGE" => EventType::MergeFinished,
                        "RESTORE" => EventType::RestoreFinished,
                        _ => return None,
                    };
                    let event = task_event(ts, c, event_type)
                        .with_opt(Attribute::Backup, cap(c, "backup"))
                        .with_opt(Attribute::Reason, cap(c, "reason"));
                    Some(if cap(c, "status") == Some("failed") {
                        event.failed()
                    } else {
                        event
                    })
                },
            ),
            Rule::new(r"Removed backup (?P<backup>\S+) from repository (?P<repo>\S+)", |ts, c| {
                Some(
                    Event::new(ts, EventType::BackupRemoved)
                        .with_opt(Attribute::Backup, cap(c, "backup"))
                        .with_opt(Attribute::Repository, cap(c, "repo")),
                )
            }),
        ],
    )
}

fn task_event(ts: Timestamp, c: &Captures<'_>, event_type: EventType) -> Event {
    Event::new(ts, event_type)
        .with_opt(Attribute::Task, cap(c, "task"))
        .with_opt(Attribute::Repository, cap(c, "repo"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParserUnit;
    use pretty_assertions::assert_eq;

    const TS: &str = "2021-03-04T10:15:22.123+00:00";

    fn line(msg: &str) -> String {
        format!("{TS} {msg}\n")
    }

    #[test]
    fn test_index_events() {
        let raw = [
            line("[Info] Created index idx_name on bucket travel-sample"),
            line("[Info] Built index idx_name on bucket travel-sample"),
            line("[Error] Failed to build index idx_two on bucket travel-sample: out of memory"),
            line("[Info] Dropped index idx_name on bucket travel-sample"),
        ]
        .concat();

        let events = index().extract(&raw).unwrap();
        let kinds: Vec<_> = events.iter().map(|e| (e.event_type, e.successful)).collect();
        assert_eq!(
            kinds,
            vec![
                (EventType::IndexCreated, true),
                (EventType::IndexBuilt, true),
                (EventType::IndexBuilt, false),
                (EventType::IndexDeleted, true),
            ]
        );
        assert_eq!(events[2].text(Attribute::Reason), Some("out of memory"));
        assert_eq!(events[2].text(Attribute::Bucket), Some("travel-sample"));
    }

    #[test]
    fn test_eventing_actions() {
        let raw = [
            line("[Info] Function: enrich deployed"),
            line("[Info] Function: enrich paused"),
            line("[Error] Function: audit_fn deployment failed: compilation error"),
        ]
        .concat();

        let events = eventing().extract(&raw).unwrap();
        assert_eq!(events[0].event_type, EventType::EventingFunctionDeployed);
        assert_eq!(events[1].event_type, EventType::EventingFunctionPaused);
        assert!(!events[2].successful);
        assert_eq!(events[2].text(Attribute::Function), Some("audit_fn"));
    }

    #[test]
    fn test_fts_and_analytics() {
        let fts_events = fts()
            .extract(&line("INFO manager_api: index definition created, name: hotels"))
            .unwrap();
        assert_eq!(fts_events[0].text(Attribute::Index), Some("hotels"));

        let analytics_events = analytics()
            .extract(&line("INFO Created dataset `Default`.`airlines`"))
            .unwrap();
        assert_eq!(analytics_events[0].event_type, EventType::DatasetCreated);
        assert_eq!(analytics_events[0].text(Attribute::Dataset), Some("Default.airlines"));
    }

    #[test]
    fn test_xdcr_replication_ids() {
        let raw = [
            line("INFO GOXDCR.ReplMgr: Creating replication - sourceBucket=beer, targetClusterRef=remote, targetBucket=beer-copy"),
            line("INFO GOXDCR.ReplMgr: Pausing replication 8a7b/beer/beer-copy"),
        ]
        .concat();

        let events = xdcr().extract(&raw).unwrap();
        assert_eq!(events[0].text(Attribute::Cluster), Some("remote"));
        assert_eq!(events[0].text(Attribute::TargetBucket), Some("beer-copy"));
        assert_eq!(events[1].event_type, EventType::XdcrReplicationPaused);
        assert_eq!(events[1].text(Attribute::Cluster), Some("8a7b"));
        assert_eq!(events[1].text(Attribute::SourceBucket), Some("beer"));
    }

    #[test]
    fn test_backup_tasks() {
        let raw = [
            line("INFO (Rest) Added repository nightly with plan _daily_backups"),
            line("INFO (Runner) Running task backup-1 of type BACKUP for repository nightly"),
            line("INFO (Runner) Task backup-1 of type BACKUP for repository nightly finished with backup 2021-03-04T10_15_22"),
            line("ERROR (Runner) Task merge-1 of type MERGE for repository nightly failed: disk full"),
            line("INFO (Rest) Archived repository nightly as nightly-old"),
        ]
        .concat();

        let events = backup_service().extract(&raw).unwrap();
        assert_eq!(events.len(), 5);
        assert_eq!(events[0].text(Attribute::Plan), Some("_daily_backups"));
        assert_eq!(events[1].event_type, EventType::BackupStarted);
        assert_eq!(events[1].text(Attribute::Task), Some("backup-1"));
        assert_eq!(events[2].event_type, EventType::BackupFinished);
        assert_eq!(events[2].text(Attribute::Backup), Some("2021-03-04T10_15_22"));
        assert_eq!(events[3].event_type, EventType::MergeFinished);
        assert!(!events[3].successful);
        assert_eq!(events[3].text(Attribute::Reason), Some("disk full"));
        assert_eq!(events[4].text(Attribute::OldRepository), Some("nightly"));
        assert_eq!(events[4].text(Attribute::NewRepository), Some("nightly-old"));
    }
}
