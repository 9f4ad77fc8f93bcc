//! Units reading the Erlang ns_server logs

use cbeventlog_source::LogFile;
use cbeventlog_types::{Attribute, Event, EventType};

use super::BOTH_MODES;
use super::line::{LineFormat, LineParser, Rule, cap, erlang_list};

pub fn rebalance() -> LineParser {
    LineParser::new(
        "rebalance",
        LogFile::INFO,
        BOTH_MODES,
        LineFormat::NsServer,
        vec![
            Rule::new(
                r"^Starting rebalance, KeepNodes = \[(?P<keep>[^\]]*)\], EjectNodes = \[(?P<eject>[^\]]*)\](?:.*Operation Id = (?P<op>[0-9a-f-]+))?",
                |ts, c| {
                    Some(
                        Event::new(ts, EventType::RebalanceStart)
                            .with_opt(Attribute::NodesIn, erlang_list(c, "keep"))
                            .with_opt(Attribute::NodesOut, erlang_list(c, "eject"))
                            .with_opt(Attribute::OperationId, cap(c, "op")),
                    )
                },
            ),
            Rule::new(r"^Rebalance completed successfully", |ts, _| {
                Some(Event::new(ts, EventType::RebalanceFinish))
            }),
            Rule::new(r"^Rebalance exited with reason (?P<reason>.+)$", |ts, c| {
                Some(
                    Event::new(ts, EventType::RebalanceFinish)
                        .failed()
                        .with_opt(Attribute::Reason, cap(c, "reason")),
                )
            }),
            Rule::new(r"^Rebalance stopped by user", |ts, _| {
                Some(
                    Event::new(ts, EventType::RebalanceFinish)
                        .failed()
                        .with(Attribute::Reason, "stopped by user"),
                )
            }),
        ],
    )
}

pub fn failover() -> LineParser {
    LineParser::new(
        "failover",
        LogFile::INFO,
        BOTH_MODES,
        LineFormat::NsServer,
        vec![
            Rule::new(
                r"^Starting graceful failover of nodes \[(?P<nodes>[^\]]*)\](?:.*Operation Id = (?P<op>[0-9a-f-]+))?",
                |ts, c| {
                    Some(
                        Event::new(ts, EventType::GracefulFailoverStart)
                            .with_opt(Attribute::NodesOut, erlang_list(c, "nodes"))
                            .with_opt(Attribute::OperationId, cap(c, "op")),
                    )
                },
            ),
            Rule::new(
                r"^Starting failover of nodes \[(?P<nodes>[^\]]*)\](?:.*Operation Id = (?P<op>[0-9a-f-]+))?",
                |ts, c| {
                    Some(
                        Event::new(ts, EventType::FailoverStart)
                            .with_opt(Attribute::NodesOut, erlang_list(c, "nodes"))
                            .with_opt(Attribute::OperationId, cap(c, "op")),
                    )
                },
            ),
            Rule::new(r"^Failover completed successfully", |ts, _| {
                Some(Event::new(ts, EventType::FailoverEnd))
            }),
            Rule::new(r"^Failover exited with reason (?P<reason>.+)$", |ts, c| {
                Some(
                    Event::new(ts, EventType::FailoverEnd)
                        .failed()
                        .with_opt(Attribute::Reason, cap(c, "reason")),
                )
            }),
        ],
    )
}

pub fn cluster_membership() -> LineParser {
    LineParser::new(
        "cluster_membership",
        LogFile::INFO,
        BOTH_MODES,
        LineFormat::NsServer,
        vec![
            Rule::new(r"^Node '?(?P<node>[^'\s]+)'? joined cluster", |ts, c| {
                Some(Event::new(ts, EventType::NodeJoined).with_opt(Attribute::Node, cap(c, "node")))
            }),
            Rule::new(r"^Node '?(?P<node>[^'\s]+)'? left cluster", |ts, c| {
                Some(Event::new(ts, EventType::NodeLeft).with_opt(Attribute::Node, cap(c, "node")))
            }),
            Rule::new(
                r"^Node '[^']+' saw that node '(?P<node>[^']+)' went down\.(?: Details: (?P<reason>.+))?",
                |ts, c| {
                    Some(
                        Event::new(ts, EventType::NodeWentDown)
                            .with_opt(Attribute::Node, cap(c, "node"))
                            .with_opt(Attribute::Reason, cap(c, "reason")),
                    )
                },
            ),
            Rule::new(r"^Node '[^']+' saw that node '(?P<node>[^']+)' came up", |ts, c| {
                Some(Event::new(ts, EventType::NodeCameUp).with_opt(Attribute::Node, cap(c, "node")))
            }),
        ],
    )
}

pub fn bucket() -> LineParser {
    LineParser::new(
        "bucket",
        LogFile::INFO,
        BOTH_MODES,
        LineFormat::NsServer,
        vec![
            Rule::new(
                r#"^Created bucket "(?P<bucket>[^"]+)" of type: (?P<kind>\w+)"#,
                |ts, c| {
                    Some(
                        Event::new(ts, EventType::BucketCreated)
                            .with_opt(Attribute::Bucket, cap(c, "bucket"))
                            .with_opt(Attribute::BucketType, cap(c, "kind")),
                    )
                },
            ),
            Rule::new(r#"^Deleted bucket "(?P<bucket>[^"]+)""#, |ts, c| {
                Some(
                    Event::new(ts, EventType::BucketDeleted)
                        .with_opt(Attribute::Bucket, cap(c, "bucket")),
                )
            }),
            Rule::new(
                r#"^Updated bucket "(?P<bucket>[^"]+)" \(of type (?P<kind>\w+)\)"#,
                |ts, c| {
                    Some(
                        Event::new(ts, EventType::BucketUpdated)
                            .with_opt(Attribute::Bucket, cap(c, "bucket"))
                            .with_opt(Attribute::BucketType, cap(c, "kind")),
                    )
                },
            ),
            Rule::new(r#"^Flushing bucket "(?P<bucket>[^"]+)""#, |ts, c| {
                Some(
                    Event::new(ts, EventType::BucketFlushed)
                        .with_opt(Attribute::Bucket, cap(c, "bucket")),
                )
            }),
            Rule::new(
                r#"^Bucket "(?P<bucket>[^"]+)" loaded on node '(?P<node>[^']+)'"#,
                |ts, c| {
                    Some(
                        Event::new(ts, EventType::BucketLoaded)
                            .with_opt(Attribute::Bucket, cap(c, "bucket"))
                            .with_opt(Attribute::Node, cap(c, "node")),
                    )
                },
            ),
        ],
    )
}

pub fn service_crash() -> LineParser {
    LineParser::new(
        "service_crash",
        LogFile::BABYSITTER,
        BOTH_MODES,
        LineFormat::NsServer,
        vec![Rule::new(
            r"^Service '(?P<service>[^']+)' exited with status (?P<status>-?\d+)",
            |ts, c| {
                let service = cap(c, "service")?;
                let status = cap(c, "status")?;
                let event_type = if service == "memcached" {
                    EventType::MemcachedCrashed
                } else {
                    EventType::ServiceCrashed
                };
                Some(
                    Event::new(ts, event_type)
                        .failed()
                        .with(Attribute::Reason, format!("exited with status {status}"))
                        .with(Attribute::Service, service),
                )
            },
        )],
    )
}

pub fn dropped_ticks() -> LineParser {
    LineParser::new(
        "dropped_ticks",
        LogFile::DEBUG,
        BOTH_MODES,
        LineFormat::NsServer,
        vec![Rule::new(r"(?i)dropped (?P<ticks>\d+) ticks", |ts, c| {
            let ticks: i64 = cap(c, "ticks")?.parse().ok()?;
            Some(Event::new(ts, EventType::DroppedTicks).with(Attribute::DroppedTicks, ticks))
        })],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParserUnit;
    use cbeventlog_types::AttrValue;
    use pretty_assertions::assert_eq;

    fn line(ts: &str, msg: &str) -> String {
        format!("[ns_server:info,{ts},ns_1@10.0.0.1:<0.512.0>:mod:fun:100]{msg}\n")
    }

    fn list(items: &[&str]) -> AttrValue {
        AttrValue::List(items.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_rebalance_start_and_finish() {
        let raw = [
            line(
                "2021-03-04T10:00:00.000Z",
                "Starting rebalance, KeepNodes = ['ns_1@10.0.0.1','ns_1@10.0.0.2'], EjectNodes = ['ns_1@10.0.0.3'], Failed over and being ejected nodes = []; no delta recovery nodes; Operation Id = 5b6b3c0d9e",
            ),
            line("2021-03-04T10:05:00.000Z", "Rebalance completed successfully."),
            line(
                "2021-03-04T11:00:00.000Z",
                "Rebalance exited with reason {buckets_shutdown_wait_failed}",
            ),
        ]
        .concat();

        let events = rebalance().extract(&raw).unwrap();
        assert_eq!(events.len(), 3);

        assert_eq!(events[0].event_type, EventType::RebalanceStart);
        assert_eq!(
            events[0].get(Attribute::NodesIn),
            Some(&list(&["ns_1@10.0.0.1", "ns_1@10.0.0.2"]))
        );
        assert_eq!(events[0].get(Attribute::NodesOut), Some(&list(&["ns_1@10.0.0.3"])));
        assert_eq!(events[0].text(Attribute::OperationId), Some("5b6b3c0d9e"));

        assert_eq!(events[1].event_type, EventType::RebalanceFinish);
        assert!(events[1].successful);

        assert!(!events[2].successful);
        assert_eq!(
            events[2].text(Attribute::Reason),
            Some("{buckets_shutdown_wait_failed}")
        );
    }

    #[test]
    fn test_empty_eject_list_is_absent() {
        let raw = line(
            "2021-03-04T10:00:00Z",
            "Starting rebalance, KeepNodes = ['ns_1@a'], EjectNodes = [], Failed over and being ejected nodes = []",
        );
        let events = rebalance().extract(&raw).unwrap();
        assert_eq!(events[0].get(Attribute::NodesOut), None);
        assert_eq!(events[0].get(Attribute::OperationId), None);
    }

    #[test]
    fn test_failover_variants() {
        let raw = [
            line(
                "2021-03-04T10:00:00Z",
                "Starting graceful failover of nodes ['ns_1@b']. Operation Id = abc123",
            ),
            line("2021-03-04T10:01:00Z", "Starting failover of nodes ['ns_1@c']."),
            line("2021-03-04T10:02:00Z", "Failover exited with reason {failover_failed}"),
        ]
        .concat();

        let types: Vec<_> = failover()
            .extract(&raw)
            .unwrap()
            .into_iter()
            .map(|e| (e.event_type, e.successful))
            .collect();
        assert_eq!(
            types,
            vec![
                (EventType::GracefulFailoverStart, true),
                (EventType::FailoverStart, true),
                (EventType::FailoverEnd, false),
            ]
        );
    }

    #[test]
    fn test_node_went_down() {
        let raw = line(
            "2021-03-04T10:00:00Z",
            "Node 'ns_1@a' saw that node 'ns_1@b' went down. Details: [{nodedown_reason,connection_closed}]",
        );
        let events = cluster_membership().extract(&raw).unwrap();
        assert_eq!(events[0].event_type, EventType::NodeWentDown);
        assert_eq!(events[0].text(Attribute::Node), Some("ns_1@b"));
        assert_eq!(
            events[0].text(Attribute::Reason),
            Some("[{nodedown_reason,connection_closed}]")
        );
    }

    #[test]
    fn test_bucket_lifecycle() {
        let raw = [
            line(
                "2021-03-04T10:00:00Z",
                r#"Created bucket "travel-sample" of type: couchbase"#,
            ),
            "[{num_replicas,1},\n {ram_quota,104857600}]\n".to_string(),
            line("2021-03-04T10:00:05Z", r#"Bucket "travel-sample" loaded on node 'ns_1@a' in 0 seconds."#),
            line("2021-03-04T10:10:00Z", r#"Deleted bucket "travel-sample""#),
        ]
        .concat();

        let events = bucket().extract(&raw).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].text(Attribute::BucketType), Some("couchbase"));
        assert_eq!(events[1].event_type, EventType::BucketLoaded);
        assert_eq!(events[1].text(Attribute::Node), Some("ns_1@a"));
        assert_eq!(events[2].event_type, EventType::BucketDeleted);
        assert_eq!(events[2].get(Attribute::BucketType), None);
    }

    #[test]
    fn test_service_crash_distinguishes_memcached() {
        let raw = [
            line("2021-03-04T10:00:00Z", "Service 'memcached' exited with status 137. Restarting."),
            line("2021-03-04T10:00:01Z", "Service 'indexer' exited with status 2. Restarting."),
        ]
        .concat();
        let events = service_crash().extract(&raw).unwrap();
        assert_eq!(events[0].event_type, EventType::MemcachedCrashed);
        assert_eq!(events[1].event_type, EventType::ServiceCrashed);
        assert_eq!(events[1].text(Attribute::Service), Some("indexer"));
        assert_eq!(events[1].text(Attribute::Reason), Some("exited with status 2"));
        assert!(!events[1].successful);
    }

    #[test]
    fn test_dropped_ticks_count() {
        let raw = line("2021-03-04T10:00:00Z", "Dropped 12 ticks");
        let events = dropped_ticks().extract(&raw).unwrap();
        assert_eq!(events[0].get(Attribute::DroppedTicks), Some(&AttrValue::Count(12)));
    }
}
