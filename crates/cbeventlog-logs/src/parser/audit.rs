//! User actions recorded in the audit log

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use cbeventlog_source::LogFile;
use cbeventlog_types::{Attribute, Event, EventType, SourceMode};

use super::{BUNDLE_ONLY, ExtractError, ParserUnit, parse_timestamp};

/// Envelope fields that are not part of a settings change
const ENVELOPE: &[&str] = &["id", "description", "local", "remote", "sessionid"];

#[derive(Debug, Deserialize)]
struct Identity {
    user: String,
}

#[derive(Debug, Deserialize)]
struct AuditRecord {
    timestamp: String,
    name: String,
    #[serde(default)]
    real_userid: Option<Identity>,
    #[serde(default)]
    identity: Option<Identity>,
    #[serde(default)]
    groups: Option<Vec<String>>,
    #[serde(default)]
    group_name: Option<String>,
    #[serde(flatten)]
    rest: BTreeMap<String, Value>,
}

/// Reads the JSON-lines audit log, only present in a bundle
pub struct AuditParser;

impl AuditParser {
    fn to_event(record: AuditRecord) -> Option<Event> {
        let ts = parse_timestamp(&record.timestamp)?;
        let target = record.identity.map(|i| i.user);
        let actor = record.real_userid.map(|i| i.user);

        let event = match record.name.as_str() {
            "set user" => Event::new(ts, EventType::UserAdded)
                .with_opt(Attribute::User, target)
                .with_opt(Attribute::Groups, record.groups.filter(|g| !g.is_empty())),
            "delete user" => Event::new(ts, EventType::UserDeleted).with_opt(Attribute::User, target),
            "set group" => Event::new(ts, EventType::GroupAdded)
                .with_opt(Attribute::Group, record.group_name)
                .with_opt(Attribute::User, actor),
            "delete group" => Event::new(ts, EventType::GroupDeleted)
                .with_opt(Attribute::Group, record.group_name)
                .with_opt(Attribute::User, actor),
            name if name.ends_with("settings") => {
                let mut settings: BTreeMap<String, String> = record
                    .rest
                    .into_iter()
                    .filter(|(key, _)| !ENVELOPE.contains(&key.as_str()))
                    .map(|(key, value)| (key, setting_value(value)))
                    .collect();
                settings.insert("name".to_string(), record.name.clone());
                Event::new(ts, EventType::SettingsChanged)
                    .with_opt(Attribute::User, actor)
                    .with(Attribute::Settings, settings)
            }
            _ => return None,
        };
        Some(event)
    }
}

fn setting_value(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

impl ParserUnit for AuditParser {
    fn name(&self) -> &'static str {
        "user_actions"
    }

    fn log(&self) -> LogFile {
        LogFile::AUDIT
    }

    fn supported_modes(&self) -> &'static [SourceMode] {
        BUNDLE_ONLY
    }

    fn extract(&self, raw: &str) -> Result<Vec<Event>, ExtractError> {
        let mut events = Vec::new();
        let mut lines = 0;
        let mut recognized = 0;

        for (number, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            lines += 1;

            match serde_json::from_str::<AuditRecord>(line) {
                Ok(record) => {
                    recognized += 1;
                    events.extend(Self::to_event(record));
                }
                Err(e) => debug!(line = number + 1, error = %e, "Skipping audit record"),
            }
        }

        if lines > 0 && recognized == 0 {
            return Err(ExtractError::UnrecognizedFormat { lines });
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cbeventlog_types::AttrValue;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_user_and_group_actions() {
        let raw = r#"{"timestamp":"2021-03-04T10:00:00.000Z","id":8232,"name":"set user","real_userid":{"domain":"builtin","user":"Administrator"},"identity":{"domain":"local","user":"alice"},"groups":["ops","dev"]}
{"timestamp":"2021-03-04T10:01:00.000Z","id":8194,"name":"delete user","identity":{"domain":"local","user":"bob"}}
not json at all
{"timestamp":"2021-03-04T10:02:00.000Z","id":8244,"name":"set group","group_name":"ops","real_userid":{"domain":"builtin","user":"Administrator"}}
{"timestamp":"2021-03-04T10:03:00.000Z","id":8263,"name":"login success","real_userid":{"domain":"builtin","user":"Administrator"}}
"#;

        let events = AuditParser.extract(raw).unwrap();
        assert_eq!(events.len(), 3);

        assert_eq!(events[0].event_type, EventType::UserAdded);
        assert_eq!(events[0].text(Attribute::User), Some("alice"));
        assert_eq!(
            events[0].get(Attribute::Groups),
            Some(&AttrValue::List(vec!["ops".to_string(), "dev".to_string()]))
        );
        assert_eq!(events[1].event_type, EventType::UserDeleted);
        assert_eq!(events[2].event_type, EventType::GroupAdded);
        assert_eq!(events[2].text(Attribute::Group), Some("ops"));
        assert_eq!(events[2].text(Attribute::User), Some("Administrator"));
    }

    #[test]
    fn test_settings_change_collects_payload() {
        let raw = r#"{"timestamp":"2021-03-04T10:00:00.000Z","id":8209,"name":"modify compaction settings","description":"Auto compaction settings were modified","real_userid":{"domain":"builtin","user":"Administrator"},"parallel_db_and_view_compaction":false,"database_fragmentation_threshold":{"percentage":30}}"#;

        let events = AuditParser.extract(raw).unwrap();
        let Some(AttrValue::Map(settings)) = events[0].get(Attribute::Settings) else {
            panic!("settings missing");
        };
        assert_eq!(settings["parallel_db_and_view_compaction"], "false");
        assert_eq!(settings["database_fragmentation_threshold"], r#"{"percentage":30}"#);
        assert_eq!(settings["name"], "modify compaction settings");
        assert!(!settings.contains_key("description"));
        assert!(!settings.contains_key("id"));
    }

    #[test]
    fn test_non_json_log_is_a_failure() {
        assert_eq!(
            AuditParser.extract("garbage\n"),
            Err(ExtractError::UnrecognizedFormat { lines: 1 })
        );
    }
}
