use std::sync::LazyLock;

use chrono::DateTime;
use regex::{Captures, Regex};

use cbeventlog_source::LogFile;
use cbeventlog_types::{Event, SourceMode, Timestamp};

use super::{ExtractError, ParserUnit};

/// ns_server header: `[ns_server:info,2021-03-04T10:15:22.123Z,ns_1@10.0.0.1:<0.1.0>:mod:fun:12]message`
static NS_SERVER_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[[a-z_]+:[a-z]+,(?P<ts>[^,\]]+),[^\]]*\](?P<msg>.*)$")
        .expect("invalid ns_server header pattern")
});

/// Parse the timestamp formats Couchbase components write
pub fn parse_timestamp(s: &str) -> Option<Timestamp> {
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .ok()
}

/// How a log line carries its timestamp
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineFormat {
    /// Erlang components: bracketed header, message after `]`
    NsServer,
    /// Go and Java services: timestamp is the first token
    Prefixed,
}

impl LineFormat {
    /// Split a line into timestamp and message, `None` for continuation lines
    pub fn split<'a>(&self, line: &'a str) -> Option<(Timestamp, &'a str)> {
        match self {
            Self::NsServer => {
                let caps = NS_SERVER_HEADER.captures(line)?;
                let ts = parse_timestamp(caps.name("ts")?.as_str())?;
                Some((ts, caps.name("msg")?.as_str().trim()))
            }
            Self::Prefixed => {
                let (first, rest) = line.split_once(char::is_whitespace)?;
                let ts = parse_timestamp(first)?;
                Some((ts, rest.trim()))
            }
        }
    }
}

/// Builds an event from a matched message
pub type BuildFn = fn(Timestamp, &Captures<'_>) -> Option<Event>;

/// A message pattern and what to make of it
pub struct Rule {
    pub pattern: &'static str,
    pub build: BuildFn,
}

impl Rule {
    pub fn new(pattern: &'static str, build: BuildFn) -> Self {
        Self { pattern, build }
    }
}

/// A unit driven by a table of line rules; the first matching rule wins
pub struct LineParser {
    name: &'static str,
    log: LogFile,
    modes: &'static [SourceMode],
    format: LineFormat,
    rules: Vec<(Regex, BuildFn)>,
}

impl LineParser {
    pub fn new(
        name: &'static str,
        log: LogFile,
        modes: &'static [SourceMode],
        format: LineFormat,
        rules: Vec<Rule>,
    ) -> Self {
        let rules = rules
            .into_iter()
            .map(|rule| {
                let regex = Regex::new(rule.pattern).expect("invalid built-in rule pattern");
                (regex, rule.build)
            })
            .collect();

        Self {
            name,
            log,
            modes,
            format,
            rules,
        }
    }
}

impl ParserUnit for LineParser {
    fn name(&self) -> &'static str {
        self.name
    }

    fn log(&self) -> LogFile {
        self.log
    }

    fn supported_modes(&self) -> &'static [SourceMode] {
        self.modes
    }

    fn extract(&self, raw: &str) -> Result<Vec<Event>, ExtractError> {
        let mut events = Vec::new();
        let mut lines = 0;
        let mut recognized = 0;

        for line in raw.lines() {
            if line.trim().is_empty() {
                continue;
            }
            lines += 1;

            let Some((ts, message)) = self.format.split(line) else {
                continue;
            };
            recognized += 1;

            for (regex, build) in &self.rules {
                if let Some(caps) = regex.captures(message) {
                    if let Some(event) = build(ts, &caps) {
                        events.push(event);
                    }
                    break;
                }
            }
        }

        if lines > 0 && recognized == 0 {
            return Err(ExtractError::UnrecognizedFormat { lines });
        }
        Ok(events)
    }
}

// ============================================================================
// Capture helpers shared by the rule tables
// ============================================================================

/// Named capture, `None` when absent or empty
pub(crate) fn cap<'a>(caps: &Captures<'a>, name: &str) -> Option<&'a str> {
    caps.name(name)
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
}

/// Items of an Erlang list body such as `'ns_1@a','ns_1@b'`
pub(crate) fn erlang_list(caps: &Captures<'_>, name: &str) -> Option<Vec<String>> {
    let items: Vec<String> = cap(caps, name)?
        .split(',')
        .map(|item| item.trim().trim_matches('\'').to_string())
        .filter(|item| !item.is_empty())
        .collect();
    if items.is_empty() { None } else { Some(items) }
}
