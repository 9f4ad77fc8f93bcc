/// A raw Couchbase log, addressable in both source modes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LogFile {
    /// File name inside a cbcollect bundle
    pub bundle_file: &'static str,

    /// Stream name under `/sasl_logs/` on a live node, if the node serves it
    pub live_stream: Option<&'static str>,
}

impl LogFile {
    pub const INFO: LogFile = LogFile::served("ns_server.info.log", "info");
    pub const DEBUG: LogFile = LogFile::served("ns_server.debug.log", "debug");
    pub const BABYSITTER: LogFile = LogFile::served("ns_server.babysitter.log", "babysitter");
    pub const INDEXER: LogFile = LogFile::served("ns_server.indexer.log", "indexer");
    pub const EVENTING: LogFile = LogFile::served("ns_server.eventing.log", "eventing");
    pub const FTS: LogFile = LogFile::served("ns_server.fts.log", "fts");
    pub const ANALYTICS: LogFile = LogFile::served("ns_server.analytics_info.log", "analytics_info");
    pub const GOXDCR: LogFile = LogFile::served("ns_server.goxdcr.log", "goxdcr");
    pub const BACKUP: LogFile = LogFile::served("ns_server.backup_service.log", "backup_service");
    pub const AUDIT: LogFile = LogFile {
        bundle_file: "audit.log",
        live_stream: None,
    };

    const fn served(bundle_file: &'static str, live_stream: &'static str) -> Self {
        Self {
            bundle_file,
            live_stream: Some(live_stream),
        }
    }

    /// REST path of this log on a live node
    pub fn live_path(&self) -> Option<String> {
        self.live_stream.map(|stream| format!("/sasl_logs/{}", stream))
    }
}
