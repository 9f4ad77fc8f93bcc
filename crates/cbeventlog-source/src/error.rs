use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("invalid node address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },
    #[error("could not reach {url}: {source}")]
    Unreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("authentication rejected by {url} (status {status})")]
    Unauthorized { url: String, status: u16 },
    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },
    #[error("log '{file}' is not served by a live node")]
    NotServed { file: &'static str },
    #[error("bundle path {} does not exist", .0.display())]
    MissingBundle(PathBuf),
    #[error("could not extract bundle {}: {source}", path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("log '{file}' not found in bundle")]
    MissingLog { file: &'static str },
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SourceError {
    /// Classify a transport error from reqwest
    pub(crate) fn transport(url: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else {
            Self::Unreachable {
                url: url.to_string(),
                source,
            }
        }
    }
}
