//! REST access to a running Couchbase node

use std::time::Duration;

use reqwest::{StatusCode, Url};
use secrecy::ExposeSecret;
use tracing::debug;

use crate::catalog::LogFile;
use crate::error::SourceError;
use cbeventlog_types::Credentials;

/// Default administrative port of a Couchbase node
const DEFAULT_PORT: u16 = 8091;

/// Default administrative port over TLS
const DEFAULT_TLS_PORT: u16 = 18091;

/// Connection and request timeouts for live-node retrieval
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub request: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            request: Duration::from_secs(60),
        }
    }
}

/// Authenticated channel to one node's administrative interface
#[derive(Debug)]
pub struct LiveNode {
    client: reqwest::Client,
    base: Url,
    credentials: Credentials,
}

impl LiveNode {
    /// Build the client and make the first authenticated contact
    pub async fn connect(
        address: &str,
        credentials: Credentials,
        timeouts: Timeouts,
    ) -> Result<Self, SourceError> {
        let base = normalize_address(address)?;
        let client = reqwest::Client::builder()
            .connect_timeout(timeouts.connect)
            .timeout(timeouts.request)
            .build()
            .map_err(|e| SourceError::transport(base.as_str(), e))?;

        let node = Self {
            client,
            base,
            credentials,
        };

        let url = node.url("/whoami")?;
        debug!(%url, "Checking credentials");
        let response = node.get(&url).await?;
        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(SourceError::Unauthorized {
                url: url.to_string(),
                status: response.status().as_u16(),
            }),
            status if !status.is_success() => Err(SourceError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }),
            _ => Ok(node),
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Download one log stream
    pub async fn fetch(&self, log: &LogFile) -> Result<String, SourceError> {
        let path = log.live_path().ok_or(SourceError::NotServed {
            file: log.bundle_file,
        })?;
        let url = self.url(&path)?;
        debug!(%url, "Fetching log");

        let response = self.get(&url).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| SourceError::transport(url.as_str(), e))
    }

    fn url(&self, path: &str) -> Result<Url, SourceError> {
        self.base
            .join(path)
            .map_err(|e| SourceError::InvalidAddress {
                address: self.base.to_string(),
                reason: e.to_string(),
            })
    }

    async fn get(&self, url: &Url) -> Result<reqwest::Response, SourceError> {
        self.client
            .get(url.clone())
            .basic_auth(
                &self.credentials.username,
                Some(self.credentials.password.expose_secret()),
            )
            .send()
            .await
            .map_err(|e| SourceError::transport(url.as_str(), e))
    }
}

/// Turn a user-supplied address into a base URL
///
/// `http://` is assumed when no scheme is given and port 8091 when no port is given.
fn normalize_address(address: &str) -> Result<Url, SourceError> {
    let trimmed = address.trim().trim_end_matches('/');
    let invalid = |reason: String| SourceError::InvalidAddress {
        address: address.to_string(),
        reason,
    };

    if trimmed.is_empty() {
        return Err(invalid("address is empty".to_string()));
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    };

    let authority = with_scheme
        .split_once("://")
        .map(|(_, rest)| rest.split('/').next().unwrap_or(rest))
        .unwrap_or_default();
    let has_port = match authority.rsplit_once(':') {
        Some((_, tail)) => !tail.ends_with(']'),
        None => false,
    };

    let mut url = Url::parse(&with_scheme).map_err(|e| invalid(e.to_string()))?;
    if url.host_str().is_none() {
        return Err(invalid("address has no host".to_string()));
    }
    if !has_port {
        let port = if url.scheme() == "https" {
            DEFAULT_TLS_PORT
        } else {
            DEFAULT_PORT
        };
        url.set_port(Some(port))
            .map_err(|_| invalid("cannot set port".to_string()))?;
    }
    url.set_path("/");
    Ok(url)
}
