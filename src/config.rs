use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use cbeventlog_logs::Timeouts;

/// Settings file contents; every key is optional
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Parser units run concurrently per node
    pub workers: usize,

    pub connect_timeout_secs: u64,

    pub request_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            workers: 4,
            connect_timeout_secs: 10,
            request_timeout_secs: 60,
        }
    }
}

impl Settings {
    /// Load settings from a TOML file, or the defaults when no file is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        let settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse settings file {}", path.display()))?;
        debug!(path = %path.display(), ?settings, "Loaded settings");
        Ok(settings)
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            connect: Duration::from_secs(self.connect_timeout_secs),
            request: Duration::from_secs(self.request_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_defaults_without_file() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.timeouts(), Timeouts::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cbeventlog.toml");
        fs::write(&path, "workers = 8\nrequest_timeout_secs = 5\n").unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.workers, 8);
        assert_eq!(settings.connect_timeout_secs, 10);
        assert_eq!(settings.timeouts().request, Duration::from_secs(5));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cbeventlog.toml");
        fs::write(&path, "wrokers = 8\n").unwrap();

        let err = Settings::load(Some(&path)).unwrap_err();
        assert!(format!("{err:#}").contains("wrokers"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Settings::load(Some(&dir.path().join("absent.toml"))).is_err());
    }
}
