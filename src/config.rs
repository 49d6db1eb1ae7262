//! Configuration chargée depuis un fichier TOML.
//!
//! Tous les champs sont optionnels; les valeurs absentes reprennent
//! `DownloadOptions::default()`.
//!
//! ```toml
//! max_workers = 16
//! chunk_size = 1048576
//! retries = 5
//! timeout_secs = 60
//! backoff_ms = 250
//! verify = true
//! ```
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::downloader::DownloadOptions;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("lecture de {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("analyse de {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub max_workers: Option<usize>,
    pub chunk_size: Option<u64>,
    pub retries: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub backoff_ms: Option<u64>,
    pub verify: Option<bool>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Les champs de `other` remplacent ceux de `self` lorsqu'ils sont renseignés.
    pub fn merge(self, other: Config) -> Config {
        Config {
            max_workers: other.max_workers.or(self.max_workers),
            chunk_size: other.chunk_size.or(self.chunk_size),
            retries: other.retries.or(self.retries),
            timeout_secs: other.timeout_secs.or(self.timeout_secs),
            backoff_ms: other.backoff_ms.or(self.backoff_ms),
            verify: other.verify.or(self.verify),
        }
    }

    pub fn to_options(&self) -> DownloadOptions {
        let defaults = DownloadOptions::default();
        DownloadOptions {
            max_workers: self.max_workers.unwrap_or(defaults.max_workers),
            chunk_size: self.chunk_size.unwrap_or(defaults.chunk_size),
            retries: self.retries.unwrap_or(defaults.retries),
            request_timeout: self
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            retry_backoff: self
                .backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_backoff),
            verify_digest: self.verify.unwrap_or(defaults.verify_digest),
        }
    }
}
