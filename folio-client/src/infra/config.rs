use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domains::invalidation::InvalidationDelays;
use crate::domains::jobs::{DuplicateStartPolicy, ProgressSampler};
use crate::error::{ClientError, Result};
use crate::infra::constants::{defaults, jobs, millis, stream};
use crate::infra::transport::{Endpoint, StreamKind};

/// Engine settings, persisted as JSON in the user's config directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server_url: String,
    pub stream: StreamKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    pub reconnect_delay_ms: u64,
    pub completion_grace_ms: u64,
    pub progress_sampling: ProgressSampler,
    pub duplicate_start: DuplicateStartPolicy,
    pub invalidation: InvalidationDelays,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: defaults::SERVER_URL.to_string(),
            stream: StreamKind::default(),
            api_token: None,
            reconnect_delay_ms: millis(stream::RECONNECT_DELAY),
            completion_grace_ms: millis(jobs::COMPLETION_GRACE),
            progress_sampling: ProgressSampler::default(),
            duplicate_start: DuplicateStartPolicy::default(),
            invalidation: InvalidationDelays::default(),
        }
    }
}

impl ClientConfig {
    /// Defaults, then the config file, then environment overrides.
    ///
    /// A missing file is normal; an unreadable or malformed one is logged
    /// and skipped.
    pub fn load() -> Self {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => match Self::load_from(&path) {
                Ok(config) => config,
                Err(err) => {
                    log::warn!("Ignoring config file: {}", err);
                    Self::default()
                }
            },
            _ => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| {
            ClientError::ConfigRead {
                path: path.to_path_buf(),
                source,
            }
        })?;

        serde_json::from_str(&content).map_err(|source| {
            ClientError::ConfigParse {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let write_err = |source| ClientError::ConfigWrite {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let content = serde_json::to_string_pretty(self).map_err(|source| {
            ClientError::ConfigParse {
                path: path.to_path_buf(),
                source,
            }
        })?;
        std::fs::write(path, content).map_err(write_err)
    }

    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| {
            dir.join(defaults::CONFIG_DIR).join(defaults::CONFIG_FILE)
        })
    }

    /// Apply `FOLIO_SERVER_URL` / `FOLIO_API_TOKEN` style overrides.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(server_url) = lookup(defaults::SERVER_URL_ENV)
            .filter(|value| !value.trim().is_empty())
        {
            self.server_url = server_url;
        }
        if let Some(token) = lookup(defaults::API_TOKEN_ENV)
            .filter(|value| !value.trim().is_empty())
        {
            self.api_token = Some(token);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.progress_sampling.every == 0 {
            return Err(ClientError::InvalidConfig(
                "progress_sampling.every must be at least 1".into(),
            ));
        }
        if self.reconnect_delay_ms == 0 {
            return Err(ClientError::InvalidConfig(
                "reconnect_delay_ms must be greater than zero".into(),
            ));
        }
        self.endpoint().map(|_| ())
    }

    pub fn endpoint(&self) -> Result<Endpoint> {
        let endpoint = Endpoint::new(self.stream.url_for(&self.server_url)?);
        Ok(match &self.api_token {
            Some(token) => endpoint.with_bearer_token(token.clone()),
            None => endpoint,
        })
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn completion_grace(&self) -> Duration {
        Duration::from_millis(self.completion_grace_ms)
    }
}
