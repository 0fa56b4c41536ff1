use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ClientError, Result};
use crate::infra::constants::routes;

/// Which of the server's two event stream styles to listen on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    /// `<base without /api>/sse`, carries job and catalog events.
    #[default]
    Multiplexed,
    /// `<base>/jobs/listen`, carries job events only.
    Jobs,
}

impl StreamKind {
    /// Build the stream url for a configured server base url.
    pub fn url_for(&self, base_url: &str) -> Result<Url> {
        let base = base_url.trim().trim_end_matches('/');
        let raw = match self {
            Self::Multiplexed => {
                let root =
                    base.strip_suffix(routes::API_SUFFIX).unwrap_or(base);
                format!("{root}{}", routes::MULTIPLEXED_EVENTS)
            }
            Self::Jobs => format!("{base}{}", routes::JOB_EVENTS),
        };

        Url::parse(&raw).map_err(|source| ClientError::InvalidServerUrl {
            url: base_url.to_owned(),
            source,
        })
    }
}

/// A resolved event stream location plus the credentials to open it.
#[derive(Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: Url,
    bearer_token: Option<String>,
}

impl Endpoint {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            bearer_token: None,
        }
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn bearer_token(&self) -> Option<&str> {
        self.bearer_token.as_deref()
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("url", &self.url.as_str())
            .field("has_token", &self.bearer_token.is_some())
            .finish()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}
