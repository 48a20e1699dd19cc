//! Configuration for the registry client.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

/// Default registry endpoint, including the API prefix.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:50001/api";

/// Configuration for the [`RegistryClient`](crate::RegistryClient).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Base URL the resource paths are appended to.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Timeout for a single request.
    #[serde(with = "duration_secs", default = "default_timeout")]
    pub timeout: Duration,

    /// Extra attempts after a transport failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout: default_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl RegistryConfig {
    /// Create a config for the given endpoint.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Set the timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry budget for transport failures.
    #[must_use]
    pub const fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Overlay environment variables onto this config.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("CFP_API_URL") {
            self.endpoint = url;
        }

        if let Some(secs) = std::env::var("CFP_API_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            self.timeout = Duration::from_secs(secs);
        }
    }

    /// Parse and check the endpoint.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if the endpoint is not an absolute http(s) URL.
    pub fn endpoint_url(&self) -> Result<Url> {
        let url = Url::parse(&self.endpoint)
            .map_err(|e| Error::invalid_request(format!("invalid endpoint '{}': {e}", self.endpoint)))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(Error::invalid_request(format!(
                "unsupported endpoint scheme '{scheme}'"
            ))),
        }
    }
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

const fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

const fn default_max_retries() -> u32 {
    2
}

/// Serialization helper for Duration as seconds.
pub(crate) mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
