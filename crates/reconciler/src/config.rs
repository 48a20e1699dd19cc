//! Controller runtime configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration shared by the Speaker and Proposal controllers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Field owner recorded on every status patch.
    #[serde(default = "default_controller_name")]
    pub controller_name: String,

    /// Concurrent workers per controller.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Interval between full relists.
    #[serde(with = "duration_secs", default = "default_resync_interval")]
    pub resync_interval: Duration,

    /// First failure backoff.
    #[serde(with = "duration_millis", default = "default_backoff_base")]
    pub backoff_base: Duration,

    /// Backoff ceiling.
    #[serde(with = "duration_millis", default = "default_backoff_max")]
    pub backoff_max: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            controller_name: default_controller_name(),
            workers: default_workers(),
            resync_interval: default_resync_interval(),
            backoff_base: default_backoff_base(),
            backoff_max: default_backoff_max(),
        }
    }
}

impl ControllerConfig {
    /// Set the worker count.
    #[must_use]
    pub const fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the resync interval.
    #[must_use]
    pub const fn with_resync_interval(mut self, interval: Duration) -> Self {
        self.resync_interval = interval;
        self
    }

    /// Set the failure backoff bounds.
    #[must_use]
    pub const fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_max = max;
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
        if let Ok(name) = std::env::var("CFP_CONTROLLER_NAME") {
            self.controller_name = name;
        }

        if let Some(workers) = env_parse::<usize>("CFP_WORKERS") {
            self.workers = workers;
        }

        if let Some(secs) = env_parse::<u64>("CFP_RESYNC_SECS") {
            self.resync_interval = Duration::from_secs(secs);
        }
    }

    /// Check the configuration before starting controllers.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for an empty controller name, zero workers, a
    /// zero resync interval or a backoff ceiling below its base.
    pub fn validate(&self) -> Result<()> {
        if self.controller_name.trim().is_empty() {
            return Err(Error::invalid_config("controller name must not be empty"));
        }
        if self.workers == 0 {
            return Err(Error::invalid_config("workers must be at least 1"));
        }
        if self.resync_interval.is_zero() {
            return Err(Error::invalid_config("resync interval must be positive"));
        }
        if self.backoff_max < self.backoff_base {
            return Err(Error::invalid_config(format!(
                "backoff max {:?} is below backoff base {:?}",
                self.backoff_max, self.backoff_base
            )));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn default_controller_name() -> String {
    "cfp-controller".to_string()
}

const fn default_workers() -> usize {
    2
}

const fn default_resync_interval() -> Duration {
    Duration::from_secs(300)
}

const fn default_backoff_base() -> Duration {
    Duration::from_secs(1)
}

const fn default_backoff_max() -> Duration {
    Duration::from_secs(300)
}

mod duration_secs {
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

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
