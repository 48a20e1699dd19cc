//! Operator configuration.
//!
//! Values are layered: defaults, then the config file, then environment
//! variables, then command-line flags.

use std::path::Path;
use std::time::Duration;

use cfp_reconciler::ControllerConfig;
use cfp_registry::RegistryConfig;
use serde::{Deserialize, Serialize};

use crate::cli::Cli;
use crate::error::{Error, Result};

/// Complete configuration for the `cfp-controller` binary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorConfig {
    /// Registry API client settings.
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Controller runtime settings.
    #[serde(default)]
    pub controller: ControllerConfig,
}

impl OperatorConfig {
    /// Load configuration from a file, picking the format by extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => {
                serde_json::from_str(&content).map_err(|e| Error::parse(path, e.to_string()))
            }
            Some("yaml" | "yml") => {
                serde_yaml::from_str(&content).map_err(|e| Error::parse(path, e.to_string()))
            }
            _ => toml::from_str(&content).map_err(|e| Error::parse(path, e.to_string())),
        }
    }

    /// Overlay environment variables.
    pub fn apply_env(&mut self) {
        self.registry.apply_env();
        self.controller.apply_env();
    }

    /// Overlay command-line flags.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(endpoint) = &cli.endpoint {
            self.registry.endpoint.clone_from(endpoint);
        }
        if let Some(workers) = cli.workers {
            self.controller.workers = workers;
        }
        if let Some(secs) = cli.resync_secs {
            self.controller.resync_interval = Duration::from_secs(secs);
        }
    }

    /// Check both sections.
    ///
    /// # Errors
    ///
    /// Returns `Invalid` for an unusable endpoint or controller settings.
    pub fn validate(&self) -> Result<()> {
        self.registry.endpoint_url()?;
        self.controller.validate()?;
        Ok(())
    }

    /// Build the effective configuration for a command line.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file is unusable or the result is invalid.
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env();
        config.apply_cli(cli);
        config.validate()?;
        Ok(config)
    }
}
