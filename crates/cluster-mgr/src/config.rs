//! Cluster manager configuration.
//!
//! Read from a YAML file with a single `vital_llm_cluster_mgr` section:
//!
//! ```yaml
//! vital_llm_cluster_mgr:
//!   runpod_key: "rpa_..."
//!   poll_interval_secs: 5
//!   running_timeout_secs: 600
//! ```
//!
//! Loading never fails. A missing file, missing section, missing key or
//! unparseable YAML yields the defaults with an empty credential, and the
//! reason is logged.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::lifecycle::DEFAULT_MAX_TRANSIENT_FAILURES;
use crate::providers::runpod::{RunPod, API_BASE_URL, DEFAULT_TIMEOUT_SECS};
use crate::providers::traits::TransportError;

/// Config file location relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "../vital-llm-cluster-mgr-config.yaml";

/// Top-level YAML section holding the cluster manager settings.
pub const CONFIG_SECTION: &str = "vital_llm_cluster_mgr";

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    vital_llm_cluster_mgr: Option<ClusterMgrConfig>,
}

/// Cluster manager settings.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterMgrConfig {
    /// RunPod API key. Empty when not configured.
    pub runpod_key: String,
    /// GraphQL endpoint.
    pub endpoint: String,
    pub request_timeout_secs: u64,
    /// Fixed interval between polls in blocking waits.
    pub poll_interval_secs: u64,
    pub running_timeout_secs: u64,
    /// Fleet polls before a termination is reported unconfirmed.
    pub terminate_attempts: u32,
    /// Consecutive transport failures a wait absorbs.
    pub max_transient_failures: u32,
}

impl Default for ClusterMgrConfig {
    fn default() -> Self {
        Self {
            runpod_key: String::new(),
            endpoint: API_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            poll_interval_secs: 5,
            running_timeout_secs: 600,
            terminate_attempts: 10,
            max_transient_failures: DEFAULT_MAX_TRANSIENT_FAILURES,
        }
    }
}

impl fmt::Debug for ClusterMgrConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterMgrConfig")
            .field(
                "runpod_key",
                &if self.runpod_key.is_empty() {
                    "<empty>"
                } else {
                    "<redacted>"
                },
            )
            .field("endpoint", &self.endpoint)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("running_timeout_secs", &self.running_timeout_secs)
            .field("terminate_attempts", &self.terminate_attempts)
            .field("max_transient_failures", &self.max_transient_failures)
            .finish()
    }
}

impl ClusterMgrConfig {
    /// Load settings from `path`, falling back to defaults.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();

        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Config file not readable, using defaults");
                return Self::default();
            }
        };

        match Self::from_yaml(&contents) {
            Ok(config) => {
                if config.runpod_key.is_empty() {
                    warn!(path = %path.display(), "No runpod_key in {CONFIG_SECTION}");
                } else {
                    info!(path = %path.display(), "Loaded cluster manager config");
                }
                debug!(config = ?config, "Effective config");
                config
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to parse config, using defaults");
                Self::default()
            }
        }
    }

    /// Parse settings from YAML text.
    ///
    /// A document without the section parses to the defaults.
    ///
    /// # Errors
    /// Returns the YAML error if the text does not parse.
    pub fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        let file: ConfigFile = serde_yaml::from_str(contents)?;
        Ok(file.vital_llm_cluster_mgr.unwrap_or_default())
    }

    /// Replace the credential with `api_key` when one is given.
    #[must_use]
    pub fn with_api_key(mut self, api_key: Option<&str>) -> Self {
        if let Some(key) = api_key.map(str::trim).filter(|k| !k.is_empty()) {
            self.runpod_key = key.to_string();
        }
        self
    }

    #[must_use]
    pub fn has_credential(&self) -> bool {
        !self.runpod_key.trim().is_empty()
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    #[must_use]
    pub fn running_timeout(&self) -> Duration {
        Duration::from_secs(self.running_timeout_secs)
    }

    /// Worst-case time [`ClusterMgrConfig::terminate_attempts`] polls take.
    ///
    /// Saturates at [`Duration::MAX`].
    #[must_use]
    pub fn terminate_timeout(&self) -> Duration {
        self.poll_interval()
            .checked_mul(self.terminate_attempts)
            .unwrap_or(Duration::MAX)
    }

    /// Build the HTTP transport these settings describe.
    ///
    /// # Errors
    /// Returns error if HTTP client cannot be created.
    pub fn transport(&self) -> Result<RunPod, TransportError> {
        RunPod::with_endpoint(
            self.runpod_key.clone(),
            self.endpoint.clone(),
            Duration::from_secs(self.request_timeout_secs),
        )
    }
}
