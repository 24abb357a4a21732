//! Runtime configuration.
//!
//! Process settings come from the environment. Provider capabilities,
//! connections, and tenant resource bindings come from a YAML file.

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::capability::{CapabilitySettings, CapabilityTable};
use crate::driver::DriverTimeouts;
use crate::resolver::{ConnectionConfig, ResourceBinding, StaticConnections, StaticResolver};

/// Default cloud-driver endpoint.
pub const DEFAULT_DRIVER_BASE_URL: &str = "http://localhost:1024/spider";

/// Default state directory of the file-backed store.
pub const DEFAULT_STATE_DIR: &str = "./.orchestrator";

/// Process-level settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Cloud-driver service root.
    pub driver_base_url: String,
    /// Per-class driver call budgets.
    pub timeouts: DriverTimeouts,
    /// Where the file-backed store keeps records.
    pub state_dir: PathBuf,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            driver_base_url: DEFAULT_DRIVER_BASE_URL.to_string(),
            timeouts: DriverTimeouts::default(),
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
        }
    }
}

impl OrchestratorConfig {
    /// Read settings from the environment, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let secs = |name: &str, fallback: Duration| {
            lookup(name)
                .and_then(|s| s.parse::<u64>().ok())
                .map_or(fallback, Duration::from_secs)
        };

        Self {
            driver_base_url: lookup("DRIVER_BASE_URL")
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.driver_base_url),
            timeouts: DriverTimeouts {
                very_short: secs("DRIVER_TIMEOUT_VERY_SHORT_SECS", defaults.timeouts.very_short),
                medium: secs("DRIVER_TIMEOUT_MEDIUM_SECS", defaults.timeouts.medium),
                long: secs("DRIVER_TIMEOUT_LONG_SECS", defaults.timeouts.long),
            },
            state_dir: lookup("ORCHESTRATOR_STATE_DIR")
                .filter(|s| !s.is_empty())
                .map_or(defaults.state_dir, PathBuf::from),
        }
    }
}

/// Contents of the YAML config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigFile {
    /// Provider name → settings. A `Common` entry is the fallback.
    pub capabilities: BTreeMap<String, CapabilitySettings>,
    pub connections: Vec<ConnectionConfig>,
    pub resources: Vec<ResourceBinding>,
}

impl ConfigFile {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Parse configuration from YAML text.
    ///
    /// # Errors
    /// Returns an error if the YAML is malformed.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    #[must_use]
    pub fn capability_table(&self) -> CapabilityTable {
        CapabilityTable::from_map(self.capabilities.clone())
    }

    #[must_use]
    pub fn connection_catalog(&self) -> StaticConnections {
        StaticConnections::new(self.connections.clone())
    }

    #[must_use]
    pub fn resolver(&self) -> StaticResolver {
        StaticResolver::from_bindings(self.resources.clone())
    }
}
