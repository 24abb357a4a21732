//! Per-provider cluster management capabilities.
//!
//! Settings are keyed by canonical provider name (`"aws"`, `"AWS"` and `"Aws"`
//! all map to `Aws`). Providers without an entry use the `Common` settings.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{OrchestratorError, OrchestratorResult};

/// Key of the fallback entry.
pub const COMMON_PROVIDER: &str = "Common";

/// Canonical provider name: first letter upper-cased, the rest lower-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProviderKey(String);

impl ProviderKey {
    #[must_use]
    pub fn normalize(provider: &str) -> Self {
        let mut chars = provider.trim().chars();
        let key = match chars.next() {
            Some(first) => first
                .to_uppercase()
                .chain(chars.as_str().to_lowercase().chars())
                .collect(),
            None => String::new(),
        };
        Self(key)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cluster management settings of one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CapabilitySettings {
    /// Whether clusters may be created and mutated.
    pub enabled: bool,
    /// Whether node groups may be sent with the create request.
    pub node_groups_on_creation: bool,
    /// Whether node groups accept an explicit image.
    pub node_image_designation: bool,
    /// Minimum number of subnets a cluster must be placed in.
    pub required_subnet_count: usize,
    /// Supported Kubernetes versions. Empty means any.
    pub version: Vec<String>,
}

impl Default for CapabilitySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            node_groups_on_creation: true,
            node_image_designation: false,
            required_subnet_count: 1,
            version: Vec::new(),
        }
    }
}

impl CapabilitySettings {
    /// Whether `version` is allowed. `1.30` accepts `1.30` and `1.30.4`.
    #[must_use]
    pub fn supports_version(&self, version: &str) -> bool {
        self.version.is_empty()
            || self.version.iter().any(|v| {
                version == v
                    || version
                        .strip_prefix(v.as_str())
                        .is_some_and(|rest| rest.starts_with('.'))
            })
    }
}

/// Where a provider's settings came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilitySource {
    /// The provider has its own entry.
    Provider,
    /// The provider has no entry; `Common` applies.
    CommonFallback,
}

/// Settings that apply to a provider, with their origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCapability {
    pub provider: ProviderKey,
    pub source: CapabilitySource,
    pub settings: CapabilitySettings,
}

/// Provider → settings lookup with a `Common` fallback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityTable {
    providers: BTreeMap<ProviderKey, CapabilitySettings>,
    common: CapabilitySettings,
}

impl CapabilityTable {
    #[must_use]
    pub fn new(common: CapabilitySettings) -> Self {
        Self {
            providers: BTreeMap::new(),
            common,
        }
    }

    /// Add or replace a provider entry.
    #[must_use]
    pub fn with_provider(mut self, provider: &str, settings: CapabilitySettings) -> Self {
        self.providers.insert(ProviderKey::normalize(provider), settings);
        self
    }

    /// Build from a config map. A `Common` key (any case) becomes the fallback.
    #[must_use]
    pub fn from_map(entries: BTreeMap<String, CapabilitySettings>) -> Self {
        let common_key = ProviderKey::normalize(COMMON_PROVIDER);
        let mut table = Self::default();
        for (provider, settings) in entries {
            let key = ProviderKey::normalize(&provider);
            if key == common_key {
                table.common = settings;
            } else {
                table.providers.insert(key, settings);
            }
        }
        table
    }

    /// Settings for a provider, falling back to `Common`.
    #[must_use]
    pub fn lookup(&self, provider: &str) -> ResolvedCapability {
        let key = ProviderKey::normalize(provider);
        if let Some(settings) = self.providers.get(&key) {
            return ResolvedCapability {
                provider: key,
                source: CapabilitySource::Provider,
                settings: settings.clone(),
            };
        }

        debug!(provider = %key, "No capability entry for provider, using Common");
        ResolvedCapability {
            provider: key,
            source: CapabilitySource::CommonFallback,
            settings: self.common.clone(),
        }
    }

    /// Gate a mutating operation on the provider's `enabled` flag.
    ///
    /// # Errors
    /// Returns [`OrchestratorError::CapabilityDisabled`] when cluster management
    /// is off for the provider.
    pub fn require_enabled(&self, provider: &str) -> OrchestratorResult<ResolvedCapability> {
        let resolved = self.lookup(provider);
        if resolved.settings.enabled {
            Ok(resolved)
        } else {
            Err(OrchestratorError::CapabilityDisabled {
                provider: resolved.provider.to_string(),
            })
        }
    }
}
