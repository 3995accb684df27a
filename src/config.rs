//! Configuration: bot token, admin allow-list, media root, and the
//! profile → per-network credential map.
//!
//! Loaded once at startup from a YAML file. Credential bundles are opaque
//! to the core; each network's publisher parses its own.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::publish::Network;

/// Per-profile credential bundles, keyed by network. Bundles are forwarded
/// unchanged to the relevant network's publisher.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct ProfileConfig {
    pub networks: HashMap<Network, serde_json::Value>,
}

/// Top-level configuration file.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Transport bot token.
    pub bot_token: SecretString,
    /// Operator allow-list: user ids or usernames, `*` allows everyone.
    #[serde(default)]
    pub admins: Vec<String>,
    /// Root directory for staged media.
    #[serde(default = "default_media_dir")]
    pub media_dir: PathBuf,
    /// Named credential profiles, in file order.
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileConfig>,
}

fn default_media_dir() -> PathBuf {
    PathBuf::from("./media")
}

impl Config {
    /// Load and validate the YAML config file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(raw)?;
        if config.profiles.is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "profiles".into(),
                hint: "Define at least one profile with per-network credentials.".into(),
            });
        }
        Ok(config)
    }

    pub fn admin_list(&self) -> AdminList {
        AdminList::new(self.admins.clone())
    }

    pub fn profile(&self, name: &str) -> Option<&ProfileConfig> {
        self.profiles.get(name)
    }

    pub fn profile_names(&self) -> Vec<String> {
        self.profiles.keys().cloned().collect()
    }
}

/// Exact-match operator allow-list with a `*` wildcard.
#[derive(Debug, Clone, Default)]
pub struct AdminList {
    allowed: Vec<String>,
}

impl AdminList {
    pub fn new(allowed: Vec<String>) -> Self {
        Self { allowed }
    }

    pub fn is_allowed(&self, operator: &str) -> bool {
        self.allowed.iter().any(|u| u == "*" || u == operator)
    }
}
