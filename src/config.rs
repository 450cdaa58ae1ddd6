use crate::acl::Policy;
use crate::error::IndexGateError;

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    /// Named directory connectors referenced by `ldap_auth` rules.
    #[serde(default)]
    pub ldaps: Vec<LdapConnectorConfig>,
    /// Blocks in evaluation order.
    #[serde(default)]
    pub access_control_rules: Vec<BlockSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Upper bound for a whole decision; expiry is a default deny.
    pub decision_timeout_ms: Option<u64>,
    /// Probe every directory connector when the engine is built.
    pub check_directories_on_startup: bool,
    pub startup_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            decision_timeout_ms: None,
            check_directories_on_startup: false,
            startup_timeout_ms: 60_000,
        }
    }
}

/// Raw settings for one block: its name, policy and every rule keyed by name.
///
/// Rules are kept in a hash map on purpose; evaluation order is always
/// derived from the precedence table, never from configuration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockSettings {
    pub name: String,
    #[serde(rename = "type")]
    pub policy: Policy,
    #[serde(flatten)]
    pub rules: HashMap<String, serde_json::Value>,
}

impl BlockSettings {
    pub fn new(name: impl Into<String>, policy: Policy) -> Self {
        Self {
            name: name.into(),
            policy,
            rules: HashMap::new(),
        }
    }

    pub fn with_rule(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.rules.insert(key.into(), value);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LdapConnectorConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub ssl_enabled: bool,
    /// Service account used for group searches; anonymous when unset.
    pub bind_dn: Option<String>,
    pub bind_password: Option<String>,
    pub search_user_base_dn: String,
    pub user_id_attribute: String,
    pub search_groups_base_dn: String,
    pub unique_member_attribute: String,
    /// Bound for a single connection attempt
    pub connect_timeout_ms: u64,
    /// Wait between connection attempts
    pub retry_interval_ms: u64,
    /// How long a request keeps retrying to connect before reporting a connection failure
    pub connect_retry_window_ms: u64,
    /// Budget for a whole bind or search, connection included
    pub request_timeout_ms: u64,
}

impl Default for LdapConnectorConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            host: "localhost".to_string(),
            port: 389,
            ssl_enabled: false,
            bind_dn: None,
            bind_password: None,
            search_user_base_dn: String::new(),
            user_id_attribute: "uid".to_string(),
            search_groups_base_dn: String::new(),
            unique_member_attribute: "uniqueMember".to_string(),
            connect_timeout_ms: 5_000,
            retry_interval_ms: 1_000,
            connect_retry_window_ms: 2_000,
            request_timeout_ms: 10_000,
        }
    }
}

impl LdapConnectorConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn connect_retry_window(&self) -> Duration {
        Duration::from_millis(self.connect_retry_window_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.name.trim().is_empty() {
            return Err(IndexGateError::InvalidConfig(
                "ldaps.name cannot be empty".to_string(),
            ));
        }

        if self.host.trim().is_empty() {
            return Err(IndexGateError::InvalidConfig(format!(
                "ldaps.{}.host cannot be empty",
                self.name
            )));
        }

        if self.port == 0 {
            return Err(IndexGateError::InvalidConfig(format!(
                "ldaps.{}.port must be greater than 0",
                self.name
            )));
        }

        if self.connect_timeout_ms == 0 {
            return Err(IndexGateError::InvalidConfig(format!(
                "ldaps.{}.connect_timeout_ms must be greater than 0",
                self.name
            )));
        }

        if self.retry_interval_ms == 0 {
            return Err(IndexGateError::InvalidConfig(format!(
                "ldaps.{}.retry_interval_ms must be greater than 0",
                self.name
            )));
        }

        if self.request_timeout_ms == 0 {
            return Err(IndexGateError::InvalidConfig(format!(
                "ldaps.{}.request_timeout_ms must be greater than 0",
                self.name
            )));
        }

        if self.bind_dn.is_some() && self.bind_password.is_none() {
            return Err(IndexGateError::InvalidConfig(format!(
                "ldaps.{}.bind_password is required when bind_dn is set",
                self.name
            )));
        }

        Ok(())
    }
}

impl EngineConfig {
    pub fn decision_timeout(&self) -> Option<Duration> {
        self.decision_timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.decision_timeout_ms == Some(0) {
            return Err(IndexGateError::InvalidConfig(
                "engine.decision_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.check_directories_on_startup && self.startup_timeout_ms == 0 {
            return Err(IndexGateError::InvalidConfig(
                "engine.startup_timeout_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        toml::from_str(content).map_err(|e| IndexGateError::Config(e.to_string()))
    }

    pub fn from_json_str(content: &str) -> crate::Result<Self> {
        serde_json::from_str(content).map_err(|e| IndexGateError::Config(e.to_string()))
    }

    /// Structural checks that do not need the rule registry. Rule keys and
    /// parameters are checked when blocks are built.
    pub fn validate(&self) -> crate::Result<()> {
        self.engine.validate()?;

        let mut connectors = HashSet::new();
        for ldap in &self.ldaps {
            ldap.validate()?;
            if !connectors.insert(ldap.name.as_str()) {
                return Err(IndexGateError::InvalidConfig(format!(
                    "duplicate ldap connector name: {}",
                    ldap.name
                )));
            }
        }

        let mut blocks = HashSet::new();
        for block in &self.access_control_rules {
            if block.name.trim().is_empty() {
                return Err(IndexGateError::EmptyBlockName);
            }
            if !blocks.insert(block.name.as_str()) {
                return Err(IndexGateError::DuplicateBlock(block.name.clone()));
            }
        }

        Ok(())
    }
}
