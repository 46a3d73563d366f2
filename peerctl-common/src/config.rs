//! Configuration loading
//!
//! Configuration is read from a TOML file with environment variable
//! overrides for the values that commonly differ between deployments
//! (database path, bind address, bridge endpoints).

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Top level service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address the HTTP API binds to
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path to the sqlite database file
    #[serde(default = "default_database")]
    pub database: String,

    #[serde(default)]
    pub bridges: BridgeConfig,

    #[serde(default)]
    pub email: EmailConfig,

    #[serde(default)]
    pub limits: LimitConfig,

    #[serde(default)]
    pub autopeer: AutopeerConfig,
}

/// Base URLs for the sibling services peerctl reads reference data from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_pdbctl_url")]
    pub pdbctl_url: String,
    #[serde(default = "default_ixctl_url")]
    pub ixctl_url: String,
    #[serde(default = "default_devicectl_url")]
    pub devicectl_url: String,
    /// Request timeout for bridge calls, in seconds
    #[serde(default = "default_bridge_timeout")]
    pub timeout_secs: u64,
}

/// Outgoing email settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    /// Default from: address when a network has no override
    #[serde(default = "default_from_address")]
    pub default_from: String,
    /// Prefix prepended to every subject line
    #[serde(default)]
    pub subject_prefix: String,
    /// When set, workflow emails are redirected to the initiating user
    /// instead of the actual peer contact
    #[serde(default = "default_true")]
    pub test_mode: bool,
}

/// Usage limits applied before starting new session workflows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitConfig {
    /// Session limit for networks without an explicit max_sessions value
    #[serde(default = "default_free_max_sessions")]
    pub free_max_sessions: u32,
}

/// Autopeer endpoint registry
///
/// Maps peer ASNs to the base URL of their autopeer API. A network absent
/// from the map is not autopeer enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutopeerConfig {
    /// ASN (as string key, TOML tables require it) -> endpoint URL
    #[serde(default)]
    pub networks: HashMap<String, String>,

    /// Status poll interval in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Maximum number of status poll attempts before giving up
    #[serde(default = "default_poll_attempts")]
    pub poll_max_attempts: u32,
}

impl AutopeerConfig {
    /// Autopeer endpoint URL for an ASN, if that network is enabled
    pub fn url_for(&self, asn: u32) -> Option<&str> {
        self.networks.get(&asn.to_string()).map(|s| s.as_str())
    }
}

fn default_listen() -> String {
    "127.0.0.1:7300".to_string()
}

fn default_database() -> String {
    "peerctl.db".to_string()
}

fn default_pdbctl_url() -> String {
    "http://127.0.0.1:7301".to_string()
}

fn default_ixctl_url() -> String {
    "http://127.0.0.1:7302".to_string()
}

fn default_devicectl_url() -> String {
    "http://127.0.0.1:7303".to_string()
}

fn default_bridge_timeout() -> u64 {
    30
}

fn default_from_address() -> String {
    "noreply@localhost".to_string()
}

fn default_true() -> bool {
    true
}

fn default_free_max_sessions() -> u32 {
    100
}

fn default_poll_interval() -> u64 {
    3000
}

fn default_poll_attempts() -> u32 {
    300
}

impl Default for Config {
    fn default() -> Self {
        toml::from_str("").expect("empty config must deserialize from defaults")
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        toml::from_str("").expect("empty config must deserialize from defaults")
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        toml::from_str("").expect("empty config must deserialize from defaults")
    }
}

impl Default for LimitConfig {
    fn default() -> Self {
        toml::from_str("").expect("empty config must deserialize from defaults")
    }
}

impl Default for AutopeerConfig {
    fn default() -> Self {
        toml::from_str("").expect("empty config must deserialize from defaults")
    }
}

impl Config {
    /// Load configuration from a TOML file, then apply env var overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)?;
                toml::from_str(&content)
                    .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?
            }
            None => Config::default(),
        };

        if let Ok(value) = std::env::var("PEERCTL_LISTEN") {
            config.listen = value;
        }
        if let Ok(value) = std::env::var("PEERCTL_DATABASE") {
            config.database = value;
        }
        if let Ok(value) = std::env::var("PEERCTL_PDBCTL_URL") {
            config.bridges.pdbctl_url = value;
        }
        if let Ok(value) = std::env::var("PEERCTL_IXCTL_URL") {
            config.bridges.ixctl_url = value;
        }
        if let Ok(value) = std::env::var("PEERCTL_DEVICECTL_URL") {
            config.bridges.devicectl_url = value;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.listen, "127.0.0.1:7300");
        assert_eq!(config.autopeer.poll_max_attempts, 300);
        assert!(config.email.test_mode);
    }

    #[test]
    fn test_autopeer_lookup() {
        let config: Config = toml::from_str(
            r#"
            [autopeer.networks]
            63311 = "https://autopeer.example.com/api"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.autopeer.url_for(63311),
            Some("https://autopeer.example.com/api")
        );
        assert_eq!(config.autopeer.url_for(64500), None);
    }
}
