//! Account configuration
//!
//! TOML is the native format. A `.json` file is read as the older client's
//! `config.json`: either a top-level array of accounts or `{"account": [...]}`.

use crate::net::{NetError, Outbound};
use crate::portal::transport::TransportOptions;
use crate::portal::{Credentials, DEFAULT_PROBE_URL, MonitorSettings};
use serde::{Deserialize, Deserializer, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const CONFIG_DIR: &str = "esurfing";
const CONFIG_FILE: &str = "config.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to parse JSON config: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Failed to serialize config: {0}")]
    WriteError(#[from] toml::ser::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "account", default)]
    pub accounts: Vec<AccountConfig>,
}

/// One portal account and how its unit probes, retries and binds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    pub username: String,
    pub password: String,

    #[serde(
        default = "default_check_interval_ms",
        alias = "network_check_interval_ms",
        alias = "check_interval"
    )]
    pub check_interval_ms: u64,

    /// Zero or negative retries forever
    #[serde(default = "default_max_retries", alias = "max_retry")]
    pub max_retries: i64,

    #[serde(default = "default_retry_delay_ms", alias = "retry_interval")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_url: Option<String>,

    #[serde(
        default,
        alias = "dns_address",
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub dns: Option<IpAddr>,

    /// Shorthand for `outbound = { type = "interface", name = ... }`
    #[serde(
        default,
        alias = "bind_device",
        skip_serializing_if = "Option::is_none"
    )]
    pub bind_interface: Option<String>,

    #[serde(default)]
    pub outbound: Outbound,
}

fn default_check_interval_ms() -> u64 {
    3000
}

fn default_max_retries() -> i64 {
    5
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_request_timeout_ms() -> u64 {
    10000
}

/// Older configs write `""` for "no custom DNS"
fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<IpAddr>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(address) => address.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonConfig {
    List(Vec<AccountConfig>),
    Table(Config),
}

impl AccountConfig {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            check_interval_ms: default_check_interval_ms(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            probe_url: None,
            dns: None,
            bind_interface: None,
            outbound: Outbound::System,
        }
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }

    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            probe_url: self
                .probe_url
                .clone()
                .unwrap_or_else(|| DEFAULT_PROBE_URL.to_string()),
            check_interval: Duration::from_millis(self.check_interval_ms),
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    /// Effective binding; an explicit `outbound` wins over `bind_interface`
    pub fn outbound(&self) -> Outbound {
        match (&self.outbound, self.bind_interface.as_deref()) {
            (Outbound::System, Some(name)) if !name.is_empty() => Outbound::Interface {
                name: name.to_string(),
            },
            (outbound, _) => outbound.clone(),
        }
    }

    /// Resolves the interface address, so it can fail at startup
    pub fn transport_options(&self) -> Result<TransportOptions, NetError> {
        Ok(TransportOptions {
            timeout: Duration::from_millis(self.request_timeout_ms),
            local_address: self.outbound().local_address()?,
            dns: self.dns,
        })
    }

    fn validate(&self, index: usize) -> Result<(), ConfigError> {
        if self.username.trim().is_empty() {
            return Err(ConfigError::Invalid(format!("account {}: empty username", index)));
        }
        if self.password.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "account {} ({}): empty password",
                index, self.username
            )));
        }
        if self.check_interval_ms == 0 {
            return Err(ConfigError::Invalid(format!(
                "account {} ({}): check interval must be greater than zero",
                index, self.username
            )));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(format!(
                "account {} ({}): request timeout must be greater than zero",
                index, self.username
            )));
        }
        Ok(())
    }
}

impl Config {
    /// Load and validate; the format follows the file extension
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            Self::from_json(&content)
        } else {
            Self::from_toml(&content)
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config = match serde_json::from_str(content)? {
            JsonConfig::List(accounts) => Config { accounts },
            JsonConfig::Table(config) => config,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.accounts.is_empty() {
            return Err(ConfigError::Invalid("no accounts configured".to_string()));
        }
        for (index, account) in self.accounts.iter().enumerate() {
            account.validate(index)?;
        }
        Ok(())
    }

    /// Starting point written by `init`
    pub fn sample() -> Self {
        let mut account = AccountConfig::new("your-account", "your-password");
        account.probe_url = Some(DEFAULT_PROBE_URL.to_string());
        Self {
            accounts: vec![account],
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// `<config dir>/esurfing/config.toml`, or `config.toml` in the working directory
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE))
    }
}
