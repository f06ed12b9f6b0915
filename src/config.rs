//! Configuration management for ddns-updater.

use crate::error::{DdnsError, Result};
use crate::family::AddressFamily;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Shortest accepted check interval, in seconds.
pub const MIN_INTERVAL_SECS: u64 = 15;

/// User-Agent sent with every request. dyndns2 providers reject anonymous agents.
pub const USER_AGENT: &str = concat!("ddns-updater/", env!("CARGO_PKG_VERSION"));

/// Main configuration structure.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// DNS record to keep up to date (e.g., "home.example.com").
    #[serde(default)]
    pub hostname: String,

    /// Dynamic DNS username.
    #[serde(default)]
    pub username: String,

    /// Dynamic DNS password.
    #[serde(default)]
    pub password: String,

    /// Check interval in seconds (default: 300 = 5 minutes).
    #[serde(default = "default_interval")]
    pub check_interval_secs: u64,

    /// Also track the AAAA record.
    #[serde(default)]
    pub enable_ipv6: bool,

    /// Log level filter (default: info).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Timeout applied to every HTTP request, in seconds.
    #[serde(default = "default_timeout")]
    pub http_timeout_secs: u64,

    /// Retries after the first attempt of each network call.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff factor in seconds, doubled on every retry.
    #[serde(default = "default_backoff")]
    pub retry_backoff_factor: f64,

    /// dyndns2 update endpoint.
    #[serde(default = "default_update_url")]
    pub update_url: String,

    /// IPv4 discovery services, in priority order.
    #[serde(default = "default_ipv4_services")]
    pub ipv4_services: Vec<String>,

    /// IPv6 discovery services, in priority order.
    #[serde(default = "default_ipv6_services")]
    pub ipv6_services: Vec<String>,
}

fn default_interval() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_timeout() -> u64 {
    15
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff() -> f64 {
    1.0
}

fn default_update_url() -> String {
    "https://infomaniak.com/nic/update".to_string()
}

fn default_ipv4_services() -> Vec<String> {
    vec![
        "https://api.ipify.org?format=json".to_string(),
        "https://api.my-ip.io/v2/ip.json".to_string(),
        "https://ipv4.icanhazip.com".to_string(),
    ]
}

fn default_ipv6_services() -> Vec<String> {
    vec![
        "https://api64.ipify.org?format=json".to_string(),
        "https://api6.my-ip.io/v2/ip.json".to_string(),
        "https://ipv6.icanhazip.com".to_string(),
    ]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hostname: String::new(),
            username: String::new(),
            password: String::new(),
            check_interval_secs: default_interval(),
            enable_ipv6: false,
            log_level: default_log_level(),
            http_timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
            retry_backoff_factor: default_backoff(),
            update_url: default_update_url(),
            ipv4_services: default_ipv4_services(),
            ipv6_services: default_ipv6_services(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("hostname", &self.hostname)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("check_interval_secs", &self.check_interval_secs)
            .field("enable_ipv6", &self.enable_ipv6)
            .field("log_level", &self.log_level)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_factor", &self.retry_backoff_factor)
            .field("update_url", &self.update_url)
            .field("ipv4_services", &self.ipv4_services)
            .field("ipv6_services", &self.ipv6_services)
            .finish()
    }
}

impl Config {
    /// Get the default config file path.
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| DdnsError::Config("Could not find config directory".to_string()))?;

        Ok(config_dir.join("ddns-updater").join("config.toml"))
    }

    /// Load configuration from a specific path. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load from `path` and apply process environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::load_from(path)?;
        config.apply_env_with(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides read through `lookup`. Unset or empty keys leave
    /// the current value in place.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |keys: &[&str]| {
            keys.iter()
                .filter_map(|&key| lookup(key))
                .map(|value| clean_env(&value))
                .find(|value| !value.is_empty())
        };

        if let Some(v) = get(&["DDNS_HOSTNAME", "INFOMANIAK_DDNS_HOSTNAME"]) {
            self.hostname = v;
        }
        if let Some(v) = get(&["DDNS_USERNAME", "INFOMANIAK_DDNS_USERNAME"]) {
            self.username = v;
        }
        if let Some(v) = get(&["DDNS_PASSWORD", "INFOMANIAK_DDNS_PASSWORD"]) {
            self.password = v;
        }
        if let Some(v) = get(&["DDNS_INTERVAL_SECONDS"]) {
            self.check_interval_secs = parse_number("DDNS_INTERVAL_SECONDS", &v)?;
        }
        if let Some(v) = get(&["DDNS_ENABLE_IPV6"]) {
            self.enable_ipv6 = parse_bool(&v);
        }
        if let Some(v) = get(&["DDNS_LOG_LEVEL"]) {
            self.log_level = v.to_lowercase();
        }
        if let Some(v) = get(&["DDNS_REQUEST_TIMEOUT"]) {
            self.http_timeout_secs = parse_number("DDNS_REQUEST_TIMEOUT", &v)?;
        }
        if let Some(v) = get(&["DDNS_MAX_RETRIES"]) {
            self.max_retries = parse_number("DDNS_MAX_RETRIES", &v)?;
        }
        if let Some(v) = get(&["DDNS_RETRY_BACKOFF"]) {
            self.retry_backoff_factor = parse_number("DDNS_RETRY_BACKOFF", &v)?;
        }
        if let Some(v) = get(&["DDNS_UPDATE_URL"]) {
            self.update_url = v;
        }

        Ok(())
    }

    /// Normalize and validate. Only a validated config may drive the loop.
    pub fn validated(mut self) -> Result<Self> {
        self.hostname = self.hostname.trim().to_lowercase();
        self.username = self.username.trim().to_string();

        if self.hostname.is_empty() {
            return Err(DdnsError::Config("hostname is required".to_string()));
        }
        if self.username.is_empty() {
            return Err(DdnsError::Config("username is required".to_string()));
        }
        if self.password.is_empty() {
            return Err(DdnsError::Config("password is required".to_string()));
        }
        if self.check_interval_secs < MIN_INTERVAL_SECS {
            return Err(DdnsError::Config(format!(
                "check interval {}s is below the {}s minimum",
                self.check_interval_secs, MIN_INTERVAL_SECS
            )));
        }
        if self.http_timeout_secs == 0 {
            return Err(DdnsError::Config(
                "HTTP timeout must be at least 1s".to_string(),
            ));
        }
        if !self.retry_backoff_factor.is_finite() || self.retry_backoff_factor < 0.0 {
            return Err(DdnsError::Config(format!(
                "retry backoff factor must be a non-negative number, got {}",
                self.retry_backoff_factor
            )));
        }
        if self.update_url.trim().is_empty() {
            return Err(DdnsError::Config("update URL is required".to_string()));
        }
        for family in self.families() {
            if self.services(family).is_empty() {
                return Err(DdnsError::Config(format!(
                    "no {} discovery services configured",
                    family
                )));
            }
        }

        Ok(self)
    }

    /// Families checked every cycle: IPv4 always, IPv6 when enabled.
    pub fn families(&self) -> Vec<AddressFamily> {
        if self.enable_ipv6 {
            vec![AddressFamily::V4, AddressFamily::V6]
        } else {
            vec![AddressFamily::V4]
        }
    }

    /// Discovery services for a family.
    pub fn services(&self, family: AddressFamily) -> &[String] {
        match family {
            AddressFamily::V4 => &self.ipv4_services,
            AddressFamily::V6 => &self.ipv6_services,
        }
    }

    /// Get the check interval.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    /// Get the per-request HTTP timeout.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Get the retry policy for discovery and updates.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_backoff_factor)
    }

    /// HTTP client shared by discovery and updates.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        Ok(reqwest::Client::builder()
            .timeout(self.http_timeout())
            .user_agent(USER_AGENT)
            .build()?)
    }

    /// Generate example configuration.
    pub fn example() -> Self {
        Self {
            hostname: "home.example.com".to_string(),
            username: "ddns-user".to_string(),
            password: "change-me".to_string(),
            ..Self::default()
        }
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Trim and strip one layer of matching surrounding quotes.
fn clean_env(value: &str) -> String {
    let value = value.trim();
    let bytes = value.as_bytes();
    if bytes.len() >= 2
        && bytes[0] == bytes[bytes.len() - 1]
        && (bytes[0] == b'"' || bytes[0] == b'\'')
    {
        return value[1..value.len() - 1].trim().to_string();
    }
    value.to_string()
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| DdnsError::Config(format!("{} has an invalid value: {:?}", key, value)))
}
