//! Configuration types for the sidekick agent
//!
//! This module defines the immutable configuration values passed into the
//! registration engine and the record publisher.

use crate::address::NetworkPrefix;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

/// Placeholder replaced by the selected address in the value template
pub const IP_PLACEHOLDER: &str = "$ip";

/// Default etcd endpoint
pub const DEFAULT_ETCD_ENDPOINT: &str = "http://172.16.28.1:2379";

/// Default network prefix (any IPv4 address)
pub const DEFAULT_CIDR: &str = "0.0.0.0/0";

/// Default refresh interval
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// TTL of published DNS records, in seconds
pub const DEFAULT_RECORD_TTL_SECS: u32 = 60;

/// Registration (etcd mode) configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationConfig {
    /// Registry endpoints, tried in order
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<String>,

    /// Network prefix the registered address must fall in
    #[serde(default = "default_cidr")]
    pub cidr: String,

    /// Registered value; every `$ip` is replaced by the selected address
    #[serde(default = "default_value_template")]
    pub value_template: String,

    /// Shallowest directory whose TTL is managed; defaults to the key's parent
    #[serde(default)]
    pub keep_root: Option<String>,

    /// Refresh interval; entries get a TTL of twice this
    #[serde(default = "default_interval")]
    pub interval: Duration,

    /// Attach the TTL on the initial write instead of on the first tick
    #[serde(default)]
    pub initial_ttl: bool,

    /// Retries per registry operation before the failure is fatal
    ///
    /// Zero (the default) fails on the first error.
    #[serde(default)]
    pub max_retries: usize,

    /// Delay between retries
    #[serde(default = "default_retry_delay")]
    pub retry_delay: Duration,

    /// Absolute key of the leaf entry (e.g. "/service/instance-1")
    pub key: String,
}

impl RegistrationConfig {
    /// Create a configuration for `key` with defaults for everything else
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            endpoints: default_endpoints(),
            cidr: default_cidr(),
            value_template: default_value_template(),
            keep_root: None,
            interval: default_interval(),
            initial_ttl: false,
            max_retries: 0,
            retry_delay: default_retry_delay(),
            key: key.into(),
        }
    }

    /// Set the registry endpoints
    pub fn with_endpoints(mut self, endpoints: Vec<String>) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Set the network prefix
    pub fn with_cidr(mut self, cidr: impl Into<String>) -> Self {
        self.cidr = cidr.into();
        self
    }

    /// Set the value template
    pub fn with_value_template(mut self, template: impl Into<String>) -> Self {
        self.value_template = template.into();
        self
    }

    /// Set the keep root
    pub fn with_keep_root(mut self, keep_root: impl Into<String>) -> Self {
        self.keep_root = Some(keep_root.into());
        self
    }

    /// Set the refresh interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the retry policy
    pub fn with_retries(mut self, max_retries: usize, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    /// TTL attached to every entry on refresh
    ///
    /// Saturates for intervals that `validate` rejects.
    pub fn ttl(&self) -> Duration {
        self.interval.saturating_mul(2)
    }

    /// The keep root as passed to the path decomposer ("" means the parent)
    pub fn keep_root_or_default(&self) -> &str {
        self.keep_root.as_deref().unwrap_or("")
    }

    /// Parse the configured network prefix
    pub fn prefix(&self) -> Result<NetworkPrefix> {
        self.cidr.parse()
    }

    /// Render the registered value for `ip`
    pub fn render_value(&self, ip: IpAddr) -> String {
        render_value(&self.value_template, ip)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validate_key(&self.key)?;

        if self.endpoints.is_empty() || self.endpoints.iter().any(|e| e.trim().is_empty()) {
            return Err(Error::usage("At least one registry endpoint is required"));
        }

        if self.interval.is_zero() {
            return Err(Error::usage("Refresh interval must be > 0"));
        }
        if self.interval.checked_mul(2).is_none() {
            return Err(Error::usage(format!(
                "Refresh interval {:?} is too large",
                self.interval
            )));
        }

        if let Some(keep_root) = &self.keep_root
            && !keep_root.is_empty()
            && !keep_root.starts_with('/')
        {
            return Err(Error::usage(format!(
                "Keep root must be an absolute path. Got: {keep_root}"
            )));
        }

        self.prefix()?;
        Ok(())
    }
}

/// Record publisher (DNS mode) configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Network prefix the published address must fall in
    #[serde(default = "default_cidr")]
    pub cidr: String,

    /// Provider zone identifier
    pub zone_id: String,

    /// Fully qualified record name
    pub hostname: String,

    /// Record TTL in seconds
    #[serde(default = "default_record_ttl")]
    pub ttl: u32,
}

impl PublishConfig {
    /// Create a configuration with defaults for the prefix and TTL
    pub fn new(zone_id: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            cidr: default_cidr(),
            zone_id: zone_id.into(),
            hostname: hostname.into(),
            ttl: default_record_ttl(),
        }
    }

    /// Set the network prefix
    pub fn with_cidr(mut self, cidr: impl Into<String>) -> Self {
        self.cidr = cidr.into();
        self
    }

    /// Parse the configured network prefix
    pub fn prefix(&self) -> Result<NetworkPrefix> {
        self.cidr.parse()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.zone_id.trim().is_empty() {
            return Err(Error::usage("Missing ZONE_ID argument"));
        }
        if self.hostname.trim().is_empty() {
            return Err(Error::usage("Missing HOSTNAME argument"));
        }
        self.prefix()?;
        Ok(())
    }
}

/// Replace every `$ip` in `template` with `ip`
pub fn render_value(template: &str, ip: IpAddr) -> String {
    template.replace(IP_PLACEHOLDER, &ip.to_string())
}

/// Check that `key` is an absolute leaf path
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::usage("Missing KEY argument"));
    }
    if !key.starts_with('/') {
        return Err(Error::usage(format!("Key must be an absolute path. Got: {key}")));
    }
    if key.ends_with('/') {
        return Err(Error::usage(format!(
            "Key must name a leaf, not a directory. Got: {key}"
        )));
    }
    Ok(())
}

/// Parse a duration such as `1m`, `30s`, `1m30s`, `500ms` or `2h`
///
/// A bare number is rejected: the unit is mandatory (except for `0`).
pub fn parse_duration(input: &str) -> Result<Duration> {
    let s = input.trim();
    if s.is_empty() {
        return Err(Error::usage("Empty duration"));
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let invalid = || {
        Error::usage(format!(
            "Invalid duration '{input}' (examples: 30s, 1m, 1m30s, 500ms)"
        ))
    };

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .ok_or_else(invalid)?;
        if digits == 0 {
            return Err(invalid());
        }
        let value: f64 = rest[..digits].parse().map_err(|_| invalid())?;
        rest = &rest[digits..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        let scale = match unit {
            "ns" => 1e-9,
            "us" | "µs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => return Err(invalid()),
        };

        let part = Duration::try_from_secs_f64(value * scale).map_err(|_| invalid())?;
        total = total.checked_add(part).ok_or_else(invalid)?;
    }

    Ok(total)
}

fn default_endpoints() -> Vec<String> {
    vec![DEFAULT_ETCD_ENDPOINT.to_string()]
}

fn default_cidr() -> String {
    DEFAULT_CIDR.to_string()
}

fn default_value_template() -> String {
    IP_PLACEHOLDER.to_string()
}

fn default_interval() -> Duration {
    DEFAULT_INTERVAL
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_record_ttl() -> u32 {
    DEFAULT_RECORD_TTL_SECS
}
