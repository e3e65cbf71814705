// # Key-Value Registry Trait
//
// Defines the interface to the hierarchical key-value store the agent
// registers itself in.
//
// ## Implementations
//
// - etcd v2 keys API: `sidekick-registry-etcd` crate
//
// ## Usage
//
// ```rust,ignore
// use sidekick_core::traits::{KeyValueRegistry, SetOptions};
// use std::time::Duration;
//
// registry.set("/service/instance-1", "10.0.0.5", &SetOptions::default()).await?;
// registry
//     .set("/service/", "", &SetOptions::refresh(Duration::from_secs(120), true))
//     .await?;
// registry.delete("/service/instance-1").await?;
// ```

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Options for a set operation
///
/// The flags are independent: `refresh` re-arms the TTL without touching
/// the value, `prev_exist` makes the write fail when the key is absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Expire the entry after this long
    pub ttl: Option<Duration>,
    /// Only re-arm the TTL; the stored value is left alone
    pub refresh: bool,
    /// Fail unless the entry already exists
    pub prev_exist: bool,
    /// The entry is a directory (no value)
    pub dir: bool,
}

impl SetOptions {
    /// Options for a TTL-only refresh of an existing entry
    pub fn refresh(ttl: Duration, dir: bool) -> Self {
        Self {
            ttl: Some(ttl),
            refresh: true,
            prev_exist: true,
            dir,
        }
    }

    /// Attach a TTL
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// The node returned by the store after a successful write
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RegistryNode {
    /// Full key of the node
    pub key: String,
    /// Stored value, absent for directories
    #[serde(default)]
    pub value: Option<String>,
    /// Whether the node is a directory
    #[serde(default)]
    pub dir: bool,
    /// Remaining TTL in seconds, if the node expires
    #[serde(default)]
    pub ttl: Option<i64>,
}

/// Trait for key-value registry implementations
///
/// # Contract
///
/// - One request per call: no retry, no backoff (owned by `RegistrationEngine`)
/// - No background tasks
/// - An unreachable store is reported as `Error::RegistryUnavailable`;
///   a store that answers with an error is reported as `Error::Registry`
#[async_trait]
pub trait KeyValueRegistry: Send + Sync {
    /// Write `value` at `key` according to `options`
    ///
    /// `value` is ignored for refreshes and directories.
    async fn set(
        &self,
        key: &str,
        value: &str,
        options: &SetOptions,
    ) -> Result<RegistryNode, crate::Error>;

    /// Delete the (non-directory) entry at `key`
    async fn delete(&self, key: &str) -> Result<(), crate::Error>;

    /// Get the registry name (for logging/debugging)
    fn registry_name(&self) -> &'static str;
}
