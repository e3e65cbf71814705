// # DNS Provider Trait
//
// Defines the interface for upserting DNS records via provider APIs.
//
// ## Implementations
//
// - Cloudflare: `sidekick-provider-cloudflare` crate
// - Route53: `sidekick-provider-route53` crate
//
// ## Usage
//
// ```rust,ignore
// use sidekick_core::traits::{DnsProvider, RecordSet};
//
// let record = RecordSet::new("zone-id", "app.example.com", ip, 60);
// provider.upsert_record(&record).await?;
// ```

use async_trait::async_trait;
use std::fmt;
use std::net::IpAddr;

/// DNS record type, derived from the address family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    /// IPv4 address record
    A,
    /// IPv6 address record
    Aaaa,
}

impl RecordType {
    /// The record type that can hold `ip`
    pub fn for_address(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => RecordType::A,
            IpAddr::V6(_) => RecordType::Aaaa,
        }
    }

    /// Wire name of the record type
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single address record to upsert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSet {
    /// Provider zone identifier
    pub zone_id: String,
    /// Fully qualified record name
    pub name: String,
    /// Record type
    pub record_type: RecordType,
    /// Record TTL in seconds
    pub ttl: u32,
    /// Address the record points at
    pub address: IpAddr,
}

impl RecordSet {
    /// Build a record whose type follows the address family
    pub fn new(
        zone_id: impl Into<String>,
        name: impl Into<String>,
        address: IpAddr,
        ttl: u32,
    ) -> Self {
        Self {
            zone_id: zone_id.into(),
            name: name.into(),
            record_type: RecordType::for_address(&address),
            ttl,
            address,
        }
    }
}

/// Result of an upsert
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertResult {
    /// Record did not exist and was created
    Created,
    /// Record existed with different content and was overwritten
    Updated {
        /// The address the record held before
        previous: Option<IpAddr>,
    },
    /// Record already matched (no-op)
    Unchanged,
    /// Change accepted by a provider that does not report whether the
    /// record existed
    Submitted,
}

/// Trait for DNS provider implementations
///
/// # Contract
///
/// - Single-shot: no retry, no backoff, no background tasks
/// - Stateless between calls
/// - Never log credentials
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Create the record, or overwrite it if it exists
    async fn upsert_record(&self, record: &RecordSet) -> Result<UpsertResult, crate::Error>;

    /// Get the provider name (for logging/debugging)
    ///
    /// # Returns
    ///
    /// A static string identifying the provider (e.g., "cloudflare")
    fn provider_name(&self) -> &'static str;
}
