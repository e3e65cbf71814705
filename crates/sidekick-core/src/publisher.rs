//! One-shot DNS record publishing
//!
//! Upserts a single address record pointing at the workload. There is no
//! refresh loop and no cleanup: the record stays until something else
//! changes it.

use crate::config::{DEFAULT_RECORD_TTL_SECS, PublishConfig};
use crate::error::{Error, Result};
use crate::traits::{DnsProvider, RecordSet, UpsertResult};
use std::net::IpAddr;
use tracing::info;

/// Publishes the workload address through a [`DnsProvider`]
pub struct RecordPublisher {
    provider: Box<dyn DnsProvider>,
    ttl: u32,
}

impl RecordPublisher {
    /// Create a publisher using the default record TTL
    pub fn new(provider: Box<dyn DnsProvider>) -> Self {
        Self {
            provider,
            ttl: DEFAULT_RECORD_TTL_SECS,
        }
    }

    /// Create a publisher from a validated configuration
    pub fn from_config(provider: Box<dyn DnsProvider>, config: &PublishConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            provider,
            ttl: config.ttl,
        })
    }

    /// Record TTL in seconds
    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    /// Upsert `hostname` in `zone_id` to point at `address`
    ///
    /// The record type follows the address family (A or AAAA).
    ///
    /// # Returns
    ///
    /// - `Ok(UpsertResult)`: What the provider did
    /// - `Err(Error::Usage)`: If the zone or hostname is empty
    /// - `Err(Error::ProviderUpsertFailed)`: If the provider call failed
    pub async fn publish(
        &self,
        zone_id: &str,
        hostname: &str,
        address: IpAddr,
    ) -> Result<UpsertResult> {
        if zone_id.trim().is_empty() {
            return Err(Error::usage("Missing ZONE_ID argument"));
        }
        if hostname.trim().is_empty() {
            return Err(Error::usage("Missing HOSTNAME argument"));
        }

        let record = RecordSet::new(zone_id, hostname, address, self.ttl);
        let provider = self.provider.provider_name();
        info!(
            "Publishing {} {} -> {} (ttl {}s) via {}",
            record.record_type, record.name, record.address, record.ttl, provider
        );

        let result = self
            .provider
            .upsert_record(&record)
            .await
            .map_err(|e| match e {
                Error::ProviderUpsertFailed { .. } => e,
                other => Error::upsert(provider, other.to_string()),
            })?;

        match &result {
            UpsertResult::Created => info!("Created {} -> {}", record.name, record.address),
            UpsertResult::Updated { previous } => info!(
                "Updated {} -> {} (previous: {:?})",
                record.name, record.address, previous
            ),
            UpsertResult::Unchanged => {
                info!("{} already points at {}", record.name, record.address)
            }
            UpsertResult::Submitted => info!("Upserted {} -> {}", record.name, record.address),
        }

        Ok(result)
    }

    /// Publish using the zone and hostname from `config`
    pub async fn publish_config(
        &self,
        config: &PublishConfig,
        address: IpAddr,
    ) -> Result<UpsertResult> {
        self.publish(&config.zone_id, &config.hostname, address).await
    }
}
