// # Route53 DNS Provider
//
// Publishes a single A/AAAA record through the AWS Route53 API.
//
// ## Upsert Semantics
//
// One `ChangeResourceRecordSets` call carrying a single UPSERT change.
// Route53 creates or replaces the record atomically and does not say which,
// so every successful call reports `UpsertResult::Submitted`.
//
// Credentials and region come from the standard AWS provider chain
// (environment, profile, instance metadata). SDK retries are disabled so a
// failed call surfaces immediately.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_route53::Client;
use aws_sdk_route53::config::retry::RetryConfig;
use aws_sdk_route53::error::DisplayErrorContext;
use aws_sdk_route53::types::{
    Change, ChangeAction, ChangeBatch, ResourceRecord, ResourceRecordSet, RrType,
};
use sidekick_core::traits::{DnsProvider, RecordSet, RecordType, UpsertResult};
use sidekick_core::{Error, Result};

const PROVIDER_NAME: &str = "route53";

/// Route53 DNS provider
#[derive(Debug, Clone)]
pub struct Route53Provider {
    client: Client,
}

impl Route53Provider {
    /// Load credentials and region from the environment
    pub async fn from_env() -> Self {
        let shared = aws_config::defaults(BehaviorVersion::latest()).load().await;
        Self::from_sdk_config(&shared)
    }

    /// Build a provider from a shared AWS configuration
    pub fn from_sdk_config(shared: &SdkConfig) -> Self {
        Self::from_conf(aws_sdk_route53::config::Builder::from(shared).build())
    }

    /// Build a provider from a Route53 client configuration
    pub fn from_conf(config: aws_sdk_route53::Config) -> Self {
        let config = config
            .to_builder()
            .retry_config(RetryConfig::disabled())
            .build();
        Self {
            client: Client::from_conf(config),
        }
    }
}

#[async_trait]
impl DnsProvider for Route53Provider {
    async fn upsert_record(&self, record: &RecordSet) -> Result<UpsertResult> {
        tracing::info!(
            "Route53 UPSERT {} {} -> {} in zone {}",
            record.record_type,
            record.name,
            record.address,
            record.zone_id
        );

        let output = self
            .client
            .change_resource_record_sets()
            .hosted_zone_id(&record.zone_id)
            .change_batch(change_batch(record)?)
            .send()
            .await
            .map_err(|e| Error::upsert(PROVIDER_NAME, DisplayErrorContext(&e).to_string()))?;

        tracing::debug!("Route53 accepted change: {:?}", output);
        Ok(UpsertResult::Submitted)
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }
}

/// Change batch upserting `record`
pub fn change_batch(record: &RecordSet) -> Result<ChangeBatch> {
    let build_error = |e: aws_sdk_route53::error::BuildError| {
        Error::upsert(PROVIDER_NAME, format!("Invalid change batch: {e}"))
    };

    let value = ResourceRecord::builder()
        .value(record.address.to_string())
        .build()
        .map_err(build_error)?;

    let record_set = ResourceRecordSet::builder()
        .name(&record.name)
        .r#type(rr_type(record.record_type))
        .ttl(i64::from(record.ttl))
        .resource_records(value)
        .build()
        .map_err(build_error)?;

    let change = Change::builder()
        .action(ChangeAction::Upsert)
        .resource_record_set(record_set)
        .build()
        .map_err(build_error)?;

    ChangeBatch::builder()
        .comment("sidekick")
        .changes(change)
        .build()
        .map_err(build_error)
}

fn rr_type(record_type: RecordType) -> RrType {
    match record_type {
        RecordType::A => RrType::A,
        RecordType::Aaaa => RrType::Aaaa,
    }
}
