//! Contract Test: One-Shot Record Publishing
//!
//! Constraints verified:
//! - Exactly one upsert per publish, typed by the address family
//! - Missing zone or hostname is a usage error and never reaches the provider
//! - Provider failures surface with the provider's name

mod common;

use common::*;
use sidekick_core::config::PublishConfig;
use sidekick_core::error::Error;
use sidekick_core::traits::{RecordType, UpsertResult};
use sidekick_core::RecordPublisher;
use std::net::IpAddr;

#[tokio::test]
async fn publishes_a_record_for_ipv4() {
    let provider = MockDnsProvider::new("mock");
    let publisher =
        RecordPublisher::new(Box::new(MockDnsProvider::sharing_records_with(&provider)));

    let result = tokio_test::assert_ok!(
        publisher
            .publish("zone-123", "web.example.com", address())
            .await
    );
    assert_eq!(result, UpsertResult::Created);

    let records = provider.upserted();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].zone_id, "zone-123");
    assert_eq!(records[0].name, "web.example.com");
    assert_eq!(records[0].record_type, RecordType::A);
    assert_eq!(records[0].address, address());
    assert_eq!(records[0].ttl, 60);
}

#[tokio::test]
async fn publishes_aaaa_for_ipv6() {
    let provider = MockDnsProvider::new("mock");
    let publisher =
        RecordPublisher::new(Box::new(MockDnsProvider::sharing_records_with(&provider)));
    let ip: IpAddr = "2001:db8::10".parse().unwrap();

    publisher.publish("zone-123", "web.example.com", ip).await.unwrap();

    let records = provider.upserted();
    assert_eq!(records[0].record_type, RecordType::Aaaa);
    assert_eq!(records[0].address, ip);
}

#[tokio::test]
async fn missing_arguments_never_reach_the_provider() {
    let provider = MockDnsProvider::new("mock");
    let publisher =
        RecordPublisher::new(Box::new(MockDnsProvider::sharing_records_with(&provider)));

    let err = tokio_test::assert_err!(publisher.publish("zone-123", "", address()).await);
    assert!(err.is_usage());
    assert!(err.to_string().contains("HOSTNAME"));

    let err = tokio_test::assert_err!(publisher.publish("  ", "web.example.com", address()).await);
    assert!(matches!(err, Error::Usage(_)));
    assert!(err.to_string().contains("ZONE_ID"));

    assert!(provider.upserted().is_empty());
}

#[tokio::test]
async fn provider_failure_names_the_provider() {
    let publisher = RecordPublisher::new(Box::new(MockDnsProvider::failing(
        "mock",
        "403 Forbidden",
    )));

    let err = publisher
        .publish("zone-123", "web.example.com", address())
        .await
        .unwrap_err();

    match err {
        Error::ProviderUpsertFailed { provider, message } => {
            assert_eq!(provider, "mock");
            assert!(message.contains("403 Forbidden"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn config_ttl_is_used() {
    let provider = MockDnsProvider::new("mock");
    let mut config = PublishConfig::new("zone-123", "web.example.com");
    config.ttl = 300;

    let publisher = RecordPublisher::from_config(
        Box::new(MockDnsProvider::sharing_records_with(&provider)),
        &config,
    )
    .expect("valid config");
    assert_eq!(publisher.ttl(), 300);

    publisher.publish_config(&config, address()).await.unwrap();
    assert_eq!(provider.upserted()[0].ttl, 300);
}

#[test]
fn from_config_rejects_missing_hostname() {
    let config = PublishConfig::new("zone-123", "");
    let result = RecordPublisher::from_config(Box::new(MockDnsProvider::new("mock")), &config);
    assert!(matches!(result, Err(Error::Usage(_))));
}
