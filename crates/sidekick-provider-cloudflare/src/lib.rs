// # Cloudflare DNS Provider
//
// Publishes a single A/AAAA record through the Cloudflare API v4.
//
// ## Upsert Semantics
//
// 1. List records matching the hostname and type in the zone
// 2. No match: create the record (POST)
// 3. Match with the same address and TTL: nothing to do
// 4. Match with a different address or TTL: overwrite it (PUT)
//
// One lookup plus at most one write per call. No retry, no caching, no
// background tasks. The API token never appears in logs or Debug output.
//
// ## API Reference
//
// - List DNS Records: GET `/zones/:zone_id/dns_records?name=...&type=...`
// - Create DNS Record: POST `/zones/:zone_id/dns_records`
// - Update DNS Record: PUT `/zones/:zone_id/dns_records/:record_id`

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use sidekick_core::traits::{DnsProvider, RecordSet, UpsertResult};
use sidekick_core::{Error, Result};
use std::net::IpAddr;
use std::time::Duration;

/// Cloudflare API base URL
pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const PROVIDER_NAME: &str = "cloudflare";

/// Cloudflare DNS provider
///
/// # Dry-Run Mode
///
/// When `dry_run` is true the record lookup still happens, but the create or
/// update is only logged. The result reports what would have been done.
pub struct CloudflareProvider {
    /// Cloudflare API token (Zone:DNS:Edit)
    api_token: String,

    /// API base URL, without a trailing slash
    base_url: String,

    client: reqwest::Client,

    dry_run: bool,
}

impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("api_token", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

/// Envelope of every Cloudflare API v4 response
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: u32,
    #[serde(default)]
    message: String,
}

/// The fields of an existing DNS record this provider cares about
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExistingRecord {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub ttl: u32,
}

/// What an upsert has to do, given the current state of the zone
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertAction {
    Create,
    Update {
        record_id: String,
        previous: Option<IpAddr>,
    },
    Unchanged,
}

impl CloudflareProvider {
    /// Create a new Cloudflare provider
    ///
    /// # Errors
    ///
    /// - `Error::Config` if the token is empty or the HTTP client cannot be built
    pub fn new(api_token: impl Into<String>, dry_run: bool) -> Result<Self> {
        let api_token = api_token.into();
        if api_token.trim().is_empty() {
            return Err(Error::config("Cloudflare API token is required"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {e}")))?;

        if dry_run {
            tracing::warn!("Cloudflare provider running in DRY-RUN mode - no changes will be made");
        }

        Ok(Self {
            api_token,
            base_url: CLOUDFLARE_API_BASE.to_string(),
            client,
            dry_run,
        })
    }

    /// Point the provider at a different API base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn records_url(&self, zone_id: &str) -> String {
        format!("{}/zones/{}/dns_records", self.base_url, zone_id)
    }

    /// Find the record matching the name and type, if any
    async fn find_record(&self, record: &RecordSet) -> Result<Option<ExistingRecord>> {
        tracing::debug!(
            "Looking up record: {} (type: {})",
            record.name,
            record.record_type
        );

        let response = self
            .client
            .get(self.records_url(&record.zone_id))
            .bearer_auth(&self.api_token)
            .query(&[("name", record.name.as_str()), ("type", record.record_type.as_str())])
            .send()
            .await
            .map_err(|e| Error::upsert(PROVIDER_NAME, format!("HTTP request failed: {e}")))?;

        let body = read_body(response, "Record lookup").await?;
        parse_lookup(&body)
    }

    async fn create_record(&self, record: &RecordSet) -> Result<()> {
        let response = self
            .client
            .post(self.records_url(&record.zone_id))
            .bearer_auth(&self.api_token)
            .json(&record_payload(record))
            .send()
            .await
            .map_err(|e| Error::upsert(PROVIDER_NAME, format!("HTTP request failed: {e}")))?;

        let body = read_body(response, "Record creation").await?;
        check_envelope(&body)
    }

    async fn update_record(&self, record: &RecordSet, record_id: &str) -> Result<()> {
        let url = format!("{}/{}", self.records_url(&record.zone_id), record_id);
        let response = self
            .client
            .put(&url)
            .bearer_auth(&self.api_token)
            .json(&record_payload(record))
            .send()
            .await
            .map_err(|e| Error::upsert(PROVIDER_NAME, format!("HTTP request failed: {e}")))?;

        let body = read_body(response, "Record update").await?;
        check_envelope(&body)
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    async fn upsert_record(&self, record: &RecordSet) -> Result<UpsertResult> {
        tracing::info!(
            "Upserting Cloudflare DNS record: {} -> {} ({}) [mode: {}]",
            record.name,
            record.address,
            record.record_type,
            if self.dry_run { "DRY-RUN" } else { "LIVE" }
        );

        let existing = self.find_record(record).await?;

        match plan_upsert(existing.as_ref(), record) {
            UpsertAction::Unchanged => {
                tracing::info!(
                    "DNS record already has correct IP: {} -> {}",
                    record.name,
                    record.address
                );
                Ok(UpsertResult::Unchanged)
            }
            UpsertAction::Create => {
                if self.dry_run {
                    tracing::info!(
                        "[DRY-RUN] Would POST {} with payload: {}",
                        self.records_url(&record.zone_id),
                        record_payload(record)
                    );
                } else {
                    self.create_record(record).await?;
                    tracing::info!("DNS record created: {} -> {}", record.name, record.address);
                }
                Ok(UpsertResult::Created)
            }
            UpsertAction::Update { record_id, previous } => {
                if self.dry_run {
                    tracing::info!(
                        "[DRY-RUN] Would PUT {}/{} with payload: {}",
                        self.records_url(&record.zone_id),
                        record_id,
                        record_payload(record)
                    );
                } else {
                    self.update_record(record, &record_id).await?;
                    tracing::info!(
                        "DNS record updated: {} -> {} (was: {:?})",
                        record.name,
                        record.address,
                        previous
                    );
                }
                Ok(UpsertResult::Updated { previous })
            }
        }
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }
}

/// JSON body for create and update requests
pub fn record_payload(record: &RecordSet) -> Value {
    serde_json::json!({
        "type": record.record_type.as_str(),
        "name": record.name,
        "content": record.address.to_string(),
        "ttl": record.ttl,
        "proxied": false,
    })
}

/// Decide between create, update and no-op
pub fn plan_upsert(existing: Option<&ExistingRecord>, record: &RecordSet) -> UpsertAction {
    let Some(existing) = existing else {
        return UpsertAction::Create;
    };

    let previous = existing.content.parse::<IpAddr>().ok();
    if previous == Some(record.address) && existing.ttl == record.ttl {
        return UpsertAction::Unchanged;
    }

    UpsertAction::Update {
        record_id: existing.id.clone(),
        previous,
    }
}

/// Map a non-success HTTP status to a provider error
pub fn status_error(status: u16, context: &str, body: &str) -> Error {
    let message = match status {
        401 | 403 => format!(
            "Authentication failed: Invalid API token or insufficient permissions. Status: {status}"
        ),
        404 => format!("{context} failed: zone not found. Status: {status}"),
        409 => format!("Conflict: Record is being updated by another process. Status: {status}"),
        429 => format!("Rate limit exceeded. Please retry later. Status: {status}"),
        500..=599 => format!("Cloudflare server error (transient): {status} - {body}"),
        _ => format!("{context} failed: {status} - {body}"),
    };
    Error::upsert(PROVIDER_NAME, message)
}

/// Extract the first matching record from a list response
pub fn parse_lookup(body: &Value) -> Result<Option<ExistingRecord>> {
    let response: ApiResponse<Vec<ExistingRecord>> = serde_json::from_value(body.clone())
        .map_err(|e| Error::upsert(PROVIDER_NAME, format!("Failed to parse response: {e}")))?;

    if !response.success {
        return Err(envelope_error(&response.errors));
    }

    Ok(response.result.unwrap_or_default().into_iter().next())
}

fn check_envelope(body: &Value) -> Result<()> {
    let response: ApiResponse<Value> = serde_json::from_value(body.clone())
        .map_err(|e| Error::upsert(PROVIDER_NAME, format!("Failed to parse response: {e}")))?;

    if response.success {
        Ok(())
    } else {
        Err(envelope_error(&response.errors))
    }
}

fn envelope_error(errors: &[ApiMessage]) -> Error {
    let detail = errors
        .iter()
        .map(|e| format!("{} ({})", e.message, e.code))
        .collect::<Vec<_>>()
        .join("; ");
    let detail = if detail.is_empty() {
        "unknown error".to_string()
    } else {
        detail
    };
    Error::upsert(PROVIDER_NAME, format!("API returned an error: {detail}"))
}

async fn read_body(response: reqwest::Response, context: &str) -> Result<Value> {
    let status = response.status();
    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());
        return Err(status_error(status.as_u16(), context, &error_text));
    }

    response
        .json()
        .await
        .map_err(|e| Error::upsert(PROVIDER_NAME, format!("Failed to parse response: {e}")))
}
