// # etcd Registry
//
// KeyValueRegistry implementation over the etcd v2 keys API.
//
// ## Requests
//
// - Set:     PUT `/v2/keys/<key>` (form: value, ttl, refresh, prevExist, dir)
// - Delete:  DELETE `/v2/keys/<key>`
//
// A refresh sends no value, so the stored value is left alone and watchers
// are not notified.
//
// ## Endpoint Failover
//
// Endpoints are tried in the order given. Connection failures and 5xx
// responses move on to the next endpoint; any other response is final.
// When no endpoint answers, the call fails with `Error::RegistryUnavailable`.

use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;
use sidekick_core::traits::{KeyValueRegistry, RegistryNode, SetOptions};
use sidekick_core::{Error, Result};
use std::time::Duration;

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Successful keys API response
#[derive(Debug, Deserialize)]
struct KeysResponse {
    #[serde(default)]
    action: String,
    node: Option<RegistryNode>,
}

/// Error body returned by etcd
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EtcdError {
    pub error_code: u32,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub cause: Option<String>,
}

impl From<EtcdError> for Error {
    fn from(e: EtcdError) -> Self {
        let message = match e.cause {
            Some(cause) if !cause.is_empty() => format!("{} ({})", e.message, cause),
            _ => e.message,
        };
        Error::registry(e.error_code, message)
    }
}

/// etcd v2 client
#[derive(Debug)]
pub struct EtcdRegistry {
    endpoints: Vec<Url>,
    client: reqwest::Client,
}

impl EtcdRegistry {
    /// Create a client for the given endpoints
    ///
    /// Each endpoint must be an `http` or `https` URL. Empty entries are
    /// skipped so a comma-separated list with a trailing comma still works.
    ///
    /// # Errors
    ///
    /// - `Error::Config` if no endpoint is given or one is not a valid URL
    pub fn new<I, S>(endpoints: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let endpoints = endpoints
            .into_iter()
            .map(|e| e.as_ref().trim().to_string())
            .filter(|e| !e.is_empty())
            .map(|e| parse_endpoint(&e))
            .collect::<Result<Vec<_>>>()?;

        if endpoints.is_empty() {
            return Err(Error::config("At least one etcd endpoint is required"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { endpoints, client })
    }

    /// Parse a comma-separated endpoint list
    pub fn from_list(list: &str) -> Result<Self> {
        Self::new(list.split(','))
    }

    pub fn endpoints(&self) -> &[Url] {
        &self.endpoints
    }

    /// Send one request, failing over across endpoints
    async fn send(
        &self,
        method: Method,
        key: &str,
        form: &[(&'static str, String)],
    ) -> Result<Option<RegistryNode>> {
        let mut failures = Vec::new();

        for endpoint in &self.endpoints {
            let url = key_url(endpoint, key)?;
            let mut request = self.client.request(method.clone(), url);
            if !form.is_empty() {
                request = request.form(form);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    tracing::debug!("etcd endpoint {} unreachable: {}", endpoint, e);
                    failures.push(format!("{endpoint}: {e}"));
                    continue;
                }
            };

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| Error::http(format!("Failed to read etcd response: {e}")))?;

            if status.is_server_error() {
                tracing::debug!("etcd endpoint {} returned {}", endpoint, status);
                failures.push(format!("{endpoint}: {status} {}", body.trim()));
                continue;
            }

            return parse_response(status, &body);
        }

        Err(Error::unavailable(failures.join("; ")))
    }
}

#[async_trait]
impl KeyValueRegistry for EtcdRegistry {
    async fn set(&self, key: &str, value: &str, options: &SetOptions) -> Result<RegistryNode> {
        tracing::debug!("etcd set {} ({:?})", key, options);

        let node = self.send(Method::PUT, key, &set_form(value, options)).await?;
        Ok(node.unwrap_or_else(|| RegistryNode {
            key: key.to_string(),
            ..Default::default()
        }))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        tracing::debug!("etcd delete {}", key);
        self.send(Method::DELETE, key, &[]).await.map(|_| ())
    }

    fn registry_name(&self) -> &'static str {
        "etcd"
    }
}

fn parse_endpoint(endpoint: &str) -> Result<Url> {
    let url = Url::parse(endpoint)
        .map_err(|e| Error::config(format!("Invalid etcd endpoint '{endpoint}': {e}")))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(Error::config(format!(
            "Invalid etcd endpoint '{endpoint}': unsupported scheme '{other}'"
        ))),
    }
}

/// Build the keys API URL for `key` under `endpoint`
///
/// Directory keys keep their trailing slash.
pub fn key_url(endpoint: &Url, key: &str) -> Result<Url> {
    let mut url = endpoint.clone();
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| Error::config(format!("Invalid etcd endpoint '{endpoint}'")))?;
        segments.pop_if_empty().push("v2").push("keys");
        segments.extend(key.trim_start_matches('/').split('/'));
    }
    Ok(url)
}

/// Form fields for a set request
///
/// The value is omitted for refreshes and directories.
pub fn set_form(value: &str, options: &SetOptions) -> Vec<(&'static str, String)> {
    let mut form = Vec::new();

    if !options.refresh && !options.dir {
        form.push(("value", value.to_string()));
    }
    if let Some(ttl) = options.ttl {
        // etcd TTLs are whole seconds; zero would mean "no TTL"
        form.push(("ttl", ttl.as_secs().max(1).to_string()));
    }
    if options.refresh {
        form.push(("refresh", "true".to_string()));
    }
    if options.prev_exist {
        form.push(("prevExist", "true".to_string()));
    }
    if options.dir {
        form.push(("dir", "true".to_string()));
    }

    form
}

/// Interpret a (non-5xx) keys API response
pub fn parse_response(status: StatusCode, body: &str) -> Result<Option<RegistryNode>> {
    if status.is_success() {
        let response: KeysResponse = serde_json::from_str(body)?;
        tracing::trace!("etcd {} ok", response.action);
        return Ok(response.node);
    }

    match serde_json::from_str::<EtcdError>(body) {
        Ok(e) => Err(e.into()),
        Err(_) => Err(Error::http(format!("etcd returned {status}: {}", body.trim()))),
    }
}
