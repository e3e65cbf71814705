//! Test doubles and common utilities for contract tests
//!
//! The doubles record every call so tests can assert on the exact sequence
//! of registry and provider operations.

#![allow(dead_code)]

use sidekick_core::config::RegistrationConfig;
use sidekick_core::engine::EngineEvent;
use sidekick_core::error::{Error, Result};
use sidekick_core::traits::{
    DnsProvider, KeyValueRegistry, RecordSet, RegistryNode, SetOptions, UpsertResult,
};
use std::collections::HashMap;
use std::future::Future;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;

/// One call made against a registry double
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryCall {
    Set {
        key: String,
        value: String,
        options: SetOptions,
    },
    Delete {
        key: String,
    },
}

impl RegistryCall {
    pub fn is_refresh(&self) -> bool {
        matches!(self, RegistryCall::Set { options, .. } if options.refresh)
    }

    pub fn key(&self) -> &str {
        match self {
            RegistryCall::Set { key, .. } | RegistryCall::Delete { key } => key,
        }
    }
}

/// A registry that records calls and fails on demand
pub struct RecordingRegistry {
    calls: Arc<Mutex<Vec<RegistryCall>>>,
    /// Remaining failures per key for set()
    failures: Arc<Mutex<HashMap<String, usize>>>,
    /// Error returned by failing set() calls
    unavailable: bool,
    fail_delete: bool,
}

impl RecordingRegistry {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            failures: Arc::new(Mutex::new(HashMap::new())),
            unavailable: false,
            fail_delete: false,
        }
    }

    /// Create a registry that shares the call log and failure plan with `other`
    pub fn sharing_calls_with(other: &Self) -> Self {
        Self {
            calls: Arc::clone(&other.calls),
            failures: Arc::clone(&other.failures),
            unavailable: other.unavailable,
            fail_delete: other.fail_delete,
        }
    }

    /// Fail the next `times` set() calls on `key`
    pub fn failing_on(self, key: &str, times: usize) -> Self {
        self.fail_next(key, times);
        self
    }

    /// Fail the next `times` set() calls on `key`, shared with every clone
    pub fn fail_next(&self, key: &str, times: usize) {
        self.failures.lock().unwrap().insert(key.to_string(), times);
    }

    /// Report failures as an unreachable registry instead of a rejection
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Fail every delete() call
    pub fn failing_delete(mut self) -> Self {
        self.fail_delete = true;
        self
    }

    pub fn calls(&self) -> Vec<RegistryCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Keys of refresh calls, in order
    pub fn refreshed_paths(&self) -> Vec<String> {
        self.calls()
            .iter()
            .filter(|call| call.is_refresh())
            .map(|call| call.key().to_string())
            .collect()
    }

    /// Plain (non-refresh) writes
    pub fn value_writes(&self) -> Vec<RegistryCall> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, RegistryCall::Set { .. }) && !call.is_refresh())
            .collect()
    }

    pub fn deleted_keys(&self) -> Vec<String> {
        self.calls()
            .iter()
            .filter_map(|call| match call {
                RegistryCall::Delete { key } => Some(key.clone()),
                _ => None,
            })
            .collect()
    }

    fn take_failure(&self, key: &str) -> bool {
        let mut failures = self.failures.lock().unwrap();
        match failures.get_mut(key) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait::async_trait]
impl KeyValueRegistry for RecordingRegistry {
    async fn set(&self, key: &str, value: &str, options: &SetOptions) -> Result<RegistryNode> {
        self.calls.lock().unwrap().push(RegistryCall::Set {
            key: key.to_string(),
            value: value.to_string(),
            options: options.clone(),
        });

        if self.take_failure(key) {
            return Err(if self.unavailable {
                Error::unavailable("connection refused")
            } else {
                Error::registry(100, format!("Key not found ({key})"))
            });
        }

        Ok(RegistryNode {
            key: key.to_string(),
            value: (!options.dir && !options.refresh).then(|| value.to_string()),
            dir: options.dir,
            ttl: options.ttl.map(|ttl| ttl.as_secs() as i64),
        })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.calls.lock().unwrap().push(RegistryCall::Delete {
            key: key.to_string(),
        });

        if self.fail_delete {
            return Err(Error::unavailable("connection refused"));
        }
        Ok(())
    }

    fn registry_name(&self) -> &'static str {
        "recording"
    }
}

/// A registry that parks the refresh of one key until the test releases it
pub struct GatedRegistry {
    inner: RecordingRegistry,
    gated_key: String,
    gate: Arc<Semaphore>,
    entered_tx: mpsc::UnboundedSender<String>,
}

impl GatedRegistry {
    /// Returns the registry, the gate to release it, and a receiver that
    /// yields the key each time a gated refresh starts waiting
    pub fn new(
        inner: RecordingRegistry,
        gated_key: &str,
    ) -> (Self, Arc<Semaphore>, mpsc::UnboundedReceiver<String>) {
        let gate = Arc::new(Semaphore::new(0));
        let (entered_tx, entered_rx) = mpsc::unbounded_channel();

        let registry = Self {
            inner,
            gated_key: gated_key.to_string(),
            gate: Arc::clone(&gate),
            entered_tx,
        };

        (registry, gate, entered_rx)
    }
}

#[async_trait::async_trait]
impl KeyValueRegistry for GatedRegistry {
    async fn set(&self, key: &str, value: &str, options: &SetOptions) -> Result<RegistryNode> {
        if options.refresh && key == self.gated_key {
            let _ = self.entered_tx.send(key.to_string());
            self.gate
                .acquire()
                .await
                .map_err(|e| Error::Other(e.to_string()))?
                .forget();
        }
        self.inner.set(key, value, options).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.delete(key).await
    }

    fn registry_name(&self) -> &'static str {
        "gated"
    }
}

/// A DNS provider that records upserts
pub struct MockDnsProvider {
    records: Arc<Mutex<Vec<RecordSet>>>,
    result: std::result::Result<UpsertResult, String>,
    pub name: &'static str,
}

impl MockDnsProvider {
    pub fn new(name: &'static str) -> Self {
        Self {
            records: Arc::new(Mutex::new(Vec::new())),
            result: Ok(UpsertResult::Created),
            name,
        }
    }

    /// Create a provider that fails every upsert with `message`
    pub fn failing(name: &'static str, message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
            ..Self::new(name)
        }
    }

    /// Create a provider that shares the record log with `other`
    pub fn sharing_records_with(other: &Self) -> Self {
        Self {
            records: Arc::clone(&other.records),
            result: other.result.clone(),
            name: other.name,
        }
    }

    pub fn upserted(&self) -> Vec<RecordSet> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl DnsProvider for MockDnsProvider {
    async fn upsert_record(&self, record: &RecordSet) -> Result<UpsertResult> {
        self.records.lock().unwrap().push(record.clone());
        self.result.clone().map_err(|message| Error::http(message))
    }

    fn provider_name(&self) -> &'static str {
        self.name
    }
}

/// The address every test registers
pub fn address() -> IpAddr {
    IpAddr::from([10, 0, 0, 5])
}

/// A configuration with a one-second interval
pub fn config(key: &str) -> RegistrationConfig {
    RegistrationConfig::new(key).with_interval(Duration::from_secs(1))
}

/// A tick source driven by the test
pub fn manual_ticks() -> (mpsc::UnboundedSender<()>, UnboundedReceiverStream<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, UnboundedReceiverStream::new(rx))
}

/// A shutdown future triggered by the returned sender
///
/// Dropping the sender also triggers shutdown.
pub fn shutdown_trigger() -> (oneshot::Sender<()>, impl Future<Output = ()> + Send + 'static) {
    let (tx, rx) = oneshot::channel::<()>();
    (tx, async move {
        let _ = rx.await;
    })
}

/// Wait (up to 5 seconds) for an event matching `predicate`
pub async fn wait_for_event<F>(
    rx: &mut mpsc::Receiver<EngineEvent>,
    mut predicate: F,
) -> EngineEvent
where
    F: FnMut(&EngineEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(event) = rx.recv().await {
            if predicate(&event) {
                return event;
            }
        }
        panic!("event channel closed before the expected event");
    })
    .await
    .expect("event arrives within 5 seconds")
}

/// Wait for the given tick to complete
pub async fn wait_for_tick(rx: &mut mpsc::Receiver<EngineEvent>, tick: u64) {
    wait_for_event(rx, |event| {
        matches!(event, EngineEvent::TickCompleted { tick: t, .. } if *t == tick)
    })
    .await;
}
