//! Core traits for the sidekick agent
//!
//! This module defines the abstract interfaces the agent talks to.
//!
//! - [`AddressSource`]: Enumerate local interface addresses
//! - [`KeyValueRegistry`]: Set and delete keys in a hierarchical store
//! - [`DnsProvider`]: Upsert DNS records via provider APIs

pub mod address_source;
pub mod dns_provider;
pub mod kv_registry;

pub use address_source::{AddressSource, InterfaceAddress};
pub use dns_provider::{DnsProvider, RecordSet, RecordType, UpsertResult};
pub use kv_registry::{KeyValueRegistry, RegistryNode, SetOptions};
