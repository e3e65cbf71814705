// # sidekick-core
//
// Core library for the sidekick self-registration agent.
//
// ## Architecture Overview
//
// A sidekick runs next to a workload, finds the workload's routable address
// and publishes it:
// - **AddressSource**: Trait for enumerating local interface addresses
// - **KeyValueRegistry**: Trait for the hierarchical key-value store (etcd v2)
// - **DnsProvider**: Trait for upserting DNS records via provider APIs
// - **RegistrationEngine**: Writes the leaf key, keeps the leaf and every
//   directory above it (down from the keep root) alive, deletes the leaf on
//   shutdown
// - **RecordPublisher**: One-shot DNS upsert of the selected address
//
// ## Design Principles
//
// 1. **Fail fast**: Registry errors terminate the agent; the scheduler restarts it
// 2. **Single thread of control**: One task races refresh ticks against shutdown
// 3. **Library-first**: The binary is a thin layer over this crate
// 4. **Explicit configuration**: Immutable config values passed in at construction

pub mod address;
pub mod config;
pub mod engine;
pub mod error;
pub mod path;
pub mod publisher;
pub mod shutdown;
pub mod traits;

// Re-export core types for convenience
pub use address::{NetworkPrefix, select_address, select_address_str};
pub use config::{PublishConfig, RegistrationConfig};
pub use engine::{EngineEvent, RegistrationEngine, RegistrationState};
pub use error::{Error, Result};
pub use path::{Decomposition, PathSegment, decompose};
pub use publisher::RecordPublisher;
pub use shutdown::ShutdownSignal;
pub use traits::{AddressSource, DnsProvider, KeyValueRegistry};
