// # Address Source Trait
//
// Defines the interface for reading the local interface table.
//
// ## Implementations
//
// - getifaddrs-based (unix): `sidekick-ip-local` crate
//
// ## Usage
//
// ```rust,ignore
// use sidekick_core::{AddressSource, NetworkPrefix, select_address};
//
// let source = /* AddressSource implementation */;
// let prefix: NetworkPrefix = "10.0.0.0/8".parse()?;
// let ip = select_address(&source, &prefix)?;
// ```

use std::fmt;
use std::net::IpAddr;

/// One address assigned to a local network interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceAddress {
    /// Interface name (e.g. "eth0")
    pub interface: String,
    /// The assigned address
    pub ip: IpAddr,
}

impl InterfaceAddress {
    pub fn new(interface: impl Into<String>, ip: IpAddr) -> Self {
        Self {
            interface: interface.into(),
            ip,
        }
    }
}

impl fmt::Display for InterfaceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.ip, self.interface)
    }
}

/// Trait for interface table implementations
///
/// Enumeration is a single synchronous system call; implementations must
/// not cache results between calls and must preserve the order the OS
/// reports addresses in, since selection returns the first match.
pub trait AddressSource: Send + Sync {
    /// List every address currently assigned to a local interface
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<InterfaceAddress>)`: All addresses, loopback included
    /// - `Err(Error::InterfaceEnumerationFailed)`: If the table cannot be read
    fn interface_addresses(&self) -> Result<Vec<InterfaceAddress>, crate::Error>;

    /// Get the source name (for logging/debugging)
    fn source_name(&self) -> &'static str;
}
