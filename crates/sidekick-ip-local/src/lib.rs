// # Local Address Source
//
// Reads the addresses assigned to this host's network interfaces.
//
// ## Platform Support
//
// Unix only, through `getifaddrs(3)` as wrapped by `nix`. Entries come back
// in the order the kernel reports them, loopback included; filtering is left to
// `sidekick_core::select_address`. On other platforms enumeration fails
// with `Error::InterfaceEnumerationFailed`.

use sidekick_core::traits::{AddressSource, InterfaceAddress};
use sidekick_core::{Error, Result};

/// Interface table of the local host
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalAddressSource;

impl LocalAddressSource {
    pub fn new() -> Self {
        Self
    }
}

impl AddressSource for LocalAddressSource {
    fn interface_addresses(&self) -> Result<Vec<InterfaceAddress>> {
        let addresses = imp::interface_addresses()?;
        tracing::debug!("Found {} interface address(es)", addresses.len());
        Ok(addresses)
    }

    fn source_name(&self) -> &'static str {
        "local"
    }
}

#[cfg(unix)]
mod imp {
    use super::*;
    use nix::ifaddrs::getifaddrs;
    use nix::sys::socket::SockaddrStorage;
    use std::net::{IpAddr, SocketAddrV4, SocketAddrV6};

    pub fn interface_addresses() -> Result<Vec<InterfaceAddress>> {
        let entries = getifaddrs().map_err(|e| Error::enumeration(e.to_string()))?;

        Ok(entries
            .filter_map(|entry| {
                let ip = entry.address.as_ref().and_then(socket_ip)?;
                Some(InterfaceAddress::new(entry.interface_name, ip))
            })
            .collect())
    }

    /// IPv4/IPv6 address of a socket address; other families are skipped
    pub(super) fn socket_ip(addr: &SockaddrStorage) -> Option<IpAddr> {
        if let Some(sin) = addr.as_sockaddr_in() {
            return Some(IpAddr::V4(*SocketAddrV4::from(*sin).ip()));
        }
        addr.as_sockaddr_in6()
            .map(|sin6| IpAddr::V6(*SocketAddrV6::from(*sin6).ip()))
    }
}

#[cfg(not(unix))]
mod imp {
    use super::*;

    pub fn interface_addresses() -> Result<Vec<InterfaceAddress>> {
        Err(Error::enumeration(
            "Local interface enumeration is only supported on Unix",
        ))
    }
}
