//! Address selection
//!
//! Picks the workload's routable address: the first non-loopback local
//! interface address inside an operator-supplied CIDR prefix.

use crate::error::{Error, Result};
use crate::traits::AddressSource;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use tracing::{debug, trace};

/// An IPv4 or IPv6 network in CIDR notation
///
/// Host bits are masked off on parse, so `10.1.2.3/8` and `10.0.0.0/8`
/// describe the same network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NetworkPrefix {
    network: IpAddr,
    len: u8,
}

impl NetworkPrefix {
    /// Create a prefix, masking host bits
    ///
    /// # Returns
    ///
    /// - `Err(Error::InvalidPrefix)`: If `len` exceeds the address width
    pub fn new(addr: IpAddr, len: u8) -> Result<Self> {
        let max = max_len(&addr);
        if len > max {
            return Err(Error::invalid_prefix(
                format!("{addr}/{len}"),
                format!("prefix length must be at most {max}"),
            ));
        }

        Ok(Self {
            network: mask(addr, len),
            len,
        })
    }

    /// The network address (host bits zeroed)
    pub fn network(&self) -> IpAddr {
        self.network
    }

    /// The prefix length in bits
    pub fn prefix_len(&self) -> u8 {
        self.len
    }

    /// Check whether `ip` lies inside this network
    ///
    /// IPv4-mapped IPv6 addresses are matched against IPv4 prefixes as
    /// their IPv4 form. Addresses of the other family never match.
    pub fn contains(&self, ip: &IpAddr) -> bool {
        let candidate = match self.network {
            IpAddr::V4(_) => ip.to_canonical(),
            IpAddr::V6(_) => *ip,
        };

        match (self.network, candidate) {
            (IpAddr::V4(_), IpAddr::V4(_)) | (IpAddr::V6(_), IpAddr::V6(_)) => {
                mask(candidate, self.len) == self.network
            }
            _ => false,
        }
    }
}

impl FromStr for NetworkPrefix {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let (addr, len) = trimmed
            .split_once('/')
            .ok_or_else(|| Error::invalid_prefix(s, "expected <address>/<length>"))?;

        let addr: IpAddr = addr
            .parse()
            .map_err(|e| Error::invalid_prefix(s, format!("{e}")))?;

        let len: u8 = len
            .parse()
            .map_err(|_| Error::invalid_prefix(s, format!("invalid prefix length '{len}'")))?;

        Self::new(addr, len)
    }
}

impl fmt::Display for NetworkPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.len)
    }
}

fn max_len(addr: &IpAddr) -> u8 {
    match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

fn mask(addr: IpAddr, len: u8) -> IpAddr {
    match addr {
        IpAddr::V4(v4) => {
            let bits = u32::from(v4);
            let mask = if len == 0 { 0 } else { u32::MAX << (32 - u32::from(len)) };
            IpAddr::V4(Ipv4Addr::from(bits & mask))
        }
        IpAddr::V6(v6) => {
            let bits = u128::from(v6);
            let mask = if len == 0 { 0 } else { u128::MAX << (128 - u32::from(len)) };
            IpAddr::V6(Ipv6Addr::from(bits & mask))
        }
    }
}

/// Select the first non-loopback interface address inside `prefix`
///
/// Addresses are considered in the order the source reports them.
///
/// # Returns
///
/// - `Ok(IpAddr)`: The selected address
/// - `Err(Error::InterfaceEnumerationFailed)`: If the interface table cannot be read
/// - `Err(Error::NoMatchingAddress)`: If no address qualifies
pub fn select_address<S>(source: &S, prefix: &NetworkPrefix) -> Result<IpAddr>
where
    S: AddressSource + ?Sized,
{
    let candidates = source.interface_addresses()?;
    debug!(
        "{} reported {} interface address(es)",
        source.source_name(),
        candidates.len()
    );

    for candidate in candidates {
        if candidate.ip.to_canonical().is_loopback() {
            trace!("Skipping loopback address {}", candidate);
            continue;
        }

        if prefix.contains(&candidate.ip) {
            debug!("Selected {} for prefix {}", candidate, prefix);
            return Ok(candidate.ip);
        }

        trace!("Address {} is outside {}", candidate, prefix);
    }

    Err(Error::NoMatchingAddress(prefix.to_string()))
}

/// Parse `cidr` and select a matching address
///
/// # Returns
///
/// - `Err(Error::InvalidPrefix)`: If `cidr` is malformed
/// - Otherwise as [`select_address`]
pub fn select_address_str<S>(source: &S, cidr: &str) -> Result<IpAddr>
where
    S: AddressSource + ?Sized,
{
    let prefix: NetworkPrefix = cidr.parse()?;
    select_address(source, &prefix)
}
