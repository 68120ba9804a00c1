// Copyright (c) 2025 - Cowboy AI, Inc.
//! Network Value Objects with Validation Invariants
//!
//! Subnets, VLAN tags and per-segment address allocation for the
//! experiment data plane.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use thiserror::Error;

/// Network validation error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("Invalid CIDR notation: {0}")]
    InvalidCidr(String),

    #[error("Invalid prefix length: {0} (must be 0-32 for IPv4, 0-128 for IPv6)")]
    InvalidPrefixLength(u8),

    #[error("Invalid VLAN ID: {0} (must be 1-4094)")]
    InvalidVlanId(u16),

    #[error("Address {address} is outside subnet {subnet}")]
    OutsideSubnet { address: IpAddr, subnet: String },

    #[error("Address {0} is already allocated")]
    AddressInUse(IpAddr),

    #[error("Subnet {0} has no free host addresses")]
    Exhausted(String),
}

/// VLAN ID value object
///
/// IEEE 802.1Q tag in the range 1-4094; 0 and 4095 are reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct VlanId(u16);

impl VlanId {
    /// Minimum valid VLAN ID
    pub const MIN: u16 = 1;

    /// Maximum valid VLAN ID
    pub const MAX: u16 = 4094;

    /// Tag used for point-to-point services when neither side asks for one
    pub const P2P_DEFAULT: VlanId = VlanId(100);

    pub fn new(id: u16) -> Result<Self, NetworkError> {
        if !(Self::MIN..=Self::MAX).contains(&id) {
            return Err(NetworkError::InvalidVlanId(id));
        }

        Ok(Self(id))
    }

    pub fn value(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for VlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u16> for VlanId {
    type Error = NetworkError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<VlanId> for u16 {
    fn from(vlan: VlanId) -> Self {
        vlan.0
    }
}

/// IPv4 or IPv6 network in CIDR notation
///
/// Invariants:
/// - Prefix length fits the address family
/// - Host bits of the network address are zero
///
/// # Examples
///
/// ```rust
/// use slice_orchestrator::domain::Subnet;
///
/// let subnet = Subnet::new("10.20.0.0/24").unwrap();
/// assert_eq!(subnet.gateway().unwrap().to_string(), "10.20.0.1");
/// assert!(Subnet::new("10.20.0.5/24").is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Subnet {
    network: IpAddr,
    prefix_length: u8,
}

impl Subnet {
    pub fn new(cidr: impl AsRef<str>) -> Result<Self, NetworkError> {
        let cidr = cidr.as_ref();
        let (addr_str, prefix_str) = cidr
            .split_once('/')
            .ok_or_else(|| NetworkError::InvalidCidr(cidr.to_string()))?;

        let network = IpAddr::from_str(addr_str)
            .map_err(|_| NetworkError::InvalidIpAddress(addr_str.to_string()))?;
        let prefix_length = prefix_str
            .parse::<u8>()
            .map_err(|_| NetworkError::InvalidCidr(cidr.to_string()))?;

        Self::from_parts(network, prefix_length)
            .and_then(|subnet| {
                if subnet.network == network {
                    Ok(subnet)
                } else {
                    Err(NetworkError::InvalidCidr(cidr.to_string()))
                }
            })
    }

    /// Build from an address and prefix, masking off host bits
    pub fn from_parts(address: IpAddr, prefix_length: u8) -> Result<Self, NetworkError> {
        let bits = family_bits(&address);
        if prefix_length > bits {
            return Err(NetworkError::InvalidPrefixLength(prefix_length));
        }

        let masked = to_u128(&address) & mask(bits, prefix_length);
        Ok(Self {
            network: from_u128(&address, masked),
            prefix_length,
        })
    }

    pub fn network(&self) -> IpAddr {
        self.network
    }

    pub fn prefix_length(&self) -> u8 {
        self.prefix_length
    }

    pub fn is_ipv4(&self) -> bool {
        self.network.is_ipv4()
    }

    /// Whether `address` lies inside this subnet
    pub fn contains(&self, address: &IpAddr) -> bool {
        if address.is_ipv4() != self.network.is_ipv4() {
            return false;
        }
        let bits = family_bits(&self.network);
        to_u128(address) & mask(bits, self.prefix_length) == to_u128(&self.network)
    }

    /// Usable host addresses in ascending order
    ///
    /// Skips the network address, and the broadcast address on IPv4
    /// subnets larger than a point-to-point /31.
    pub fn hosts(&self) -> impl Iterator<Item = IpAddr> + '_ {
        let bits = family_bits(&self.network);
        let host_bits = u32::from(bits - self.prefix_length);
        let base = to_u128(&self.network);
        let size: u128 = if host_bits >= 128 { u128::MAX } else { 1u128 << host_bits };

        let (first, last) = match (self.network, host_bits) {
            (_, 0) => (0, 0),
            (IpAddr::V4(_), 1) => (0, 1),
            (IpAddr::V4(_), _) => (1, size - 2),
            (IpAddr::V6(_), _) => (1, size - 1),
        };
        let empty = host_bits == 0;

        (first..=last)
            .filter(move |_| !empty)
            .map(move |offset| from_u128(&self.network, base + offset))
    }

    /// Conventional gateway: the first usable host
    pub fn gateway(&self) -> Option<IpAddr> {
        self.hosts().next()
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_length)
    }
}

impl FromStr for Subnet {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Subnet {
    type Error = NetworkError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Subnet> for String {
    fn from(subnet: Subnet) -> Self {
        subnet.to_string()
    }
}

/// Host address bookkeeping for one segment subnet
///
/// The gateway is reserved up front so it is never handed to an interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpAllocator {
    subnet: Subnet,
    allocated: BTreeSet<IpAddr>,
}

impl IpAllocator {
    pub fn new(subnet: Subnet) -> Self {
        let mut allocated = BTreeSet::new();
        if let Some(gateway) = subnet.gateway() {
            allocated.insert(gateway);
        }
        Self { subnet, allocated }
    }

    pub fn subnet(&self) -> &Subnet {
        &self.subnet
    }

    /// Claim a specific address
    pub fn allocate(&mut self, address: IpAddr) -> Result<IpAddr, NetworkError> {
        if !self.subnet.contains(&address) || address == self.subnet.network() {
            return Err(NetworkError::OutsideSubnet {
                address,
                subnet: self.subnet.to_string(),
            });
        }
        if !self.allocated.insert(address) {
            return Err(NetworkError::AddressInUse(address));
        }
        Ok(address)
    }

    /// Claim the lowest free host address
    pub fn allocate_next(&mut self) -> Result<IpAddr, NetworkError> {
        let next = self
            .subnet
            .hosts()
            .find(|host| !self.allocated.contains(host))
            .ok_or_else(|| NetworkError::Exhausted(self.subnet.to_string()))?;
        self.allocated.insert(next);
        Ok(next)
    }

    /// Return an address to the pool; the gateway stays reserved
    pub fn free(&mut self, address: &IpAddr) -> bool {
        if Some(*address) == self.subnet.gateway() {
            return false;
        }
        self.allocated.remove(address)
    }

    pub fn allocated(&self) -> impl Iterator<Item = &IpAddr> {
        self.allocated.iter()
    }
}

fn family_bits(address: &IpAddr) -> u8 {
    match address {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

fn mask(bits: u8, prefix_length: u8) -> u128 {
    let host_bits = u32::from(bits - prefix_length);
    let all = if bits == 128 { u128::MAX } else { (1u128 << bits) - 1 };
    if host_bits >= 128 {
        0
    } else {
        all & !((1u128 << host_bits) - 1)
    }
}

fn to_u128(address: &IpAddr) -> u128 {
    match address {
        IpAddr::V4(v4) => u128::from(u32::from(*v4)),
        IpAddr::V6(v6) => u128::from(*v6),
    }
}

fn from_u128(family: &IpAddr, value: u128) -> IpAddr {
    match family {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::from(value as u32)),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::from(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_subnet_parsing() {
        let subnet = Subnet::new("192.168.1.0/24").unwrap();
        assert_eq!(subnet.network(), ip("192.168.1.0"));
        assert_eq!(subnet.prefix_length(), 24);
        assert!(subnet.is_ipv4());
        assert_eq!(subnet.to_string(), "192.168.1.0/24");
    }

    #[test]
    fn test_invalid_subnets() {
        assert!(Subnet::new("192.168.1.0").is_err());
        assert!(Subnet::new("192.168.1.0/33").is_err());
        assert!(Subnet::new("2001:db8::/129").is_err());
        assert!(Subnet::new("192.168.1.7/24").is_err()); // host bits set
        assert!(Subnet::new("not-an-ip/24").is_err());
    }

    #[test]
    fn test_contains() {
        let subnet = Subnet::new("10.0.0.0/30").unwrap();
        assert!(subnet.contains(&ip("10.0.0.2")));
        assert!(!subnet.contains(&ip("10.0.0.4")));
        assert!(!subnet.contains(&ip("2001:db8::1")));
    }

    #[test]
    fn test_ipv4_hosts_skip_network_and_broadcast() {
        let subnet = Subnet::new("10.0.0.0/30").unwrap();
        let hosts: Vec<_> = subnet.hosts().collect();
        assert_eq!(hosts, vec![ip("10.0.0.1"), ip("10.0.0.2")]);
        assert_eq!(subnet.gateway(), Some(ip("10.0.0.1")));
    }

    #[test]
    fn test_ipv6_gateway() {
        let subnet = Subnet::new("2001:db8:1::/64").unwrap();
        assert_eq!(subnet.gateway(), Some(ip("2001:db8:1::1")));
    }

    #[test]
    fn test_allocator_reserves_gateway() {
        let mut alloc = IpAllocator::new(Subnet::new("10.0.0.0/29").unwrap());
        assert_eq!(alloc.allocate_next().unwrap(), ip("10.0.0.2"));
        assert_eq!(
            alloc.allocate(ip("10.0.0.1")),
            Err(NetworkError::AddressInUse(ip("10.0.0.1")))
        );
        assert!(!alloc.free(&ip("10.0.0.1")));
    }

    #[test]
    fn test_allocator_explicit_and_free() {
        let mut alloc = IpAllocator::new(Subnet::new("10.0.0.0/29").unwrap());
        assert_eq!(alloc.allocate(ip("10.0.0.5")).unwrap(), ip("10.0.0.5"));
        assert!(alloc.allocate(ip("10.0.0.5")).is_err());
        assert!(matches!(
            alloc.allocate(ip("10.0.1.5")),
            Err(NetworkError::OutsideSubnet { .. })
        ));
        assert!(alloc.free(&ip("10.0.0.5")));
        assert_eq!(alloc.allocate(ip("10.0.0.5")).unwrap(), ip("10.0.0.5"));
    }

    #[test]
    fn test_allocator_exhaustion() {
        let mut alloc = IpAllocator::new(Subnet::new("10.0.0.0/30").unwrap());
        assert_eq!(alloc.allocate_next().unwrap(), ip("10.0.0.2"));
        assert!(matches!(alloc.allocate_next(), Err(NetworkError::Exhausted(_))));
    }

    #[test]
    fn test_vlan_id() {
        assert!(VlanId::new(100).is_ok());
        assert!(VlanId::new(0).is_err());
        assert!(VlanId::new(4095).is_err());
        assert_eq!(VlanId::P2P_DEFAULT.value(), 100);
    }

    #[test]
    fn test_vlan_serde_rejects_reserved() {
        assert!(serde_json::from_str::<VlanId>("4095").is_err());
        assert_eq!(serde_json::from_str::<VlanId>("200").unwrap().value(), 200);
    }
}
