// # CIDR Descriptor
//
// Parses `"<address>/<prefix-length>"` into a structured descriptor.
//
// The address keeps its host bits: `192.168.1.10/24` describes the host
// 192.168.1.10 on 192.168.1.0/24, which is what hostname.if needs. The
// family is recorded at parse time so callers never have to infer it from
// a failing IPv4-only computation.

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use crate::error::{Error, Result};

/// Address family of a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    /// Prefix length that denotes a single host
    pub fn host_prefix_len(self) -> u8 {
        match self {
            AddressFamily::V4 => 32,
            AddressFamily::V6 => 128,
        }
    }
}

/// A parsed address with its prefix length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cidr {
    net: IpNet,
}

impl Cidr {
    /// Parse an `address/prefix` literal
    ///
    /// Fails with `Error::MalformedAddress` when the separator is missing,
    /// the address does not parse, or the prefix is out of range for the
    /// address family.
    pub fn parse(literal: &str) -> Result<Self> {
        let (address, prefix) = literal.split_once('/').ok_or_else(|| {
            Error::malformed(format!("{:?}: missing '/' prefix separator", literal))
        })?;

        let address: IpAddr = address
            .parse()
            .map_err(|_| Error::malformed(format!("{:?}: invalid IP address", literal)))?;

        if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::malformed(format!(
                "{:?}: invalid prefix length",
                literal
            )));
        }
        let prefix: u8 = prefix
            .parse()
            .map_err(|_| Error::malformed(format!("{:?}: prefix length out of range", literal)))?;

        Self::new(address, prefix)
    }

    /// Build a descriptor from the separate fields stored on a record
    pub fn from_parts(address: &str, prefix: u8) -> Result<Self> {
        Self::parse(&format!("{}/{}", address, prefix))
    }

    /// Build a descriptor from an already-parsed address
    pub fn new(address: IpAddr, prefix: u8) -> Result<Self> {
        let net = match address {
            IpAddr::V4(v4) => Ipv4Net::new(v4, prefix).map(IpNet::V4),
            IpAddr::V6(v6) => Ipv6Net::new(v6, prefix).map(IpNet::V6),
        }
        .map_err(|_| {
            Error::malformed(format!(
                "{}/{}: prefix length out of range for address family",
                address, prefix
            ))
        })?;
        Ok(Self { net })
    }

    /// The address as written, host bits included
    pub fn address(&self) -> IpAddr {
        self.net.addr()
    }

    pub fn prefix_len(&self) -> u8 {
        self.net.prefix_len()
    }

    pub fn family(&self) -> AddressFamily {
        match self.net {
            IpNet::V4(_) => AddressFamily::V4,
            IpNet::V6(_) => AddressFamily::V6,
        }
    }

    /// Subnet mask implied by the prefix length
    pub fn netmask(&self) -> IpAddr {
        self.net.netmask()
    }

    /// The network this address belongs to (host bits cleared)
    pub fn network(&self) -> IpNet {
        self.net.trunc()
    }

    /// Whether the prefix denotes a single host (/32 or /128)
    pub fn is_host(&self) -> bool {
        self.prefix_len() == self.family().host_prefix_len()
    }

    /// The IPv4 netmask in dotted-decimal form
    ///
    /// Fails on an IPv6 descriptor.
    pub fn ipv4_mask(&self) -> Result<Ipv4Addr> {
        match self.net {
            IpNet::V4(net) => Ok(net.netmask()),
            IpNet::V6(_) => Err(Error::invalid_input(format!(
                "{}: IPv4 netmask requested for an IPv6 address",
                self
            ))),
        }
    }
}

impl FromStr for Cidr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address(), self.prefix_len())
    }
}

/// Parse an `address/prefix` literal into a [`Cidr`]
pub fn parse_cidr(literal: &str) -> Result<Cidr> {
    Cidr::parse(literal)
}
