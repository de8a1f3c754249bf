// Copyright 2025 Anapaya Systems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Lease data model shared between the client and the registry.

use std::{fmt, net::Ipv4Addr, str::FromStr, time::SystemTime};

use ipnet::Ipv4Net;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An IPv4 address in the registry's representation (host byte order).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Ip4(u32);

impl Ip4 {
    /// Creates an address from its host-order bits.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Returns the host-order bits of the address.
    pub const fn to_bits(self) -> u32 {
        self.0
    }

    /// Returns the address as a standard library IPv4 address.
    pub const fn to_ipv4(self) -> Ipv4Addr {
        Ipv4Addr::from_bits(self.0)
    }
}

impl From<Ipv4Addr> for Ip4 {
    fn from(addr: Ipv4Addr) -> Self {
        Self(addr.to_bits())
    }
}

impl From<Ip4> for Ipv4Addr {
    fn from(ip: Ip4) -> Self {
        ip.to_ipv4()
    }
}

impl fmt::Display for Ip4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.to_ipv4(), f)
    }
}

impl FromStr for Ip4 {
    type Err = std::net::AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ipv4Addr::from_str(s).map(Self::from)
    }
}

impl Serialize for Ip4 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Ip4 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The endpoint a participant advertises together with its lease.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseAttributes {
    /// Publicly reachable address of the host.
    #[serde(rename = "PublicIP")]
    pub public_ip: Ip4,
    /// Port of the host's HTTP endpoint, kept as given by the caller.
    #[serde(rename = "HTTPPort")]
    pub http_port: String,
}

impl LeaseAttributes {
    /// Creates lease attributes for the given endpoint.
    pub fn new(public_ip: impl Into<Ip4>, http_port: impl Into<String>) -> Self {
        Self {
            public_ip: public_ip.into(),
            http_port: http_port.into(),
        }
    }
}

/// A subnet granted by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetLease {
    /// The leased network.
    pub subnet: Ipv4Net,
    /// The attributes the lease was granted for.
    pub attrs: LeaseAttributes,
    /// Point in time after which the registry may hand the subnet to someone else.
    pub expiration: SystemTime,
}

/// The network configuration handed to the caller after a successful acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubnetDefinition {
    /// The leased network.
    pub net: Ipv4Net,
    /// MTU of the external interface.
    pub mtu: u32,
}

/// The external interface the overlay traffic leaves through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInfo {
    /// Interface name, e.g. `eth0`.
    pub name: String,
    /// Interface index.
    pub index: u32,
    /// Interface MTU in bytes.
    pub mtu: u32,
}

impl InterfaceInfo {
    /// Creates the description of an interface.
    pub fn new(name: impl Into<String>, index: u32, mtu: u32) -> Self {
        Self {
            name: name.into(),
            index,
            mtu,
        }
    }
}
