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
//! Overlay network configuration.
//!
//! The configuration is stored as JSON with PascalCase keys:
//!
//! ```json
//! { "Network": "10.1.0.0/16", "SubnetLen": 24 }
//! ```

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Subnet length used when the network is large enough.
pub const DEFAULT_SUBNET_LEN: u8 = 24;
/// Longest subnet prefix that still leaves room for hosts.
pub const MAX_SUBNET_LEN: u8 = 30;

/// Network configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration is not valid JSON or misses fields.
    #[error("failed to parse network config: {0}")]
    Parse(#[from] serde_json::Error),
    /// The subnet prefix is too long.
    #[error("SubnetLen must be at most /{MAX_SUBNET_LEN}, got /{0}")]
    SubnetLenTooLarge(u8),
    /// The network cannot hold enough subnets.
    #[error("network {network} must accommodate at least four /{subnet_len} subnets")]
    NetworkTooSmall {
        /// The configured network.
        network: Ipv4Net,
        /// The configured subnet length.
        subnet_len: u8,
    },
    /// A subnet bound lies outside the network.
    #[error("{bound} {addr} is not in network {network}")]
    BoundNotInNetwork {
        /// Name of the bound.
        bound: &'static str,
        /// The bound's address.
        addr: Ipv4Addr,
        /// The configured network.
        network: Ipv4Net,
    },
    /// A subnet bound does not start a subnet.
    #[error("{bound} {addr} is not on a /{subnet_len} boundary")]
    BoundMisaligned {
        /// Name of the bound.
        bound: &'static str,
        /// The bound's address.
        addr: Ipv4Addr,
        /// The configured subnet length.
        subnet_len: u8,
    },
    /// SubnetMin is past SubnetMax.
    #[error("SubnetMin {min} is larger than SubnetMax {max}")]
    EmptyRange {
        /// Lower bound.
        min: Ipv4Addr,
        /// Upper bound.
        max: Ipv4Addr,
    },
}

/// Serialized form of a [NetworkConfig].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkConfigDto {
    /// The overlay network all subnets are carved from.
    pub network: Ipv4Net,
    /// Prefix length of a single subnet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet_len: Option<u8>,
    /// First subnet that may be handed out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet_min: Option<Ipv4Addr>,
    /// Last subnet that may be handed out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet_max: Option<Ipv4Addr>,
}

/// Validated overlay network configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkConfig {
    network: Ipv4Net,
    subnet_len: u8,
    subnet_min: Ipv4Addr,
    subnet_max: Ipv4Addr,
}

impl NetworkConfig {
    /// Creates a configuration for `network` using the default subnet length and bounds.
    pub fn new(network: Ipv4Net) -> Result<Self, ConfigError> {
        Self::try_from(NetworkConfigDto {
            network,
            subnet_len: None,
            subnet_min: None,
            subnet_max: None,
        })
    }

    /// Parses and validates a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let dto: NetworkConfigDto = serde_json::from_str(json)?;
        Self::try_from(dto)
    }

    /// The overlay network.
    pub fn network(&self) -> Ipv4Net {
        self.network
    }

    /// Prefix length of a single subnet.
    pub fn subnet_len(&self) -> u8 {
        self.subnet_len
    }

    /// First subnet that may be handed out.
    pub fn subnet_min(&self) -> Ipv4Net {
        subnet(self.subnet_min, self.subnet_len)
    }

    /// Last subnet that may be handed out.
    pub fn subnet_max(&self) -> Ipv4Net {
        subnet(self.subnet_max, self.subnet_len)
    }

    /// Number of addresses in one subnet.
    pub fn subnet_size(&self) -> u64 {
        1u64 << (32 - self.subnet_len)
    }

    /// Number of subnets between SubnetMin and SubnetMax, both included.
    pub fn subnet_count(&self) -> u64 {
        (u64::from(self.subnet_max.to_bits()) - u64::from(self.subnet_min.to_bits()))
            / self.subnet_size()
            + 1
    }
}

impl TryFrom<NetworkConfigDto> for NetworkConfig {
    type Error = ConfigError;

    fn try_from(value: NetworkConfigDto) -> Result<Self, Self::Error> {
        let network = value.network.trunc();
        let prefix_len = network.prefix_len();

        let subnet_len = value.subnet_len.unwrap_or(if prefix_len < DEFAULT_SUBNET_LEN {
            DEFAULT_SUBNET_LEN
        } else {
            prefix_len + 2
        });
        if subnet_len > MAX_SUBNET_LEN {
            return Err(ConfigError::SubnetLenTooLarge(subnet_len));
        }
        if subnet_len < prefix_len + 2 {
            return Err(ConfigError::NetworkTooSmall {
                network,
                subnet_len,
            });
        }

        let size = 1u64 << (32 - subnet_len);
        let first = u64::from(network.network().to_bits());
        let end = first + (1u64 << (32 - prefix_len));

        // The first subnet is skipped by default.
        let subnet_min = value
            .subnet_min
            .unwrap_or_else(|| Ipv4Addr::from_bits((first + size) as u32));
        let subnet_max = value
            .subnet_max
            .unwrap_or_else(|| Ipv4Addr::from_bits((end - size) as u32));

        for (bound, addr) in [("SubnetMin", subnet_min), ("SubnetMax", subnet_max)] {
            if !network.contains(&addr) {
                return Err(ConfigError::BoundNotInNetwork {
                    bound,
                    addr,
                    network,
                });
            }
            if u64::from(addr.to_bits()) % size != 0 {
                return Err(ConfigError::BoundMisaligned {
                    bound,
                    addr,
                    subnet_len,
                });
            }
        }
        if subnet_min > subnet_max {
            return Err(ConfigError::EmptyRange {
                min: subnet_min,
                max: subnet_max,
            });
        }

        Ok(Self {
            network,
            subnet_len,
            subnet_min,
            subnet_max,
        })
    }
}

impl From<&NetworkConfig> for NetworkConfigDto {
    fn from(config: &NetworkConfig) -> Self {
        Self {
            network: config.network,
            subnet_len: Some(config.subnet_len),
            subnet_min: Some(config.subnet_min),
            subnet_max: Some(config.subnet_max),
        }
    }
}

fn subnet(addr: Ipv4Addr, len: u8) -> Ipv4Net {
    // Lengths are validated to be at most MAX_SUBNET_LEN.
    Ipv4Net::new_assert(addr, len)
}
