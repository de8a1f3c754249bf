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
//! The subnet environment file consumed by the data plane and container runtimes.

use std::{fmt, net::Ipv4Addr, path::Path};

use ipnet::Ipv4Net;
use overlay_lease_client::SubnetDefinition;
use overlay_utils::io::write_file_atomic;

/// Content of the subnet environment file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetEnv {
    /// The whole overlay network.
    pub network: Ipv4Net,
    /// The leased subnet, addressed by its first host address.
    pub subnet: Ipv4Net,
    /// MTU to use inside the overlay.
    pub mtu: u32,
    /// Whether traffic leaving the overlay is masqueraded.
    pub ip_masq: bool,
}

impl SubnetEnv {
    /// Creates the environment for the subnet in `def`.
    pub fn new(network: Ipv4Net, def: &SubnetDefinition, ip_masq: bool) -> Self {
        let first_host = Ipv4Addr::from_bits(def.net.network().to_bits().wrapping_add(1));
        Self {
            network,
            subnet: Ipv4Net::new_assert(first_host, def.net.prefix_len()),
            mtu: def.mtu,
            ip_masq,
        }
    }

    /// Writes the environment to `path`, replacing any previous content.
    pub async fn write(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        write_file_atomic(path, self.to_string().as_bytes()).await
    }
}

impl fmt::Display for SubnetEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "FLANNEL_NETWORK={}", self.network)?;
        writeln!(f, "FLANNEL_SUBNET={}", self.subnet)?;
        writeln!(f, "FLANNEL_MTU={}", self.mtu)?;
        writeln!(f, "FLANNEL_IPMASQ={}", self.ip_masq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_first_host_of_subnet() {
        let def = SubnetDefinition {
            net: "10.1.2.0/24".parse().unwrap(),
            mtu: 1450,
        };
        let env = SubnetEnv::new("10.1.0.0/16".parse().unwrap(), &def, true);

        assert_eq!(
            env.to_string(),
            "FLANNEL_NETWORK=10.1.0.0/16\n\
             FLANNEL_SUBNET=10.1.2.1/24\n\
             FLANNEL_MTU=1450\n\
             FLANNEL_IPMASQ=true\n"
        );
    }
}
