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
//! Integration tests for the overlay lease components
//!
//! This crate contains tests that run the allocation backend against a real
//! in-process registry, with several participants sharing one network.

use std::{net::Ipv4Addr, sync::Arc, time::Duration};

use overlay_lease_client::{Backend, InterfaceInfo, new_backend};
use overlay_subnet_registry::{
    config::NetworkConfig,
    local::{DEFAULT_RENEW_MARGIN, SharedLeaseManager},
    manager::LeaseManager,
};
use rand::SeedableRng as _;
use rand_chacha::ChaCha8Rng;

/// MTU of the external interface used by all participants.
pub const TEST_MTU: u32 = 1450;

/// Shared registry for integration tests.
pub struct LeaseTestEnv {
    /// The registry all participants lease from.
    pub manager: SharedLeaseManager,
    renew_margin: Duration,
}

impl LeaseTestEnv {
    /// Creates an environment leasing from `network` with default subnet sizes.
    pub fn new(network: &str) -> Self {
        let config = NetworkConfig::new(network.parse().unwrap()).unwrap();
        Self::from_manager(LeaseManager::new(config, ChaCha8Rng::seed_from_u64(42)))
    }

    /// Creates an environment with short lease lifetimes, so renewals happen
    /// within a test.
    pub fn with_short_leases(network: &str, lease_ttl: Duration, renew_margin: Duration) -> Self {
        let config = NetworkConfig::new(network.parse().unwrap()).unwrap();
        let manager =
            LeaseManager::new(config, ChaCha8Rng::seed_from_u64(42)).with_lease_ttl(lease_ttl);
        let mut env = Self::from_manager(manager);
        env.renew_margin = renew_margin;
        env
    }

    fn from_manager(manager: LeaseManager) -> Self {
        Self {
            manager: SharedLeaseManager::new(manager),
            renew_margin: DEFAULT_RENEW_MARGIN,
        }
    }

    /// Creates a new participant with its own registry handle.
    pub fn participant(&self) -> Arc<dyn Backend> {
        let registry = self
            .manager
            .registry()
            .with_renew_margin(self.renew_margin)
            .with_retry_delay(Duration::from_millis(10));
        new_backend(Arc::new(registry))
    }
}

/// The external interface used by all participants.
pub fn test_interface() -> InterfaceInfo {
    InterfaceInfo::new("eth0", 2, TEST_MTU)
}

/// Public IP of the `n`-th participant.
pub fn public_ip(n: u8) -> Ipv4Addr {
    Ipv4Addr::new(192, 168, 0, n)
}
