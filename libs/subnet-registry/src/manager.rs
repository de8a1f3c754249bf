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
//! Subnet lease book.

use std::{
    collections::BTreeMap,
    time::{Duration, SystemTime},
};

use ipnet::Ipv4Net;
use overlay_lease_client::{Ip4, LeaseAttributes, SubnetLease};
use rand_chacha::ChaCha8Rng;
use thiserror::Error;

use crate::{
    allocator::{SubnetAllocator, SubnetAllocatorError},
    config::NetworkConfig,
};

/// How long a lease is valid after it was acquired or renewed.
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Lease registration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LeaseRegistrationError {
    /// The subnet is leased to another host.
    #[error("subnet {subnet} is leased to {holder}")]
    LeaseHeldByOther {
        /// The requested subnet.
        subnet: Ipv4Net,
        /// Public IP of the current lease holder.
        holder: Ip4,
    },
    /// The lease expiration is not representable.
    #[error("lease lifetime {ttl:?} is too large")]
    LeaseTtlOverflow {
        /// The configured lease lifetime.
        ttl: Duration,
    },
    /// Subnet allocation error.
    #[error(transparent)]
    SubnetAllocatorError(#[from] SubnetAllocatorError),
}

// Internal structure to keep track of leases
#[derive(Debug, PartialEq, Eq, Clone)]
struct LeaseEntry {
    attrs: LeaseAttributes,
    expiration: SystemTime,
}

/// In-memory registry of subnet leases for one overlay network.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct LeaseManager {
    config: NetworkConfig,
    lease_ttl: Duration,
    /// Map between subnet and lease
    leases: BTreeMap<Ipv4Net, LeaseEntry>,
    free_subnets: SubnetAllocator,
}

impl LeaseManager {
    /// Creates a lease manager handing out the subnets of `config`.
    pub fn new(config: NetworkConfig, rng: ChaCha8Rng) -> Self {
        Self {
            free_subnets: SubnetAllocator::new(&config, rng),
            config,
            lease_ttl: DEFAULT_LEASE_TTL,
            leases: Default::default(),
        }
    }

    /// Set the lifetime of acquired and renewed leases.
    pub fn with_lease_ttl(mut self, lease_ttl: Duration) -> Self {
        self.lease_ttl = lease_ttl;
        self
    }

    /// The network configuration.
    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// The lifetime of acquired and renewed leases.
    pub fn lease_ttl(&self) -> Duration {
        self.lease_ttl
    }

    /// Acquires a lease for `attrs`.
    ///
    /// A host that already holds a lease (identified by its public IP) gets the
    /// same subnet back with a fresh expiration. Otherwise a random free subnet
    /// is allocated.
    pub fn acquire(
        &mut self,
        attrs: LeaseAttributes,
        now: SystemTime,
    ) -> Result<SubnetLease, LeaseRegistrationError> {
        let expiration = self.expiration(now)?;
        let existing = self
            .leases
            .iter()
            .find(|(_, entry)| entry.attrs.public_ip == attrs.public_ip)
            .map(|(subnet, _)| *subnet);

        let subnet = match existing {
            Some(subnet) => {
                tracing::debug!(%subnet, public_ip = %attrs.public_ip, "Reusing existing lease");
                subnet
            }
            None => self.free_subnets.allocate(None)?,
        };

        Ok(self.insert(subnet, attrs, expiration))
    }

    /// Extends the lease on `subnet` held by `attrs.public_ip`.
    ///
    /// If the lease is gone (e.g. it expired and was cleaned up) but the subnet
    /// is still free, it is claimed again.
    pub fn renew(
        &mut self,
        subnet: Ipv4Net,
        attrs: LeaseAttributes,
        now: SystemTime,
    ) -> Result<SubnetLease, LeaseRegistrationError> {
        let expiration = self.expiration(now)?;
        match self.leases.get(&subnet) {
            Some(entry) if entry.attrs.public_ip != attrs.public_ip => {
                return Err(LeaseRegistrationError::LeaseHeldByOther {
                    subnet,
                    holder: entry.attrs.public_ip,
                });
            }
            Some(_) => {}
            None => {
                self.free_subnets.allocate(Some(subnet))?;
                tracing::info!(%subnet, public_ip = %attrs.public_ip, "Reclaimed lapsed lease");
            }
        }

        Ok(self.insert(subnet, attrs, expiration))
    }

    /// Immediately releases the lease on `subnet`.
    ///
    /// Returns `true` if the lease existed and was released, otherwise `false`
    pub fn release(&mut self, subnet: Ipv4Net) -> bool {
        match self.leases.remove(&subnet) {
            Some(_) => {
                if let Err(e) = self.free_subnets.free(subnet) {
                    tracing::warn!(%subnet, error = %e, "Released lease was not allocated");
                }
                true
            }
            None => false,
        }
    }

    /// Returns all current leases, ordered by subnet.
    pub fn leases(&self) -> Vec<SubnetLease> {
        self.leases
            .iter()
            .map(|(subnet, entry)| to_lease(*subnet, entry))
            .collect()
    }

    /// Returns the lease on `subnet`, if any.
    pub fn lease(&self, subnet: Ipv4Net) -> Option<SubnetLease> {
        self.leases
            .get(&subnet)
            .map(|entry| to_lease(subnet, entry))
    }

    /// Number of subnets that can still be leased.
    ///
    /// Call [Self::clean_expired] before this to get the actual count
    pub fn free_subnets(&self) -> u64 {
        self.free_subnets.free_count()
    }

    /// Removes all leases that expired before `now`
    ///
    /// Should be called periodically
    ///
    /// Returns (lease_count_before, lease_count_after)
    pub fn clean_expired(&mut self, now: SystemTime) -> (usize, usize) {
        let start_lease_count = self.leases.len();

        self.leases.retain(|subnet, entry| {
            if now <= entry.expiration {
                return true;
            }
            tracing::info!(%subnet, public_ip = %entry.attrs.public_ip, "Lease expired");
            if let Err(e) = self.free_subnets.free(*subnet) {
                tracing::warn!(%subnet, error = %e, "Expired lease was not allocated");
            }
            false
        });

        (start_lease_count, self.leases.len())
    }

    fn expiration(&self, now: SystemTime) -> Result<SystemTime, LeaseRegistrationError> {
        now.checked_add(self.lease_ttl)
            .ok_or(LeaseRegistrationError::LeaseTtlOverflow { ttl: self.lease_ttl })
    }

    fn insert(
        &mut self,
        subnet: Ipv4Net,
        attrs: LeaseAttributes,
        expiration: SystemTime,
    ) -> SubnetLease {
        let entry = LeaseEntry { attrs, expiration };
        let lease = to_lease(subnet, &entry);
        self.leases.insert(subnet, entry);
        lease
    }
}

fn to_lease(subnet: Ipv4Net, entry: &LeaseEntry) -> SubnetLease {
    SubnetLease {
        subnet,
        attrs: entry.attrs.clone(),
        expiration: entry.expiration,
    }
}
