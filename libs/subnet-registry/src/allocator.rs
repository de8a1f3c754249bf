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
//! A subnet allocator.

use ipnet::Ipv4Net;
use rand::Rng as _;
use rand_chacha::ChaCha8Rng;
use thiserror::Error;

use crate::{
    allocator::subnet_set::{SubnetSet, SubnetSetError},
    config::NetworkConfig,
};

mod subnet_set;

/// An allocator of the subnets between SubnetMin and SubnetMax of a network.
// Impl Note:
// The SubnetSet contains all free subnets.
// On Allocation - Subnet is removed from the Set
// On Free       - Subnet is added to the Set.
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct SubnetAllocator {
    free: SubnetSet,
    /// RNG for random subnet allocation.
    rng: ChaCha8Rng,
}

impl SubnetAllocator {
    /// Creates a new SubnetAllocator with all subnets of `config` free.
    pub fn new(config: &NetworkConfig, rng: ChaCha8Rng) -> Self {
        // At most 2^30 subnets fit into the IPv4 space.
        let capacity = config.subnet_count() as u32;
        Self {
            free: SubnetSet::full(
                config.subnet_min().network(),
                config.subnet_len(),
                capacity,
            ),
            rng,
        }
    }

    /// Frees a subnet.
    pub fn free(&mut self, subnet: Ipv4Net) -> Result<(), SubnetAllocatorError> {
        self.free.insert(subnet)?;
        Ok(())
    }

    /// Checks if a subnet is free.
    pub fn is_free(&self, subnet: Ipv4Net) -> bool {
        self.free.contains(subnet)
    }

    /// Number of free subnets.
    pub fn free_count(&self) -> u64 {
        self.free.len()
    }

    /// Allocates `requested`, or a random free subnet if none is requested.
    pub fn allocate(
        &mut self,
        requested: Option<Ipv4Net>,
    ) -> Result<Ipv4Net, SubnetAllocatorError> {
        let subnet = match requested {
            Some(subnet) => subnet,
            None => {
                if self.free.is_empty() {
                    return Err(SubnetAllocatorError::NoSubnetsAvailable);
                }
                let n = self.rng.random_range(0..self.free.len());
                self.free
                    .nth(n)
                    .ok_or(SubnetAllocatorError::NoSubnetsAvailable)?
            }
        };
        self.free.remove(subnet)?;
        Ok(subnet)
    }
}

/// Subnet allocation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubnetAllocatorError {
    /// Subnet outside of SubnetMin and SubnetMax.
    #[error("requested subnet {0} not in allocation range")]
    SubnetNotInRange(Ipv4Net),
    /// Subnet does not match the configured subnet length or boundary.
    #[error("requested subnet {0} does not match the subnet layout")]
    SubnetMisaligned(Ipv4Net),
    /// Subnet already allocated.
    #[error("subnet {0} already allocated")]
    SubnetAlreadyAllocated(Ipv4Net),
    /// Subnet is already free.
    #[error("subnet {0} is already free")]
    SubnetAlreadyFreed(Ipv4Net),
    /// All subnets are allocated.
    #[error("no subnets available")]
    NoSubnetsAvailable,
}

impl From<SubnetSetError> for SubnetAllocatorError {
    fn from(err: SubnetSetError) -> Self {
        match err {
            SubnetSetError::NotInRange(subnet) => SubnetAllocatorError::SubnetNotInRange(subnet),
            SubnetSetError::Misaligned(subnet) => SubnetAllocatorError::SubnetMisaligned(subnet),
            SubnetSetError::AlreadyInSet(subnet) => {
                SubnetAllocatorError::SubnetAlreadyFreed(subnet)
            }
            SubnetSetError::NotInSet(subnet) => {
                SubnetAllocatorError::SubnetAlreadyAllocated(subnet)
            }
        }
    }
}
