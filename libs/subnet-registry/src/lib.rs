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
//! # Subnet Registry
//!
//! Hand out subnets of an overlay network as time-limited leases.
//!
//! The [manager::LeaseManager] keeps track of which host (identified by its
//! public IP) holds which subnet and until when. Which subnet to hand out next
//! is decided by the [allocator::SubnetAllocator], within the bounds of the
//! [config::NetworkConfig].
//!
//! [local::LocalRegistry] exposes a shared manager through the
//! [overlay_lease_client::LeaseRegistry] interface, including the background
//! renewal of the acquired lease.

pub mod allocator;
pub mod config;
pub mod local;
pub mod manager;
