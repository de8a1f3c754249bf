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
//! # Lease Client
//!
//! Obtains an exclusive subnet for an overlay participant and keeps the lease
//! alive for the lifetime of the process.
//!
//! The [alloc::AllocBackend] acquires the subnet from a [registry::LeaseRegistry]
//! during startup ([backend::Backend::initialize]), renews it in the background
//! ([backend::Backend::run]) and can be stopped at any time
//! ([backend::Backend::stop]). Both blocking operations observe the same
//! [signal::CancellationSignal].
//!
//! Which subnet is handed out, and how leases are stored, is up to the registry.

pub mod alloc;
pub mod backend;
pub mod lease;
pub mod registry;
pub mod signal;

pub use alloc::{AllocBackend, BACKEND_NAME, ClientState, new_backend};
pub use backend::{Backend, ErrorKind, LeaseError};
pub use lease::{InterfaceInfo, Ip4, LeaseAttributes, SubnetDefinition, SubnetLease};
pub use registry::{LeaseRegistry, RegistryError};
pub use signal::{AlreadyClosed, CancellationSignal};
