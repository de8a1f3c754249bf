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
//! The registry seam the lease client talks to.

use async_trait::async_trait;
use thiserror::Error;

use crate::{
    lease::{LeaseAttributes, SubnetLease},
    signal::CancellationSignal,
};

/// Errors reported by a [LeaseRegistry].
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The cancellation signal was closed before the operation completed.
    #[error("task canceled")]
    Canceled,
    /// Any other registry failure.
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl RegistryError {
    /// Wraps an arbitrary error as a registry failure.
    pub fn other(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        RegistryError::Other(err.into())
    }
}

/// Owner of the subnet allocation and lease storage.
///
/// Implementations decide which subnet to hand out and when to extend it. Both
/// operations must observe `cancel` and return promptly once it is closed.
#[async_trait]
pub trait LeaseRegistry: Send + Sync + 'static {
    /// Acquires a lease for `attrs`, waiting as long as the registry needs.
    ///
    /// Must return [RegistryError::Canceled] if `cancel` is closed before a lease
    /// is granted.
    async fn acquire_lease(
        &self,
        attrs: LeaseAttributes,
        cancel: &CancellationSignal,
    ) -> Result<SubnetLease, RegistryError>;

    /// Keeps the previously acquired lease alive until `cancel` is closed.
    ///
    /// Renewal failures are handled (and retried) by the registry itself.
    async fn renew_lease(&self, cancel: &CancellationSignal);
}
