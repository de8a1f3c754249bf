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
//! The backend interface exposed to the orchestrator.

use std::net::Ipv4Addr;

use async_trait::async_trait;
use thiserror::Error;

use crate::{
    lease::{InterfaceInfo, SubnetDefinition},
    registry::RegistryError,
};

/// Errors returned by [Backend::initialize].
#[derive(Debug, Error)]
pub enum LeaseError {
    /// The backend was stopped before a lease was granted.
    #[error("task canceled")]
    Canceled,
    /// The registry failed to grant a lease.
    #[error("failed to acquire lease: {0}")]
    AcquisitionFailure(#[source] RegistryError),
}

/// Coarse classification of a [LeaseError].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Graceful shutdown raced the acquisition.
    Canceled,
    /// Acquisition failed for any other reason.
    AcquisitionFailure,
}

impl LeaseError {
    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LeaseError::Canceled => ErrorKind::Canceled,
            LeaseError::AcquisitionFailure(_) => ErrorKind::AcquisitionFailure,
        }
    }

    /// Returns true if the error signals cancellation.
    pub fn is_canceled(&self) -> bool {
        self.kind() == ErrorKind::Canceled
    }
}

impl From<RegistryError> for LeaseError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Canceled => LeaseError::Canceled,
            other => LeaseError::AcquisitionFailure(other),
        }
    }
}

/// An overlay network backend.
///
/// The orchestrator calls [Backend::initialize] once at startup, then drives
/// [Backend::run] on a separate task and finally calls [Backend::stop] on
/// shutdown, which unblocks whichever of the two is still pending.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Acquires a subnet for this host.
    ///
    /// `ip_masq` is configuration for the data plane and not used while leasing.
    async fn initialize(
        &self,
        ext_iface: &InterfaceInfo,
        ext_ip: Ipv4Addr,
        http_port: &str,
        ip_masq: bool,
    ) -> Result<SubnetDefinition, LeaseError>;

    /// Keeps the acquired lease alive until the backend is stopped.
    ///
    /// Must only be called after a successful [Backend::initialize].
    async fn run(&self);

    /// Stops the backend. Should be called once; later calls have no effect.
    fn stop(&self);

    /// Name of the backend kind.
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn registry_errors_map_to_lease_errors() {
        let canceled = LeaseError::from(RegistryError::Canceled);
        assert_matches!(canceled, LeaseError::Canceled);
        assert!(canceled.is_canceled());
        assert!(canceled.source().is_none());

        let failure = LeaseError::from(RegistryError::other("network unreachable"));
        assert_eq!(failure.kind(), ErrorKind::AcquisitionFailure);
        assert_eq!(
            failure.to_string(),
            "failed to acquire lease: network unreachable"
        );
        assert_eq!(
            failure.source().map(|e| e.to_string()).as_deref(),
            Some("network unreachable")
        );
    }
}
