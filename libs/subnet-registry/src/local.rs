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
//! In-process [LeaseRegistry] backed by a shared [LeaseManager].

use std::{
    sync::{Arc, Mutex},
    time::{Duration, SystemTime},
};

use async_trait::async_trait;
use overlay_lease_client::{
    CancellationSignal, LeaseAttributes, LeaseRegistry, RegistryError, SubnetLease,
};

use crate::manager::LeaseManager;

/// How long before expiry a lease is renewed.
pub const DEFAULT_RENEW_MARGIN: Duration = Duration::from_secs(60 * 60);
/// Delay between renewal attempts after a failure.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(60);

/// A [LeaseManager] shared between any number of [LocalRegistry] handles.
#[derive(Clone)]
pub struct SharedLeaseManager {
    inner: Arc<Mutex<LeaseManager>>,
}

impl SharedLeaseManager {
    /// Wraps `manager` for shared use.
    pub fn new(manager: LeaseManager) -> Self {
        Self {
            inner: Arc::new(Mutex::new(manager)),
        }
    }

    /// Creates a registry handle for one participant.
    pub fn registry(&self) -> LocalRegistry {
        LocalRegistry::new(self.clone())
    }

    /// Returns all current leases.
    pub fn leases(&self) -> Vec<SubnetLease> {
        self.inner.lock().unwrap().leases()
    }

    /// Runs `f` with exclusive access to the manager.
    pub fn with_manager<R>(&self, f: impl FnOnce(&mut LeaseManager) -> R) -> R {
        f(&mut self.inner.lock().unwrap())
    }
}

/// Registry handle of a single participant.
///
/// Remembers the lease it acquired so that [LeaseRegistry::renew_lease] knows
/// what to keep alive.
pub struct LocalRegistry {
    manager: SharedLeaseManager,
    my_lease: Mutex<Option<SubnetLease>>,
    renew_margin: Duration,
    retry_delay: Duration,
}

impl LocalRegistry {
    /// Creates a registry handle on `manager`.
    pub fn new(manager: SharedLeaseManager) -> Self {
        Self {
            manager,
            my_lease: Mutex::new(None),
            renew_margin: DEFAULT_RENEW_MARGIN,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// How long before expiry the lease is renewed.
    pub fn with_renew_margin(mut self, renew_margin: Duration) -> Self {
        self.renew_margin = renew_margin;
        self
    }

    /// The delay between retries if a renewal fails.
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// The lease this handle currently holds.
    pub fn current_lease(&self) -> Option<SubnetLease> {
        self.my_lease.lock().unwrap().clone()
    }

    // Waits at least half of the remaining lifetime, also when the margin
    // exceeds the lease TTL.
    fn renew_deadline(&self, lease: &SubnetLease) -> Duration {
        let remaining = lease
            .expiration
            .duration_since(SystemTime::now())
            .unwrap_or_default();
        remaining
            .saturating_sub(self.renew_margin)
            .max(remaining / 2)
    }
}

#[async_trait]
impl LeaseRegistry for LocalRegistry {
    async fn acquire_lease(
        &self,
        attrs: LeaseAttributes,
        cancel: &CancellationSignal,
    ) -> Result<SubnetLease, RegistryError> {
        if cancel.is_closed() {
            return Err(RegistryError::Canceled);
        }

        let lease = self
            .manager
            .with_manager(|manager| {
                let now = SystemTime::now();
                let (before, after) = manager.clean_expired(now);
                if before != after {
                    tracing::debug!(removed = before - after, "Cleaned expired leases");
                }
                manager.acquire(attrs, now)
            })
            .map_err(RegistryError::other)?;

        tracing::info!(
            subnet = %lease.subnet,
            public_ip = %lease.attrs.public_ip,
            "Lease granted"
        );
        *self.my_lease.lock().unwrap() = Some(lease.clone());
        Ok(lease)
    }

    async fn renew_lease(&self, cancel: &CancellationSignal) {
        let Some(mut lease) = self.current_lease() else {
            tracing::warn!("No lease to renew, waiting for shutdown");
            cancel.closed().await;
            return;
        };

        let mut wait = self.renew_deadline(&lease);
        let mut fail_count = 0;
        loop {
            if cancel
                .run_until_closed(tokio::time::sleep(wait))
                .await
                .is_none()
            {
                return;
            }

            let res = self.manager.with_manager(|manager| {
                manager.renew(lease.subnet, lease.attrs.clone(), SystemTime::now())
            });
            match res {
                Ok(renewed) => {
                    fail_count = 0;
                    lease = renewed;
                    *self.my_lease.lock().unwrap() = Some(lease.clone());
                    wait = self.renew_deadline(&lease);
                    tracing::info!(
                        subnet = %lease.subnet,
                        next_renewal_secs = wait.as_secs(),
                        "Lease renewed"
                    );
                }
                Err(e) => {
                    fail_count += 1;
                    wait = self.retry_delay;
                    tracing::error!(
                        subnet = %lease.subnet,
                        retry_secs = wait.as_secs(),
                        fail_count,
                        error = %e,
                        "Failed to renew lease"
                    );
                }
            }
        }
    }
}
