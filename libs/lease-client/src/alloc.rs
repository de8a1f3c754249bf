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
//! Backend that only allocates a subnet and keeps the lease alive.

use std::{
    net::Ipv4Addr,
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
};

use async_trait::async_trait;

use crate::{
    backend::{Backend, LeaseError},
    lease::{InterfaceInfo, LeaseAttributes, SubnetDefinition},
    registry::LeaseRegistry,
    signal::CancellationSignal,
};

/// Name reported by [AllocBackend].
pub const BACKEND_NAME: &str = "allocation";

/// Lifecycle state of an [AllocBackend].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ClientState {
    /// Constructed, no lease yet.
    Created = 0,
    /// A lease was acquired.
    Leased = 1,
    /// The lease is being renewed.
    Renewing = 2,
    /// The backend was stopped. Terminal.
    Canceled = 3,
}

impl ClientState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ClientState::Created,
            1 => ClientState::Leased,
            2 => ClientState::Renewing,
            _ => ClientState::Canceled,
        }
    }
}

/// Creates an allocation backend bound to `registry`.
pub fn new_backend(registry: Arc<dyn LeaseRegistry>) -> Arc<dyn Backend> {
    Arc::new(AllocBackend::new(registry))
}

/// Acquires a subnet from a [LeaseRegistry] and renews it until stopped.
///
/// Both [Backend::initialize] and [Backend::run] observe the same
/// [CancellationSignal], which is closed by [Backend::stop].
pub struct AllocBackend {
    registry: Arc<dyn LeaseRegistry>,
    stop: CancellationSignal,
    state: AtomicU8,
}

impl AllocBackend {
    /// Creates a new backend bound to `registry`.
    pub fn new(registry: Arc<dyn LeaseRegistry>) -> Self {
        Self {
            registry,
            stop: CancellationSignal::new(),
            state: AtomicU8::new(ClientState::Created as u8),
        }
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> ClientState {
        ClientState::from_u8(self.state.load(Ordering::Acquire))
    }

    // Never leaves Canceled, as the store in `stop` is the only way in.
    fn transition(&self, from: ClientState, to: ClientState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[async_trait]
impl Backend for AllocBackend {
    async fn initialize(
        &self,
        ext_iface: &InterfaceInfo,
        ext_ip: Ipv4Addr,
        http_port: &str,
        _ip_masq: bool,
    ) -> Result<SubnetDefinition, LeaseError> {
        let attrs = LeaseAttributes::new(ext_ip, http_port);

        if self.stop.is_closed() {
            tracing::debug!("Backend stopped before lease acquisition");
            return Err(LeaseError::Canceled);
        }

        tracing::debug!(public_ip = %attrs.public_ip, http_port, "Acquiring lease");
        let lease = self
            .registry
            .acquire_lease(attrs, &self.stop)
            .await
            .map_err(LeaseError::from)
            .inspect_err(|e| tracing::debug!(error = %e, "Lease acquisition did not succeed"))?;

        self.transition(ClientState::Created, ClientState::Leased);
        tracing::info!(
            subnet = %lease.subnet,
            mtu = ext_iface.mtu,
            iface = %ext_iface.name,
            "Acquired lease"
        );

        Ok(SubnetDefinition {
            net: lease.subnet,
            mtu: ext_iface.mtu,
        })
    }

    async fn run(&self) {
        match self.state() {
            ClientState::Created => {
                tracing::error!("Lease renewal started before a lease was acquired");
            }
            ClientState::Renewing => {
                tracing::warn!("Lease renewal already running");
            }
            ClientState::Leased => {
                self.transition(ClientState::Leased, ClientState::Renewing);
            }
            ClientState::Canceled => {}
        }

        self.registry.renew_lease(&self.stop).await;
        tracing::debug!("Lease renewal stopped");
    }

    fn stop(&self) {
        match self.stop.close() {
            Ok(()) => {
                self.state.store(ClientState::Canceled as u8, Ordering::Release);
                tracing::debug!(backend = BACKEND_NAME, "Backend stopped");
            }
            Err(e) => {
                tracing::warn!(backend = BACKEND_NAME, error = %e, "Ignoring repeated stop");
            }
        }
    }

    fn name(&self) -> &'static str {
        BACKEND_NAME
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::Mutex,
        time::{Duration, SystemTime},
    };

    use assert_matches::assert_matches;
    use ipnet::Ipv4Net;

    use super::*;
    use crate::{
        backend::ErrorKind,
        lease::{Ip4, SubnetLease},
        registry::RegistryError,
    };

    enum Response {
        Grant(Ipv4Net),
        Fail(&'static str),
        WaitForCancel,
    }

    struct MockRegistry {
        response: Response,
        seen_attrs: Mutex<Vec<LeaseAttributes>>,
        renew_calls: Mutex<usize>,
    }

    impl MockRegistry {
        fn new(response: Response) -> Arc<Self> {
            Arc::new(Self {
                response,
                seen_attrs: Mutex::new(Vec::new()),
                renew_calls: Mutex::new(0),
            })
        }

        fn seen_attrs(&self) -> Vec<LeaseAttributes> {
            self.seen_attrs.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LeaseRegistry for MockRegistry {
        async fn acquire_lease(
            &self,
            attrs: LeaseAttributes,
            cancel: &CancellationSignal,
        ) -> Result<SubnetLease, RegistryError> {
            self.seen_attrs.lock().unwrap().push(attrs.clone());
            match &self.response {
                Response::Grant(subnet) => {
                    Ok(SubnetLease {
                        subnet: *subnet,
                        attrs,
                        expiration: SystemTime::now() + Duration::from_secs(3600),
                    })
                }
                Response::Fail(msg) => Err(RegistryError::other(*msg)),
                Response::WaitForCancel => {
                    cancel.closed().await;
                    Err(RegistryError::Canceled)
                }
            }
        }

        async fn renew_lease(&self, cancel: &CancellationSignal) {
            *self.renew_calls.lock().unwrap() += 1;
            cancel.closed().await;
        }
    }

    fn iface(mtu: u32) -> InterfaceInfo {
        InterfaceInfo::new("eth0", 2, mtu)
    }

    fn net(s: &str) -> Ipv4Net {
        s.parse().unwrap()
    }

    #[test_log::test(tokio::test)]
    async fn initialize_returns_leased_network_with_interface_mtu() {
        let registry = MockRegistry::new(Response::Grant(net("10.1.2.0/24")));
        let backend = AllocBackend::new(registry.clone());

        let def = backend
            .initialize(&iface(1450), Ipv4Addr::new(10, 0, 0, 5), "8080", false)
            .await
            .expect("should acquire lease");

        assert_eq!(
            def,
            SubnetDefinition {
                net: net("10.1.2.0/24"),
                mtu: 1450
            }
        );
        assert_eq!(backend.state(), ClientState::Leased);
    }

    #[test_log::test(tokio::test)]
    async fn initialize_passes_attributes_unmodified() {
        let registry = MockRegistry::new(Response::Grant(net("10.1.2.0/24")));
        let backend = AllocBackend::new(registry.clone());

        let cases = [
            (Ipv4Addr::new(10, 0, 0, 5), "8080"),
            (Ipv4Addr::new(192, 168, 7, 254), "08080"),
            (Ipv4Addr::UNSPECIFIED, ""),
            (Ipv4Addr::BROADCAST, " not-a-port "),
        ];
        for (ip, port) in cases {
            backend.initialize(&iface(1500), ip, port, true).await.unwrap();
        }

        let seen = registry.seen_attrs();
        assert_eq!(seen.len(), cases.len());
        for ((ip, port), attrs) in cases.iter().zip(seen) {
            assert_eq!(attrs.public_ip, Ip4::from(*ip));
            assert_eq!(attrs.http_port, *port);
        }
    }

    #[test_log::test(tokio::test)]
    async fn initialize_wraps_registry_errors() {
        let registry = MockRegistry::new(Response::Fail("quota exceeded"));
        let backend = AllocBackend::new(registry);

        let err = backend
            .initialize(&iface(1500), Ipv4Addr::new(10, 0, 0, 5), "8080", false)
            .await
            .expect_err("should fail");

        assert_matches!(err, LeaseError::AcquisitionFailure(RegistryError::Other(_)));
        assert_eq!(err.kind(), ErrorKind::AcquisitionFailure);
        let msg = err.to_string();
        assert!(msg.contains("failed to acquire lease"), "got {msg}");
        assert!(msg.contains("quota exceeded"), "got {msg}");
        assert_eq!(backend.state(), ClientState::Created);
    }

    #[test_log::test(tokio::test)]
    async fn initialize_after_stop_is_canceled_without_reaching_registry() {
        let registry = MockRegistry::new(Response::Grant(net("10.1.2.0/24")));
        let backend = AllocBackend::new(registry.clone());

        backend.stop();
        let err = backend
            .initialize(&iface(1500), Ipv4Addr::new(10, 0, 0, 5), "8080", false)
            .await
            .expect_err("should be canceled");

        assert_matches!(err, LeaseError::Canceled);
        assert!(err.is_canceled());
        assert!(registry.seen_attrs().is_empty());
        assert_eq!(backend.state(), ClientState::Canceled);
    }

    #[test_log::test(tokio::test)]
    #[ntest::timeout(5_000)]
    async fn stop_unblocks_pending_initialize() {
        let registry = MockRegistry::new(Response::WaitForCancel);
        let backend = Arc::new(AllocBackend::new(registry));

        let init = tokio::spawn({
            let backend = backend.clone();
            async move {
                backend
                    .initialize(&iface(1500), Ipv4Addr::new(10, 0, 0, 5), "8080", false)
                    .await
            }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        backend.stop();

        let res = init.await.unwrap();
        assert_matches!(res, Err(LeaseError::Canceled));
    }

    #[test_log::test(tokio::test)]
    #[ntest::timeout(5_000)]
    async fn stop_unblocks_run() {
        let registry = MockRegistry::new(Response::Grant(net("10.1.2.0/24")));
        let backend = Arc::new(AllocBackend::new(registry.clone()));
        backend
            .initialize(&iface(1500), Ipv4Addr::new(10, 0, 0, 5), "8080", false)
            .await
            .unwrap();

        let run = tokio::spawn({
            let backend = backend.clone();
            async move { backend.run().await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(backend.state(), ClientState::Renewing);
        backend.stop();

        tokio::time::timeout(Duration::from_secs(1), run)
            .await
            .expect("run must return after stop")
            .unwrap();
        assert_eq!(*registry.renew_calls.lock().unwrap(), 1);
        assert_eq!(backend.state(), ClientState::Canceled);
    }

    #[test_log::test(tokio::test)]
    #[ntest::timeout(5_000)]
    async fn run_before_initialize_never_acquires() {
        let registry = MockRegistry::new(Response::Grant(net("10.1.2.0/24")));
        let backend = Arc::new(AllocBackend::new(registry.clone()));

        let run = tokio::spawn({
            let backend = backend.clone();
            async move { backend.run().await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!run.is_finished());
        assert!(registry.seen_attrs().is_empty());
        assert_eq!(backend.state(), ClientState::Created);

        backend.stop();
        tokio::time::timeout(Duration::from_secs(1), run)
            .await
            .expect("run must return after stop")
            .unwrap();
        assert!(registry.seen_attrs().is_empty());
        assert_eq!(*registry.renew_calls.lock().unwrap(), 1);
        assert_eq!(backend.state(), ClientState::Canceled);
    }

    #[test_log::test(tokio::test)]
    async fn repeated_stop_is_ignored() {
        let registry = MockRegistry::new(Response::WaitForCancel);
        let backend = AllocBackend::new(registry);

        backend.stop();
        backend.stop();
        backend.stop();

        assert_eq!(backend.state(), ClientState::Canceled);
    }

    #[test_log::test(tokio::test)]
    async fn stop_racing_successful_initialize_yields_one_outcome() {
        for _ in 0..100 {
            let registry = MockRegistry::new(Response::Grant(net("10.1.2.0/24")));
            let backend = Arc::new(AllocBackend::new(registry));

            let init = tokio::spawn({
                let backend = backend.clone();
                async move {
                    backend
                        .initialize(&iface(1450), Ipv4Addr::new(10, 0, 0, 5), "8080", false)
                        .await
                }
            });
            let stop = tokio::spawn({
                let backend = backend.clone();
                async move { backend.stop() }
            });

            let res = init.await.unwrap();
            stop.await.unwrap();

            match res {
                Ok(def) => {
                    assert_eq!(def.net, net("10.1.2.0/24"));
                    assert_eq!(def.mtu, 1450);
                }
                Err(e) => assert_matches!(e, LeaseError::Canceled),
            }
            assert_eq!(backend.state(), ClientState::Canceled);
        }
    }

    #[test_log::test(tokio::test)]
    async fn name_is_constant_in_every_state() {
        let registry = MockRegistry::new(Response::Grant(net("10.1.2.0/24")));
        let backend = Arc::new(AllocBackend::new(registry));
        assert_eq!(backend.name(), "allocation");

        backend
            .initialize(&iface(1500), Ipv4Addr::new(10, 0, 0, 5), "8080", false)
            .await
            .unwrap();
        assert_eq!(backend.name(), "allocation");

        let run = tokio::spawn({
            let backend = backend.clone();
            async move { backend.run().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(backend.name(), "allocation");

        backend.stop();
        run.await.unwrap();
        assert_eq!(backend.name(), "allocation");
    }

    #[test_log::test(tokio::test)]
    async fn new_backend_returns_trait_object() {
        let registry = MockRegistry::new(Response::Grant(net("10.1.2.0/24")));
        let backend = new_backend(registry);
        assert_eq!(backend.name(), BACKEND_NAME);

        let def = backend
            .initialize(&iface(9001), Ipv4Addr::new(10, 0, 0, 5), "8080", false)
            .await
            .unwrap();
        assert_eq!(def.mtu, 9001);
    }
}
