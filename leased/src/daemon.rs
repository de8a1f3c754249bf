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
//! Lease daemon runtime.

use std::{
    net::Ipv4Addr,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, ensure};
use overlay_lease_client::{InterfaceInfo, new_backend};
use overlay_subnet_registry::{
    config::{NetworkConfig, NetworkConfigDto},
    local::{DEFAULT_RENEW_MARGIN, SharedLeaseManager},
    manager::{DEFAULT_LEASE_TTL, LeaseManager},
};
use overlay_utils::{io::read_file, task_handler::CancelTaskSet};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::{cli::RunArgs, subnet_env::SubnetEnv};

/// Longest accepted lease lifetime.
pub const MAX_LEASE_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Resolved configuration of a daemon run.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// The overlay network to lease from.
    pub network: NetworkConfig,
    /// The external interface of this host.
    pub iface: InterfaceInfo,
    /// Public IP advertised with the lease.
    pub public_ip: Ipv4Addr,
    /// HTTP port advertised with the lease.
    pub http_port: String,
    /// Whether IP masquerading is enabled.
    pub ip_masq: bool,
    /// Where the subnet environment is written.
    pub subnet_file: PathBuf,
    /// Lifetime of a lease.
    pub lease_ttl: Duration,
    /// How long before expiry a lease is renewed.
    pub renew_margin: Duration,
}

impl DaemonConfig {
    /// Creates a config for `network` with default timings.
    pub fn new(
        network: NetworkConfig,
        iface: InterfaceInfo,
        public_ip: Ipv4Addr,
        subnet_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            network,
            iface,
            public_ip,
            http_port: crate::cli::DEFAULT_HTTP_PORT.to_string(),
            ip_masq: false,
            subnet_file: subnet_file.into(),
            lease_ttl: DEFAULT_LEASE_TTL,
            renew_margin: DEFAULT_RENEW_MARGIN,
        }
    }

    /// Builds the config from the command line, loading the network config file.
    pub async fn from_args(args: RunArgs) -> anyhow::Result<Self> {
        let lease_ttl = Duration::from_secs(args.lease_ttl_secs);
        let renew_margin = Duration::from_secs(args.renew_margin_secs);
        check_lease_timing(lease_ttl, renew_margin)?;

        let network = load_network_config(&args.config).await?;
        Ok(Self {
            network,
            iface: InterfaceInfo::new(args.iface, args.iface_index, args.iface_mtu),
            public_ip: args.public_ip,
            http_port: args.http_port,
            ip_masq: args.ip_masq,
            subnet_file: args.subnet_file,
            lease_ttl,
            renew_margin,
        })
    }
}

/// Checks that a lease lives long enough to be renewed before it expires.
pub fn check_lease_timing(lease_ttl: Duration, renew_margin: Duration) -> anyhow::Result<()> {
    ensure!(
        !lease_ttl.is_zero() && lease_ttl <= MAX_LEASE_TTL,
        "lease TTL must be between 1s and {}s, got {}s",
        MAX_LEASE_TTL.as_secs(),
        lease_ttl.as_secs()
    );
    ensure!(
        renew_margin < lease_ttl,
        "renew margin ({}s) must be shorter than the lease TTL ({}s)",
        renew_margin.as_secs(),
        lease_ttl.as_secs()
    );
    Ok(())
}

/// Loads and validates a network config file.
pub async fn load_network_config(path: &Path) -> anyhow::Result<NetworkConfig> {
    let dto: NetworkConfigDto = read_file(path)
        .await
        .with_context(|| format!("failed to read network config {}", path.display()))?;
    NetworkConfig::try_from(dto)
        .with_context(|| format!("invalid network config {}", path.display()))
}

/// Acquires a subnet lease, publishes it to the subnet file and keeps it alive
/// until the task set is cancelled.
///
/// Cancellation before the lease is acquired is a clean shutdown. Once the
/// lease is published the task set is polled alongside the renewal, so a
/// failing task shuts the daemon down.
pub async fn run(config: DaemonConfig, task_set: &mut CancelTaskSet) -> anyhow::Result<()> {
    let network = config.network.network();
    let rng = ChaCha8Rng::seed_from_u64(rand::rng().next_u64());
    let manager = SharedLeaseManager::new(
        LeaseManager::new(config.network, rng).with_lease_ttl(config.lease_ttl),
    );
    let registry = manager.registry().with_renew_margin(config.renew_margin);

    let backend = new_backend(Arc::new(registry));
    task_set.spawn_on_cancel({
        let backend = backend.clone();
        move || backend.stop()
    });

    let subnet = match backend
        .initialize(&config.iface, config.public_ip, &config.http_port, config.ip_masq)
        .await
    {
        Ok(subnet) => subnet,
        Err(e) if e.is_canceled() => {
            tracing::info!("Shut down before a lease was acquired");
            return Ok(());
        }
        Err(e) => return Err(e).context("failed to initialize backend"),
    };
    tracing::info!(
        backend = backend.name(),
        subnet = %subnet.net,
        mtu = subnet.mtu,
        "Backend initialized"
    );

    SubnetEnv::new(network, &subnet, config.ip_masq)
        .write(&config.subnet_file)
        .await
        .with_context(|| format!("failed to write {}", config.subnet_file.display()))?;
    tracing::info!(path = %config.subnet_file.display(), "Wrote subnet file");

    tokio::join!(backend.run(), task_set.join_all());
    tracing::info!("Lease renewal stopped");
    Ok(())
}
