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
//! Lease daemon CLI options.

use std::{net::Ipv4Addr, path::PathBuf};

use clap::{Args, Parser, Subcommand};
use overlay_observability::LogFormat;

/// Default location of the subnet environment file.
pub const DEFAULT_SUBNET_FILE: &str = "/run/flannel/subnet.env";
/// Default port of the host's HTTP endpoint.
pub const DEFAULT_HTTP_PORT: &str = "5002";

/// Overlay subnet lease daemon
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Opts {
    /// Top-level subcommand
    #[command(subcommand)]
    pub command: Commands,

    /// Logging options
    #[command(flatten)]
    pub logging: LoggingOptions,
}

/// Logging options.
#[derive(Debug, Args)]
pub struct LoggingOptions {
    /// Log daemon output to stderr.
    #[arg(long, global = true, default_value_t = true, action = clap::ArgAction::Set)]
    pub stderr: bool,

    /// Directory for the daemon log.
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    /// Format of the stderr log output.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

/// Top-level subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Acquire a subnet, write the subnet file and keep the lease alive.
    Run(RunArgs),
    /// Validate a network config and print it with all defaults resolved.
    CheckConfig {
        /// The network config file (JSON).
        #[arg(long)]
        config: PathBuf,
    },
}

/// Options of the `run` subcommand.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// The network config file (JSON).
    #[arg(long)]
    pub config: PathBuf,

    /// The public IP of this host.
    #[arg(long)]
    pub public_ip: Ipv4Addr,

    /// The port of this host's HTTP endpoint, advertised with the lease.
    #[arg(long, default_value = DEFAULT_HTTP_PORT)]
    pub http_port: String,

    /// Name of the external interface.
    #[arg(long, default_value = "eth0")]
    pub iface: String,

    /// Index of the external interface.
    #[arg(long, default_value_t = 0)]
    pub iface_index: u32,

    /// MTU of the external interface.
    #[arg(long, default_value_t = 1500)]
    pub iface_mtu: u32,

    /// Set up IP masquerading for traffic leaving the overlay network.
    #[arg(long)]
    pub ip_masq: bool,

    /// Where to write the subnet environment file.
    #[arg(long, default_value = DEFAULT_SUBNET_FILE)]
    pub subnet_file: PathBuf,

    /// Lifetime of a lease in seconds.
    #[arg(long, default_value_t = 24 * 60 * 60)]
    pub lease_ttl_secs: u64,

    /// How many seconds before expiry a lease is renewed.
    #[arg(long, default_value_t = 60 * 60)]
    pub renew_margin_secs: u64,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn verify_cli() {
        Opts::command().debug_assert();
    }

    #[test]
    fn run_defaults() {
        let opts = Opts::parse_from([
            "leased",
            "run",
            "--config",
            "net.json",
            "--public-ip",
            "10.0.0.5",
        ]);
        assert!(opts.logging.stderr);
        assert_eq!(opts.logging.log_format, LogFormat::Text);
        let Commands::Run(args) = opts.command else {
            panic!("expected run subcommand");
        };
        assert_eq!(args.public_ip, Ipv4Addr::new(10, 0, 0, 5));
        assert_eq!(args.http_port, DEFAULT_HTTP_PORT);
        assert_eq!(args.iface_mtu, 1500);
        assert!(!args.ip_masq);
        assert_eq!(args.subnet_file, PathBuf::from(DEFAULT_SUBNET_FILE));
    }
}
