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
//! Overlay subnet lease daemon binary.

use anyhow::Context;
use clap::Parser;
use leased::{
    cli::{Commands, Opts},
    daemon::{self, DaemonConfig, load_network_config},
};
use overlay_observability::setup_tracing;
use overlay_subnet_registry::config::NetworkConfigDto;
use overlay_utils::task_handler::CancelTaskSet;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();
    let _guards = setup_tracing(
        opts.logging.log_dir.as_ref(),
        opts.logging.stderr,
        opts.logging.log_format,
    )
    .context("failed to set up logging")?;

    match opts.command {
        Commands::Run(args) => {
            let config = DaemonConfig::from_args(args).await?;
            let mut task_set = CancelTaskSet::new_with_signal_handler();
            let res = daemon::run(config, &mut task_set).await;
            if let Err(e) = &res {
                tracing::error!(error = ?e, "Daemon failed");
            }
            res
        }
        Commands::CheckConfig { config } => {
            let network = load_network_config(&config).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&NetworkConfigDto::from(&network))?
            );
            Ok(())
        }
    }
}
