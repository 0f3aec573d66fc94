// Copyright 2026 RingKV Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::path::PathBuf;
use std::sync::Arc;

use clap::ValueHint;
use error_stack::Result;
use error_stack::ResultExt;
use ringkv_cluster::NodeRole;
use ringkv_core::make_runtime;
use ringkv_server::repl;
use ringkv_server::server::start_node;
use ringkv_server::telemetry;

use crate::Error;
use crate::config::LoadConfigResult;
use crate::config::load_config;

/// A client-only member: it gossips to learn the ring but never owns an arc.
/// Operations typed on stdin route straight to the owners.
#[derive(Debug, clap::Parser)]
pub struct CommandClient {
    /// Address of an existing group member to learn the ring from.
    #[clap(short = 'g', long = "group")]
    group: String,
    /// Port to bind for the UDP gossip listener.
    #[clap(short = 'l', long = "listen-port")]
    listen_port: Option<u16>,
    #[clap(long = "config", value_hint = ValueHint::FilePath)]
    config_file: Option<PathBuf>,
}

impl CommandClient {
    pub fn run(self) -> Result<(), Error> {
        let LoadConfigResult {
            mut config,
            warnings,
        } = load_config(self.config_file)?;

        if let Some(port) = self.listen_port {
            config.server.listen_addr.set_port(port);
        }
        config.server.initial_peer = Some(self.group);

        telemetry::init(
            "ringkv-client",
            &config.server.listen_addr.to_string(),
            &config.telemetry,
        );
        for warning in warnings {
            log::warn!("{warning}");
        }

        let runtime = make_runtime("client_runtime", "client_thread", 2);
        let make_error = || Error("failed to start the client member".to_string());

        runtime.block_on(async {
            let (handle, shutdown_tx) =
                start_node(&runtime, &runtime, &config, NodeRole::Client, 0)
                    .await
                    .change_context_lazy(make_error)?;
            let shutdown_tx = Arc::new(shutdown_tx);

            {
                let shutdown_tx = shutdown_tx.clone();
                ctrlc::set_handler(move || shutdown_tx.shutdown()).change_context_lazy(|| {
                    Error("failed to setup ctrl-c signal handle".to_string())
                })?;
            }

            let state = handle.state().clone();
            let shutdown_listener = handle.shutdown_listener();
            let mut repl_result = Ok(());
            tokio::select! {
                result = repl::run_repl(&state) => {
                    repl_result = result.map(|_| ());
                    shutdown_tx.shutdown();
                }
                _ = shutdown_listener.is_shutdown() => {}
            }

            handle.await_shutdown().await;
            repl_result.change_context_lazy(|| Error("command session failed".to_string()))
        })
    }
}
