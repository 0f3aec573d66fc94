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
use ringkv_core::Config;
use ringkv_core::Runtime;
use ringkv_core::make_runtime;
use ringkv_core::num_cpus;
use ringkv_server::repl;
use ringkv_server::repl::ReplOutcome;
use ringkv_server::server::start_node;
use ringkv_server::telemetry;

use crate::Error;
use crate::config::LoadConfigResult;
use crate::config::load_config;

#[derive(Debug, clap::Parser)]
pub struct CommandStart {
    /// Port to bind for the UDP gossip listener and the TCP request listener.
    #[clap(short = 'l', long = "listen-port")]
    listen_port: Option<u16>,
    /// Address of an existing group member; absent means be the first member.
    #[clap(short = 'g', long = "group")]
    group: Option<String>,
    /// Fault tolerance level; seeds the initial heartbeat counter.
    #[clap(short = 'f', long = "fault-tolerance", default_value_t = 0)]
    fault_tolerance: u64,
    /// Path to a `word##definition` file to preload into the cluster.
    #[clap(long = "data", value_hint = ValueHint::FilePath)]
    data_file: Option<PathBuf>,
    #[clap(long = "config", value_hint = ValueHint::FilePath)]
    config_file: Option<PathBuf>,
}

impl CommandStart {
    pub fn run(self) -> Result<(), Error> {
        let LoadConfigResult {
            mut config,
            warnings,
        } = load_config(self.config_file)?;

        // CLI flags sit on top of file and environment.
        if let Some(port) = self.listen_port {
            config.server.listen_addr.set_port(port);
        }
        if let Some(group) = self.group {
            config.server.initial_peer = Some(group);
        }

        telemetry::init(
            "ringkv",
            &config.server.listen_addr.to_string(),
            &config.telemetry,
        );
        for warning in warnings {
            log::warn!("{warning}");
        }
        log::info!("RingKV is starting with loaded config: {config:#?}");

        let server_runtime = make_server_runtime();
        let gossip_runtime = make_gossip_runtime();
        server_runtime.block_on(run_node(
            &server_runtime,
            &gossip_runtime,
            config,
            self.fault_tolerance,
            self.data_file,
        ))
    }
}

fn make_server_runtime() -> Runtime {
    let parallelism = num_cpus().get();
    make_runtime("server_runtime", "server_thread", parallelism)
}

fn make_gossip_runtime() -> Runtime {
    make_runtime("gossip_runtime", "gossip_thread", 1)
}

async fn run_node(
    server_rt: &Runtime,
    gossip_rt: &Runtime,
    config: Config,
    fault_tolerance: u64,
    data_file: Option<PathBuf>,
) -> Result<(), Error> {
    let make_error = || Error("failed to start the node".to_string());

    let (handle, shutdown_tx) =
        start_node(server_rt, gossip_rt, &config, NodeRole::Server, fault_tolerance)
            .await
            .change_context_lazy(make_error)?;
    let shutdown_tx = Arc::new(shutdown_tx);

    {
        let shutdown_tx = shutdown_tx.clone();
        ctrlc::set_handler(move || shutdown_tx.shutdown())
            .change_context_lazy(|| Error("failed to setup ctrl-c signal handle".to_string()))?;
    }

    if let Some(data_file) = data_file {
        repl::preload_data_file(handle.state(), &data_file)
            .await
            .change_context_lazy(make_error)?;
    }

    let state = handle.state().clone();
    let shutdown_listener = handle.shutdown_listener();
    let mut repl_result = Ok(ReplOutcome::Eof);
    tokio::select! {
        result = repl::run_repl(&state) => {
            repl_result = result;
            shutdown_tx.shutdown();
        }
        _ = shutdown_listener.is_shutdown() => {}
    }

    handle.await_shutdown().await;
    repl_result
        .map(|_| ())
        .change_context_lazy(|| Error("command session failed".to_string()))
}
