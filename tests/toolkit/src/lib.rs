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

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use mea::shutdown::ShutdownSend;
use ringkv_cluster::NodeRole;
use ringkv_cluster::NodeState;
use ringkv_core::Config;
use ringkv_core::LogsConfig;
use ringkv_core::Runtime;
use ringkv_server::server::NodeHandle;
use ringkv_server::server::start_node;

/// Knobs for a test node. Defaults keep gossip fast and failure detection
/// effectively off so a test opts into the timing it wants to observe.
#[derive(Debug, Clone)]
pub struct TestNodeOptions {
    /// Forced ring slot; `None` hashes the address like production.
    pub ring_slot: Option<u32>,
    /// Bootstrap contact; `None` founds a new ring.
    pub initial_peer: Option<String>,
    pub replica_count: usize,
    pub gossip_interval: Duration,
    pub heartbeat_threshold: u64,
}

impl Default for TestNodeOptions {
    fn default() -> Self {
        Self {
            ring_slot: None,
            initial_peer: None,
            replica_count: 2,
            gossip_interval: Duration::from_millis(100),
            heartbeat_threshold: 100_000,
        }
    }
}

#[derive(Debug)]
pub struct TestNode {
    handle: NodeHandle,
    shutdown_tx: ShutdownSend,
}

impl TestNode {
    pub fn state(&self) -> &Arc<NodeState> {
        self.handle.state()
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.handle.listen_addr()
    }

    /// The `host:port` other nodes use as the bootstrap contact.
    pub fn advertise_addr(&self) -> String {
        self.state().advertise_addr().to_string()
    }

    /// The HTTP endpoint the api client talks to.
    pub fn endpoint(&self) -> String {
        format!("http://{}", self.state().advertise_addr())
    }

    /// Stops the node without a leave handoff, like a crash as far as the
    /// rest of the cluster is concerned.
    pub async fn kill(self) {
        self.shutdown_tx.shutdown();
        self.handle.await_shutdown().await;
    }
}

/// Starts an in-process server node on an ephemeral localhost port.
pub async fn start_test_node(rt: &Runtime, opts: TestNodeOptions) -> TestNode {
    let mut config = Config::default();
    config.server.listen_addr = "127.0.0.1:0".parse().unwrap();
    config.server.ring_slot = opts.ring_slot;
    config.server.initial_peer = opts.initial_peer;
    config.replication.replica_count = opts.replica_count;
    config.gossip.gossip_interval =
        jiff::SignedDuration::from_millis(opts.gossip_interval.as_millis() as i64);
    config.gossip.heartbeat_interval = jiff::SignedDuration::from_millis(20);
    config.gossip.heartbeat_threshold = opts.heartbeat_threshold;
    config.telemetry.logs = LogsConfig::disabled();

    let (handle, shutdown_tx) = start_node(rt, rt, &config, NodeRole::Server, 0)
        .await
        .expect("failed to start test node");
    TestNode {
        handle,
        shutdown_tx,
    }
}

/// Polls `check` until it holds or `timeout` elapses.
pub async fn wait_until(what: &str, timeout: Duration, mut check: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    loop {
        if check() {
            return;
        }
        if Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
