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
use std::sync::RwLock;
use std::sync::RwLockReadGuard;
use std::sync::RwLockWriteGuard;
use std::sync::atomic::AtomicU64;
use std::time::Duration;

use error_stack::Result;
use error_stack::ResultExt;
use ringkv_core::Config;
use ringkv_core::KeyEntry;
use tokio::net::UdpSocket;

use crate::ClusterError;
use crate::member::Member;
use crate::rpc::RpcTransport;
use crate::view::RingView;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    /// A full ring member that owns an arc and stores keys.
    Server,
    /// A client-only member: participates in gossip to learn the ring but is
    /// never placed on it.
    Client,
}

/// The node-scoped handle behind which the entire ring state lives: the
/// locked [`RingView`], the UDP gossip socket, the RPC transport and the tick
/// clock. Everything a node's activities share goes through here; nothing is
/// process-global.
#[derive(Debug)]
pub struct NodeState {
    role: NodeRole,
    advertise_addr: String,
    listen_addr: SocketAddr,
    replica_count: usize,
    heartbeat_threshold: u64,
    gossip_interval: Duration,
    heartbeat_interval: Duration,
    ring_slot_override: Option<u32>,
    initial_heartbeat: u64,
    ticks: AtomicU64,
    view: RwLock<RingView>,
    socket: UdpSocket,
    transport: RpcTransport,
}

impl NodeState {
    /// Binds the UDP gossip listener and assembles the node state. A bind
    /// failure here is fatal to startup.
    pub async fn try_new(
        config: &Config,
        role: NodeRole,
        initial_heartbeat: u64,
    ) -> Result<Arc<Self>, ClusterError> {
        let make_error =
            || ClusterError::Internal("failed to initialize the node state".to_string());

        let socket = UdpSocket::bind(config.server.listen_addr)
            .await
            .change_context_lazy(make_error)?;
        let listen_addr = socket.local_addr().change_context_lazy(make_error)?;
        let advertise_addr =
            resolve_advertise_addr(listen_addr, config.server.advertise_addr.as_deref())
                .change_context_lazy(make_error)?;
        log::info!("gossip listener bound on [{listen_addr}], advertised as [{advertise_addr}]");

        Ok(Arc::new(Self {
            role,
            listen_addr,
            replica_count: config.replication.replica_count,
            heartbeat_threshold: config.gossip.heartbeat_threshold,
            gossip_interval: Duration::from_secs_f64(config.gossip.gossip_interval.as_secs_f64()),
            heartbeat_interval: Duration::from_secs_f64(
                config.gossip.heartbeat_interval.as_secs_f64(),
            ),
            ring_slot_override: config.server.ring_slot,
            initial_heartbeat,
            ticks: AtomicU64::new(0),
            view: RwLock::new(RingView::new(advertise_addr.clone())),
            socket,
            transport: RpcTransport::try_new()?,
            advertise_addr,
        }))
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    /// The `host:port` identity peers know this node by.
    pub fn advertise_addr(&self) -> &str {
        &self.advertise_addr
    }

    /// The bound address; the TCP request listener binds the same port.
    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    pub(crate) fn listen_port(&self) -> u16 {
        self.listen_addr.port()
    }

    pub(crate) fn view(&self) -> RwLockReadGuard<'_, RingView> {
        self.view.read().unwrap()
    }

    pub(crate) fn view_mut(&self) -> RwLockWriteGuard<'_, RingView> {
        self.view.write().unwrap()
    }

    pub(crate) fn socket(&self) -> &UdpSocket {
        &self.socket
    }

    pub(crate) fn transport(&self) -> &RpcTransport {
        &self.transport
    }

    pub(crate) fn replica_count(&self) -> usize {
        self.replica_count
    }

    pub(crate) fn heartbeat_threshold(&self) -> u64 {
        self.heartbeat_threshold
    }

    pub(crate) fn gossip_interval(&self) -> Duration {
        self.gossip_interval
    }

    pub(crate) fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    pub(crate) fn ring_slot_override(&self) -> Option<u32> {
        self.ring_slot_override
    }

    pub(crate) fn initial_heartbeat(&self) -> u64 {
        self.initial_heartbeat
    }

    pub(crate) fn ticks(&self) -> &AtomicU64 {
        &self.ticks
    }

    /// How many heartbeat ticks have elapsed locally.
    pub fn clock(&self) -> u64 {
        self.ticks.load(std::sync::atomic::Ordering::Relaxed)
    }

    pub fn member_snapshot(&self) -> Vec<Member> {
        self.view().member_snapshot()
    }

    pub fn ring_snapshot(&self) -> Vec<(u32, String)> {
        self.view().ring_snapshot()
    }

    pub fn store_snapshot(&self) -> Vec<KeyEntry> {
        self.view().store_snapshot()
    }

    /// The node's current ring slot, if any.
    pub fn ring_slot(&self) -> Option<u32> {
        self.view().self_slot()
    }
}

/// Resolves the `host:port` peers should use to reach a node listening on
/// `listen_addr`. An explicit advertise address wins; an unspecified listen
/// host falls back to the machine's local IP.
pub fn resolve_advertise_addr(
    listen_addr: SocketAddr,
    advertise_addr: Option<&str>,
) -> std::result::Result<String, std::io::Error> {
    match advertise_addr {
        Some(advertise_addr) => Ok(advertise_addr.to_string()),
        None => {
            if listen_addr.ip().is_unspecified() {
                let ip = local_ip_address::local_ip().map_err(std::io::Error::other)?;
                Ok(SocketAddr::new(ip, listen_addr.port()).to_string())
            } else {
                Ok(listen_addr.to_string())
            }
        }
    }
}
