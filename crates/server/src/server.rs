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

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use error_stack::Result;
use error_stack::ResultExt;
use mea::shutdown::ShutdownRecv;
use mea::shutdown::ShutdownSend;
use mea::waitgroup::WaitGroup;
use poem::Endpoint;
use poem::EndpointExt;
use poem::IntoResponse;
use poem::Middleware;
use poem::Request;
use poem::Response;
use poem::http::StatusCode;
use poem::listener::Listener;
use poem::listener::TcpListener;
use ringkv_cluster::GossipFuture;
use ringkv_cluster::NodeRole;
use ringkv_cluster::NodeState;
use ringkv_cluster::node_routes;
use ringkv_core::Config;
use ringkv_core::JoinHandle;
use ringkv_core::Runtime;

use crate::ServerError;

struct LoggerMiddleware;

impl<E> Middleware<E> for LoggerMiddleware
where
    E: Endpoint,
    E::Output: IntoResponse,
{
    type Output = LoggerEndpoint<E>;

    fn transform(&self, endpoint: E) -> Self::Output {
        LoggerEndpoint(endpoint)
    }
}

struct LoggerEndpoint<E>(E);

impl<E> Endpoint for LoggerEndpoint<E>
where
    E: Endpoint,
    E::Output: IntoResponse,
{
    type Output = Response;

    async fn call(&self, req: Request) -> std::result::Result<Self::Output, poem::Error> {
        let method = req.method().clone();
        let uri = req.uri().clone();
        log::debug!("{method} {uri} called");
        let resp = self.0.call(req).await.inspect_err(|err| {
            if err.status() != StatusCode::NOT_FOUND {
                log::debug!("{method} {uri} {}: {err}", err.status());
            }
        })?;
        let resp = resp.into_response();
        log::debug!("{method} {uri} returns {}", resp.status());
        Ok(resp)
    }
}

/// A started node: its state handle plus the futures that make it live.
#[derive(Debug)]
pub struct NodeHandle {
    state: Arc<NodeState>,
    listen_addr: SocketAddr,
    server_fut: JoinHandle<std::result::Result<(), io::Error>>,
    gossip_futs: Vec<GossipFuture>,
    shutdown_rx_server: ShutdownRecv,
}

impl NodeHandle {
    pub fn state(&self) -> &Arc<NodeState> {
        &self.state
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    /// A receiver that resolves when the node has been asked to shut down.
    pub fn shutdown_listener(&self) -> ShutdownRecv {
        self.shutdown_rx_server.clone()
    }

    pub async fn await_shutdown(self) {
        self.shutdown_rx_server.is_shutdown().await;

        log::info!("ringkv node is shutting down");
        for fut in self.gossip_futs {
            fut.await;
        }
        match self.server_fut.await {
            Ok(_) => log::info!("ringkv server stopped."),
            Err(err) => log::error!(err:?; "ringkv server failed."),
        }
    }
}

/// Starts a node: binds the UDP gossip listener and the TCP request listener
/// on the same port, spawns the membership activities, and bootstraps the
/// ring role (founding member, joiner, or client). Listener bind failures are
/// fatal.
pub async fn start_node(
    server_rt: &Runtime,
    gossip_rt: &Runtime,
    config: &Config,
    role: NodeRole,
    fault_tolerance: u64,
) -> Result<(NodeHandle, ShutdownSend), ServerError> {
    let make_error = || ServerError("failed to start the node".to_string());

    let state = NodeState::try_new(config, role, fault_tolerance)
        .await
        .change_context_lazy(make_error)?;

    let (shutdown_tx_server, shutdown_rx_server) = mea::shutdown::new_pair();

    // The request listener shares the gossip listener's port.
    let acceptor = TcpListener::bind(state.listen_addr().to_string())
        .into_acceptor()
        .await
        .change_context_lazy(make_error)?;
    let listen_addr = state.listen_addr();

    let wg = WaitGroup::new();
    let server_fut = {
        let shutdown_clone = shutdown_rx_server.clone();
        let wg_clone = wg.clone();
        let route = node_routes(state.clone()).with(LoggerMiddleware);
        let signal = async move {
            log::info!("request server has started on [{listen_addr}]");
            drop(wg_clone);

            shutdown_clone.is_shutdown().await;
            log::info!("request server is closing");
        };

        server_rt.spawn(async move {
            poem::Server::new_with_acceptor(acceptor)
                .run_with_graceful_shutdown(route, signal, Some(Duration::from_secs(30)))
                .await
        })
    };
    wg.await;

    // Membership activities run before bootstrap so a joiner hears gossip
    // from the moment it announces itself.
    let gossip_futs = state.clone().run_gossip(gossip_rt, shutdown_rx_server.clone());

    match (role, config.server.initial_peer.as_deref()) {
        (NodeRole::Server, None) => state.register_first_member(),
        (NodeRole::Server, Some(contact)) => {
            state.join_group(contact).await.change_context_lazy(|| {
                ServerError(format!("failed to join the ring via {contact}"))
            })?;
        }
        (NodeRole::Client, Some(contact)) => state.register_client(contact),
        (NodeRole::Client, None) => {
            error_stack::bail!(ServerError(
                "client mode requires a bootstrap contact".to_string()
            ));
        }
    }

    let handle = NodeHandle {
        state,
        listen_addr,
        server_fut,
        gossip_futs,
        shutdown_rx_server,
    };
    Ok((handle, shutdown_tx_server))
}
