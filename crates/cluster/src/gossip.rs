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
use std::sync::atomic::Ordering;

use fastimer::MakeDelayExt;
use mea::shutdown::ShutdownRecv;
use ringkv_core::JoinHandle;
use ringkv_core::Runtime;
use ringkv_core::timer;
use ringkv_metrics::GlobalMetrics;

use crate::member::Member;
use crate::member::Movement;
use crate::member::RingPosition;
use crate::member::marshal_member;
use crate::member::unmarshal_member;
use crate::node::NodeState;

/// Separates the in-band listen port from the message body. The UDP source
/// port may differ from the port the sender listens on.
const PORT_SEP: &str = "<PORT>";
/// Separates the message tag from its payload.
const TAG_SEP: &str = "|%|";
const TAG_GOSSIP: &str = "GOSSIP";

/// Datagrams never exceed this; one serialized member fits comfortably.
const MAX_DATAGRAM: usize = 1024;

pub type GossipFuture = JoinHandle<()>;

/// Builds the wire form of one gossip datagram.
fn frame_datagram(listen_port: u16, payload: &str) -> String {
    format!("{listen_port}{PORT_SEP}{TAG_GOSSIP}{TAG_SEP}{payload}")
}

/// Splits a datagram into the sender's listen port, the tag, and the payload.
fn parse_datagram(text: &str) -> Option<(&str, &str, &str)> {
    let (port, rest) = text.split_once(PORT_SEP)?;
    let (tag, payload) = rest.split_once(TAG_SEP)?;
    Some((port, tag, payload))
}

impl NodeState {
    /// Spawns the node's membership activities: the datagram receiver, the
    /// heartbeat ticker and the gossip ticker. Each runs until shutdown.
    pub fn run_gossip(
        self: Arc<Self>,
        rt: &Runtime,
        shutdown_rx: ShutdownRecv,
    ) -> Vec<GossipFuture> {
        let mut futs = vec![];

        // Datagram receiver
        let state = self.clone();
        let shutdown = shutdown_rx.clone();
        futs.push(rt.spawn(async move {
            let fut = async {
                let mut buf = [0u8; MAX_DATAGRAM];
                loop {
                    match state.socket().recv_from(&mut buf).await {
                        Ok((len, from)) => state.handle_datagram(&buf[..len], from),
                        Err(err) => log::error!("udp receive failed: {err}"),
                    }
                }
            };
            tokio::select! {
                _ = fut => {}
                _ = shutdown.is_shutdown() => {
                    log::info!("gossip receiver is shutting down");
                }
            }
        }));

        // Heartbeat ticker: local clock advance only, no messages.
        let state = self.clone();
        let shutdown = shutdown_rx.clone();
        futs.push(rt.spawn(async move {
            let fut = async {
                let mut ticker = timer().interval(state.heartbeat_interval());
                loop {
                    ticker.tick().await;
                    state.advance_clock();
                }
            };
            tokio::select! {
                _ = fut => {}
                _ = shutdown.is_shutdown() => {
                    log::info!("heartbeat ticker is shutting down");
                }
            }
        }));

        // Gossip ticker
        let state = self.clone();
        let shutdown = shutdown_rx.clone();
        futs.push(rt.spawn(async move {
            let fut = async {
                let mut ticker = timer().interval(state.gossip_interval());
                loop {
                    ticker.tick().await;
                    state.gossip_tick().await;
                }
            };
            tokio::select! {
                _ = fut => {}
                _ = shutdown.is_shutdown() => {
                    log::info!("gossip ticker is shutting down");
                }
            }
        }));

        futs
    }

    /// One round of push gossip: advance every silence counter, declare the
    /// timed-out members dead, and send the full member table to one random
    /// live peer. Best effort; send errors are logged and dropped.
    pub async fn gossip_tick(&self) {
        let (receiver, subjects, lost_predecessor) = {
            let mut view = self.view_mut();
            if view.ring_len() == 0 {
                return;
            }
            let mut rng = rand::rng();
            let Some(receiver) = view.random_live_peer(&mut rng) else {
                return;
            };

            view.increment_heartbeats();

            let predecessor = view
                .self_slot()
                .and_then(|slot| view.predecessor_of(slot))
                .map(|(slot, _)| slot);
            let mut lost_predecessor = false;
            for silent in view.silent_members(self.heartbeat_threshold()) {
                log::warn!(
                    "member {} declared dead after {} silent ticks",
                    silent.address,
                    silent.heartbeat,
                );
                GlobalMetrics::get().gossip.dead_members.add(1, &[]);
                if silent.position.slot().is_some() && silent.position.slot() == predecessor {
                    lost_predecessor = true;
                }
                view.update_member(Member::new(
                    RingPosition::Gone,
                    silent.address,
                    silent.heartbeat,
                    Movement::Leaving,
                ));
            }

            let subjects = view.gossip_subjects(&receiver);
            (receiver, subjects, lost_predecessor)
        };

        let metrics = &GlobalMetrics::get().gossip;
        for subject in &subjects {
            let frame = frame_datagram(self.listen_port(), &marshal_member(Some(subject)));
            debug_assert!(frame.len() <= MAX_DATAGRAM);
            match self
                .socket()
                .send_to(frame.as_bytes(), receiver.address.as_str())
                .await
            {
                Ok(_) => metrics.datagrams_out.add(1, &[]),
                Err(err) => log::error!("gossip send to {} failed: {err}", receiver.address),
            }
        }

        if lost_predecessor {
            // We just inherited the dead predecessor's arc; our held keys are
            // short one copy on the far side.
            self.refresh_replicas().await;
        }
    }

    fn handle_datagram(&self, data: &[u8], from: SocketAddr) {
        GlobalMetrics::get().gossip.datagrams_in.add(1, &[]);

        let Ok(text) = std::str::from_utf8(data) else {
            log::error!("dropping non-utf8 datagram from {from}");
            return;
        };
        let Some((port, tag, payload)) = parse_datagram(text) else {
            log::error!("dropping malformed datagram from {from}: {text:?}");
            return;
        };
        if tag != TAG_GOSSIP {
            log::debug!("dropping datagram with unknown tag {tag:?} from {from}");
            return;
        }

        let subject = match unmarshal_member(payload) {
            Ok(Some(subject)) => subject,
            Ok(None) => return,
            Err(err) => {
                log::error!("dropping undecodable gossip payload from {from}: {err:?}");
                return;
            }
        };

        let sender = format!("{}:{port}", from.ip());
        log::debug!("gossip from {sender}: {subject:?}");

        let mut view = self.view_mut();
        // Hearing from the sender at all is evidence it is alive.
        view.reset_heartbeat(&sender);
        view.update_member(subject);
    }

    pub(crate) fn advance_clock(&self) {
        self.ticks().fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_round_trip() {
        let member = Member::new(
            RingPosition::Slot(77),
            "127.0.0.1:4567",
            0,
            Movement::Stable,
        );
        let frame = frame_datagram(4567, &marshal_member(Some(&member)));
        assert_eq!(frame, "4567<PORT>GOSSIP|%|77$$$127.0.0.1:4567$$$0$$$2");

        let (port, tag, payload) = parse_datagram(&frame).unwrap();
        assert_eq!(port, "4567");
        assert_eq!(tag, TAG_GOSSIP);
        assert_eq!(unmarshal_member(payload).unwrap(), Some(member));
    }

    #[test]
    fn test_parse_rejects_unframed_text() {
        assert!(parse_datagram("GOSSIP|%|NIL").is_none());
        assert!(parse_datagram("4567<PORT>GOSSIP-NIL").is_none());
    }
}
