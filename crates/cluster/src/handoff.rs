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

use error_stack::Result;
use error_stack::bail;
use ringkv_core::ring_hash;

use crate::ClusterError;
use crate::member::Member;
use crate::member::Movement;
use crate::member::RingPosition;
use crate::node::NodeState;

impl NodeState {
    /// Registers this node as the founding ring member at its hashed address.
    pub fn register_first_member(&self) {
        let slot = self
            .ring_slot_override()
            .unwrap_or_else(|| ring_hash(self.advertise_addr()));
        log::info!("founding the ring at slot {slot}");
        self.view_mut().update_member(Member::new(
            RingPosition::Slot(slot),
            self.advertise_addr(),
            self.initial_heartbeat(),
            Movement::Stable,
        ));
    }

    /// Registers this node as a client-only member with `contact` as its first
    /// known ring member. The rest of the ring arrives via gossip.
    pub fn register_client(&self, contact: &str) {
        let mut view = self.view_mut();
        view.update_member(Member::new(
            RingPosition::Client,
            self.advertise_addr(),
            0,
            Movement::Stable,
        ));
        view.update_member(Member::new(
            RingPosition::Slot(ring_hash(contact)),
            contact,
            0,
            Movement::Stable,
        ));
    }

    /// Joins the ring through `contact`, pulling the keys of the new arc from
    /// the current successor.
    ///
    /// The candidate slot hashes the address together with a wall-clock stamp
    /// so a rejoining node does not collide with its own stale slot. Each
    /// received key advances this node's exposed arc as a `Joining` member;
    /// the final promotion claims the full slot as `Stable`.
    pub async fn join_group(&self, contact: &str) -> Result<(), ClusterError> {
        let slot = self.ring_slot_override().unwrap_or_else(|| {
            ring_hash(&format!("{}{}", self.advertise_addr(), jiff::Timestamp::now()))
        });

        let Some(successor) = self.transport().get_successor(contact, slot).await? else {
            bail!(ClusterError::Internal(format!(
                "contact {contact} knows no ring members"
            )));
        };
        log::info!(
            "joining at slot {slot}; pulling entries from successor {}",
            successor.address,
        );
        self.view_mut().update_member(successor.clone());

        let entries = self
            .transport()
            .get_entry_data(&successor.address, slot, self.advertise_addr().to_string())
            .await?;
        for entry in entries {
            let mut view = self.view_mut();
            view.store.insert_new(entry.key, entry.value);
            view.update_member(Member::new(
                RingPosition::Slot(entry.key),
                self.advertise_addr(),
                0,
                Movement::Joining,
            ));
        }

        self.view_mut().update_member(Member::new(
            RingPosition::Slot(slot),
            self.advertise_addr(),
            self.initial_heartbeat(),
            Movement::Stable,
        ));
        Ok(())
    }

    /// Leaves the ring: drains held keys to the current successor in
    /// descending order, shrinking this node's claimed arc per key, then
    /// announces the departure and gossips it one last time.
    pub async fn leave_group(&self) -> Result<(), ClusterError> {
        let Some(own_slot) = self.view().self_slot() else {
            log::info!("not on the ring; nothing to hand off");
            return Ok(());
        };

        // Ask a random member rather than trusting a cached successor; the
        // ring may have changed under us.
        let receiver = {
            let view = self.view();
            let mut rng = rand::rng();
            view.random_live_peer(&mut rng)
                .map(|m| m.address)
                .unwrap_or_else(|| view.self_addr().to_string())
        };
        let Some(successor) = self.transport().get_successor(&receiver, own_slot).await? else {
            bail!(ClusterError::Internal(
                "no successor found to hand data to".to_string()
            ));
        };
        self.view_mut().update_member(successor.clone());

        if successor.address == self.advertise_addr() {
            log::info!("sole ring member; departing without handoff");
        } else {
            log::info!("handing held keys to successor {}", successor.address);
            let mut cursor = own_slot;
            loop {
                let Some(entry) = self.view().store.floor(cursor) else {
                    break;
                };
                let reply = match self
                    .transport()
                    .call(&successor.address, "send_leave_data", &entry)
                    .await
                {
                    Ok(reply) => reply,
                    Err(err) => {
                        log::error!("leave handoff interrupted: {err:?}");
                        break;
                    }
                };
                if reply.success != 1 {
                    log::error!("successor refused key {}; stopping handoff", entry.key);
                    break;
                }

                let mut view = self.view_mut();
                view.store.remove(entry.key);
                view.update_member(Member::new(
                    RingPosition::Slot(entry.key),
                    self.advertise_addr(),
                    0,
                    Movement::Leaving,
                ));
                cursor = entry.key;
            }
        }

        self.view_mut().update_member(Member::new(
            RingPosition::Gone,
            self.advertise_addr(),
            0,
            Movement::DataSentAndLeft,
        ));

        // One last round so someone hears that we left.
        self.gossip_tick().await;
        log::info!("departed the ring");
        Ok(())
    }
}
