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

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::hash_map::Entry;

use rand::Rng;
use ringkv_core::KeyStore;

use crate::member::Member;
use crate::member::Movement;
use crate::member::RingPosition;

/// A node's picture of the cluster: every member it has heard of (keyed by
/// address), the ordered index of live ring positions, and the key entries the
/// node currently holds. All mutation funnels through [`RingView::update_member`];
/// the holder serializes access behind a single lock.
#[derive(Debug)]
pub struct RingView {
    self_addr: String,
    members: HashMap<String, Member>,
    owner_index: BTreeMap<u32, String>,
    pub(crate) store: KeyStore,
}

impl RingView {
    pub fn new(self_addr: impl Into<String>) -> Self {
        Self {
            self_addr: self_addr.into(),
            members: HashMap::new(),
            owner_index: BTreeMap::new(),
            store: KeyStore::new(),
        }
    }

    pub fn self_addr(&self) -> &str {
        &self.self_addr
    }

    pub fn member(&self, addr: &str) -> Option<&Member> {
        self.members.get(addr)
    }

    /// The local node's current ring slot, if it is on the ring.
    pub fn self_slot(&self) -> Option<u32> {
        self.members
            .get(&self.self_addr)
            .and_then(|m| m.position.slot())
    }

    pub fn ring_len(&self) -> usize {
        self.owner_index.len()
    }

    /// The live ring in slot order, as `(slot, address)` pairs.
    pub fn ring_snapshot(&self) -> Vec<(u32, String)> {
        self.owner_index
            .iter()
            .map(|(slot, addr)| (*slot, addr.clone()))
            .collect()
    }

    pub fn member_snapshot(&self) -> Vec<Member> {
        let mut members: Vec<Member> = self.members.values().cloned().collect();
        members.sort_by(|a, b| a.address.cmp(&b.address));
        members
    }

    /// The single gate through which every membership mutation passes.
    ///
    /// Keeps the address map and the ring index consistent with one another:
    /// unknown addresses are inserted (client positions never touch the ring
    /// index, and a slot collision is reported and skipped); known addresses
    /// are refreshed subject to lifecycle monotonicity, moving the ring entry
    /// when a Joining id grows or a Leaving/departed id shrinks.
    pub fn update_member(&mut self, candidate: Member) {
        let addr = candidate.address.clone();
        match self.members.entry(addr.clone()) {
            Entry::Vacant(ent) => {
                let position = ent.insert(candidate).position;
                if let RingPosition::Slot(slot) = position {
                    if self.owner_index.contains_key(&slot) {
                        log::error!("two members with same ring id {slot}; ignoring {addr}");
                    } else {
                        self.owner_index.insert(slot, addr);
                    }
                }
            }
            Entry::Occupied(mut ent) => {
                let local = ent.get_mut();

                // A lower remote counter is evidence the peer was seen alive
                // more recently than we thought.
                if local.heartbeat > candidate.heartbeat {
                    local.heartbeat = 0;
                }

                // Client records never affect routing.
                if candidate.position == RingPosition::Client {
                    return;
                }

                // Lifecycle is monotone: a Stable report cannot override a
                // Leaving one.
                if local.movement < candidate.movement {
                    log::debug!(
                        "rejecting lifecycle regression for {addr}: {:?} -> {:?}",
                        local.movement,
                        candidate.movement,
                    );
                    return;
                }

                let last_position = local.position;
                let last_movement = local.movement;
                let next_position = candidate.position;
                let next_movement = candidate.movement;
                *local = candidate;

                let joining_grow = (next_movement == Movement::Joining
                    || last_movement == Movement::Joining)
                    && next_position > last_position;
                let leaving_shrink = (matches!(
                    next_movement,
                    Movement::Leaving | Movement::DataSentAndLeft
                ) || matches!(
                    last_movement,
                    Movement::Leaving | Movement::DataSentAndLeft
                )) && next_position < last_position;

                if joining_grow || leaving_shrink {
                    if let RingPosition::Slot(old) = last_position {
                        self.owner_index.remove(&old);
                    }
                    if let RingPosition::Slot(new) = next_position {
                        match self.owner_index.get(&new) {
                            Some(holder) if holder != &addr => {
                                log::error!("two members with same ring id {new}; ignoring {addr}");
                            }
                            _ => {
                                self.owner_index.insert(new, addr);
                            }
                        }
                    }
                }
            }
        }
    }

    /// Resets a member's silence counter, if the address is known.
    pub fn reset_heartbeat(&mut self, addr: &str) {
        if let Some(member) = self.members.get_mut(addr) {
            member.heartbeat = 0;
        }
    }

    /// Advances every non-local silence counter by one gossip tick.
    pub fn increment_heartbeats(&mut self) {
        for member in self.members.values_mut() {
            if member.address != self.self_addr {
                member.heartbeat += 1;
            }
        }
    }

    /// Members whose silence exceeded the threshold and are not yet declared
    /// gone.
    pub fn silent_members(&self, threshold: u64) -> Vec<Member> {
        self.members
            .values()
            .filter(|m| m.heartbeat > threshold && m.position != RingPosition::Gone)
            .cloned()
            .collect()
    }

    /// One random member that is not gone and not the local node. Clients are
    /// eligible: they listen for gossip like everyone else.
    pub fn random_live_peer<R: Rng>(&self, rng: &mut R) -> Option<Member> {
        let peers: Vec<&Member> = self
            .members
            .values()
            .filter(|m| m.position.is_live() && m.address != self.self_addr)
            .collect();
        if peers.is_empty() {
            return None;
        }
        Some(peers[rng.random_range(0..peers.len())].clone())
    }

    /// The gossip subjects to forward to `receiver`: everyone whose position
    /// differs from the receiver's own.
    pub fn gossip_subjects(&self, receiver: &Member) -> Vec<Member> {
        self.members
            .values()
            .filter(|m| m.position != receiver.position)
            .cloned()
            .collect()
    }

    /// The owner of `key`: the member with the least slot >= key, wrapping to
    /// the least slot overall.
    pub fn owner_of(&self, key: u32) -> Option<(u32, Member)> {
        let entry = self
            .owner_index
            .range(key..)
            .next()
            .or_else(|| self.owner_index.iter().next());
        self.resolve(entry)
    }

    /// The strict successor of ring position `slot`, wrapping. With a single
    /// entry the successor is that entry itself.
    pub fn successor_of(&self, slot: u32) -> Option<(u32, Member)> {
        let entry = match slot.checked_add(1) {
            Some(from) => self.owner_index.range(from..).next(),
            None => None,
        }
        .or_else(|| self.owner_index.iter().next());
        self.resolve(entry)
    }

    /// The strict predecessor of ring position `slot`, wrapping.
    pub fn predecessor_of(&self, slot: u32) -> Option<(u32, Member)> {
        let entry = self
            .owner_index
            .range(..slot)
            .next_back()
            .or_else(|| self.owner_index.iter().next_back());
        self.resolve(entry)
    }

    fn resolve(&self, entry: Option<(&u32, &String)>) -> Option<(u32, Member)> {
        let (slot, addr) = entry?;
        let member = self.members.get(addr)?;
        Some((*slot, member.clone()))
    }

    pub fn store_snapshot(&self) -> Vec<ringkv_core::KeyEntry> {
        self.store.snapshot()
    }

    /// Checks the view's internal agreement: the ring index is injective and
    /// every indexed address points back at a live member with that slot.
    #[cfg(test)]
    fn assert_consistent(&self) {
        for (slot, addr) in &self.owner_index {
            let member = self.members.get(addr).expect("indexed address unknown");
            assert_eq!(member.position, RingPosition::Slot(*slot));
            assert_ne!(member.movement, Movement::DataSentAndLeft);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stable(slot: u32, addr: &str) -> Member {
        Member::new(RingPosition::Slot(slot), addr, 0, Movement::Stable)
    }

    fn view() -> RingView {
        let mut view = RingView::new("127.0.0.1:4567");
        view.update_member(stable(100, "127.0.0.1:4567"));
        view.update_member(stable(500, "127.0.0.1:4568"));
        view.update_member(stable(900, "127.0.0.1:4569"));
        view
    }

    #[test]
    fn test_unknown_address_joins_index() {
        let view = view();
        assert_eq!(view.ring_len(), 3);
        assert_eq!(view.self_slot(), Some(100));
        view.assert_consistent();
    }

    #[test]
    fn test_client_never_touches_index() {
        let mut view = view();
        view.update_member(Member::new(
            RingPosition::Client,
            "127.0.0.1:9999",
            0,
            Movement::Stable,
        ));
        assert_eq!(view.ring_len(), 3);
        assert!(view.member("127.0.0.1:9999").is_some());
        view.assert_consistent();
    }

    #[test]
    fn test_slot_collision_reported_not_resolved() {
        let mut view = view();
        view.update_member(stable(500, "127.0.0.1:4570"));
        assert_eq!(view.ring_len(), 3);
        assert_eq!(
            view.owner_of(500).map(|(_, m)| m.address),
            Some("127.0.0.1:4568".to_string())
        );
        view.assert_consistent();
    }

    #[test]
    fn test_heartbeat_reset_on_fresher_view() {
        let mut view = view();
        view.update_member(Member::new(
            RingPosition::Slot(500),
            "127.0.0.1:4568",
            40,
            Movement::Stable,
        ));
        // The remote reports less silence than we accumulated: reset.
        let mut fresher = stable(500, "127.0.0.1:4568");
        fresher.heartbeat = 2;
        view.update_member(fresher);
        assert_eq!(view.member("127.0.0.1:4568").unwrap().heartbeat, 2);
    }

    #[test]
    fn test_lifecycle_never_regresses() {
        let mut view = view();
        view.update_member(Member::new(
            RingPosition::Slot(400),
            "127.0.0.1:4568",
            0,
            Movement::Leaving,
        ));
        // A stale Stable report must not resurrect the leaver.
        view.update_member(stable(500, "127.0.0.1:4568"));
        let member = view.member("127.0.0.1:4568").unwrap();
        assert_eq!(member.movement, Movement::Leaving);
        assert_eq!(member.position, RingPosition::Slot(400));
        view.assert_consistent();
    }

    #[test]
    fn test_reset_survives_rejected_update() {
        let mut view = view();
        let mut silent = stable(500, "127.0.0.1:4568");
        silent.heartbeat = 40;
        view.update_member(silent);
        view.update_member(Member::new(
            RingPosition::Slot(400),
            "127.0.0.1:4568",
            40,
            Movement::Leaving,
        ));

        // A stale Stable report is rejected, but its lower heartbeat still
        // counts as evidence of life.
        let mut stale = stable(500, "127.0.0.1:4568");
        stale.heartbeat = 1;
        view.update_member(stale);
        let member = view.member("127.0.0.1:4568").unwrap();
        assert_eq!(member.movement, Movement::Leaving);
        assert_eq!(member.heartbeat, 0);
    }

    #[test]
    fn test_leaving_shrinks_ring_entry() {
        let mut view = view();
        view.update_member(Member::new(
            RingPosition::Slot(300),
            "127.0.0.1:4568",
            0,
            Movement::Leaving,
        ));
        assert_eq!(
            view.owner_of(400).map(|(slot, _)| slot),
            Some(900),
            "keys above the shed range move to the successor"
        );
        assert_eq!(view.owner_of(200).map(|(slot, _)| slot), Some(300));
        view.assert_consistent();
    }

    #[test]
    fn test_departed_member_leaves_index() {
        let mut view = view();
        view.update_member(Member::new(
            RingPosition::Gone,
            "127.0.0.1:4568",
            0,
            Movement::DataSentAndLeft,
        ));
        assert_eq!(view.ring_len(), 2);
        assert!(view.member("127.0.0.1:4568").is_some(), "record is retained");
        view.assert_consistent();
    }

    #[test]
    fn test_joining_grows_ring_entry() {
        let mut view = RingView::new("127.0.0.1:4567");
        view.update_member(stable(900, "127.0.0.1:4567"));
        for slot in [100, 500] {
            view.update_member(Member::new(
                RingPosition::Slot(slot),
                "127.0.0.1:4568",
                0,
                Movement::Joining,
            ));
            assert_eq!(view.owner_of(50).map(|(s, _)| s), Some(slot));
        }
        view.update_member(stable(600, "127.0.0.1:4568"));
        assert_eq!(view.owner_of(550).map(|(s, _)| s), Some(600));
        assert_eq!(view.ring_len(), 2);
        view.assert_consistent();
    }

    #[test]
    fn test_owner_wraps() {
        let view = view();
        assert_eq!(view.owner_of(0).map(|(s, _)| s), Some(100));
        assert_eq!(view.owner_of(100).map(|(s, _)| s), Some(100));
        assert_eq!(view.owner_of(101).map(|(s, _)| s), Some(500));
        assert_eq!(view.owner_of(901).map(|(s, _)| s), Some(100));
    }

    #[test]
    fn test_successor_and_predecessor_wrap() {
        let view = view();
        assert_eq!(view.successor_of(100).map(|(s, _)| s), Some(500));
        assert_eq!(view.successor_of(900).map(|(s, _)| s), Some(100));
        assert_eq!(view.predecessor_of(100).map(|(s, _)| s), Some(900));
        assert_eq!(view.predecessor_of(900).map(|(s, _)| s), Some(500));
    }

    #[test]
    fn test_successor_of_sole_member_is_itself() {
        let mut view = RingView::new("127.0.0.1:4567");
        view.update_member(stable(100, "127.0.0.1:4567"));
        assert_eq!(view.successor_of(100).map(|(s, _)| s), Some(100));
        assert_eq!(view.successor_of(600).map(|(s, _)| s), Some(100));
    }

    #[test]
    fn test_silence_bookkeeping() {
        let mut view = view();
        view.increment_heartbeats();
        view.increment_heartbeats();
        assert_eq!(view.member("127.0.0.1:4567").unwrap().heartbeat, 0);
        assert_eq!(view.member("127.0.0.1:4568").unwrap().heartbeat, 2);

        assert!(view.silent_members(1).iter().all(|m| m.heartbeat > 1));
        assert_eq!(view.silent_members(1).len(), 2);
        assert_eq!(view.silent_members(2).len(), 0);

        view.reset_heartbeat("127.0.0.1:4568");
        assert_eq!(view.member("127.0.0.1:4568").unwrap().heartbeat, 0);
    }

    #[test]
    fn test_random_live_peer_skips_self_and_gone() {
        let mut view = view();
        view.update_member(Member::new(
            RingPosition::Gone,
            "127.0.0.1:4569",
            0,
            Movement::Leaving,
        ));
        let mut rng = rand::rng();
        for _ in 0..16 {
            let peer = view.random_live_peer(&mut rng).unwrap();
            assert_eq!(peer.address, "127.0.0.1:4568");
        }
    }

    #[test]
    fn test_gossip_subjects_skip_receiver() {
        let view = view();
        let receiver = view.member("127.0.0.1:4568").unwrap().clone();
        let subjects = view.gossip_subjects(&receiver);
        assert_eq!(subjects.len(), 2);
        assert!(subjects.iter().all(|s| s.address != receiver.address));
    }
}
