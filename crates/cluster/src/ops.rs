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

use ringkv_core::KeyEntry;
use ringkv_core::TOMBSTONE;
use ringkv_metrics::GlobalMetrics;
use ringkv_metrics::OperationMetrics;

use crate::member::Member;
use crate::member::Movement;
use crate::member::RingPosition;
use crate::node::NodeState;
use crate::rpc::ConsistentOpArgs;
use crate::rpc::RpcReply;

/// How many times a caller chases owner hints before giving up. Stale views
/// converge within a hop or two; anything longer means the ring is churning
/// faster than gossip can follow.
const OWNER_RETRIES: usize = 3;

/// How many replica acknowledgements a write awaits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consistency {
    One,
    Quorum,
    All,
}

impl Consistency {
    /// Decodes the external level: `-1` selects the non-consistent path.
    pub fn from_level(level: i32) -> std::result::Result<Option<Self>, String> {
        match level {
            -1 => Ok(None),
            0 => Ok(Some(Consistency::One)),
            1 => Ok(Some(Consistency::Quorum)),
            2 => Ok(Some(Consistency::All)),
            other => Err(format!("invalid consistency level: {other}")),
        }
    }

    pub fn level(level: Option<Self>) -> i32 {
        match level {
            None => -1,
            Some(Consistency::One) => 0,
            Some(Consistency::Quorum) => 1,
            Some(Consistency::All) => 2,
        }
    }
}

/// A client-facing data operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataOp {
    Insert,
    Update,
    Remove,
    Lookup,
}

impl DataOp {
    fn method(self, consistent: bool) -> &'static str {
        match (self, consistent) {
            (DataOp::Insert, false) => "send_data",
            (DataOp::Insert, true) => "send_data_consistent",
            (DataOp::Update, false) => "update_data",
            (DataOp::Update, true) => "update_data_consistent",
            (DataOp::Remove, false) => "remove_data",
            (DataOp::Remove, true) => "remove_data_consistent",
            (DataOp::Lookup, false) => "get_data",
            (DataOp::Lookup, true) => "get_data_consistent",
        }
    }

    fn metric_label(self) -> &'static str {
        match self {
            DataOp::Insert => OperationMetrics::OPERATION_INSERT,
            DataOp::Update => OperationMetrics::OPERATION_UPDATE,
            DataOp::Remove => OperationMetrics::OPERATION_REMOVE,
            DataOp::Lookup => OperationMetrics::OPERATION_LOOKUP,
        }
    }

    fn mutates(self) -> bool {
        !matches!(self, DataOp::Lookup)
    }
}

impl NodeState {
    /// A hint to the current owner when this node's view says the key belongs
    /// elsewhere.
    fn owner_hint(&self, key: u32) -> Option<Member> {
        let view = self.view();
        let (_, owner) = view.owner_of(key)?;
        (owner.address != view.self_addr()).then_some(owner)
    }

    /// Owner-side insert.
    pub async fn handle_send_data(
        &self,
        level: Option<Consistency>,
        entry: KeyEntry,
    ) -> RpcReply {
        if let Some(newer) = self.owner_hint(entry.key) {
            return RpcReply::rejected_with_hint(newer);
        }

        let inserted = self.view_mut().store.insert_new(entry.key, entry.value.clone());
        if !inserted {
            log::debug!("refusing insert: key {} already stored", entry.key);
            return RpcReply::rejected();
        }
        RpcReply {
            success: self.replicate(level, &entry).await,
            data: None,
            member: None,
        }
    }

    /// Owner-side update: delete any existing entry, then insert the new one.
    pub async fn handle_update_data(
        &self,
        level: Option<Consistency>,
        entry: KeyEntry,
    ) -> RpcReply {
        let removed = self.view_mut().store.remove(entry.key);
        if !removed {
            if let Some(newer) = self.owner_hint(entry.key) {
                return RpcReply::rejected_with_hint(newer);
            }
            log::debug!("data doesn't exist: key {}", entry.key);
            return RpcReply::rejected();
        }

        let inserted = self.view_mut().store.insert_new(entry.key, entry.value.clone());
        if !inserted {
            log::error!("cannot update key {}: lost the slot mid-update", entry.key);
            return RpcReply::rejected();
        }
        RpcReply {
            success: self.replicate(level, &entry).await,
            data: None,
            member: None,
        }
    }

    /// Owner-side remove. A successful delete propagates a tombstone to the
    /// replicas.
    pub async fn handle_remove_data(
        &self,
        level: Option<Consistency>,
        mut entry: KeyEntry,
    ) -> RpcReply {
        let removed = self.view_mut().store.remove(entry.key);
        if !removed {
            if let Some(newer) = self.owner_hint(entry.key) {
                return RpcReply::rejected_with_hint(newer);
            }
            log::debug!("data doesn't exist: key {}", entry.key);
            return RpcReply::rejected();
        }

        entry.value = TOMBSTONE.to_string();
        RpcReply {
            success: self.replicate(level, &entry).await,
            data: None,
            member: None,
        }
    }

    /// Owner-side lookup.
    pub fn handle_get_data(&self, key: u32) -> RpcReply {
        let view = self.view();
        match view.store.get(key) {
            Some(value) => RpcReply::ok_with_data(KeyEntry::new(key, value)),
            None => {
                if let Some((_, owner)) = view.owner_of(key) {
                    if owner.address != view.self_addr() {
                        return RpcReply::rejected_with_hint(owner);
                    }
                }
                log::debug!("data doesn't exist: key {key}");
                RpcReply::rejected()
            }
        }
    }

    /// Replica write: unconditionally delete, then insert unless the value is
    /// a tombstone. Never re-replicates. A tombstone over a missing entry is
    /// still a success: the end state is the same.
    pub fn handle_write_data(&self, entry: KeyEntry) -> RpcReply {
        let mut view = self.view_mut();
        view.store.remove(entry.key);
        if entry.is_tombstone() {
            return RpcReply::ok();
        }
        RpcReply::from_success(view.store.insert_new(entry.key, entry.value))
    }

    /// Bulk join handoff: hand out every held key at or below the joiner's
    /// slot, deleting each locally and exposing the joiner's growing arc.
    pub fn handle_get_entry_data(&self, id: u32, joiner: String) -> Vec<KeyEntry> {
        let mut view = self.view_mut();
        let handed = view.store.drain_up_to(id);
        for entry in &handed {
            view.update_member(Member::new(
                RingPosition::Slot(entry.key),
                joiner.clone(),
                0,
                Movement::Joining,
            ));
        }
        log::info!("handed {} entries to joiner {joiner}", handed.len());
        handed
    }

    /// Accepts one key from a leaving predecessor and replicates it onward.
    pub async fn handle_send_leave_data(&self, entry: KeyEntry) -> RpcReply {
        let inserted = self.view_mut().store.insert_new(entry.key, entry.value.clone());
        if !inserted {
            log::error!("cannot store leave data: key {} already stored", entry.key);
            return RpcReply::rejected();
        }
        self.write_to_replicas(&entry).await;
        RpcReply::ok()
    }

    pub fn handle_get_successor(&self, id: u32) -> Option<Member> {
        self.view().successor_of(id).map(|(_, member)| member)
    }

    /// Executes a client-originated operation: route to the key's owner from
    /// the local view, chase owner hints a bounded number of times, and
    /// surface transport failures after the transport's own retries.
    pub async fn route_operation(
        &self,
        op: DataOp,
        key: u32,
        value: String,
        level: Option<Consistency>,
    ) -> RpcReply {
        let metrics = &GlobalMetrics::get().operation;
        let start = std::time::Instant::now();
        let reply = self.route_operation_inner(op, key, value, level).await;

        let status = match reply.success {
            1 => OperationMetrics::STATUS_SUCCESS,
            RpcReply::TRANSPORT_FAILED => OperationMetrics::STATUS_FAILURE,
            _ => OperationMetrics::STATUS_REJECTED,
        };
        let labels = OperationMetrics::operation_labels(op.metric_label(), status);
        metrics.count.add(1, &labels);
        metrics
            .duration
            .record(start.elapsed().as_secs_f64(), &labels);
        reply
    }

    async fn route_operation_inner(
        &self,
        op: DataOp,
        key: u32,
        value: String,
        level: Option<Consistency>,
    ) -> RpcReply {
        if op.mutates() && value == TOMBSTONE {
            log::error!("rejecting reserved tombstone value from client");
            return RpcReply::rejected();
        }

        for _ in 0..OWNER_RETRIES {
            let owner = {
                let view = self.view();
                view.owner_of(key).map(|(_, member)| member)
            };
            let Some(owner) = owner else {
                log::error!("no ring members known; cannot route key {key}");
                return RpcReply::rejected();
            };

            let entry = KeyEntry::new(key, value.clone());
            let result = match level {
                None => {
                    self.transport()
                        .call(&owner.address, op.method(false), &entry)
                        .await
                }
                Some(level) => {
                    let args = ConsistentOpArgs {
                        consistency: Consistency::level(Some(level)),
                        entry,
                    };
                    self.transport()
                        .call(&owner.address, op.method(true), &args)
                        .await
                }
            };

            let reply = match result {
                Ok(reply) => reply,
                Err(err) => {
                    log::error!("giving up on {op:?} for key {key}: {err:?}");
                    return RpcReply::transport_failed();
                }
            };

            // The owner's view disagreed; adopt its hint and try again.
            if reply.success != 1 {
                if let Some(hint) = reply.member.clone() {
                    self.view_mut().update_member(hint);
                    continue;
                }
            }
            return reply;
        }

        log::error!("owner for key {key} kept moving; giving up");
        RpcReply::rejected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_decoding() {
        assert_eq!(Consistency::from_level(-1).unwrap(), None);
        assert_eq!(Consistency::from_level(0).unwrap(), Some(Consistency::One));
        assert_eq!(
            Consistency::from_level(1).unwrap(),
            Some(Consistency::Quorum)
        );
        assert_eq!(Consistency::from_level(2).unwrap(), Some(Consistency::All));
        assert!(Consistency::from_level(3).is_err());
    }

    #[test]
    fn test_method_names() {
        assert_eq!(DataOp::Insert.method(false), "send_data");
        assert_eq!(DataOp::Insert.method(true), "send_data_consistent");
        assert_eq!(DataOp::Lookup.method(true), "get_data_consistent");
    }
}
