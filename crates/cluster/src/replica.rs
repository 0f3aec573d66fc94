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
use ringkv_metrics::GlobalMetrics;

use crate::node::NodeState;
use crate::ops::Consistency;

impl NodeState {
    /// Writes `entry` to the next `replica_count` live successors of this
    /// node's ring position and returns how many acknowledged. Failed
    /// successors are logged and skipped; the cursor stops once it wraps back
    /// around to this node.
    pub(crate) async fn write_to_replicas(&self, entry: &KeyEntry) -> usize {
        let target = self.replica_count();
        let Some(own_slot) = self.view().self_slot() else {
            return 0;
        };

        let mut cursor = own_slot;
        let mut sent = 0;
        let mut scanned = 0;
        loop {
            let (ring_len, successor) = {
                let view = self.view();
                (view.ring_len(), view.successor_of(cursor))
            };
            if sent >= target || scanned >= ring_len {
                break;
            }
            let Some((slot, member)) = successor else {
                break;
            };
            if slot == own_slot {
                // Wrapped around: the only remaining successor is ourselves.
                break;
            }
            cursor = slot;
            scanned += 1;

            match self
                .transport()
                .call_once(&member.address, "write_data", entry)
                .await
            {
                Ok(reply) if reply.success == 1 => {
                    sent += 1;
                    GlobalMetrics::get().replication.writes.add(1, &[]);
                }
                Ok(reply) => {
                    log::error!(
                        "replica {} refused key {}: success={}",
                        member.address,
                        entry.key,
                        reply.success,
                    );
                }
                Err(err) => {
                    log::error!("replica write to {} failed: {err:?}", member.address);
                }
            }
        }

        if sent < target {
            log::warn!(
                "replicated key {} to {sent} of {target} successors",
                entry.key,
            );
        }
        sent
    }

    /// Runs replication after a successful local mutation and maps the
    /// acknowledgement count to the requested consistency level. The
    /// non-consistent path and ONE succeed on the local write alone.
    pub(crate) async fn replicate(&self, level: Option<Consistency>, entry: &KeyEntry) -> i32 {
        let target = self.replica_count();
        let sent = self.write_to_replicas(entry).await;
        let satisfied = match level {
            None | Some(Consistency::One) => true,
            Some(Consistency::Quorum) => sent >= quorum(target),
            Some(Consistency::All) => sent == target,
        };
        if !satisfied {
            GlobalMetrics::get().replication.shortfalls.add(1, &[]);
        }
        i32::from(satisfied)
    }

    /// Re-replicates every held key. Runs when this node's ring predecessor
    /// dies: the inherited arc's far-side copies are gone.
    pub(crate) async fn refresh_replicas(&self) {
        let entries = self.view().store_snapshot();
        log::info!("refreshing replicas for {} held keys", entries.len());
        for entry in entries {
            self.write_to_replicas(&entry).await;
        }
    }
}

/// Replica acknowledgements needed for a quorum; together with the owner's
/// local copy this is a majority of the `target + 1` copies.
pub(crate) fn quorum(target: usize) -> usize {
    (target + 1) / 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quorum_counts() {
        assert_eq!(quorum(1), 1);
        assert_eq!(quorum(2), 1);
        assert_eq!(quorum(3), 2);
        assert_eq!(quorum(4), 2);
        assert_eq!(quorum(5), 3);
    }
}
