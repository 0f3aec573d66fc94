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

use serde::Deserialize;
use serde::Serialize;

/// The reserved value that marks a replica-level delete. Client-supplied
/// values must never carry it.
pub const TOMBSTONE: &str = "##DELETE##";

/// A user-visible key/value pair. Keys live in the ring space; values are
/// opaque to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEntry {
    pub key: u32,
    pub value: String,
}

impl KeyEntry {
    pub fn new(key: u32, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.value == TOMBSTONE
    }
}

/// The ordered in-memory key store of a node. Holds both the keys the node
/// owns and the keys replicated to it from upstream owners.
#[derive(Debug, Clone, Default)]
pub struct KeyStore {
    entries: BTreeMap<u32, String>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts `(key, value)` unless the key is already present. Returns
    /// whether the entry was inserted; an existing entry is left untouched.
    pub fn insert_new(&mut self, key: u32, value: impl Into<String>) -> bool {
        match self.entries.entry(key) {
            std::collections::btree_map::Entry::Vacant(ent) => {
                ent.insert(value.into());
                true
            }
            std::collections::btree_map::Entry::Occupied(_) => false,
        }
    }

    /// Removes the entry for `key`, reporting whether one existed.
    pub fn remove(&mut self, key: u32) -> bool {
        self.entries.remove(&key).is_some()
    }

    pub fn get(&self, key: u32) -> Option<&str> {
        self.entries.get(&key).map(String::as_str)
    }

    /// The greatest entry with key less than or equal to `key`.
    pub fn floor(&self, key: u32) -> Option<KeyEntry> {
        self.entries
            .range(..=key)
            .next_back()
            .map(|(k, v)| KeyEntry::new(*k, v.clone()))
    }

    /// Removes and returns every entry with key less than or equal to `key`,
    /// in ascending order.
    pub fn drain_up_to(&mut self, key: u32) -> Vec<KeyEntry> {
        let rest = match key.checked_add(1) {
            Some(bound) => self.entries.split_off(&bound),
            None => BTreeMap::new(),
        };
        let handed = std::mem::replace(&mut self.entries, rest);
        handed
            .into_iter()
            .map(|(k, v)| KeyEntry::new(k, v))
            .collect()
    }

    /// A point-in-time copy of the full store, in key order.
    pub fn snapshot(&self) -> Vec<KeyEntry> {
        self.entries
            .iter()
            .map(|(k, v)| KeyEntry::new(*k, v.clone()))
            .collect()
    }
}
