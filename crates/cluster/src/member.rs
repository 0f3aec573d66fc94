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
use error_stack::report;
use ringkv_core::RING_SLOTS;
use serde::Deserialize;
use serde::Serialize;

use crate::ClusterError;

/// A member's place on the ring. `Gone` and `Client` travel on the wire as the
/// reserved integers `-1` and `-204`; live members carry their slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum RingPosition {
    Slot(u32),
    /// Dead or departed. The member record is retained so gossip cannot
    /// silently re-introduce the address.
    Gone,
    /// A client-only member that is never placed on the ring.
    Client,
}

impl RingPosition {
    pub fn slot(self) -> Option<u32> {
        match self {
            RingPosition::Slot(slot) => Some(slot),
            _ => None,
        }
    }

    pub fn is_live(self) -> bool {
        !matches!(self, RingPosition::Gone)
    }
}

impl From<RingPosition> for i64 {
    fn from(position: RingPosition) -> i64 {
        match position {
            RingPosition::Slot(slot) => i64::from(slot),
            RingPosition::Gone => -1,
            RingPosition::Client => -204,
        }
    }
}

impl TryFrom<i64> for RingPosition {
    type Error = String;

    fn try_from(value: i64) -> std::result::Result<Self, String> {
        match value {
            -1 => Ok(RingPosition::Gone),
            -204 => Ok(RingPosition::Client),
            slot if (0..i64::from(RING_SLOTS)).contains(&slot) => {
                Ok(RingPosition::Slot(slot as u32))
            }
            other => Err(format!("invalid ring position: {other}")),
        }
    }
}

impl PartialOrd for RingPosition {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RingPosition {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        i64::from(*self).cmp(&i64::from(*other))
    }
}

/// The lifecycle phase of a member. The order is the lifecycle order: an
/// update may never raise a member's phase, which is what keeps a stale
/// `Stable` report from resurrecting a node that already started leaving.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum Movement {
    DataSentAndLeft,
    Leaving,
    Stable,
    Joining,
}

impl From<Movement> for u8 {
    fn from(movement: Movement) -> u8 {
        match movement {
            Movement::DataSentAndLeft => 0,
            Movement::Leaving => 1,
            Movement::Stable => 2,
            Movement::Joining => 3,
        }
    }
}

impl TryFrom<u8> for Movement {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, String> {
        match value {
            0 => Ok(Movement::DataSentAndLeft),
            1 => Ok(Movement::Leaving),
            2 => Ok(Movement::Stable),
            3 => Ok(Movement::Joining),
            other => Err(format!("invalid movement: {other}")),
        }
    }
}

/// A known peer. The address is the durable identity; the position is the
/// (possibly transient) place on the ring; the heartbeat is a silence counter
/// reset by any evidence of liveness.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Member {
    pub position: RingPosition,
    pub address: String,
    pub heartbeat: u64,
    pub movement: Movement,
}

impl Member {
    pub fn new(
        position: RingPosition,
        address: impl Into<String>,
        heartbeat: u64,
        movement: Movement,
    ) -> Self {
        Self {
            position,
            address: address.into(),
            heartbeat,
            movement,
        }
    }
}

/// Field separator of the gossip member serialization. Reserved; must not
/// appear inside any field.
const FIELD_SEP: &str = "$$$";
/// The wire image of a null member.
const NIL: &str = "NIL";

/// Serializes a member for the gossip datagram payload.
pub fn marshal_member(member: Option<&Member>) -> String {
    match member {
        None => NIL.to_string(),
        Some(member) => {
            debug_assert!(!member.address.contains(FIELD_SEP));
            format!(
                "{}{FIELD_SEP}{}{FIELD_SEP}{}{FIELD_SEP}{}",
                i64::from(member.position),
                member.address,
                member.heartbeat,
                u8::from(member.movement),
            )
        }
    }
}

/// Deserializes a gossip payload. `NIL` decodes to `None` and is ignored by
/// receivers.
pub fn unmarshal_member(payload: &str) -> Result<Option<Member>, ClusterError> {
    if payload == NIL {
        return Ok(None);
    }

    let make_error = || ClusterError::Protocol(format!("malformed member payload: {payload:?}"));

    let mut fields = payload.splitn(4, FIELD_SEP);
    let mut next = || fields.next().ok_or_else(|| report!(make_error()));

    let position = next()?
        .parse::<i64>()
        .map_err(|_| report!(make_error()))
        .and_then(|raw| RingPosition::try_from(raw).map_err(|_| report!(make_error())))?;
    let address = next()?.to_string();
    let heartbeat = next()?.parse::<u64>().map_err(|_| report!(make_error()))?;
    let movement = next()?
        .parse::<u8>()
        .map_err(|_| report!(make_error()))
        .and_then(|raw| Movement::try_from(raw).map_err(|_| report!(make_error())))?;

    Ok(Some(Member::new(position, address, heartbeat, movement)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marshal_round_trip() {
        let member = Member::new(
            RingPosition::Slot(4711),
            "127.0.0.1:4567",
            3,
            Movement::Stable,
        );
        let payload = marshal_member(Some(&member));
        assert_eq!(payload, "4711$$$127.0.0.1:4567$$$3$$$2");
        assert_eq!(unmarshal_member(&payload).unwrap(), Some(member));
    }

    #[test]
    fn test_marshal_nil() {
        assert_eq!(marshal_member(None), "NIL");
        assert_eq!(unmarshal_member("NIL").unwrap(), None);
    }

    #[test]
    fn test_sentinels_on_wire() {
        let gone = Member::new(RingPosition::Gone, "10.0.0.1:4567", 30, Movement::Leaving);
        assert_eq!(marshal_member(Some(&gone)), "-1$$$10.0.0.1:4567$$$30$$$1");

        let client = Member::new(RingPosition::Client, "10.0.0.2:4567", 0, Movement::Stable);
        let decoded = unmarshal_member(&marshal_member(Some(&client))).unwrap();
        assert_eq!(decoded, Some(client));
    }

    #[test]
    fn test_unmarshal_rejects_garbage() {
        assert!(unmarshal_member("").is_err());
        assert!(unmarshal_member("12$$$only-two-fields").is_err());
        assert!(unmarshal_member("x$$$addr$$$0$$$2").is_err());
        // Position outside the ring space.
        assert!(unmarshal_member("1000000$$$addr$$$0$$$2").is_err());
        // Unknown movement discriminant.
        assert!(unmarshal_member("5$$$addr$$$0$$$9").is_err());
    }

    #[test]
    fn test_movement_order_is_lifecycle_order() {
        assert!(Movement::DataSentAndLeft < Movement::Leaving);
        assert!(Movement::Leaving < Movement::Stable);
        assert!(Movement::Stable < Movement::Joining);
    }

    #[test]
    fn test_position_order_uses_wire_image() {
        assert!(RingPosition::Client < RingPosition::Gone);
        assert!(RingPosition::Gone < RingPosition::Slot(0));
        assert!(RingPosition::Slot(0) < RingPosition::Slot(1));
    }
}
