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

use std::time::Duration;

use behavior_tests::test_runtime;
use ringkv_client::Client;
use ringkv_client::ClientBuilder;
use ringkv_cluster::Consistency;
use ringkv_cluster::RingPosition;
use tests_toolkit::TestNode;
use tests_toolkit::TestNodeOptions;
use tests_toolkit::start_test_node;
use tests_toolkit::wait_until;

fn client_of(node: &TestNode) -> Client {
    ClientBuilder::new(node.endpoint()).build().unwrap()
}

fn holds(node: &TestNode, key: u32) -> bool {
    node.state()
        .store_snapshot()
        .iter()
        .any(|entry| entry.key == key)
}

#[test]
fn test_solo_insert_lookup() {
    let rt = test_runtime();
    rt.block_on(async {
        let node = start_test_node(&rt, TestNodeOptions::default()).await;
        let client = client_of(&node);

        client.insert(42, "hello", None).await.unwrap();
        assert_eq!(
            client.lookup(42, None).await.unwrap(),
            Some("hello".to_string())
        );
        // Routing idempotence: the same lookup twice yields the same answer.
        assert_eq!(
            client.lookup(42, None).await.unwrap(),
            Some("hello".to_string())
        );
        assert_eq!(client.lookup(7, None).await.unwrap(), None);

        // Inserting the same key again is a local-state conflict.
        assert!(client.insert(42, "again", None).await.is_err());

        node.kill().await;
    });
}

#[test]
fn test_two_node_join_handoff() {
    let rt = test_runtime();
    rt.block_on(async {
        let a = start_test_node(
            &rt,
            TestNodeOptions {
                ring_slot: Some(950),
                ..Default::default()
            },
        )
        .await;
        let client_a = client_of(&a);
        for key in [100u32, 500, 900] {
            client_a
                .insert(key, &format!("value-{key}"), None)
                .await
                .unwrap();
        }

        let b = start_test_node(
            &rt,
            TestNodeOptions {
                ring_slot: Some(600),
                initial_peer: Some(a.advertise_addr()),
                ..Default::default()
            },
        )
        .await;

        // The handoff split the arc at 600: keys at or below it moved.
        assert!(holds(&a, 900));
        assert!(!holds(&a, 100) && !holds(&a, 500));
        assert!(holds(&b, 100) && holds(&b, 500));
        assert_eq!(b.state().ring_slot(), Some(600));

        // Both nodes answer every key.
        let client_b = client_of(&b);
        for client in [&client_a, &client_b] {
            for key in [100u32, 500, 900] {
                assert_eq!(
                    client.lookup(key, None).await.unwrap(),
                    Some(format!("value-{key}"))
                );
            }
        }

        b.kill().await;
        a.kill().await;
    });
}

#[test]
fn test_leave_hands_everything_to_successor() {
    let rt = test_runtime();
    rt.block_on(async {
        let a = start_test_node(
            &rt,
            TestNodeOptions {
                ring_slot: Some(950),
                ..Default::default()
            },
        )
        .await;
        let client_a = client_of(&a);
        for key in [100u32, 500, 900] {
            client_a
                .insert(key, &format!("value-{key}"), None)
                .await
                .unwrap();
        }
        let b = start_test_node(
            &rt,
            TestNodeOptions {
                ring_slot: Some(600),
                initial_peer: Some(a.advertise_addr()),
                ..Default::default()
            },
        )
        .await;

        a.state().leave_group().await.unwrap();

        for key in [100u32, 500, 900] {
            assert!(holds(&b, key), "key {key} should have moved to b");
        }
        assert!(a.state().store_snapshot().is_empty());

        // The departure gossip leaves b as the only ring member.
        wait_until("b to see a single-member ring", Duration::from_secs(5), || {
            b.state().ring_snapshot() == vec![(600, b.advertise_addr())]
        })
        .await;

        let client_b = client_of(&b);
        for key in [100u32, 500, 900] {
            assert_eq!(
                client_b.lookup(key, None).await.unwrap(),
                Some(format!("value-{key}"))
            );
        }

        a.kill().await;
        b.kill().await;
    });
}

#[test]
fn test_gossip_death_detection() {
    let rt = test_runtime();
    rt.block_on(async {
        let opts = |slot: u32, peer: Option<String>| TestNodeOptions {
            ring_slot: Some(slot),
            initial_peer: peer,
            heartbeat_threshold: 10,
            ..Default::default()
        };
        let a = start_test_node(&rt, opts(100, None)).await;
        let b = start_test_node(&rt, opts(500, Some(a.advertise_addr()))).await;
        let c = start_test_node(&rt, opts(900, Some(b.advertise_addr()))).await;

        for node in [&a, &b, &c] {
            wait_until("ring to converge", Duration::from_secs(10), || {
                node.state().ring_snapshot().len() == 3
            })
            .await;
        }

        let c_addr = c.advertise_addr();
        c.kill().await;

        for node in [&a, &b] {
            wait_until(
                "the dead member to fall out of the ring",
                Duration::from_secs(20),
                || !node.state().ring_snapshot().iter().any(|(slot, _)| *slot == 900),
            )
            .await;

            // The record is retained so gossip cannot resurrect the address.
            let members = node.state().member_snapshot();
            let dead = members.iter().find(|m| m.address == c_addr).unwrap();
            assert_eq!(dead.position, RingPosition::Gone);
        }

        b.kill().await;
        a.kill().await;
    });
}

#[test]
fn test_owner_mismatch_hint_and_retry() {
    let rt = test_runtime();
    rt.block_on(async {
        // Gossip is effectively off: every bit of ring knowledge below moves
        // with the data handoffs, leaving a deliberately stale view on a.
        let quiet = Duration::from_secs(3600);
        let a = start_test_node(
            &rt,
            TestNodeOptions {
                ring_slot: Some(100),
                gossip_interval: quiet,
                ..Default::default()
            },
        )
        .await;
        let client_a = client_of(&a);
        client_a.insert(480, "x480", None).await.unwrap();
        client_a.insert(490, "x490", None).await.unwrap();

        // b takes keys 480 and 490; a records b at slot 490.
        let b = start_test_node(
            &rt,
            TestNodeOptions {
                ring_slot: Some(500),
                initial_peer: Some(a.advertise_addr()),
                gossip_interval: quiet,
                ..Default::default()
            },
        )
        .await;
        let client_b = client_of(&b);
        client_b.insert(450, "x450", None).await.unwrap();

        // c takes key 450 from b; b records c at slot 450. a has never heard
        // of c.
        let c = start_test_node(
            &rt,
            TestNodeOptions {
                ring_slot: Some(450),
                initial_peer: Some(b.advertise_addr()),
                gossip_interval: quiet,
                ..Default::default()
            },
        )
        .await;
        assert!(
            !a.state()
                .member_snapshot()
                .iter()
                .any(|m| m.address == c.advertise_addr())
        );

        // a routes key 430 to b; b's view disagrees and hints at c; a adopts
        // the hint and succeeds against c.
        client_a.insert(430, "x430", None).await.unwrap();
        assert!(holds(&c, 430));
        assert!(
            a.state()
                .member_snapshot()
                .iter()
                .any(|m| m.address == c.advertise_addr())
        );

        c.kill().await;
        b.kill().await;
        a.kill().await;
    });
}

#[test]
fn test_quorum_succeeds_where_all_fails() {
    let rt = test_runtime();
    rt.block_on(async {
        let opts = |slot: u32, peer: Option<String>| TestNodeOptions {
            ring_slot: Some(slot),
            initial_peer: peer,
            ..Default::default()
        };
        let a = start_test_node(&rt, opts(100, None)).await;
        let b = start_test_node(&rt, opts(500, Some(a.advertise_addr()))).await;
        let c = start_test_node(&rt, opts(900, Some(b.advertise_addr()))).await;

        for node in [&a, &b, &c] {
            wait_until("ring to converge", Duration::from_secs(10), || {
                node.state().ring_snapshot().len() == 3
            })
            .await;
        }

        // Failure detection is off (high threshold): the dead successor
        // stays in everyone's ring view.
        b.kill().await;

        // Key 50 is owned by a; its successors are b (dead) and c. One
        // replica plus the owner's copy is a quorum of three.
        let client_a = client_of(&a);
        client_a
            .insert(50, "quorum", Some(Consistency::Quorum))
            .await
            .unwrap();
        assert!(holds(&a, 50));
        assert!(holds(&c, 50), "the live successor should hold a replica");

        // ALL needs both successors; the write itself is not rolled back.
        assert!(
            client_a
                .insert(60, "all", Some(Consistency::All))
                .await
                .is_err()
        );
        assert!(holds(&a, 60));

        c.kill().await;
        a.kill().await;
    });
}

#[test]
fn test_remove_idempotence_and_tombstones() {
    let rt = test_runtime();
    rt.block_on(async {
        let opts = |slot: u32, peer: Option<String>| TestNodeOptions {
            ring_slot: Some(slot),
            initial_peer: peer,
            ..Default::default()
        };
        let a = start_test_node(&rt, opts(100, None)).await;
        let b = start_test_node(&rt, opts(500, Some(a.advertise_addr()))).await;
        let c = start_test_node(&rt, opts(900, Some(b.advertise_addr()))).await;

        for node in [&a, &b, &c] {
            wait_until("ring to converge", Duration::from_secs(10), || {
                node.state().ring_snapshot().len() == 3
            })
            .await;
        }

        let client = client_of(&a);
        client.insert(50, "v", Some(Consistency::All)).await.unwrap();
        assert!(holds(&a, 50) && holds(&b, 50) && holds(&c, 50));

        // Remove propagates tombstones that clear every replica.
        client.remove(50, Some(Consistency::All)).await.unwrap();
        assert!(!holds(&a, 50) && !holds(&b, 50) && !holds(&c, 50));

        // Removing again is a local-state conflict: success then rejection.
        assert!(client.remove(50, Some(Consistency::All)).await.is_err());

        // The tombstone value is reserved for the replica protocol.
        assert!(client.insert(70, "##DELETE##", None).await.is_err());

        c.kill().await;
        b.kill().await;
        a.kill().await;
    });
}

#[test]
fn test_update_requires_existing_key() {
    let rt = test_runtime();
    rt.block_on(async {
        let node = start_test_node(&rt, TestNodeOptions::default()).await;
        let client = client_of(&node);

        assert!(client.update(11, "nothing-there", None).await.is_err());

        client.insert(11, "first", None).await.unwrap();
        client.update(11, "second", None).await.unwrap();
        assert_eq!(
            client.lookup(11, None).await.unwrap(),
            Some("second".to_string())
        );

        node.kill().await;
    });
}
