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

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use error_stack::Result;
use error_stack::ResultExt;
use error_stack::bail;
use ringkv_cluster::Consistency;
use ringkv_cluster::DataOp;
use ringkv_cluster::NodeState;
use ringkv_cluster::RpcReply;
use ringkv_core::ring_hash;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;

use crate::ServerError;

/// How a command session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplOutcome {
    /// The operator asked the node to leave the ring.
    Left,
    /// Standard input closed.
    Eof,
}

/// Serves operator commands from stdin until `leave` or end of input.
///
/// Commands are `<consistency> <op> <key> [value]` with consistency `-1`
/// (non-consistent), `0` (ONE), `1` (QUORUM) or `2` (ALL), and op one of
/// `insert`, `update`, `remove`, `lookup`, `leave`, `show`. An unrecoverable
/// transport failure aborts the session with an error.
pub async fn run_repl(state: &Arc<NodeState>) -> Result<ReplOutcome, ServerError> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    while let Some(line) = lines
        .next_line()
        .await
        .change_context_lazy(|| ServerError("failed to read stdin".to_string()))?
    {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match dispatch(state, line).await? {
            Some(outcome) => return Ok(outcome),
            None => continue,
        }
    }
    Ok(ReplOutcome::Eof)
}

async fn dispatch(state: &Arc<NodeState>, line: &str) -> Result<Option<ReplOutcome>, ServerError> {
    let mut words = line.splitn(4, ' ');
    let Some(first) = words.next() else {
        return Ok(None);
    };

    // `leave` and `show` take no consistency prefix.
    match first {
        "leave" => {
            println!("Leaving group");
            state
                .leave_group()
                .await
                .change_context_lazy(|| ServerError("failed to leave the ring".to_string()))?;
            return Ok(Some(ReplOutcome::Left));
        }
        "show" => {
            show(state);
            return Ok(None);
        }
        _ => {}
    }

    let Ok(level_raw) = first.parse::<i32>() else {
        println!("usage: <consistency> <op> <key> [value]");
        return Ok(None);
    };
    let level = match Consistency::from_level(level_raw) {
        Ok(level) => level,
        Err(err) => {
            println!("{err}");
            return Ok(None);
        }
    };

    let Some(op) = words.next() else {
        println!("usage: <consistency> <op> <key> [value]");
        return Ok(None);
    };
    match op {
        "leave" => {
            println!("Leaving group");
            state
                .leave_group()
                .await
                .change_context_lazy(|| ServerError("failed to leave the ring".to_string()))?;
            return Ok(Some(ReplOutcome::Left));
        }
        "show" => {
            show(state);
            return Ok(None);
        }
        _ => {}
    }
    let key = match words.next().map(str::parse::<u32>) {
        Some(Ok(key)) => key,
        _ => {
            println!("usage: <consistency> <op> <key> [value]");
            return Ok(None);
        }
    };
    let value = words.next().unwrap_or_default().to_string();

    let reply = match op {
        "insert" => state.route_operation(DataOp::Insert, key, value, level).await,
        "update" => state.route_operation(DataOp::Update, key, value, level).await,
        "remove" => state.route_operation(DataOp::Remove, key, value, level).await,
        "lookup" => {
            let start = Instant::now();
            let reply = state
                .route_operation(DataOp::Lookup, key, value, level)
                .await;
            match &reply.data {
                Some(entry) if reply.success == 1 => {
                    println!("{} {}", entry.key, entry.value)
                }
                _ => println!("{key} not found"),
            }
            println!("elapsed time: {:?}", start.elapsed());
            reply
        }
        other => {
            println!("unknown operation: {other}");
            return Ok(None);
        }
    };

    if reply.success == RpcReply::TRANSPORT_FAILED {
        bail!(ServerError(format!(
            "unrecoverable transport failure on {op} {key}"
        )));
    }
    if reply.success != 1 && op != "lookup" {
        println!("{op} {key} rejected");
    }
    Ok(None)
}

fn show(state: &Arc<NodeState>) {
    println!("ring ({} ticks):", state.clock());
    for (slot, addr) in state.ring_snapshot() {
        println!("  {slot:>7} {addr}");
    }
    println!("members:");
    for member in state.member_snapshot() {
        println!(
            "  {} id={} heartbeat={} movement={:?}",
            member.address,
            i64::from(member.position),
            member.heartbeat,
            member.movement,
        );
    }
    println!("data:");
    for entry in state.store_snapshot() {
        println!("  {:>7} {}", entry.key, entry.value);
    }
}

/// Preloads `word##definition` lines from `path`, inserting each definition
/// under the hash of its word.
pub async fn preload_data_file(state: &Arc<NodeState>, path: &Path) -> Result<(), ServerError> {
    let content = std::fs::read_to_string(path)
        .change_context_lazy(|| ServerError(format!("failed to read {}", path.display())))?;

    for line in content.lines() {
        let Some((word, definition)) = line.split_once("##") else {
            continue;
        };
        let key = ring_hash(word);
        log::info!("preloading {word} ({key})");
        let reply = state
            .route_operation(
                DataOp::Insert,
                key,
                definition.to_string(),
                Some(Consistency::One),
            )
            .await;
        if reply.success != 1 {
            log::warn!("preload of {word} ({key}) was rejected");
        }
    }
    Ok(())
}
