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

mod gossip;
mod handoff;
mod member;
mod node;
mod ops;
mod replica;
mod rpc;
mod view;

pub use gossip::GossipFuture;
pub use member::Member;
pub use member::Movement;
pub use member::RingPosition;
pub use member::marshal_member;
pub use member::unmarshal_member;
pub use node::NodeRole;
pub use node::NodeState;
pub use node::resolve_advertise_addr;
pub use ops::Consistency;
pub use ops::DataOp;
pub use rpc::ClientOpArgs;
pub use rpc::ConsistentOpArgs;
pub use rpc::EntryRangeArgs;
pub use rpc::RpcReply;
pub use rpc::SuccessorQuery;
pub use rpc::node_routes;
pub use view::RingView;

#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("{0}")]
    Internal(String),
}
