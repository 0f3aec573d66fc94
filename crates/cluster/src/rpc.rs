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

use std::sync::Arc;
use std::time::Duration;

use backon::ConstantBuilder;
use backon::Retryable;
use error_stack::Result;
use error_stack::ResultExt;
use error_stack::bail;
use poem::EndpointExt;
use poem::Route;
use poem::handler;
use poem::web::Data;
use poem::web::Json;
use ringkv_core::KeyEntry;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::ClusterError;
use crate::member::Member;
use crate::node::NodeState;
use crate::ops::Consistency;
use crate::ops::DataOp;

const RPC_DIAL_TIMEOUT: Duration = Duration::from_secs(3);
const RPC_CALL_TIMEOUT: Duration = Duration::from_secs(3);

const RPC_RETRY_INTERVAL: Duration = Duration::from_secs(1);
const RPC_RETRIES: usize = 3;

/// The reply record every RPC fills.
///
/// `success = 1` is success; `0` is a no-op or rejection, possibly with a
/// `member` hint pointing at the current owner; `-2` is synthesized by the
/// caller on transport failure and never travels on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcReply {
    pub success: i32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<KeyEntry>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub member: Option<Member>,
}

impl RpcReply {
    pub const TRANSPORT_FAILED: i32 = -2;

    pub fn ok() -> Self {
        Self {
            success: 1,
            data: None,
            member: None,
        }
    }

    pub fn ok_with_data(entry: KeyEntry) -> Self {
        Self {
            success: 1,
            data: Some(entry),
            member: None,
        }
    }

    pub fn rejected() -> Self {
        Self {
            success: 0,
            data: None,
            member: None,
        }
    }

    pub fn rejected_with_hint(member: Member) -> Self {
        Self {
            success: 0,
            data: None,
            member: Some(member),
        }
    }

    pub fn transport_failed() -> Self {
        Self {
            success: Self::TRANSPORT_FAILED,
            data: None,
            member: None,
        }
    }

    pub fn from_success(success: bool) -> Self {
        if success { Self::ok() } else { Self::rejected() }
    }
}

/// Request of the tunable-consistency operation variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsistentOpArgs {
    pub consistency: i32,
    pub entry: KeyEntry,
}

/// Request of the bulk join handoff: the joiner's candidate slot and address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryRangeArgs {
    pub id: u32,
    pub address: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SuccessorQuery {
    pub id: u32,
}

/// A client-originated operation executed by the receiving node on the
/// caller's behalf.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientOpArgs {
    pub consistency: i32,
    pub key: u32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub value: Option<String>,
}

/// The per-call HTTP transport of the RPC surface. Connections are pooled by
/// reqwest; dial and call are both bounded at 3 s, and a timeout surfaces to
/// the caller exactly like any other transport error.
#[derive(Debug)]
pub struct RpcTransport {
    client: reqwest::Client,
}

impl RpcTransport {
    pub fn try_new() -> Result<Self, ClusterError> {
        let client = reqwest::ClientBuilder::new()
            .no_proxy()
            .connect_timeout(RPC_DIAL_TIMEOUT)
            .timeout(RPC_CALL_TIMEOUT)
            .build()
            .change_context_lazy(|| {
                ClusterError::Internal("failed to build the rpc client".to_string())
            })?;
        Ok(Self { client })
    }

    async fn post<Req, Resp>(&self, addr: &str, method: &str, request: &Req) -> Result<Resp, ClusterError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let make_error = || ClusterError::Transport(format!("failed to call {method} on {addr}"));

        let url = format!("http://{addr}/rpc/{method}");
        let resp = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .change_context_lazy(make_error)?;
        if !resp.status().is_success() {
            bail!(make_error());
        }
        resp.json().await.change_context_lazy(make_error)
    }

    /// Calls `method` with caller-side transport retries.
    pub async fn call<Req: Serialize>(
        &self,
        addr: &str,
        method: &str,
        request: &Req,
    ) -> Result<RpcReply, ClusterError> {
        let do_call = || async {
            self.post::<Req, RpcReply>(addr, method, request)
                .await
                .inspect_err(|err| log::error!("rpc {method} to {addr} failed: {err:?}"))
        };
        do_call
            .retry(
                ConstantBuilder::new()
                    .with_delay(RPC_RETRY_INTERVAL)
                    .with_max_times(RPC_RETRIES),
            )
            .await
    }

    /// Calls `method` once. Replica writes use this: a failed successor is
    /// logged and skipped, not retried.
    pub async fn call_once<Req: Serialize>(
        &self,
        addr: &str,
        method: &str,
        request: &Req,
    ) -> Result<RpcReply, ClusterError> {
        self.post::<Req, RpcReply>(addr, method, request).await
    }

    pub async fn get_successor(&self, addr: &str, id: u32) -> Result<Option<Member>, ClusterError> {
        let query = SuccessorQuery { id };
        let do_call = || async {
            self.post::<SuccessorQuery, Option<Member>>(addr, "get_successor", &query)
                .await
                .inspect_err(|err| log::error!("rpc get_successor to {addr} failed: {err:?}"))
        };
        do_call
            .retry(
                ConstantBuilder::new()
                    .with_delay(RPC_RETRY_INTERVAL)
                    .with_max_times(RPC_RETRIES),
            )
            .await
    }

    pub async fn get_entry_data(
        &self,
        addr: &str,
        id: u32,
        joiner: String,
    ) -> Result<Vec<KeyEntry>, ClusterError> {
        let args = EntryRangeArgs {
            id,
            address: joiner,
        };
        let do_call = || async {
            self.post::<EntryRangeArgs, Vec<KeyEntry>>(addr, "get_entry_data", &args)
                .await
                .inspect_err(|err| log::error!("rpc get_entry_data to {addr} failed: {err:?}"))
        };
        do_call
            .retry(
                ConstantBuilder::new()
                    .with_delay(RPC_RETRY_INTERVAL)
                    .with_max_times(RPC_RETRIES),
            )
            .await
    }
}

/// Builds the poem route serving the node's RPC surface and the
/// client-operation endpoints.
pub fn node_routes(state: Arc<NodeState>) -> impl poem::Endpoint {
    Route::new()
        .at("/rpc/send_data", poem::post(send_data))
        .at("/rpc/update_data", poem::post(update_data))
        .at("/rpc/remove_data", poem::post(remove_data))
        .at("/rpc/get_data", poem::post(get_data))
        .at("/rpc/send_data_consistent", poem::post(send_data_consistent))
        .at(
            "/rpc/update_data_consistent",
            poem::post(update_data_consistent),
        )
        .at(
            "/rpc/remove_data_consistent",
            poem::post(remove_data_consistent),
        )
        .at("/rpc/get_data_consistent", poem::post(get_data_consistent))
        .at("/rpc/write_data", poem::post(write_data))
        .at("/rpc/send_leave_data", poem::post(send_leave_data))
        .at("/rpc/get_entry_data", poem::post(get_entry_data))
        .at("/rpc/get_successor", poem::post(get_successor))
        .at("/client/insert", poem::post(client_insert))
        .at("/client/update", poem::post(client_update))
        .at("/client/remove", poem::post(client_remove))
        .at("/client/lookup", poem::post(client_lookup))
        .at("/members", poem::get(list_members))
        .data(state)
}

#[handler]
async fn send_data(
    Json(entry): Json<KeyEntry>,
    Data(state): Data<&Arc<NodeState>>,
) -> Json<RpcReply> {
    Json(state.handle_send_data(None, entry).await)
}

#[handler]
async fn update_data(
    Json(entry): Json<KeyEntry>,
    Data(state): Data<&Arc<NodeState>>,
) -> Json<RpcReply> {
    Json(state.handle_update_data(None, entry).await)
}

#[handler]
async fn remove_data(
    Json(entry): Json<KeyEntry>,
    Data(state): Data<&Arc<NodeState>>,
) -> Json<RpcReply> {
    Json(state.handle_remove_data(None, entry).await)
}

#[handler]
async fn get_data(
    Json(entry): Json<KeyEntry>,
    Data(state): Data<&Arc<NodeState>>,
) -> Json<RpcReply> {
    Json(state.handle_get_data(entry.key))
}

fn parse_level(consistency: i32) -> std::result::Result<Option<Consistency>, RpcReply> {
    Consistency::from_level(consistency).map_err(|err| {
        log::error!("rejecting request: {err}");
        RpcReply::rejected()
    })
}

#[handler]
async fn send_data_consistent(
    Json(args): Json<ConsistentOpArgs>,
    Data(state): Data<&Arc<NodeState>>,
) -> Json<RpcReply> {
    match parse_level(args.consistency) {
        Ok(level) => Json(state.handle_send_data(level, args.entry).await),
        Err(reply) => Json(reply),
    }
}

#[handler]
async fn update_data_consistent(
    Json(args): Json<ConsistentOpArgs>,
    Data(state): Data<&Arc<NodeState>>,
) -> Json<RpcReply> {
    match parse_level(args.consistency) {
        Ok(level) => Json(state.handle_update_data(level, args.entry).await),
        Err(reply) => Json(reply),
    }
}

#[handler]
async fn remove_data_consistent(
    Json(args): Json<ConsistentOpArgs>,
    Data(state): Data<&Arc<NodeState>>,
) -> Json<RpcReply> {
    match parse_level(args.consistency) {
        Ok(level) => Json(state.handle_remove_data(level, args.entry).await),
        Err(reply) => Json(reply),
    }
}

#[handler]
async fn get_data_consistent(
    Json(args): Json<ConsistentOpArgs>,
    Data(state): Data<&Arc<NodeState>>,
) -> Json<RpcReply> {
    match parse_level(args.consistency) {
        Ok(_) => Json(state.handle_get_data(args.entry.key)),
        Err(reply) => Json(reply),
    }
}

#[handler]
async fn write_data(
    Json(entry): Json<KeyEntry>,
    Data(state): Data<&Arc<NodeState>>,
) -> Json<RpcReply> {
    Json(state.handle_write_data(entry))
}

#[handler]
async fn send_leave_data(
    Json(entry): Json<KeyEntry>,
    Data(state): Data<&Arc<NodeState>>,
) -> Json<RpcReply> {
    Json(state.handle_send_leave_data(entry).await)
}

#[handler]
async fn get_entry_data(
    Json(args): Json<EntryRangeArgs>,
    Data(state): Data<&Arc<NodeState>>,
) -> Json<Vec<KeyEntry>> {
    Json(state.handle_get_entry_data(args.id, args.address))
}

#[handler]
async fn get_successor(
    Json(query): Json<SuccessorQuery>,
    Data(state): Data<&Arc<NodeState>>,
) -> Json<Option<Member>> {
    Json(state.handle_get_successor(query.id))
}

#[handler]
async fn client_insert(
    Json(args): Json<ClientOpArgs>,
    Data(state): Data<&Arc<NodeState>>,
) -> Json<RpcReply> {
    client_op(DataOp::Insert, args, state).await
}

#[handler]
async fn client_update(
    Json(args): Json<ClientOpArgs>,
    Data(state): Data<&Arc<NodeState>>,
) -> Json<RpcReply> {
    client_op(DataOp::Update, args, state).await
}

#[handler]
async fn client_remove(
    Json(args): Json<ClientOpArgs>,
    Data(state): Data<&Arc<NodeState>>,
) -> Json<RpcReply> {
    client_op(DataOp::Remove, args, state).await
}

#[handler]
async fn client_lookup(
    Json(args): Json<ClientOpArgs>,
    Data(state): Data<&Arc<NodeState>>,
) -> Json<RpcReply> {
    client_op(DataOp::Lookup, args, state).await
}

async fn client_op(op: DataOp, args: ClientOpArgs, state: &Arc<NodeState>) -> Json<RpcReply> {
    match parse_level(args.consistency) {
        Ok(level) => Json(
            state
                .route_operation(op, args.key, args.value.unwrap_or_default(), level)
                .await,
        ),
        Err(reply) => Json(reply),
    }
}

#[handler]
async fn list_members(Data(state): Data<&Arc<NodeState>>) -> Json<Vec<Member>> {
    Json(state.member_snapshot())
}
