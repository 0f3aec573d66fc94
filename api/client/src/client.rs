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
use error_stack::ResultExt;
use error_stack::bail;
use reqwest::StatusCode;
use ringkv_cluster::ClientOpArgs;
use ringkv_cluster::Consistency;
use ringkv_cluster::Member;
use ringkv_cluster::RpcReply;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    /// The cluster refused the operation (key exists, key missing, or the
    /// requested consistency could not be met).
    #[error("operation rejected by the cluster")]
    Rejected,
    /// The contacted node could not reach the key's owner.
    #[error("transport failure inside the cluster")]
    Unreachable,
    #[error("{0}")]
    Other(String),
}

/// A client of one RingKV node. The node routes every operation to the key's
/// current owner on the client's behalf.
pub struct Client {
    client: reqwest::Client,
    endpoint: String,
}

impl Client {
    pub(crate) fn new(
        endpoint: impl Into<String>,
        builder: reqwest::ClientBuilder,
    ) -> Result<Self, Error> {
        let client = builder
            .build()
            .change_context_lazy(|| Error::Other("failed to build the http client".to_string()))?;
        Ok(Client {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub async fn insert(
        &self,
        key: u32,
        value: &str,
        level: Option<Consistency>,
    ) -> Result<(), Error> {
        let reply = self.op("insert", key, Some(value), level).await?;
        ack(reply)
    }

    pub async fn update(
        &self,
        key: u32,
        value: &str,
        level: Option<Consistency>,
    ) -> Result<(), Error> {
        let reply = self.op("update", key, Some(value), level).await?;
        ack(reply)
    }

    pub async fn remove(&self, key: u32, level: Option<Consistency>) -> Result<(), Error> {
        let reply = self.op("remove", key, None, level).await?;
        ack(reply)
    }

    pub async fn lookup(
        &self,
        key: u32,
        level: Option<Consistency>,
    ) -> Result<Option<String>, Error> {
        let reply = self.op("lookup", key, None, level).await?;
        match reply.success {
            1 => Ok(reply.data.map(|entry| entry.value)),
            RpcReply::TRANSPORT_FAILED => bail!(Error::Unreachable),
            _ => Ok(None),
        }
    }

    /// The contacted node's member table.
    pub async fn members(&self) -> Result<Vec<Member>, Error> {
        let make_error = || Error::Other("failed to list members".to_string());
        let resp = self
            .client
            .get(format!("{}/members", self.endpoint))
            .send()
            .await
            .change_context_lazy(make_error)?;
        if resp.status() != StatusCode::OK {
            bail!(make_error());
        }
        resp.json().await.change_context_lazy(make_error)
    }

    async fn op(
        &self,
        op: &str,
        key: u32,
        value: Option<&str>,
        level: Option<Consistency>,
    ) -> Result<RpcReply, Error> {
        let make_error = || Error::Other(format!("failed to call {op}"));

        let args = ClientOpArgs {
            consistency: Consistency::level(level),
            key,
            value: value.map(str::to_string),
        };
        let resp = self
            .client
            .post(format!("{}/client/{op}", self.endpoint))
            .json(&args)
            .send()
            .await
            .change_context_lazy(make_error)?;
        if resp.status() != StatusCode::OK {
            bail!(make_error());
        }
        resp.json().await.change_context_lazy(make_error)
    }
}

fn ack(reply: RpcReply) -> Result<(), Error> {
    match reply.success {
        1 => Ok(()),
        RpcReply::TRANSPORT_FAILED => bail!(Error::Unreachable),
        _ => bail!(Error::Rejected),
    }
}
