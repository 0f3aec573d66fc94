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

use crate::client::Client;
use crate::client::Error;

pub struct ClientBuilder {
    endpoint: String,
}

impl ClientBuilder {
    /// `endpoint` is any node of the cluster, as `http://host:port`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }

    pub fn build(self) -> Result<Client, Error> {
        let builder = reqwest::ClientBuilder::new().no_proxy();
        Client::new(self.endpoint, builder)
    }
}
