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

use std::sync::LazyLock;

use opentelemetry::KeyValue;
use opentelemetry::metrics::Counter;
use opentelemetry::metrics::Histogram;
use opentelemetry::metrics::Meter;

pub struct GlobalMetrics {
    pub meter: Meter,
    pub operation: OperationMetrics,
    pub gossip: GossipMetrics,
    pub replication: ReplicationMetrics,
}

impl GlobalMetrics {
    fn new() -> Self {
        let meter = opentelemetry::global::meter("ringkv");
        Self {
            operation: OperationMetrics::new(meter.clone()),
            gossip: GossipMetrics::new(meter.clone()),
            replication: ReplicationMetrics::new(meter.clone()),
            meter,
        }
    }

    pub fn get() -> &'static GlobalMetrics {
        static GLOBAL_METRICS: LazyLock<GlobalMetrics> = LazyLock::new(GlobalMetrics::new);
        &GLOBAL_METRICS
    }
}

pub struct OperationMetrics {
    pub count: Counter<u64>,
    pub duration: Histogram<f64>,
}

impl OperationMetrics {
    pub const OPERATION_INSERT: &'static str = "insert";
    pub const OPERATION_UPDATE: &'static str = "update";
    pub const OPERATION_REMOVE: &'static str = "remove";
    pub const OPERATION_LOOKUP: &'static str = "lookup";

    pub const STATUS_SUCCESS: &'static str = "success";
    pub const STATUS_REJECTED: &'static str = "rejected";
    pub const STATUS_FAILURE: &'static str = "failure";

    pub fn new(meter: Meter) -> Self {
        Self {
            count: meter
                .u64_counter("ringkv.operation.count")
                .with_description("The number of data operations served")
                .build(),
            duration: meter
                .f64_histogram("ringkv.operation.duration")
                .with_description("The duration of data operations")
                .with_unit("s")
                .build(),
        }
    }

    pub fn operation_labels(operation: &'static str, status: &'static str) -> [KeyValue; 2] {
        [
            KeyValue::new("operation", operation),
            KeyValue::new("status", status),
        ]
    }
}

pub struct GossipMetrics {
    pub datagrams_in: Counter<u64>,
    pub datagrams_out: Counter<u64>,
    pub dead_members: Counter<u64>,
}

impl GossipMetrics {
    pub fn new(meter: Meter) -> Self {
        Self {
            datagrams_in: meter
                .u64_counter("ringkv.gossip.datagrams.in")
                .with_description("The number of gossip datagrams received")
                .build(),
            datagrams_out: meter
                .u64_counter("ringkv.gossip.datagrams.out")
                .with_description("The number of gossip datagrams sent")
                .build(),
            dead_members: meter
                .u64_counter("ringkv.gossip.dead_members")
                .with_description("The number of members declared dead by failure detection")
                .build(),
        }
    }
}

pub struct ReplicationMetrics {
    pub writes: Counter<u64>,
    pub shortfalls: Counter<u64>,
}

impl ReplicationMetrics {
    pub fn new(meter: Meter) -> Self {
        Self {
            writes: meter
                .u64_counter("ringkv.replication.writes")
                .with_description("The number of replica writes acknowledged")
                .build(),
            shortfalls: meter
                .u64_counter("ringkv.replication.shortfalls")
                .with_description("The number of writes that missed their consistency target")
                .build(),
        }
    }
}
