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

use std::net::SocketAddr;
use std::num::NonZeroUsize;

use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,
    pub gossip: GossipConfig,
    pub replication: ReplicationConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// The `host:port` the node binds for both the UDP gossip listener and
    /// the TCP request listener.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    /// The `host:port` peers use to reach this node. Defaults to the listen
    /// address with an unspecified host resolved to the local IP.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advertise_addr: Option<String>,
    /// Bootstrap contact. Absent means this node is the first member.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_peer: Option<String>,
    /// Forces the ring position taken at join time instead of hashing the
    /// address. Operators use this to place nodes deterministically.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ring_slot: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GossipConfig {
    #[serde(default = "default_gossip_interval")]
    pub gossip_interval: jiff::SignedDuration,
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: jiff::SignedDuration,
    /// The number of silent gossip ticks after which a member is declared
    /// dead.
    #[serde(default = "default_heartbeat_threshold")]
    pub heartbeat_threshold: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplicationConfig {
    /// How many ring successors every write is copied to.
    #[serde(default = "default_replica_count")]
    pub replica_count: usize,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 4567))
}

const fn default_gossip_interval() -> jiff::SignedDuration {
    jiff::SignedDuration::from_millis(500)
}

const fn default_heartbeat_interval() -> jiff::SignedDuration {
    jiff::SignedDuration::from_millis(50)
}

const fn default_heartbeat_threshold() -> u64 {
    25
}

const fn default_replica_count() -> usize {
    2
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfig {
    #[serde(default = "LogsConfig::disabled")]
    pub logs: LogsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FileAppenderConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<StderrAppenderConfig>,
}

impl LogsConfig {
    pub fn disabled() -> Self {
        Self {
            file: None,
            stderr: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileAppenderConfig {
    pub filter: String,
    pub dir: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_files: Option<NonZeroUsize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StderrAppenderConfig {
    pub filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                listen_addr: default_listen_addr(),
                advertise_addr: None,
                initial_peer: None,
                ring_slot: None,
            },
            gossip: GossipConfig {
                gossip_interval: default_gossip_interval(),
                heartbeat_interval: default_heartbeat_interval(),
                heartbeat_threshold: default_heartbeat_threshold(),
            },
            replication: ReplicationConfig {
                replica_count: default_replica_count(),
            },
            telemetry: TelemetryConfig {
                logs: LogsConfig {
                    file: Some(FileAppenderConfig {
                        filter: "INFO".to_string(),
                        dir: "logs".to_string(),
                        max_files: Some(NonZeroUsize::new(64).unwrap()),
                    }),
                    stderr: Some(StderrAppenderConfig {
                        filter: "INFO".to_string(),
                    }),
                },
            },
        }
    }
}

#[derive(Clone, Debug, Ord, PartialOrd, Eq, PartialEq)]
pub struct OptionEntry {
    /// The name of the environment variable.
    pub env_name: &'static str,
    /// The path in the config file.
    pub ent_path: &'static str,
    /// The type of the value.
    pub ent_type: &'static str,
}

pub const fn known_option_entries() -> &'static [OptionEntry] {
    &[
        OptionEntry {
            env_name: "RINGKV_CONFIG_GOSSIP_GOSSIP_INTERVAL",
            ent_path: "gossip.gossip_interval",
            ent_type: "string",
        },
        OptionEntry {
            env_name: "RINGKV_CONFIG_GOSSIP_HEARTBEAT_INTERVAL",
            ent_path: "gossip.heartbeat_interval",
            ent_type: "string",
        },
        OptionEntry {
            env_name: "RINGKV_CONFIG_GOSSIP_HEARTBEAT_THRESHOLD",
            ent_path: "gossip.heartbeat_threshold",
            ent_type: "integer",
        },
        OptionEntry {
            env_name: "RINGKV_CONFIG_REPLICATION_REPLICA_COUNT",
            ent_path: "replication.replica_count",
            ent_type: "integer",
        },
        OptionEntry {
            env_name: "RINGKV_CONFIG_SERVER_ADVERTISE_ADDR",
            ent_path: "server.advertise_addr",
            ent_type: "string",
        },
        OptionEntry {
            env_name: "RINGKV_CONFIG_SERVER_INITIAL_PEER",
            ent_path: "server.initial_peer",
            ent_type: "string",
        },
        OptionEntry {
            env_name: "RINGKV_CONFIG_SERVER_LISTEN_ADDR",
            ent_path: "server.listen_addr",
            ent_type: "string",
        },
        OptionEntry {
            env_name: "RINGKV_CONFIG_SERVER_RING_SLOT",
            ent_path: "server.ring_slot",
            ent_type: "integer",
        },
        OptionEntry {
            env_name: "RINGKV_CONFIG_TELEMETRY_LOGS_FILE_DIR",
            ent_path: "telemetry.logs.file.dir",
            ent_type: "string",
        },
        OptionEntry {
            env_name: "RINGKV_CONFIG_TELEMETRY_LOGS_FILE_FILTER",
            ent_path: "telemetry.logs.file.filter",
            ent_type: "string",
        },
        OptionEntry {
            env_name: "RINGKV_CONFIG_TELEMETRY_LOGS_FILE_MAX_FILES",
            ent_path: "telemetry.logs.file.max_files",
            ent_type: "integer",
        },
        OptionEntry {
            env_name: "RINGKV_CONFIG_TELEMETRY_LOGS_STDERR_FILTER",
            ent_path: "telemetry.logs.stderr.filter",
            ent_type: "string",
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        insta::assert_toml_snapshot!(config, @r"
        [server]
        listen_addr = '0.0.0.0:4567'

        [gossip]
        gossip_interval = 'PT0.5S'
        heartbeat_interval = 'PT0.05S'
        heartbeat_threshold = 25

        [replication]
        replica_count = 2
        [telemetry.logs.file]
        filter = 'INFO'
        dir = 'logs'
        max_files = 64

        [telemetry.logs.stderr]
        filter = 'INFO'
        ");
    }

    #[test]
    fn test_option_entries_well_formed() {
        let entries = known_option_entries();
        for ent in entries {
            let derived = format!(
                "RINGKV_CONFIG_{}",
                ent.ent_path.to_ascii_uppercase().replace('.', "_")
            );
            assert_eq!(ent.env_name, derived);
            assert!(matches!(ent.ent_type, "string" | "integer" | "boolean"));
        }
        let mut sorted = entries.to_vec();
        sorted.sort();
        assert_eq!(sorted, entries.to_vec());
    }
}
