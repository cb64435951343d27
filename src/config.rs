//! Global broker defaults.
//!
//! Everything except the broker ID and port is cluster-wide. Operators usually keep these in a JSON file next to
//! the inventory; every key is optional there and falls back to the values below.

use std::{collections::BTreeMap, fmt, path::Path, path::PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

/// Port used when a host has no (truthy) port override.
pub const DEFAULT_BROKER_PORT: u16 = 9092;

/// How Kafka disposes of old log segments (`log.cleanup.policy`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogCleanupPolicy {
    #[default]
    Delete,
    Compact,
}

impl LogCleanupPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::Compact => "compact",
        }
    }
}

impl fmt::Display for LogCleanupPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Defaults bundle for every broker in the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrokerDefaults {
    /// Whether the broker service should be running.
    pub enabled: bool,

    /// Port for hosts without a port override.
    pub default_port: u16,

    /// Directories Kafka keeps its log segments in.
    pub log_dirs: Vec<PathBuf>,

    /// Zookeeper ensemble as `host:port` pairs.
    pub zookeeper_hosts: Vec<String>,

    /// Optional chroot appended to the Zookeeper connect string, e.g. `/kafka`.
    pub zookeeper_chroot: Option<String>,

    pub zookeeper_connection_timeout_ms: u64,
    pub zookeeper_session_timeout_ms: u64,

    /// Directory holding `server.properties` and `log4j.properties`.
    pub kafka_config_dir: PathBuf,

    /// File the broker's log4j appender writes to.
    pub kafka_log_file: PathBuf,

    /// Environment file read by the service's init script.
    pub default_env_file: PathBuf,

    pub jmx_port: u16,

    /// Value for `KAFKA_HEAP_OPTS`, e.g. `-Xmx1G -Xms1G`.
    pub heap_opts: Option<String>,

    /// Open file limit for the broker process.
    pub nofiles_ulimit: u32,

    pub num_network_threads: u32,
    pub num_io_threads: u32,
    pub num_partitions: u32,
    pub default_replication_factor: u32,
    pub num_replica_fetchers: u32,
    pub auto_create_topics_enable: bool,

    pub socket_send_buffer_bytes: u64,
    pub socket_receive_buffer_bytes: u64,
    pub socket_request_max_bytes: u64,

    pub log_flush_interval_messages: u64,
    pub log_flush_interval_ms: u64,
    pub log_retention_hours: u32,

    /// Size based retention; unlimited when unset.
    pub log_retention_bytes: Option<u64>,

    pub log_segment_bytes: u64,
    pub log_cleanup_interval_mins: u32,
    pub log_cleanup_policy: LogCleanupPolicy,

    /// Extra `kafka.metrics.*` style properties appended to `server.properties`.
    pub metrics_properties: BTreeMap<String, String>,

    /// Name of the system service.
    pub service_name: String,

    /// Owner of the log directories.
    pub user: String,
    pub group: String,

    /// Permission bits of the log directories.
    pub log_dir_mode: u32,
}

impl Default for BrokerDefaults {
    fn default() -> Self {
        Self {
            enabled: true,
            default_port: DEFAULT_BROKER_PORT,
            log_dirs: vec![PathBuf::from("/var/spool/kafka")],
            zookeeper_hosts: vec!["localhost:2181".to_owned()],
            zookeeper_chroot: None,
            zookeeper_connection_timeout_ms: 1_000_000,
            zookeeper_session_timeout_ms: 6_000,
            kafka_config_dir: PathBuf::from("/etc/kafka"),
            kafka_log_file: PathBuf::from("/var/log/kafka/kafka.log"),
            default_env_file: PathBuf::from("/etc/default/kafka"),
            jmx_port: 9999,
            heap_opts: None,
            nofiles_ulimit: 8192,
            num_network_threads: 2,
            num_io_threads: 2,
            num_partitions: 1,
            default_replication_factor: 1,
            num_replica_fetchers: 1,
            auto_create_topics_enable: true,
            socket_send_buffer_bytes: 1_048_576,
            socket_receive_buffer_bytes: 1_048_576,
            socket_request_max_bytes: 104_857_600,
            log_flush_interval_messages: 10_000,
            log_flush_interval_ms: 1_000,
            log_retention_hours: 168,
            log_retention_bytes: None,
            log_segment_bytes: 536_870_912,
            log_cleanup_interval_mins: 1,
            log_cleanup_policy: LogCleanupPolicy::Delete,
            metrics_properties: BTreeMap::new(),
            service_name: "kafka".to_owned(),
            user: "kafka".to_owned(),
            group: "kafka".to_owned(),
            log_dir_mode: 0o755,
        }
    }
}

impl BrokerDefaults {
    /// Parse a JSON defaults bundle. Keys that are left out keep their default.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let defaults = serde_json::from_str(s).map_err(Error::Config)?;
        debug!(?defaults, "parsed broker defaults");
        Ok(defaults)
    }

    /// Read and parse a JSON defaults file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_json_str(&s)
    }
}
