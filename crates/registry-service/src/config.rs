//! Layered configuration: CLI flags, environment-variable fallbacks, then hard defaults.
//!
//! `Config` doubles as the serializable record of the effective configuration, deriving both
//! `clap::Parser` and `serde::Serialize` on one struct.

use std::time::Duration;

use clap::Parser;
use registry_core::CompatibilityLevel;

#[derive(Debug, Parser, serde::Serialize)]
#[command(about = "A replicated schema registry node.", version)]
pub struct Config {
    /// This instance's advertised hostname, published to the coordinator's ephemeral membership.
    #[arg(long, env = "HOST_NAME")]
    pub host_name: String,

    /// This instance's advertised port.
    #[arg(long, env = "PORT", default_value = "8081")]
    pub port: u16,

    /// Coordinator namespace segment shared by every node in this registry cluster.
    #[arg(long, env = "CLUSTER_NAME")]
    pub cluster_name: String,

    /// Whether this node may be elected master. Non-eligible nodes still serve reads and forward
    /// writes.
    #[arg(long, env = "MASTER_ELIGIBILITY", default_value = "true")]
    pub master_eligibility: bool,

    /// Bootstrap URL for the log and coordinator. Accepted for parity with a production option
    /// table; the bundled standalone backend (see `backend.rs`) is in-process and ignores it. A
    /// production deployment wires `LogBackedStore`/`IdAllocator`/`MasterElector` against real
    /// adapters instead of replacing this field's meaning.
    #[arg(long, env = "KAFKASTORE_CONNECTION_URL")]
    pub kafkastore_connection_url: Option<String>,

    /// Coordinator session and connection timeout. Unused by the bundled standalone backend, which
    /// has no session to time out.
    #[arg(
        long,
        env = "KAFKASTORE_ZK_SESSION_TIMEOUT_MS",
        value_parser = humantime::parse_duration,
        default_value = "30s"
    )]
    pub kafkastore_zk_session_timeout_ms: Duration,

    /// Deadline for a single `LogBackedStore::append` to be observed by the local tailer.
    #[arg(
        long,
        env = "KAFKASTORE_WRITE_TIMEOUT_MS",
        value_parser = humantime::parse_duration,
        default_value = "5s"
    )]
    pub kafkastore_write_timeout_ms: Duration,

    /// Deadline for `LogBackedStore::init`'s bootstrap probe to be observed.
    #[arg(
        long,
        env = "KAFKASTORE_BOOTSTRAP_TIMEOUT_MS",
        value_parser = humantime::parse_duration,
        default_value = "60s"
    )]
    pub kafkastore_bootstrap_timeout_ms: Duration,

    /// Cluster-wide default compatibility level, used when neither a subject nor the cluster has
    /// an explicit config record in the store yet.
    #[arg(long, env = "AVRO_COMPATIBILITY_LEVEL", default_value = "backward")]
    pub avro_compatibility_level: CompatibilityLevelArg,

    /// Metrics sample count. Accepted for parity with the option table; the `metrics`/Prometheus
    /// exporter this service uses exposes a pull-based `/metrics` route rather than a windowed
    /// sample reporter, so this has no effect here.
    #[arg(long, env = "METRICS_NUM_SAMPLES", default_value = "2")]
    pub metrics_num_samples: u32,

    /// Metrics sample window. See `metrics_num_samples`.
    #[arg(long, env = "METRICS_SAMPLE_WINDOW_MS", default_value = "30000")]
    pub metrics_sample_window_ms: u64,

    /// Port the Prometheus `/metrics` exporter listens on.
    #[arg(long, env = "METRICS_PORT", default_value = "9094")]
    pub metrics_port: u16,
}

impl Config {
    pub fn write_timeout(&self) -> Duration {
        self.kafkastore_write_timeout_ms
    }

    pub fn bootstrap_timeout(&self) -> Duration {
        self.kafkastore_bootstrap_timeout_ms
    }

    pub fn counter_path(&self) -> String {
        format!("/{}/schema_id_counter", self.cluster_name)
    }

    pub fn election_path(&self) -> String {
        format!("/{}/election", self.cluster_name)
    }
}

/// A `clap`-parseable wrapper over [`CompatibilityLevel`]; the model type itself has no
/// CLI-friendly `FromStr` since its wire representation is `SCREAMING_SNAKE_CASE` JSON, not a CLI
/// argument convention.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct CompatibilityLevelArg(pub CompatibilityLevel);

impl std::str::FromStr for CompatibilityLevelArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let level = match s.to_ascii_lowercase().as_str() {
            "none" => CompatibilityLevel::None,
            "backward" => CompatibilityLevel::Backward,
            "forward" => CompatibilityLevel::Forward,
            "full" => CompatibilityLevel::Full,
            other => return Err(format!("unrecognized compatibility level {other:?}")),
        };
        Ok(CompatibilityLevelArg(level))
    }
}
