//! Settings file management

use secrecy::SecretString;
use serde::{Deserialize, Deserializer};

use crate::deploy::classifier::ClassifierOptions;
use crate::logs::LogLevel;

/// Engine settings, read from `settings.json`. Every field has a default.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON log lines
    #[serde(default)]
    pub log_json: bool,

    /// Also write daily-rolling log files here
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Control API server
    #[serde(default)]
    pub server: ServerSettings,

    /// Routing proxy
    #[serde(default)]
    pub proxy: ProxySettings,

    /// Artifact store
    #[serde(default)]
    pub artifacts: ArtifactSettings,

    /// Domain deployments are published under, `http://<id>.<public_domain>`
    #[serde(default = "default_public_domain")]
    pub public_domain: String,

    /// Metadata store backend
    #[serde(default)]
    pub metadata: MetadataSettings,

    /// Build task runner
    #[serde(default)]
    pub task_runner: TaskRunnerSettings,

    /// Log store backend
    #[serde(default)]
    pub log_store: LogStoreSettings,

    /// Log ingestion
    #[serde(default)]
    pub ingestion: IngestionSettings,

    /// Log line classification markers
    #[serde(default)]
    pub classifier: ClassifierOptions,

    /// Compare-and-set attempts per status transition
    #[serde(default = "default_cas_retry_limit")]
    pub cas_retry_limit: u32,

    /// Graceful shutdown bound in seconds
    #[serde(default = "default_max_shutdown_delay_secs")]
    pub max_shutdown_delay_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_public_domain() -> String {
    "localhost".to_string()
}

fn default_cas_retry_limit() -> u32 {
    8
}

fn default_max_shutdown_delay_secs() -> u64 {
    30
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|v| !v.is_empty()).map(SecretString::from))
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_dir: None,
            server: ServerSettings::default(),
            proxy: ProxySettings::default(),
            artifacts: ArtifactSettings::default(),
            public_domain: default_public_domain(),
            metadata: MetadataSettings::default(),
            task_runner: TaskRunnerSettings::default(),
            log_store: LogStoreSettings::default(),
            ingestion: IngestionSettings::default(),
            classifier: ClassifierOptions::default(),
            cas_retry_limit: default_cas_retry_limit(),
            max_shutdown_delay_secs: default_max_shutdown_delay_secs(),
        }
    }
}

/// Control API server settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_server_host")]
    pub host: String,

    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    9000
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

/// Routing proxy settings
#[derive(Debug, Clone, Deserialize)]
pub struct ProxySettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_server_host")]
    pub host: String,

    #[serde(default = "default_proxy_port")]
    pub port: u16,

    /// Resolve slugs through a remote control API instead of the local registry
    #[serde(default)]
    pub api_url: Option<String>,

    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Zero disables the slug cache
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// First path segments served as-is instead of falling through to the app root
    #[serde(default = "default_asset_dirs")]
    pub asset_dirs: Vec<String>,

    #[serde(default = "default_proxy_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_proxy_port() -> u16 {
    8000
}

fn default_cache_ttl_secs() -> u64 {
    10
}

fn default_cache_capacity() -> usize {
    1024
}

fn default_asset_dirs() -> Vec<String> {
    ["assets", "images", "static", "media", "_next", "js", "css"]
        .iter()
        .map(|dir| dir.to_string())
        .collect()
}

fn default_proxy_timeout_secs() -> u64 {
    5
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_server_host(),
            port: default_proxy_port(),
            api_url: None,
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_capacity: default_cache_capacity(),
            asset_dirs: default_asset_dirs(),
            request_timeout_secs: default_proxy_timeout_secs(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Artifact store settings
#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactSettings {
    /// Root URL holding `<deployment_id>/<path>` objects
    #[serde(default = "default_artifact_base_url")]
    pub base_url: String,
}

fn default_artifact_base_url() -> String {
    "http://localhost:9090/__output".to_string()
}

impl Default for ArtifactSettings {
    fn default() -> Self {
        Self {
            base_url: default_artifact_base_url(),
        }
    }
}

/// Metadata store backend
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MetadataSettings {
    /// Lost on restart
    #[default]
    Memory,

    /// JSON snapshot plus journal; defaults to `metadata.json` in the data directory
    File {
        #[serde(default)]
        path: Option<String>,

        /// Journal entries to accumulate before folding them into the snapshot
        #[serde(default = "default_compact_after")]
        compact_after: usize,
    },
}

fn default_compact_after() -> usize {
    crate::store::file::DEFAULT_COMPACT_AFTER
}

/// Build task runner settings
#[derive(Debug, Clone, Deserialize)]
pub struct TaskRunnerSettings {
    #[serde(default = "default_task_runner_url")]
    pub base_url: String,

    #[serde(default, deserialize_with = "deserialize_secret")]
    pub api_token: Option<SecretString>,

    #[serde(default = "default_task_runner_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_task_runner_url() -> String {
    "http://localhost:7000".to_string()
}

fn default_task_runner_timeout_secs() -> u64 {
    30
}

impl Default for TaskRunnerSettings {
    fn default() -> Self {
        Self {
            base_url: default_task_runner_url(),
            api_token: None,
            timeout_secs: default_task_runner_timeout_secs(),
        }
    }
}

/// Log store backend
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LogStoreSettings {
    #[default]
    Memory,

    /// ClickHouse over its HTTP interface
    Clickhouse {
        #[serde(default = "default_clickhouse_url")]
        url: String,

        #[serde(default = "default_clickhouse_database")]
        database: String,

        #[serde(default = "default_clickhouse_table")]
        table: String,

        #[serde(default = "default_clickhouse_user")]
        user: String,

        #[serde(default, deserialize_with = "deserialize_secret")]
        password: Option<SecretString>,

        #[serde(default = "default_clickhouse_timeout_secs")]
        timeout_secs: u64,
    },
}

fn default_clickhouse_url() -> String {
    "http://localhost:8123".to_string()
}

fn default_clickhouse_database() -> String {
    "default".to_string()
}

fn default_clickhouse_table() -> String {
    "log_events".to_string()
}

fn default_clickhouse_user() -> String {
    "default".to_string()
}

fn default_clickhouse_timeout_secs() -> u64 {
    10
}

/// Log ingestion settings
#[derive(Debug, Clone, Deserialize)]
pub struct IngestionSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_partitions")]
    pub partitions: u32,

    /// Consumers share the partitions without overlap
    #[serde(default = "default_consumers")]
    pub consumers: usize,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

fn default_partitions() -> u32 {
    4
}

fn default_consumers() -> usize {
    2
}

fn default_batch_size() -> usize {
    100
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_heartbeat_interval_ms() -> u64 {
    3000
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

impl Default for IngestionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            partitions: default_partitions(),
            consumers: default_consumers(),
            batch_size: default_batch_size(),
            poll_interval_ms: default_poll_interval_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}
