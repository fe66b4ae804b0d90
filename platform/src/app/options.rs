//! Application configuration options

use std::time::Duration;

use secrecy::SecretString;

use crate::deploy::classifier::ClassifierOptions;
use crate::deploy::fsm::FsmSettings;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::{LogStoreSettings, MetadataSettings, Settings};
use crate::utils::CooldownOptions;
use crate::workers::ingester;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Data directory layout
    pub storage: StorageLayout,

    /// Control API server
    pub server: ServerOptions,

    /// Routing proxy
    pub proxy: ProxyOptions,

    /// Root URL of deployment artifacts
    pub artifact_base_url: String,

    /// Domain deployment URLs are built on
    pub public_domain: String,

    /// Metadata store backend
    pub metadata: MetadataSettings,

    /// Build task runner
    pub task_runner: TaskRunnerOptions,

    /// Log store backend
    pub log_store: LogStoreSettings,

    /// Log ingestion
    pub ingestion: IngestionOptions,

    /// Log classification markers
    pub classifier: ClassifierOptions,

    /// FSM deployment settings
    pub fsm_settings: FsmSettings,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default(), StorageLayout::default())
    }
}

impl AppOptions {
    /// Runtime options from a settings file
    pub fn from_settings(settings: &Settings, storage: StorageLayout) -> Self {
        let ingestion = &settings.ingestion;
        Self {
            lifecycle: LifecycleOptions {
                max_shutdown_delay: Duration::from_secs(settings.max_shutdown_delay_secs),
            },
            storage,
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            proxy: ProxyOptions {
                enabled: settings.proxy.enabled,
                host: settings.proxy.host.clone(),
                port: settings.proxy.port,
                api_url: settings.proxy.api_url.clone(),
                cache_ttl: Duration::from_secs(settings.proxy.cache_ttl_secs),
                cache_capacity: settings.proxy.cache_capacity,
                asset_dirs: settings.proxy.asset_dirs.clone(),
                request_timeout: Duration::from_secs(settings.proxy.request_timeout_secs),
                max_body_bytes: settings.proxy.max_body_bytes,
            },
            artifact_base_url: settings.artifacts.base_url.clone(),
            public_domain: settings.public_domain.clone(),
            metadata: settings.metadata.clone(),
            task_runner: TaskRunnerOptions {
                base_url: settings.task_runner.base_url.clone(),
                api_token: settings.task_runner.api_token.clone(),
                timeout: Duration::from_secs(settings.task_runner.timeout_secs),
            },
            log_store: settings.log_store.clone(),
            ingestion: IngestionOptions {
                enabled: ingestion.enabled,
                partitions: ingestion.partitions,
                consumers: ingestion.consumers,
                worker: ingester::Options {
                    batch_size: ingestion.batch_size,
                    poll_interval: Duration::from_millis(ingestion.poll_interval_ms),
                    heartbeat_interval: Duration::from_millis(ingestion.heartbeat_interval_ms),
                    backoff: CooldownOptions {
                        base_delay: Duration::from_millis(ingestion.backoff_base_ms),
                        max_delay: Duration::from_millis(ingestion.backoff_max_ms),
                        multiplier: 2.0,
                    },
                },
            },
            classifier: settings.classifier.clone(),
            fsm_settings: FsmSettings {
                cas_retry_limit: settings.cas_retry_limit.max(1),
            },
        }
    }
}

/// Lifecycle options
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Control API server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9000,
        }
    }
}

/// Routing proxy options
#[derive(Debug, Clone)]
pub struct ProxyOptions {
    pub enabled: bool,
    pub host: String,
    pub port: u16,

    /// Remote control API for slug lookups; the local registry when unset
    pub api_url: Option<String>,

    pub cache_ttl: Duration,
    pub cache_capacity: usize,
    pub asset_dirs: Vec<String>,
    pub request_timeout: Duration,
    pub max_body_bytes: usize,
}

impl Default for ProxyOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8000,
            api_url: None,
            cache_ttl: Duration::from_secs(10),
            cache_capacity: 1024,
            asset_dirs: Vec::new(),
            request_timeout: Duration::from_secs(5),
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Task runner options
#[derive(Debug, Clone)]
pub struct TaskRunnerOptions {
    pub base_url: String,
    pub api_token: Option<SecretString>,
    pub timeout: Duration,
}

/// Ingestion options
#[derive(Debug, Clone)]
pub struct IngestionOptions {
    /// Run ingester workers
    pub enabled: bool,

    /// Stream partitions
    pub partitions: u32,

    /// Ingester workers, each owning a disjoint partition set
    pub consumers: usize,

    /// Per-worker options
    pub worker: ingester::Options,
}
