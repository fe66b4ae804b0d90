//! Application state management

use std::collections::HashSet;
use std::sync::Arc;

use tracing::info;

use crate::app::options::{AppOptions, ProxyOptions, TaskRunnerOptions};
use crate::cache::slug::SlugCache;
use crate::deploy::classifier::SubstringClassifier;
use crate::deploy::dispatcher::Dispatcher;
use crate::deploy::registry::DeploymentRegistry;
use crate::errors::PlatformError;
use crate::filesys::file::File;
use crate::http::client::HttpClient;
use crate::ingest::IngestionPipeline;
use crate::routing::{ApiSlugLookup, CachedSlugLookup, RegistryLookup, RoutingResolver, SlugLookup};
use crate::runner::{HttpTaskRunner, TaskRunner};
use crate::storage::layout::StorageLayout;
use crate::storage::settings::{LogStoreSettings, MetadataSettings};
use crate::store::{ClickHouseLogStore, InMemoryStore, JsonFileStore, LogStore, MemoryLogStore, MetadataStore};
use crate::stream::MemoryStream;

/// Main application state
pub struct AppState {
    /// Project and deployment records
    pub registry: Arc<DeploymentRegistry>,

    /// Build job submission
    pub dispatcher: Arc<Dispatcher>,

    /// Archived build logs
    pub log_store: Arc<dyn LogStore>,

    /// Build log stream
    pub stream: Arc<MemoryStream>,

    /// Stream processing
    pub pipeline: Arc<IngestionPipeline>,

    /// Host to artifact resolution for the proxy
    pub resolver: Arc<RoutingResolver>,
}

impl AppState {
    /// Initialize application state
    pub async fn init(options: &AppOptions) -> Result<Self, PlatformError> {
        info!("Initializing application state...");

        let store = init_metadata_store(&options.metadata, &options.storage).await?;
        let registry = Arc::new(DeploymentRegistry::new(store, options.fsm_settings.clone()));

        let runner = init_task_runner(&options.task_runner)?;
        let dispatcher = Arc::new(Dispatcher::new(runner, registry.clone()));

        let log_store = init_log_store(&options.log_store)?;
        let stream = Arc::new(MemoryStream::new(options.ingestion.partitions));
        let classifier = Arc::new(SubstringClassifier::new(options.classifier.clone()));
        let pipeline = Arc::new(IngestionPipeline::new(
            registry.clone(),
            log_store.clone(),
            classifier,
        ));

        let lookup = init_slug_lookup(&options.proxy, registry.clone())?;
        let resolver = Arc::new(RoutingResolver::new(
            lookup,
            &options.artifact_base_url,
            options.proxy.asset_dirs.iter().cloned().collect::<HashSet<_>>(),
        ));

        Ok(Self {
            registry,
            dispatcher,
            log_store,
            stream,
            pipeline,
            resolver,
        })
    }

    /// Shutdown application state
    pub async fn shutdown(&self) -> Result<(), PlatformError> {
        info!(
            "Shutting down application state ({} log events left uncommitted)...",
            self.stream.lag()
        );
        Ok(())
    }
}

async fn init_metadata_store(
    settings: &MetadataSettings,
    layout: &StorageLayout,
) -> Result<Arc<dyn MetadataStore>, PlatformError> {
    match settings {
        MetadataSettings::Memory => {
            info!("Using in-memory metadata store");
            Ok(Arc::new(InMemoryStore::new()))
        }
        MetadataSettings::File {
            path,
            compact_after,
        } => {
            let file = match path {
                Some(path) => File::new(path),
                None => layout.metadata_file(),
            };
            info!("Using metadata snapshot {}", file.path().display());
            Ok(Arc::new(JsonFileStore::open_with(file, *compact_after).await?))
        }
    }
}

fn init_task_runner(options: &TaskRunnerOptions) -> Result<Arc<dyn TaskRunner>, PlatformError> {
    let mut client = HttpClient::new(&options.base_url, options.timeout)?;
    if let Some(token) = &options.api_token {
        client = client.with_bearer_token(token.clone());
    }
    info!("Submitting build jobs to {}", client.base_url());
    Ok(Arc::new(HttpTaskRunner::new(client)))
}

fn init_log_store(settings: &LogStoreSettings) -> Result<Arc<dyn LogStore>, PlatformError> {
    match settings {
        LogStoreSettings::Memory => {
            info!("Using in-memory log store");
            Ok(Arc::new(MemoryLogStore::new()))
        }
        LogStoreSettings::Clickhouse {
            url,
            database,
            table,
            user,
            password,
            timeout_secs,
        } => {
            let client = HttpClient::new(url, std::time::Duration::from_secs(*timeout_secs))?;
            info!("Archiving build logs to ClickHouse {}.{}", database, table);
            Ok(Arc::new(ClickHouseLogStore::new(
                client,
                database,
                table,
                user,
                password.clone(),
            )?))
        }
    }
}

fn init_slug_lookup(
    options: &ProxyOptions,
    registry: Arc<DeploymentRegistry>,
) -> Result<Arc<dyn SlugLookup>, PlatformError> {
    let lookup: Arc<dyn SlugLookup> = match &options.api_url {
        Some(api_url) => {
            info!("Resolving slugs through {}", api_url);
            Arc::new(ApiSlugLookup::new(HttpClient::new(
                api_url,
                options.request_timeout,
            )?))
        }
        None => Arc::new(RegistryLookup::new(registry)),
    };

    if options.cache_capacity == 0 {
        return Ok(lookup);
    }
    Ok(Arc::new(CachedSlugLookup::new(
        lookup,
        SlugCache::new(options.cache_capacity, options.cache_ttl),
    )))
}
