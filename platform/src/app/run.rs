//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::options::{AppOptions, LifecycleOptions};
use crate::app::state::AppState;
use crate::errors::PlatformError;
use crate::routing::proxy::{self, ProxyState};
use crate::server::serve::serve;
use crate::server::state::ServerState;
use crate::workers::ingester;

/// Run the Launchpad engine until `shutdown_signal` resolves
pub async fn run(
    version: String,
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), PlatformError> {
    info!("Initializing Launchpad {}...", version);

    // Create shutdown channel
    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());

    if let Err(e) = init(&options, shutdown_tx.clone(), &mut shutdown_manager).await {
        error!("Failed to start Launchpad: {}", e);
        shutdown_manager.shutdown().await?;
        return Err(e);
    }

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

// =============================== INITIALIZATION ================================== //

async fn init(
    options: &AppOptions,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<(), PlatformError> {
    options.storage.setup().await?;

    let app_state = Arc::new(AppState::init(options).await?);
    shutdown_manager.with_app_state(app_state.clone())?;

    init_api_server(options, app_state.clone(), shutdown_manager, shutdown_tx.subscribe()).await?;

    if options.proxy.enabled {
        init_proxy_server(options, app_state.clone(), shutdown_manager, shutdown_tx.subscribe())
            .await?;
    }

    if options.ingestion.enabled {
        init_ingester_workers(options, app_state, shutdown_manager, &shutdown_tx)?;
    }

    Ok(())
}

async fn init_api_server(
    options: &AppOptions,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), PlatformError> {
    info!("Initializing control API server...");

    let server_state = ServerState::new(
        app_state.registry.clone(),
        app_state.dispatcher.clone(),
        app_state.log_store.clone(),
        app_state.stream.clone(),
        options.public_domain.clone(),
    );

    let server_handle = serve(&options.server, Arc::new(server_state), async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;

    shutdown_manager.with_api_server_handle(server_handle)?;
    Ok(())
}

async fn init_proxy_server(
    options: &AppOptions,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), PlatformError> {
    info!("Initializing routing proxy...");

    let proxy_state = ProxyState::new(app_state.resolver.clone(), &options.proxy)?;
    let proxy_handle = proxy::serve(&options.proxy, Arc::new(proxy_state), async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;

    shutdown_manager.with_proxy_server_handle(proxy_handle)?;
    Ok(())
}

fn init_ingester_workers(
    options: &AppOptions,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    shutdown_tx: &broadcast::Sender<()>,
) -> Result<(), PlatformError> {
    let consumers = app_state.stream.consumers(options.ingestion.consumers);
    info!("Initializing {} ingester workers...", consumers.len());

    for consumer in consumers {
        let worker_options = options.ingestion.worker.clone();
        let pipeline = app_state.pipeline.clone();
        let mut shutdown_rx = shutdown_tx.subscribe();

        info!(
            "Ingester {} owns partitions {:?}",
            consumer.id(),
            consumer.partitions()
        );
        let handle = tokio::spawn(async move {
            ingester::run(
                &worker_options,
                &consumer,
                pipeline.as_ref(),
                tokio::time::sleep,
                Box::pin(async move {
                    let _ = shutdown_rx.recv().await;
                }),
            )
            .await;
        });

        shutdown_manager.with_ingester_worker_handle(handle);
    }
    Ok(())
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    app_state: Option<Arc<AppState>>,
    api_server_handle: Option<JoinHandle<Result<(), PlatformError>>>,
    proxy_server_handle: Option<JoinHandle<Result<(), PlatformError>>>,
    ingester_worker_handles: Vec<JoinHandle<()>>,
}

impl ShutdownManager {
    pub fn new(shutdown_tx: broadcast::Sender<()>, lifecycle_options: LifecycleOptions) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            app_state: None,
            api_server_handle: None,
            proxy_server_handle: None,
            ingester_worker_handles: Vec::new(),
        }
    }

    pub fn with_app_state(&mut self, state: Arc<AppState>) -> Result<(), PlatformError> {
        if self.app_state.is_some() {
            return Err(PlatformError::ShutdownError("app_state already set".to_string()));
        }
        self.app_state = Some(state);
        Ok(())
    }

    pub fn with_api_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), PlatformError>>,
    ) -> Result<(), PlatformError> {
        if self.api_server_handle.is_some() {
            return Err(PlatformError::ShutdownError("api_server_handle already set".to_string()));
        }
        self.api_server_handle = Some(handle);
        Ok(())
    }

    pub fn with_proxy_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), PlatformError>>,
    ) -> Result<(), PlatformError> {
        if self.proxy_server_handle.is_some() {
            return Err(PlatformError::ShutdownError(
                "proxy_server_handle already set".to_string(),
            ));
        }
        self.proxy_server_handle = Some(handle);
        Ok(())
    }

    pub fn with_ingester_worker_handle(&mut self, handle: JoinHandle<()>) {
        self.ingester_worker_handles.push(handle);
    }

    pub async fn shutdown(&mut self) -> Result<(), PlatformError> {
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(
            self.lifecycle_options.max_shutdown_delay,
            self.shutdown_impl(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, forcing shutdown...",
                    self.lifecycle_options.max_shutdown_delay
                );
                std::process::exit(1);
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), PlatformError> {
        info!("Shutting down Launchpad...");

        // 1. Ingester workers, so no batch is left half-committed
        for handle in self.ingester_worker_handles.drain(..) {
            handle.await.map_err(|e| PlatformError::ShutdownError(e.to_string()))?;
        }

        // 2. Routing proxy
        if let Some(handle) = self.proxy_server_handle.take() {
            handle.await.map_err(|e| PlatformError::ShutdownError(e.to_string()))??;
        }

        // 3. Control API
        if let Some(handle) = self.api_server_handle.take() {
            handle.await.map_err(|e| PlatformError::ShutdownError(e.to_string()))??;
        }

        // 4. App state
        if let Some(app_state) = self.app_state.take() {
            app_state.shutdown().await?;
        }

        info!("Shutdown complete");
        Ok(())
    }
}
