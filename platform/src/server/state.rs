//! Server state

use std::sync::Arc;

use crate::deploy::dispatcher::Dispatcher;
use crate::deploy::registry::DeploymentRegistry;
use crate::store::LogStore;
use crate::stream::EventPublisher;

/// Server state shared across handlers
pub struct ServerState {
    pub registry: Arc<DeploymentRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub log_store: Arc<dyn LogStore>,
    pub publisher: Arc<dyn EventPublisher>,
    pub public_domain: String,
}

impl ServerState {
    pub fn new(
        registry: Arc<DeploymentRegistry>,
        dispatcher: Arc<Dispatcher>,
        log_store: Arc<dyn LogStore>,
        publisher: Arc<dyn EventPublisher>,
        public_domain: String,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            log_store,
            publisher,
            public_domain,
        }
    }

    /// Public URL of a deployment
    pub fn deployment_url(&self, deployment_id: &str) -> String {
        format!("http://{}.{}", deployment_id, self.public_domain)
    }
}
