//! In-memory metadata store.
//!
//! No durability: state is lost when the process exits. Used for tests and
//! single-process development setups.

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::deploy::fsm::DeploymentStatus;
use crate::errors::PlatformError;
use crate::models::deployment::Deployment;
use crate::models::project::Project;
use crate::store::state::MetadataState;
use crate::store::{CasResult, MetadataStore};

/// Thread-safe in-memory [`MetadataStore`]
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<MetadataState>,
}

fn poison_err<T>(_: PoisonError<T>) -> PlatformError {
    PlatformError::StorageError("lock poisoned".to_string())
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataStore for InMemoryStore {
    async fn insert_project(&self, project: &Project) -> Result<(), PlatformError> {
        let mut state = self.state.write().map_err(poison_err)?;
        state.insert_project(project)
    }

    async fn get_project(&self, project_id: &str) -> Result<Option<Project>, PlatformError> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.project(project_id))
    }

    async fn get_project_by_slug(&self, slug: &str) -> Result<Option<Project>, PlatformError> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.project_by_slug(slug))
    }

    async fn find_project_by_name(&self, name: &str) -> Result<Option<Project>, PlatformError> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.project_by_name(name))
    }

    async fn create_deployment(&self, deployment: &Deployment) -> Result<(), PlatformError> {
        let mut state = self.state.write().map_err(poison_err)?;
        state.create_deployment(deployment)
    }

    async fn get_deployment(
        &self,
        deployment_id: &str,
    ) -> Result<Option<Deployment>, PlatformError> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.deployment(deployment_id))
    }

    async fn list_deployments(&self, project_id: &str) -> Result<Vec<Deployment>, PlatformError> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.deployments_newest_first(project_id))
    }

    async fn compare_and_set_status(
        &self,
        deployment_id: &str,
        expected: DeploymentStatus,
        target: DeploymentStatus,
        at: DateTime<Utc>,
    ) -> Result<CasResult, PlatformError> {
        let mut state = self.state.write().map_err(poison_err)?;
        Ok(state.compare_and_set_status(deployment_id, expected, target, at))
    }
}
