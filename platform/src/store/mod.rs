//! Pluggable storage for deployment metadata and build logs.
//!
//! Status changes go through [`MetadataStore::compare_and_set_status`], the
//! per-row atomic read-modify-write the registry builds its terminal-state
//! guard on. No other lock is taken around a transition.

pub mod file;
pub mod logs;
pub mod memory;
mod state;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::deploy::fsm::DeploymentStatus;
use crate::errors::PlatformError;
use crate::models::deployment::Deployment;
use crate::models::project::Project;

pub use file::JsonFileStore;
pub use logs::{ClickHouseLogStore, LogStore, MemoryLogStore};
pub use memory::InMemoryStore;

/// Result of a compare-and-set on a deployment status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasResult {
    /// Applied; carries the updated record
    Success(Deployment),

    /// No deployment with that ID
    NotFound,

    /// Someone else changed the status first
    StateMismatch { actual: DeploymentStatus },
}

/// Metadata store for projects and deployments
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert a project. Fails with `Conflict` when the slug is taken.
    async fn insert_project(&self, project: &Project) -> Result<(), PlatformError>;

    async fn get_project(&self, project_id: &str) -> Result<Option<Project>, PlatformError>;

    async fn get_project_by_slug(&self, slug: &str) -> Result<Option<Project>, PlatformError>;

    async fn find_project_by_name(&self, name: &str) -> Result<Option<Project>, PlatformError>;

    /// Insert a deployment and point its project's `latest_deployment_id` at it.
    /// Fails with `NotFound` when the project does not exist.
    async fn create_deployment(&self, deployment: &Deployment) -> Result<(), PlatformError>;

    async fn get_deployment(&self, deployment_id: &str)
        -> Result<Option<Deployment>, PlatformError>;

    /// Deployments of a project, newest first
    async fn list_deployments(&self, project_id: &str) -> Result<Vec<Deployment>, PlatformError>;

    /// Atomically set `status` (and `updated_at`) if the stored status equals `expected`
    async fn compare_and_set_status(
        &self,
        deployment_id: &str,
        expected: DeploymentStatus,
        target: DeploymentStatus,
        at: DateTime<Utc>,
    ) -> Result<CasResult, PlatformError>;
}
