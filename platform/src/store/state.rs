//! Shared in-memory representation used by the memory and file stores

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::deploy::fsm::DeploymentStatus;
use crate::errors::PlatformError;
use crate::models::deployment::Deployment;
use crate::models::project::Project;
use crate::store::CasResult;

/// A single change to the metadata, as recorded in the file store's journal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub(crate) enum Mutation {
    Project {
        project: Project,
    },
    Deployment {
        deployment: Deployment,
    },
    Status {
        deployment_id: String,
        status: DeploymentStatus,
        updated_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct MetadataState {
    projects: HashMap<String, Project>,
    slugs: HashMap<String, String>,
    deployments: HashMap<String, Deployment>,
    /// Deployment IDs per project in creation order
    history: HashMap<String, Vec<String>>,
}

impl MetadataState {
    pub(crate) fn plan_project(&self, project: &Project) -> Result<Mutation, PlatformError> {
        if self.slugs.contains_key(&project.slug) {
            return Err(PlatformError::Conflict(format!(
                "slug already taken: {}",
                project.slug
            )));
        }
        if self.projects.contains_key(&project.id) {
            return Err(PlatformError::Conflict(format!(
                "project already exists: {}",
                project.id
            )));
        }
        Ok(Mutation::Project {
            project: project.clone(),
        })
    }

    pub(crate) fn plan_deployment(&self, deployment: &Deployment) -> Result<Mutation, PlatformError> {
        if !self.projects.contains_key(&deployment.project_id) {
            return Err(PlatformError::NotFound(format!(
                "project {}",
                deployment.project_id
            )));
        }
        if self.deployments.contains_key(&deployment.id) {
            return Err(PlatformError::Conflict(format!(
                "deployment already exists: {}",
                deployment.id
            )));
        }
        Ok(Mutation::Deployment {
            deployment: deployment.clone(),
        })
    }

    /// The status change to record, or the CAS outcome that rejects it
    pub(crate) fn plan_status(
        &self,
        deployment_id: &str,
        expected: DeploymentStatus,
        target: DeploymentStatus,
        at: DateTime<Utc>,
    ) -> Result<Mutation, CasResult> {
        let Some(deployment) = self.deployments.get(deployment_id) else {
            return Err(CasResult::NotFound);
        };
        if deployment.status != expected {
            return Err(CasResult::StateMismatch {
                actual: deployment.status,
            });
        }
        Ok(Mutation::Status {
            deployment_id: deployment_id.to_string(),
            status: target,
            updated_at: at,
        })
    }

    /// Apply a planned or replayed mutation. Applying the same one twice is harmless.
    pub(crate) fn apply(&mut self, mutation: &Mutation) {
        match mutation {
            Mutation::Project { project } => {
                self.slugs.insert(project.slug.clone(), project.id.clone());
                self.projects.insert(project.id.clone(), project.clone());
            }
            Mutation::Deployment { deployment } => {
                if let Some(project) = self.projects.get_mut(&deployment.project_id) {
                    project.latest_deployment_id = Some(deployment.id.clone());
                }
                let replaced = self
                    .deployments
                    .insert(deployment.id.clone(), deployment.clone());
                if replaced.is_none() {
                    self.history
                        .entry(deployment.project_id.clone())
                        .or_default()
                        .push(deployment.id.clone());
                }
            }
            Mutation::Status {
                deployment_id,
                status,
                updated_at,
            } => {
                if let Some(deployment) = self.deployments.get_mut(deployment_id) {
                    deployment.status = *status;
                    deployment.updated_at = *updated_at;
                }
            }
        }
    }

    pub(crate) fn insert_project(&mut self, project: &Project) -> Result<(), PlatformError> {
        let mutation = self.plan_project(project)?;
        self.apply(&mutation);
        Ok(())
    }

    pub(crate) fn project(&self, project_id: &str) -> Option<Project> {
        self.projects.get(project_id).cloned()
    }

    pub(crate) fn project_by_slug(&self, slug: &str) -> Option<Project> {
        self.slugs
            .get(slug)
            .and_then(|id| self.projects.get(id))
            .cloned()
    }

    pub(crate) fn project_by_name(&self, name: &str) -> Option<Project> {
        self.projects.values().find(|p| p.name == name).cloned()
    }

    pub(crate) fn create_deployment(&mut self, deployment: &Deployment) -> Result<(), PlatformError> {
        let mutation = self.plan_deployment(deployment)?;
        self.apply(&mutation);
        Ok(())
    }

    pub(crate) fn deployment(&self, deployment_id: &str) -> Option<Deployment> {
        self.deployments.get(deployment_id).cloned()
    }

    pub(crate) fn deployments_newest_first(&self, project_id: &str) -> Vec<Deployment> {
        self.history
            .get(project_id)
            .map(|ids| {
                ids.iter()
                    .rev()
                    .filter_map(|id| self.deployments.get(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn compare_and_set_status(
        &mut self,
        deployment_id: &str,
        expected: DeploymentStatus,
        target: DeploymentStatus,
        at: DateTime<Utc>,
    ) -> CasResult {
        match self.plan_status(deployment_id, expected, target, at) {
            Ok(mutation) => {
                self.apply(&mutation);
                self.deployment(deployment_id)
                    .map(CasResult::Success)
                    .unwrap_or(CasResult::NotFound)
            }
            Err(rejected) => rejected,
        }
    }
}
