//! Deployment registry
//!
//! Owns project and deployment records and is the only writer of deployment
//! status. Every status change is a compare-and-set against the stored row:
//! the FSM decides the target from the status just read, and a lost race is
//! retried from a fresh read. Once a deployment is terminal the FSM ignores
//! further signals, so concurrent writers converge on whichever terminal
//! state landed first.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::deploy::fsm::{DeploymentEvent, DeploymentFsm, DeploymentStatus, FsmSettings};
use crate::errors::PlatformError;
use crate::models::deployment::Deployment;
use crate::models::project::{NewProject, Project};
use crate::models::slug::generate_slug;
use crate::store::{CasResult, MetadataStore};
use crate::utils::generate_uuid;

const SLUG_ATTEMPTS: u32 = 16;
const MAX_NAME_LEN: usize = 128;

/// Deployment registry backed by a [`MetadataStore`]
pub struct DeploymentRegistry {
    store: Arc<dyn MetadataStore>,
    settings: FsmSettings,
}

impl DeploymentRegistry {
    pub fn new(store: Arc<dyn MetadataStore>, settings: FsmSettings) -> Self {
        Self { store, settings }
    }

    // ================================ PROJECTS ================================= //

    /// Register a project under a freshly generated, unique slug
    pub async fn create_project(&self, new_project: NewProject) -> Result<Project, PlatformError> {
        let name = new_project.name.trim().to_string();
        validate_project_name(&name)?;
        validate_repo_url(&new_project.repo_url)?;
        if let Some(domain) = &new_project.custom_domain {
            validate_domain(domain)?;
        }

        for attempt in 1..=SLUG_ATTEMPTS {
            let slug = generate_slug(&mut rand::thread_rng());
            let project = Project {
                id: generate_uuid(),
                name: name.clone(),
                repo_url: new_project.repo_url.trim().to_string(),
                slug,
                custom_domain: new_project.custom_domain.clone(),
                framework: new_project.framework,
                latest_deployment_id: None,
                created_at: Utc::now(),
            };

            match self.store.insert_project(&project).await {
                Ok(()) => {
                    info!("Created project {} ({}) as {}", project.name, project.id, project.slug);
                    return Ok(project);
                }
                Err(PlatformError::Conflict(reason)) => {
                    debug!("Slug collision on attempt {}: {}", attempt, reason);
                }
                Err(e) => return Err(e),
            }
        }

        Err(PlatformError::Conflict(
            "could not allocate a unique slug".to_string(),
        ))
    }

    pub async fn get_project(&self, project_id: &str) -> Result<Project, PlatformError> {
        self.store
            .get_project(project_id)
            .await?
            .ok_or_else(|| PlatformError::NotFound(format!("project {}", project_id)))
    }

    pub async fn find_project_by_name(&self, name: &str) -> Result<Option<Project>, PlatformError> {
        self.store.find_project_by_name(name.trim()).await
    }

    pub async fn get_project_by_slug(&self, slug: &str) -> Result<Project, PlatformError> {
        self.store
            .get_project_by_slug(slug)
            .await?
            .ok_or_else(|| PlatformError::NotFound(format!("slug {}", slug)))
    }

    /// Deployment currently served under a slug.
    ///
    /// The latest deployment when it completed, otherwise the newest completed
    /// one, so a failed or running build never takes the site down.
    pub async fn resolve_slug(&self, slug: &str) -> Result<String, PlatformError> {
        let project = self.get_project_by_slug(slug).await?;
        let Some(latest_id) = project.latest_deployment_id.as_deref() else {
            return Err(PlatformError::NotFound(format!("no deployment for {}", slug)));
        };

        if let Some(latest) = self.store.get_deployment(latest_id).await? {
            if latest.status == DeploymentStatus::Completed {
                return Ok(latest.id);
            }
        }

        self.store
            .list_deployments(&project.id)
            .await?
            .into_iter()
            .find(|d| d.status == DeploymentStatus::Completed)
            .map(|d| d.id)
            .ok_or_else(|| PlatformError::NotFound(format!("no completed deployment for {}", slug)))
    }

    // =============================== DEPLOYMENTS =============================== //

    /// Create a deployment in `QUEUED` and make it the project's latest
    pub async fn create(&self, project_id: &str) -> Result<Deployment, PlatformError> {
        let deployment = Deployment::queued(generate_uuid(), project_id.to_string(), Utc::now());
        self.store.create_deployment(&deployment).await?;
        info!("Created deployment {} for project {}", deployment.id, project_id);
        Ok(deployment)
    }

    pub async fn get(&self, deployment_id: &str) -> Result<Deployment, PlatformError> {
        self.store
            .get_deployment(deployment_id)
            .await?
            .ok_or_else(|| PlatformError::NotFound(format!("deployment {}", deployment_id)))
    }

    /// Deployments of a project, newest first
    pub async fn list_by_project(&self, project_id: &str) -> Result<Vec<Deployment>, PlatformError> {
        if self.store.get_project(project_id).await?.is_none() {
            return Err(PlatformError::NotFound(format!("project {}", project_id)));
        }
        self.store.list_deployments(project_id).await
    }

    /// Move a deployment to `status`.
    ///
    /// A terminal deployment is returned unchanged: late or duplicate signals are no-ops.
    pub async fn transition(
        &self,
        deployment_id: &str,
        status: DeploymentStatus,
    ) -> Result<Deployment, PlatformError> {
        self.apply(deployment_id, DeploymentEvent::Signal(status)).await
    }

    /// Force a non-terminal deployment to `FAILED`.
    ///
    /// An unknown deployment is rejected the same way as a terminal one.
    pub async fn cancel(&self, deployment_id: &str) -> Result<(), PlatformError> {
        self.apply(deployment_id, DeploymentEvent::Cancel)
            .await
            .map_err(|e| match e {
                PlatformError::NotFound(what) => {
                    PlatformError::InvalidState(format!("cannot cancel unknown {}", what))
                }
                other => other,
            })?;
        info!("Cancelled deployment {}", deployment_id);
        Ok(())
    }

    async fn apply(
        &self,
        deployment_id: &str,
        event: DeploymentEvent,
    ) -> Result<Deployment, PlatformError> {
        for _ in 0..self.settings.cas_retry_limit {
            let current = self.get(deployment_id).await?;

            let mut fsm = DeploymentFsm::new(current.status);
            let transition = fsm.process(event).map_err(PlatformError::InvalidState)?;
            let Some(target) = transition.target() else {
                debug!(
                    "Ignoring {:?} for deployment {}: already {}",
                    event, deployment_id, current.status
                );
                return Ok(current);
            };

            match self
                .store
                .compare_and_set_status(deployment_id, current.status, target, Utc::now())
                .await?
            {
                CasResult::Success(updated) => {
                    info!(
                        "Deployment {} transitioned {} -> {}",
                        deployment_id, current.status, updated.status
                    );
                    return Ok(updated);
                }
                CasResult::NotFound => {
                    return Err(PlatformError::NotFound(format!("deployment {}", deployment_id)));
                }
                CasResult::StateMismatch { actual } => {
                    debug!(
                        "Deployment {} changed to {} concurrently, retrying",
                        deployment_id, actual
                    );
                }
            }
        }

        warn!("Gave up transitioning deployment {} under contention", deployment_id);
        Err(PlatformError::TransientIo(format!(
            "deployment {} is contended",
            deployment_id
        )))
    }
}

fn validate_project_name(name: &str) -> Result<(), PlatformError> {
    if name.is_empty() {
        return Err(PlatformError::ValidationError(
            "project name cannot be empty".to_string(),
        ));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(PlatformError::ValidationError(format!(
            "project name exceeds {} characters",
            MAX_NAME_LEN
        )));
    }
    Ok(())
}

fn validate_repo_url(repo_url: &str) -> Result<(), PlatformError> {
    let repo_url = repo_url.trim();
    // scp-like form, e.g. git@github.com:acme/site.git
    if repo_url.starts_with("git@") && repo_url.contains(':') {
        return Ok(());
    }

    match url::Url::parse(repo_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https" | "git" | "ssh") && url.has_host() => {
            Ok(())
        }
        _ => Err(PlatformError::ValidationError(format!(
            "invalid repository URL: {}",
            repo_url
        ))),
    }
}

fn validate_domain(domain: &str) -> Result<(), PlatformError> {
    let valid = !domain.is_empty()
        && domain.contains('.')
        && domain
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
    if !valid {
        return Err(PlatformError::ValidationError(format!(
            "invalid custom domain: {}",
            domain
        )));
    }
    Ok(())
}
