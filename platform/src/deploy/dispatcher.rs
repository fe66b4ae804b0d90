//! Build job dispatch

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::deploy::fsm::DeploymentStatus;
use crate::deploy::registry::DeploymentRegistry;
use crate::errors::PlatformError;
use crate::models::deployment::Deployment;
use crate::models::project::Project;
use crate::runner::{build_job, TaskRunner};

/// Submits build jobs and fails the deployment when submission fails
pub struct Dispatcher {
    runner: Arc<dyn TaskRunner>,
    registry: Arc<DeploymentRegistry>,
}

impl Dispatcher {
    pub fn new(runner: Arc<dyn TaskRunner>, registry: Arc<DeploymentRegistry>) -> Self {
        Self { runner, registry }
    }

    /// Submit the build job for `deployment`.
    ///
    /// On success the deployment stays `QUEUED`. On failure it is moved to
    /// `FAILED` before this returns `DispatchFailure`.
    pub async fn dispatch(
        &self,
        deployment: &Deployment,
        project: &Project,
    ) -> Result<(), PlatformError> {
        let job = build_job(deployment, project);

        let submit_err = match self.runner.submit(&job).await {
            Ok(()) => {
                info!(
                    "Dispatched build for deployment {} of project {}",
                    deployment.id, project.id
                );
                return Ok(());
            }
            Err(e) => e,
        };

        warn!(
            "Build submission for deployment {} failed: {}",
            deployment.id, submit_err
        );

        match self
            .registry
            .transition(&deployment.id, DeploymentStatus::Failed)
            .await
        {
            Ok(_) => Err(PlatformError::DispatchFailure(submit_err.to_string())),
            Err(transition_err) => {
                error!(
                    "Could not mark deployment {} as failed after dispatch failure: {}",
                    deployment.id, transition_err
                );
                Err(PlatformError::DispatchFailure(format!(
                    "{} (marking failed also failed: {})",
                    submit_err, transition_err
                )))
            }
        }
    }
}
