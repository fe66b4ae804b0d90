//! Build task runner collaborator

pub mod http;

use async_trait::async_trait;
use openapi_client::models::BuildJobRequest;

use crate::errors::PlatformError;
use crate::models::deployment::Deployment;
use crate::models::project::Project;

pub use http::HttpTaskRunner;

/// Parameters of one build job
pub type BuildJob = BuildJobRequest;

/// Build the job parameters for a deployment of a project
pub fn build_job(deployment: &Deployment, project: &Project) -> BuildJob {
    BuildJobRequest {
        deployment_id: deployment.id.clone(),
        project_id: project.id.clone(),
        repo_url: project.repo_url.clone(),
        framework: project.framework.to_string(),
    }
}

/// Fire-and-forget job submission.
///
/// Success means the runner accepted the job, nothing more. Callers must not
/// assume an accepted job ever finishes.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn submit(&self, job: &BuildJob) -> Result<(), PlatformError>;
}
