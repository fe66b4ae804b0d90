//! Task runner reached over HTTP

use async_trait::async_trait;
use openapi_client::models::BuildJobAccepted;
use tracing::{debug, info};

use crate::errors::PlatformError;
use crate::http::client::HttpClient;
use crate::runner::{BuildJob, TaskRunner};

/// Submits build jobs with `POST <base_url>/jobs`
pub struct HttpTaskRunner {
    client: HttpClient,
}

impl HttpTaskRunner {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TaskRunner for HttpTaskRunner {
    async fn submit(&self, job: &BuildJob) -> Result<(), PlatformError> {
        // Any 2xx is an acceptance, whatever the body looks like
        let body = self.client.post("/jobs", job).await?;
        let job_id = match serde_json::from_slice::<BuildJobAccepted>(&body) {
            Ok(accepted) => accepted.job_id.unwrap_or_default(),
            Err(e) => {
                debug!(
                    "Unrecognised acknowledgement for deployment {}: {}",
                    job.deployment_id, e
                );
                String::new()
            }
        };
        info!(
            "Task runner accepted build for deployment {} (job {})",
            job.deployment_id, job_id
        );
        Ok(())
    }
}
