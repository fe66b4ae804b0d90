//! Deployment models

use chrono::{DateTime, Utc};
use openapi_server::models::DeploymentView;
use serde::{Deserialize, Serialize};

use crate::deploy::fsm::DeploymentStatus;

/// One build-and-publish attempt of a project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    /// Unique deployment ID
    pub id: String,

    /// Owning project
    pub project_id: String,

    /// Current status
    pub status: DeploymentStatus,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Last status change
    pub updated_at: DateTime<Utc>,
}

impl Deployment {
    /// A freshly requested deployment, already queued for dispatch
    pub fn queued(id: String, project_id: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            project_id,
            status: DeploymentStatus::Queued,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn to_view(&self) -> DeploymentView {
        DeploymentView {
            id: self.id.clone(),
            project_id: self.project_id.clone(),
            status: self.status.to_string(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
