//! Control API models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Envelope for successful responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: String,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: "success".to_string(),
            data,
        }
    }
}

/// Envelope for error responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
        }
    }
}

/// Health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Version response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Project creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    pub name: String,
    pub git_repo_url: String,
    #[serde(default)]
    pub framework: Option<String>,
    #[serde(default)]
    pub custom_domain: Option<String>,
}

/// Project as returned by the API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectView {
    pub id: String,
    pub name: String,
    pub git_repo_url: String,
    pub slug: String,
    pub framework: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_deployment_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectData {
    pub project: ProjectView,
}

/// Reply to `GET /project/check`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectCheckData {
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectView>,
}

/// Deploy request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployRequest {
    pub project_id: String,
}

/// Reply to an accepted deploy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployData {
    pub deployment_id: String,
    pub deployment_url: String,
}

/// Deployment as returned by the API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentView {
    pub id: String,
    pub project_id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentData {
    pub deployment: DeploymentView,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentListData {
    pub deployments: Vec<DeploymentView>,
}

/// Reply to `GET /resolve/:slug` (not enveloped, read by routing proxies)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveResponse {
    pub deployment_id: String,
}

/// A single archived build log line
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntryView {
    pub event_id: String,
    pub deployment_id: String,
    pub log: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsData {
    pub logs: Vec<LogEntryView>,
}

/// Query for `GET /logs/:id`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogsQuery {
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
}

/// A log line pushed by a build worker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishLogRequest {
    pub deployment_id: String,
    pub log: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Build workers may push one line or a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PublishEventsRequest {
    Many(Vec<PublishLogRequest>),
    One(PublishLogRequest),
}

impl PublishEventsRequest {
    pub fn into_vec(self) -> Vec<PublishLogRequest> {
        match self {
            PublishEventsRequest::Many(items) => items,
            PublishEventsRequest::One(item) => vec![item],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishEventsData {
    pub accepted: usize,
}
