//! Models exchanged with external collaborators

use serde::{Deserialize, Serialize};

/// Build job submitted to the task runner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildJobRequest {
    pub deployment_id: String,
    pub project_id: String,
    pub repo_url: String,
    pub framework: String,
}

/// Task runner acknowledgement
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildJobAccepted {
    #[serde(default)]
    pub job_id: Option<String>,
}

/// Row written to the log store (`JSONEachRow`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRow {
    pub event_id: String,
    pub deployment_id: String,
    pub log: String,
    /// RFC 3339, parsed server-side with `best_effort`
    pub timestamp: String,
}

/// Row read back from the log store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRowOut {
    pub event_id: String,
    pub deployment_id: String,
    pub log: String,
    pub timestamp_ms: i64,
}

/// `FORMAT JSON` result wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectResult<T> {
    pub data: Vec<T>,
}

/// Slug resolution reply from the control API
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlugResolution {
    #[serde(default)]
    pub deployment_id: String,
}
