//! Build log events

use chrono::{DateTime, TimeZone, Utc};
use openapi_client::models::{LogRow, LogRowOut};
use openapi_server::models::LogEntryView;
use serde::{Deserialize, Serialize};

/// One raw build-log line, scoped to a deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    pub event_id: String,
    pub deployment_id: String,
    pub log: String,
    pub timestamp: DateTime<Utc>,
}

/// Payload as it travels on the event stream; producers may omit the id and timestamp
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamPayload {
    #[serde(default)]
    pub event_id: Option<String>,
    pub deployment_id: String,
    pub log: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl LogEvent {
    pub fn to_view(&self) -> LogEntryView {
        LogEntryView {
            event_id: self.event_id.clone(),
            deployment_id: self.deployment_id.clone(),
            log: self.log.clone(),
            timestamp: self.timestamp,
        }
    }

    pub fn to_row(&self) -> LogRow {
        LogRow {
            event_id: self.event_id.clone(),
            deployment_id: self.deployment_id.clone(),
            log: self.log.clone(),
            timestamp: self.timestamp.to_rfc3339(),
        }
    }

    pub fn from_row(row: LogRowOut) -> Self {
        Self {
            event_id: row.event_id,
            deployment_id: row.deployment_id,
            log: row.log,
            timestamp: Utc
                .timestamp_millis_opt(row.timestamp_ms)
                .single()
                .unwrap_or_default(),
        }
    }
}
