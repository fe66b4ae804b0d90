//! Append-only build log storage

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use openapi_client::models::{LogRowOut, SelectResult};
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::errors::PlatformError;
use crate::http::client::HttpClient;
use crate::models::log_event::LogEvent;

/// Log store keyed by deployment ID
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Archive one event verbatim. Duplicates are tolerated.
    async fn append(&self, event: &LogEvent) -> Result<(), PlatformError>;

    /// Events of a deployment ordered by timestamp, strictly after `since` when given
    async fn read(
        &self,
        deployment_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<LogEvent>, PlatformError>;
}

/// In-memory log store
#[derive(Debug, Default)]
pub struct MemoryLogStore {
    entries: RwLock<HashMap<String, Vec<LogEvent>>>,
}

fn poison_err<T>(_: PoisonError<T>) -> PlatformError {
    PlatformError::StorageError("lock poisoned".to_string())
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of archived events, duplicates included
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .map(|entries| entries.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn append(&self, event: &LogEvent) -> Result<(), PlatformError> {
        let mut entries = self.entries.write().map_err(poison_err)?;
        entries
            .entry(event.deployment_id.clone())
            .or_default()
            .push(event.clone());
        Ok(())
    }

    async fn read(
        &self,
        deployment_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<LogEvent>, PlatformError> {
        let entries = self.entries.read().map_err(poison_err)?;
        let mut events: Vec<LogEvent> = entries
            .get(deployment_id)
            .map(|events| {
                events
                    .iter()
                    .filter(|e| since.is_none_or(|since| e.timestamp > since))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        // Stable: equal timestamps keep arrival order
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }
}

/// Log store backed by ClickHouse's HTTP interface
///
/// Expects a table shaped like:
/// `(event_id String, deployment_id String, log String, timestamp DateTime64(3))`
pub struct ClickHouseLogStore {
    client: HttpClient,
    table: String,
    user: String,
    password: Option<SecretString>,
}

impl ClickHouseLogStore {
    pub fn new(
        client: HttpClient,
        database: &str,
        table: &str,
        user: &str,
        password: Option<SecretString>,
    ) -> Result<Self, PlatformError> {
        for ident in [database, table] {
            if ident.is_empty() || !ident.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(PlatformError::ConfigError(format!(
                    "Invalid ClickHouse identifier: {}",
                    ident
                )));
            }
        }

        Ok(Self {
            client,
            table: format!("{}.{}", database, table),
            user: user.to_string(),
            password,
        })
    }

    fn request(&self, query: &[(&str, String)]) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .request(Method::POST, "/")
            .query(query)
            .header("X-ClickHouse-User", &self.user);
        if let Some(password) = &self.password {
            request = request.header("X-ClickHouse-Key", password.expose_secret());
        }
        request
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String, PlatformError> {
        let response = request.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                PlatformError::TransientIo(format!("log store unreachable: {}", e))
            } else {
                PlatformError::HttpError(e)
            }
        })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status.is_server_error() {
            return Err(PlatformError::TransientIo(format!(
                "log store returned {}: {}",
                status, body
            )));
        }
        if !status.is_success() {
            return Err(PlatformError::StorageError(format!(
                "log store returned {}: {}",
                status, body
            )));
        }
        Ok(body)
    }
}

#[async_trait]
impl LogStore for ClickHouseLogStore {
    async fn append(&self, event: &LogEvent) -> Result<(), PlatformError> {
        let row = serde_json::to_string(&event.to_row())?;
        let query = [
            (
                "query",
                format!("INSERT INTO {} FORMAT JSONEachRow", self.table),
            ),
            ("date_time_input_format", "best_effort".to_string()),
        ];
        debug!("Archiving log event {} for {}", event.event_id, event.deployment_id);
        self.send(self.request(&query).body(row)).await?;
        Ok(())
    }

    async fn read(
        &self,
        deployment_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<LogEvent>, PlatformError> {
        let since_ms = since.map(|t| t.timestamp_millis()).unwrap_or(i64::MIN);
        let query = [
            (
                "query",
                format!(
                    "SELECT event_id, deployment_id, log, toUnixTimestamp64Milli(timestamp) AS timestamp_ms \
                     FROM {} WHERE deployment_id = {{deployment_id:String}} \
                     AND toUnixTimestamp64Milli(timestamp) > {{since:Int64}} \
                     ORDER BY timestamp FORMAT JSON",
                    self.table
                ),
            ),
            ("param_deployment_id", deployment_id.to_string()),
            ("param_since", since_ms.to_string()),
            ("output_format_json_quote_64bit_integers", "0".to_string()),
        ];

        let body = self.send(self.request(&query)).await?;
        let result: SelectResult<LogRowOut> = serde_json::from_str(&body)?;
        Ok(result.data.into_iter().map(LogEvent::from_row).collect())
    }
}
