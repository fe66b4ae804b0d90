//! JSON-file backed metadata store.
//!
//! The state lives in memory. Every mutation is appended to a line-delimited
//! journal next to the snapshot and only becomes visible once the append is
//! on disk. The journal is folded into the snapshot on open and whenever it
//! grows past `compact_after` entries.

use std::ffi::OsString;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::deploy::fsm::DeploymentStatus;
use crate::errors::PlatformError;
use crate::filesys::file::File;
use crate::models::deployment::Deployment;
use crate::models::project::Project;
use crate::store::state::{MetadataState, Mutation};
use crate::store::{CasResult, MetadataStore};

pub const DEFAULT_COMPACT_AFTER: usize = 512;

struct Inner {
    state: MetadataState,
    /// Entries appended since the last compaction
    journaled: usize,
}

/// [`MetadataStore`] persisted to a JSON snapshot plus a mutation journal
pub struct JsonFileStore {
    snapshot: File,
    journal: File,
    compact_after: usize,
    inner: Mutex<Inner>,
}

impl JsonFileStore {
    /// Open the store with the default compaction threshold
    pub async fn open(file: File) -> Result<Self, PlatformError> {
        Self::open_with(file, DEFAULT_COMPACT_AFTER).await
    }

    /// Open the store, loading the snapshot and replaying the journal
    pub async fn open_with(snapshot: File, compact_after: usize) -> Result<Self, PlatformError> {
        let journal = journal_for(&snapshot);

        let mut state = if snapshot.exists().await {
            let state: MetadataState = snapshot.read_json().await?;
            info!("Loaded metadata snapshot from {}", snapshot.path().display());
            state
        } else {
            MetadataState::default()
        };

        let replayed = if journal.exists().await {
            replay(&mut state, &journal.read_string().await?)?
        } else {
            0
        };

        let store = Self {
            snapshot,
            journal,
            compact_after: compact_after.max(1),
            inner: Mutex::new(Inner {
                state,
                journaled: replayed,
            }),
        };
        if replayed > 0 {
            info!("Replayed {} journal entries", replayed);
            let mut inner = store.inner.lock().await;
            store.compact(&mut inner).await?;
            drop(inner);
        }
        Ok(store)
    }

    /// Path of the journal kept beside the snapshot
    pub fn journal_file(&self) -> &File {
        &self.journal
    }

    async fn record(&self, inner: &mut Inner, mutation: Mutation) -> Result<(), PlatformError> {
        let mut line = serde_json::to_vec(&mutation)?;
        line.push(b'\n');
        self.journal.append(&line).await?;

        inner.state.apply(&mutation);
        inner.journaled += 1;

        if inner.journaled >= self.compact_after {
            // The mutation is already durable in the journal
            if let Err(e) = self.compact(inner).await {
                warn!("Metadata compaction failed, keeping journal: {}", e);
            }
        }
        Ok(())
    }

    async fn compact(&self, inner: &mut Inner) -> Result<(), PlatformError> {
        let contents = serde_json::to_vec_pretty(&inner.state)?;
        self.snapshot.write_atomic(&contents).await?;
        self.journal.delete().await?;
        debug!("Compacted {} journal entries into snapshot", inner.journaled);
        inner.journaled = 0;
        Ok(())
    }
}

fn journal_for(snapshot: &File) -> File {
    let mut path = OsString::from(snapshot.path().as_os_str());
    path.push(".journal");
    File::new(path)
}

/// Apply every journal line to `state`.
///
/// A torn final line is dropped; corruption anywhere else is an error.
fn replay(state: &mut MetadataState, contents: &str) -> Result<usize, PlatformError> {
    let lines: Vec<&str> = contents.lines().filter(|l| !l.trim().is_empty()).collect();
    let mut applied = 0;
    for (index, line) in lines.iter().enumerate() {
        match serde_json::from_str::<Mutation>(line) {
            Ok(mutation) => {
                state.apply(&mutation);
                applied += 1;
            }
            Err(e) if index + 1 == lines.len() => {
                warn!("Dropping incomplete journal entry: {}", e);
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(applied)
}

#[async_trait]
impl MetadataStore for JsonFileStore {
    async fn insert_project(&self, project: &Project) -> Result<(), PlatformError> {
        let mut inner = self.inner.lock().await;
        let mutation = inner.state.plan_project(project)?;
        self.record(&mut inner, mutation).await
    }

    async fn get_project(&self, project_id: &str) -> Result<Option<Project>, PlatformError> {
        Ok(self.inner.lock().await.state.project(project_id))
    }

    async fn get_project_by_slug(&self, slug: &str) -> Result<Option<Project>, PlatformError> {
        Ok(self.inner.lock().await.state.project_by_slug(slug))
    }

    async fn find_project_by_name(&self, name: &str) -> Result<Option<Project>, PlatformError> {
        Ok(self.inner.lock().await.state.project_by_name(name))
    }

    async fn create_deployment(&self, deployment: &Deployment) -> Result<(), PlatformError> {
        let mut inner = self.inner.lock().await;
        let mutation = inner.state.plan_deployment(deployment)?;
        self.record(&mut inner, mutation).await
    }

    async fn get_deployment(
        &self,
        deployment_id: &str,
    ) -> Result<Option<Deployment>, PlatformError> {
        Ok(self.inner.lock().await.state.deployment(deployment_id))
    }

    async fn list_deployments(&self, project_id: &str) -> Result<Vec<Deployment>, PlatformError> {
        Ok(self.inner.lock().await.state.deployments_newest_first(project_id))
    }

    async fn compare_and_set_status(
        &self,
        deployment_id: &str,
        expected: DeploymentStatus,
        target: DeploymentStatus,
        at: DateTime<Utc>,
    ) -> Result<CasResult, PlatformError> {
        let mut inner = self.inner.lock().await;
        let mutation = match inner.state.plan_status(deployment_id, expected, target, at) {
            Ok(mutation) => mutation,
            Err(rejected) => return Ok(rejected),
        };
        self.record(&mut inner, mutation).await?;
        Ok(inner
            .state
            .deployment(deployment_id)
            .map(CasResult::Success)
            .unwrap_or(CasResult::NotFound))
    }
}
