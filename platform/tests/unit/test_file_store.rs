//! JSON file store tests

use std::sync::Arc;

use launchpad::deploy::fsm::{DeploymentStatus, FsmSettings};
use launchpad::deploy::registry::DeploymentRegistry;
use launchpad::filesys::file::File;
use launchpad::store::{CasResult, JsonFileStore, MetadataStore};
use tempfile::tempdir;

use crate::support::new_project;

async fn registry_at(file: File) -> DeploymentRegistry {
    let store = JsonFileStore::open(file).await.unwrap();
    DeploymentRegistry::new(Arc::new(store), FsmSettings::default())
}

#[tokio::test]
async fn test_state_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state").join("metadata.json");

    let (project, done, running) = {
        let registry = registry_at(File::new(&path)).await;
        let project = registry.create_project(new_project("docs")).await.unwrap();
        let done = registry.create(&project.id).await.unwrap();
        registry
            .transition(&done.id, DeploymentStatus::Completed)
            .await
            .unwrap();
        let running = registry.create(&project.id).await.unwrap();
        registry
            .transition(&running.id, DeploymentStatus::InProgress)
            .await
            .unwrap();
        (project, done, running)
    };

    let registry = registry_at(File::new(&path)).await;

    let reloaded = registry.get_project(&project.id).await.unwrap();
    assert_eq!(reloaded.slug, project.slug);
    assert_eq!(reloaded.latest_deployment_id.as_deref(), Some(running.id.as_str()));

    assert_eq!(
        registry.get(&done.id).await.unwrap().status,
        DeploymentStatus::Completed
    );
    assert_eq!(
        registry.get(&running.id).await.unwrap().status,
        DeploymentStatus::InProgress
    );

    let ids: Vec<String> = registry
        .list_by_project(&project.id)
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.id)
        .collect();
    assert_eq!(ids, vec![running.id.clone(), done.id.clone()]);

    assert_eq!(registry.resolve_slug(&project.slug).await.unwrap(), done.id);
}

#[tokio::test]
async fn test_rejected_cas_leaves_snapshot_untouched() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("metadata.json");

    let store = JsonFileStore::open(File::new(&path)).await.unwrap();
    let registry = DeploymentRegistry::new(Arc::new(store), FsmSettings::default());
    let project = registry.create_project(new_project("docs")).await.unwrap();
    let deployment = registry.create(&project.id).await.unwrap();
    drop(registry);

    let store = JsonFileStore::open(File::new(&path)).await.unwrap();
    let result = store
        .compare_and_set_status(
            &deployment.id,
            DeploymentStatus::InProgress,
            DeploymentStatus::Completed,
            chrono::Utc::now(),
        )
        .await
        .unwrap();
    assert_eq!(
        result,
        CasResult::StateMismatch {
            actual: DeploymentStatus::Queued
        }
    );

    let reopened = JsonFileStore::open(File::new(&path)).await.unwrap();
    let stored = reopened.get_deployment(&deployment.id).await.unwrap().unwrap();
    assert_eq!(stored.status, DeploymentStatus::Queued);
    assert_eq!(stored.updated_at, deployment.updated_at);
}

#[tokio::test]
async fn test_corrupt_snapshot_fails_to_open() {
    let dir = tempdir().unwrap();
    let file = File::new(dir.path().join("metadata.json"));
    file.write_atomic(b"{ definitely not json").await.unwrap();

    assert!(JsonFileStore::open(file).await.is_err());
}

#[tokio::test]
async fn test_transitions_append_to_journal_until_compaction() {
    let dir = tempdir().unwrap();
    let snapshot = File::new(dir.path().join("metadata.json"));

    let store = Arc::new(JsonFileStore::open_with(snapshot.clone(), 4).await.unwrap());
    let registry = DeploymentRegistry::new(store.clone(), FsmSettings::default());
    let project = registry.create_project(new_project("docs")).await.unwrap();
    let deployment = registry.create(&project.id).await.unwrap();

    // project + deployment so far, nothing folded into the snapshot yet
    assert!(!snapshot.exists().await);
    let journal = store.journal_file().read_string().await.unwrap();
    assert_eq!(journal.lines().count(), 2);

    registry
        .transition(&deployment.id, DeploymentStatus::InProgress)
        .await
        .unwrap();
    assert_eq!(
        store.journal_file().read_string().await.unwrap().lines().count(),
        3
    );

    // the fourth entry reaches the threshold
    registry
        .transition(&deployment.id, DeploymentStatus::Completed)
        .await
        .unwrap();
    assert!(snapshot.exists().await);
    assert!(!store.journal_file().exists().await);

    drop(registry);
    drop(store);
    let registry = registry_at(snapshot).await;
    assert_eq!(
        registry.get(&deployment.id).await.unwrap().status,
        DeploymentStatus::Completed
    );
}

#[tokio::test]
async fn test_torn_journal_tail_is_dropped() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("metadata.json");

    let (project, deployment) = {
        let registry = registry_at(File::new(&path)).await;
        let project = registry.create_project(new_project("docs")).await.unwrap();
        let deployment = registry.create(&project.id).await.unwrap();
        (project, deployment)
    };

    let journal = File::new(dir.path().join("metadata.json.journal"));
    journal.append(b"{\"op\":\"status\",\"deploym").await.unwrap();

    let registry = registry_at(File::new(&path)).await;
    assert_eq!(
        registry.get_project(&project.id).await.unwrap().latest_deployment_id,
        Some(deployment.id.clone())
    );
    assert_eq!(
        registry.get(&deployment.id).await.unwrap().status,
        DeploymentStatus::Queued
    );
    // replay folds the journal into the snapshot
    assert!(!journal.exists().await);
}

#[tokio::test]
async fn test_corrupt_journal_entry_fails_to_open() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("metadata.json");
    {
        let registry = registry_at(File::new(&path)).await;
        registry.create_project(new_project("docs")).await.unwrap();
    }

    let journal = File::new(dir.path().join("metadata.json.journal"));
    let contents = journal.read_string().await.unwrap();
    journal
        .write_atomic(format!("garbage\n{}", contents).as_bytes())
        .await
        .unwrap();

    assert!(JsonFileStore::open(File::new(&path)).await.is_err());
}
