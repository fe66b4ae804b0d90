//! End-to-end lifecycle scenarios

use std::sync::Arc;

use chrono::Utc;

use launchpad::deploy::dispatcher::Dispatcher;
use launchpad::deploy::fsm::DeploymentStatus;
use launchpad::errors::PlatformError;
use launchpad::models::deployment::Deployment;
use launchpad::routing::{RegistryLookup, RoutingResolver};
use launchpad::store::{MemoryLogStore, MetadataStore};
use launchpad::stream::MemoryStream;
use launchpad::workers::ingester;

use crate::support::{payload, pipeline, Harness, RecordingRunner};

const ARTIFACT_ROOT: &str = "http://artifacts.internal/__output";

#[tokio::test]
async fn test_successful_build_lifecycle() {
    let harness = Harness::new();
    let project = harness.project_with_slug("p1", "brave-solid-otter").await;
    let deployment = harness.registry.create(&project.id).await.unwrap();
    assert_eq!(deployment.status, DeploymentStatus::Queued);

    let dispatcher = Dispatcher::new(Arc::new(RecordingRunner::new()), harness.registry.clone());
    dispatcher.dispatch(&deployment, &project).await.unwrap();

    let stream = Arc::new(MemoryStream::new(2));
    let consumer = stream.consumers(1).pop().unwrap();
    let pipeline = pipeline(harness.registry.clone(), Arc::new(MemoryLogStore::new()));
    let options = ingester::Options::default();

    let ingest_line = |id: &str, line: &str| {
        stream
            .append(&deployment.id, payload(id, &deployment.id, line))
            .unwrap();
    };

    ingest_line("e1", "Starting build");
    ingester::poll_once(&options, &consumer, &pipeline).await.unwrap();
    assert_eq!(
        harness.registry.get(&deployment.id).await.unwrap().status,
        DeploymentStatus::InProgress
    );

    ingest_line("e2", "Upload complete\n");
    ingester::poll_once(&options, &consumer, &pipeline).await.unwrap();
    assert_eq!(
        harness.registry.get(&deployment.id).await.unwrap().status,
        DeploymentStatus::Completed
    );

    ingest_line("e3", "Error: cache cleanup failed");
    ingester::poll_once(&options, &consumer, &pipeline).await.unwrap();
    assert_eq!(
        harness.registry.get(&deployment.id).await.unwrap().status,
        DeploymentStatus::Completed
    );
    assert_eq!(stream.lag(), 0);
}

#[tokio::test]
async fn test_failed_dispatch_cannot_be_cancelled() {
    let harness = Harness::new();
    let project = harness.project("docs").await;
    let deployment = harness.registry.create(&project.id).await.unwrap();

    let dispatcher = Dispatcher::new(Arc::new(RecordingRunner::failing()), harness.registry.clone());
    assert!(dispatcher.dispatch(&deployment, &project).await.is_err());
    assert_eq!(
        harness.registry.get(&deployment.id).await.unwrap().status,
        DeploymentStatus::Failed
    );

    assert!(matches!(
        harness.registry.cancel(&deployment.id).await,
        Err(PlatformError::InvalidState(_))
    ));
}

#[tokio::test]
async fn test_slug_host_resolves_to_latest_deployment() {
    let harness = Harness::new();
    let project = harness.project_with_slug("p1", "brave-solid-otter").await;
    harness
        .store
        .create_deployment(&Deployment::queued(
            "d123".to_string(),
            project.id.clone(),
            Utc::now(),
        ))
        .await
        .unwrap();
    harness
        .registry
        .transition("d123", DeploymentStatus::Completed)
        .await
        .unwrap();

    let resolver = RoutingResolver::new(
        Arc::new(RegistryLookup::new(harness.registry.clone())),
        ARTIFACT_ROOT,
        ["assets".to_string(), "static".to_string()],
    );
    let target = resolver
        .resolve("brave-solid-otter.example.com", "/")
        .await
        .unwrap();

    assert_eq!(target.deployment_id, "d123");
    assert_eq!(target.url(), format!("{}/d123/index.html", ARTIFACT_ROOT));
}

#[tokio::test]
async fn test_literal_deployment_host() {
    let harness = Harness::new();
    let resolver = RoutingResolver::new(
        Arc::new(RegistryLookup::new(harness.registry.clone())),
        ARTIFACT_ROOT,
        ["assets".to_string(), "static".to_string()],
    );

    let target = resolver.resolve("d123.example.com", "/about").await.unwrap();

    assert_eq!(target.deployment_id, "d123");
    assert_eq!(target.base_url, format!("{}/d123/", ARTIFACT_ROOT));
    assert_eq!(target.path, "/about");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_racing_completion_yields_one_terminal_state() {
    let harness = Harness::new();
    let project = harness.project("docs").await;

    for _ in 0..50 {
        let deployment = harness.registry.create(&project.id).await.unwrap();

        let cancel = {
            let registry = harness.registry.clone();
            let id = deployment.id.clone();
            tokio::spawn(async move { registry.cancel(&id).await })
        };
        let complete = {
            let registry = harness.registry.clone();
            let id = deployment.id.clone();
            tokio::spawn(async move {
                registry
                    .transition(&id, DeploymentStatus::Completed)
                    .await
            })
        };

        let cancelled = cancel.await.unwrap();
        let completed = complete.await.unwrap().unwrap();
        let stored = harness.registry.get(&deployment.id).await.unwrap();

        assert!(stored.status.is_terminal());
        assert_eq!(completed.status, stored.status);
        match cancelled {
            Ok(()) => assert_eq!(stored.status, DeploymentStatus::Failed),
            Err(PlatformError::InvalidState(_)) => {
                assert_eq!(stored.status, DeploymentStatus::Completed)
            }
            Err(e) => panic!("unexpected cancel error: {}", e),
        }
    }
}
