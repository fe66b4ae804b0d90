//! Ingestion pipeline and worker tests

use std::sync::Arc;
use std::time::Duration;

use openapi_server::models::PublishLogRequest;

use launchpad::deploy::fsm::DeploymentStatus;
use launchpad::errors::PlatformError;
use launchpad::ingest::{self, BatchReport};
use launchpad::store::{LogStore, MemoryLogStore};
use launchpad::stream::{EventStream, MemoryStream};
use launchpad::workers::ingester::{self, PollOutcome};

use crate::support::{payload, pipeline, FlakyLogStore, Harness};

fn fast_options() -> ingester::Options {
    ingester::Options {
        poll_interval: Duration::from_millis(5),
        heartbeat_interval: Duration::from_millis(10),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_replayed_batch_reaches_same_status() {
    let harness = Harness::new();
    let project = harness.project("docs").await;
    let deployment = harness.registry.create(&project.id).await.unwrap();

    let stream = Arc::new(MemoryStream::new(1));
    for (id, line) in [
        ("e1", "Starting build"),
        ("e2", "Upload complete"),
        ("e3", "error: late cleanup warning"),
    ] {
        stream.append(&deployment.id, payload(id, &deployment.id, line)).unwrap();
    }
    let consumer = stream.consumer("c", vec![0]);
    let log_store = Arc::new(MemoryLogStore::new());
    let pipeline = pipeline(harness.registry.clone(), log_store.clone());

    let batch = consumer.next_batch(10).await.unwrap().unwrap();
    let first = pipeline.process_batch(&batch).await;
    assert_eq!(
        first,
        BatchReport {
            processed: 3,
            skipped: 0,
            deferred: 0
        }
    );
    let after_once = harness.registry.get(&deployment.id).await.unwrap();
    assert_eq!(after_once.status, DeploymentStatus::Completed);

    // crash before commit: the same batch comes back
    let replay = consumer.next_batch(10).await.unwrap().unwrap();
    assert_eq!(replay.records, batch.records);
    pipeline.process_batch(&replay).await;

    let after_twice = harness.registry.get(&deployment.id).await.unwrap();
    assert_eq!(after_twice.status, DeploymentStatus::Completed);
    assert_eq!(after_twice.updated_at, after_once.updated_at);

    // duplicates are archived again, never lost
    assert_eq!(log_store.len(), 6);
}

#[tokio::test]
async fn test_poll_commits_processed_batch() {
    let harness = Harness::new();
    let project = harness.project("docs").await;
    let deployment = harness.registry.create(&project.id).await.unwrap();

    let stream = Arc::new(MemoryStream::new(1));
    stream
        .append(&deployment.id, payload("e1", &deployment.id, "Starting build"))
        .unwrap();
    let consumer = stream.consumer("c", vec![0]);
    let pipeline = pipeline(harness.registry.clone(), Arc::new(MemoryLogStore::new()));

    let outcome = ingester::poll_once(&fast_options(), &consumer, &pipeline)
        .await
        .unwrap();
    assert!(matches!(outcome, PollOutcome::Committed(report) if report.processed == 1));
    assert_eq!(stream.committed(0), 1);
    assert_eq!(stream.lag(), 0);
    assert_eq!(
        harness.registry.get(&deployment.id).await.unwrap().status,
        DeploymentStatus::InProgress
    );

    let idle = ingester::poll_once(&fast_options(), &consumer, &pipeline)
        .await
        .unwrap();
    assert_eq!(idle, PollOutcome::Idle);
}

#[tokio::test]
async fn test_malformed_payload_is_skipped_and_committed() {
    let harness = Harness::new();
    let project = harness.project("docs").await;
    let deployment = harness.registry.create(&project.id).await.unwrap();

    let stream = Arc::new(MemoryStream::new(1));
    stream.append(&deployment.id, b"{not json".to_vec()).unwrap();
    stream
        .append(
            &deployment.id,
            br#"{"deploymentId":"","log":"Starting build"}"#.to_vec(),
        )
        .unwrap();
    stream
        .append(&deployment.id, payload("e3", &deployment.id, "Starting build"))
        .unwrap();
    let consumer = stream.consumer("c", vec![0]);
    let log_store = Arc::new(MemoryLogStore::new());
    let pipeline = pipeline(harness.registry.clone(), log_store.clone());

    let outcome = ingester::poll_once(&fast_options(), &consumer, &pipeline)
        .await
        .unwrap();
    let PollOutcome::Committed(report) = outcome else {
        panic!("expected a commit, got {:?}", outcome);
    };
    assert_eq!(report.skipped, 2);
    assert_eq!(report.processed, 1);
    assert_eq!(stream.committed(0), 3);
    assert_eq!(log_store.len(), 1);
    assert_eq!(
        harness.registry.get(&deployment.id).await.unwrap().status,
        DeploymentStatus::InProgress
    );
}

#[tokio::test]
async fn test_missing_event_id_falls_back_to_position() {
    let harness = Harness::new();
    let project = harness.project("docs").await;
    let deployment = harness.registry.create(&project.id).await.unwrap();

    let stream = Arc::new(MemoryStream::new(1));
    let raw = format!(r#"{{"deploymentId":"{}","log":"cloning"}}"#, deployment.id);
    stream.append(&deployment.id, raw.into_bytes()).unwrap();
    let consumer = stream.consumer("c", vec![0]);
    let log_store = Arc::new(MemoryLogStore::new());
    let pipeline = pipeline(harness.registry.clone(), log_store.clone());

    ingester::poll_once(&fast_options(), &consumer, &pipeline)
        .await
        .unwrap();

    let events = log_store.read(&deployment.id, None).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_id, "0-0");
}

#[tokio::test]
async fn test_unknown_deployment_is_archived_then_skipped() {
    let harness = Harness::new();
    let stream = Arc::new(MemoryStream::new(1));
    stream
        .append("ghost", payload("e1", "ghost", "Starting build"))
        .unwrap();
    stream.append("ghost", payload("e2", "ghost", "npm install")).unwrap();
    let consumer = stream.consumer("c", vec![0]);
    let log_store = Arc::new(MemoryLogStore::new());
    let pipeline = pipeline(harness.registry.clone(), log_store.clone());

    let outcome = ingester::poll_once(&fast_options(), &consumer, &pipeline)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        PollOutcome::Committed(BatchReport {
            processed: 1,
            skipped: 1,
            deferred: 0
        })
    );
    assert_eq!(log_store.len(), 2);
}

#[tokio::test]
async fn test_transient_failure_blocks_commit_until_redelivery() {
    let harness = Harness::new();
    let project = harness.project("docs").await;
    let deployment = harness.registry.create(&project.id).await.unwrap();

    let stream = Arc::new(MemoryStream::new(1));
    stream
        .append(&deployment.id, payload("e1", &deployment.id, "Starting build"))
        .unwrap();
    stream
        .append(&deployment.id, payload("e2", &deployment.id, "Upload complete"))
        .unwrap();
    let consumer = stream.consumer("c", vec![0]);
    let log_store = Arc::new(FlakyLogStore::new(1));
    let pipeline = pipeline(harness.registry.clone(), log_store.clone());

    let first = ingester::poll_once(&fast_options(), &consumer, &pipeline)
        .await
        .unwrap();
    assert_eq!(
        first,
        PollOutcome::Retry(BatchReport {
            processed: 0,
            skipped: 0,
            deferred: 2
        })
    );
    assert_eq!(stream.committed(0), 0);
    assert_eq!(
        harness.registry.get(&deployment.id).await.unwrap().status,
        DeploymentStatus::Queued
    );

    let second = ingester::poll_once(&fast_options(), &consumer, &pipeline)
        .await
        .unwrap();
    assert!(matches!(second, PollOutcome::Committed(report) if report.processed == 2));
    assert_eq!(stream.committed(0), 2);
    assert_eq!(
        harness.registry.get(&deployment.id).await.unwrap().status,
        DeploymentStatus::Completed
    );
}

#[tokio::test]
async fn test_transient_failure_only_defers_its_own_deployment() {
    let harness = Harness::new();
    let project = harness.project("docs").await;
    let blocked = harness.registry.create(&project.id).await.unwrap();
    let healthy = harness.registry.create(&project.id).await.unwrap();

    // single partition so both keys land in one batch
    let stream = Arc::new(MemoryStream::new(1));
    stream
        .append(&blocked.id, payload("b1", &blocked.id, "Starting build"))
        .unwrap();
    stream
        .append(&healthy.id, payload("h1", &healthy.id, "Starting build"))
        .unwrap();
    let consumer = stream.consumer("c", vec![0]);
    // the first append (blocked's group starts first) fails
    let pipeline = pipeline(harness.registry.clone(), Arc::new(FlakyLogStore::new(1)));

    let batch = consumer.next_batch(10).await.unwrap().unwrap();
    let report = pipeline.process_batch(&batch).await;

    assert_eq!(report.deferred, 1);
    assert_eq!(report.processed, 1);
    assert!(!report.is_committable());
}

#[tokio::test]
async fn test_heartbeats_continue_during_slow_batch() {
    let harness = Harness::new();
    let project = harness.project("docs").await;
    let deployment = harness.registry.create(&project.id).await.unwrap();

    let stream = Arc::new(MemoryStream::new(1));
    for i in 0..3 {
        stream
            .append(
                &deployment.id,
                payload(&format!("e{}", i), &deployment.id, "compiling"),
            )
            .unwrap();
    }
    let consumer = stream.consumer("slow-consumer", vec![0]);
    let pipeline = pipeline(
        harness.registry.clone(),
        Arc::new(FlakyLogStore::slow(Duration::from_millis(50))),
    );

    let batch = consumer.next_batch(10).await.unwrap().unwrap();
    assert!(stream.last_heartbeat("slow-consumer").is_none());

    let started = chrono::Utc::now();
    let report =
        ingester::process_with_heartbeat(&consumer, &pipeline, &batch, Duration::from_millis(10))
            .await;

    assert_eq!(report.processed, 3);
    let beat = stream
        .last_heartbeat("slow-consumer")
        .expect("no heartbeat while processing");
    assert!(beat > started);
}

#[tokio::test]
async fn test_worker_drains_stream_until_shutdown() {
    let harness = Harness::new();
    let project = harness.project("docs").await;
    let deployment = harness.registry.create(&project.id).await.unwrap();

    let stream = Arc::new(MemoryStream::new(4));
    let consumer = stream.consumers(1).pop().unwrap();
    let pipeline = Arc::new(pipeline(
        harness.registry.clone(),
        Arc::new(MemoryLogStore::new()),
    ));

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let worker_pipeline = pipeline.clone();
    let worker = tokio::spawn(async move {
        ingester::run(
            &fast_options(),
            &consumer,
            worker_pipeline.as_ref(),
            tokio::time::sleep,
            Box::pin(async move {
                let _ = shutdown_rx.await;
            }),
        )
        .await;
    });

    ingest::publish(
        stream.as_ref(),
        vec![
            PublishLogRequest {
                deployment_id: deployment.id.clone(),
                log: "Starting build".to_string(),
                timestamp: None,
            },
            PublishLogRequest {
                deployment_id: deployment.id.clone(),
                log: "Upload complete".to_string(),
                timestamp: None,
            },
        ],
    )
    .await
    .unwrap();

    let mut status = DeploymentStatus::Queued;
    for _ in 0..200 {
        status = harness.registry.get(&deployment.id).await.unwrap().status;
        if status == DeploymentStatus::Completed && stream.lag() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(status, DeploymentStatus::Completed);
    assert_eq!(stream.lag(), 0);

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), worker)
        .await
        .expect("worker did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_publish_assigns_ids_and_rejects_anonymous_lines() {
    let stream = MemoryStream::new(2);

    let ids = ingest::publish(
        &stream,
        vec![
            PublishLogRequest {
                deployment_id: "d1".to_string(),
                log: "a".to_string(),
                timestamp: None,
            },
            PublishLogRequest {
                deployment_id: "d1".to_string(),
                log: "b".to_string(),
                timestamp: None,
            },
        ],
    )
    .await
    .unwrap();
    assert_eq!(ids.len(), 2);
    assert_ne!(ids[0], ids[1]);
    assert_eq!(stream.lag(), 2);

    let err = ingest::publish(
        &stream,
        vec![PublishLogRequest {
            deployment_id: " ".to_string(),
            log: "c".to_string(),
            timestamp: None,
        }],
    )
    .await
    .unwrap_err();
    assert!(matches!(err, PlatformError::ValidationError(_)));
    assert_eq!(stream.lag(), 2);
}
