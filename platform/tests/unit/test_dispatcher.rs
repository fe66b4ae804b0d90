//! Dispatcher unit tests

use std::sync::Arc;

use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use launchpad::deploy::dispatcher::Dispatcher;
use launchpad::deploy::fsm::DeploymentStatus;
use launchpad::errors::PlatformError;
use launchpad::http::client::HttpClient;
use launchpad::runner::HttpTaskRunner;
use secrecy::SecretString;

use crate::support::{Harness, RecordingRunner};

#[tokio::test]
async fn test_dispatch_success_keeps_queued() {
    let harness = Harness::new();
    let runner = Arc::new(RecordingRunner::new());
    let dispatcher = Dispatcher::new(runner.clone(), harness.registry.clone());

    let project = harness.project("docs").await;
    let deployment = harness.registry.create(&project.id).await.unwrap();

    tokio_test::assert_ok!(dispatcher.dispatch(&deployment, &project).await);

    let jobs = runner.jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].deployment_id, deployment.id);
    assert_eq!(jobs[0].project_id, project.id);
    assert_eq!(jobs[0].repo_url, project.repo_url);
    assert_eq!(jobs[0].framework, "NEXT");
    assert_eq!(
        harness.registry.get(&deployment.id).await.unwrap().status,
        DeploymentStatus::Queued
    );
}

#[tokio::test]
async fn test_dispatch_failure_marks_failed() {
    let harness = Harness::new();
    let dispatcher = Dispatcher::new(Arc::new(RecordingRunner::failing()), harness.registry.clone());

    let project = harness.project("docs").await;
    let deployment = harness.registry.create(&project.id).await.unwrap();

    let err = dispatcher.dispatch(&deployment, &project).await.unwrap_err();
    assert!(matches!(err, PlatformError::DispatchFailure(_)));
    assert_eq!(
        harness.registry.get(&deployment.id).await.unwrap().status,
        DeploymentStatus::Failed
    );
}

#[tokio::test]
async fn test_dispatch_failure_of_unknown_deployment_reports_both() {
    let harness = Harness::new();
    let dispatcher = Dispatcher::new(Arc::new(RecordingRunner::failing()), harness.registry.clone());

    let project = harness.project("docs").await;
    let mut deployment = harness.registry.create(&project.id).await.unwrap();
    deployment.id = "ghost".to_string();

    let err = dispatcher.dispatch(&deployment, &project).await.unwrap_err();
    let PlatformError::DispatchFailure(message) = err else {
        panic!("expected a dispatch failure");
    };
    assert!(message.contains("runner unavailable"));
    assert!(message.contains("marking failed also failed"));
}

#[tokio::test]
async fn test_http_runner_posts_job() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/jobs"))
        .and(header("authorization", "Bearer runner-token"))
        .respond_with(ResponseTemplate::new(202).set_body_json(serde_json::json!({"jobId": "j1"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpClient::new(&server.uri(), std::time::Duration::from_secs(5))
        .unwrap()
        .with_bearer_token(SecretString::from("runner-token".to_string()));
    let harness = Harness::new();
    let dispatcher = Dispatcher::new(Arc::new(HttpTaskRunner::new(client)), harness.registry.clone());

    let project = harness.project("docs").await;
    let deployment = harness.registry.create(&project.id).await.unwrap();
    dispatcher.dispatch(&deployment, &project).await.unwrap();

    assert_eq!(
        harness.registry.get(&deployment.id).await.unwrap().status,
        DeploymentStatus::Queued
    );
}

#[tokio::test]
async fn test_http_runner_rejection_fails_deployment() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/jobs"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = HttpClient::new(&server.uri(), std::time::Duration::from_secs(5)).unwrap();
    let harness = Harness::new();
    let dispatcher = Dispatcher::new(Arc::new(HttpTaskRunner::new(client)), harness.registry.clone());

    let project = harness.project("docs").await;
    let deployment = harness.registry.create(&project.id).await.unwrap();

    assert!(dispatcher.dispatch(&deployment, &project).await.is_err());
    assert_eq!(
        harness.registry.get(&deployment.id).await.unwrap().status,
        DeploymentStatus::Failed
    );
}

#[tokio::test]
async fn test_http_runner_accepts_any_success_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/jobs"))
        .respond_with(ResponseTemplate::new(202).set_body_string("accepted"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/jobs"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"jobId": 42})))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpClient::new(&server.uri(), std::time::Duration::from_secs(5)).unwrap();
    let harness = Harness::new();
    let dispatcher = Dispatcher::new(Arc::new(HttpTaskRunner::new(client)), harness.registry.clone());

    let project = harness.project("docs").await;
    // plain-text acknowledgement, then a numeric job id
    for _ in 0..2 {
        let deployment = harness.registry.create(&project.id).await.unwrap();
        tokio_test::assert_ok!(dispatcher.dispatch(&deployment, &project).await);
        assert_eq!(
            harness.registry.get(&deployment.id).await.unwrap().status,
            DeploymentStatus::Queued
        );
    }
}
