//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use openapi_server::models::{
    ApiResponse, CreateProjectRequest, DeployData, DeployRequest, DeploymentData,
    DeploymentListData, HealthResponse, LogsData, LogsQuery, ProjectCheckData, ProjectData,
    PublishEventsData, PublishEventsRequest, ResolveResponse, VersionResponse,
};
use serde::Deserialize;
use tracing::{info, warn};

use crate::errors::PlatformError;
use crate::ingest;
use crate::models::project::{Framework, NewProject};
use crate::server::state::ServerState;
use crate::utils::version_info;

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, PlatformError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| PlatformError::ValidationError(rejection.body_text()))
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "launchpad".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

// ================================ PROJECTS ================================= //

/// `POST /project`
pub async fn create_project_handler(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<CreateProjectRequest>, JsonRejection>,
) -> Result<impl IntoResponse, PlatformError> {
    let request = json_body(payload)?;

    let framework = match request.framework.as_deref() {
        None | Some("") => Framework::default(),
        Some(raw) => raw.parse().map_err(PlatformError::ValidationError)?,
    };

    let project = state
        .registry
        .create_project(NewProject {
            name: request.name,
            repo_url: request.git_repo_url,
            framework,
            custom_domain: request.custom_domain.filter(|d| !d.is_empty()),
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(ProjectData {
            project: project.to_view(),
        })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct CheckQuery {
    pub name: String,
}

/// `GET /project/check?name=`
pub async fn check_project_handler(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<CheckQuery>,
) -> Result<impl IntoResponse, PlatformError> {
    let project = state.registry.find_project_by_name(&query.name).await?;
    Ok(Json(ApiResponse::success(ProjectCheckData {
        exists: project.is_some(),
        project: project.map(|p| p.to_view()),
    })))
}

/// `GET /project/{id}`
pub async fn get_project_handler(
    State(state): State<Arc<ServerState>>,
    Path(project_id): Path<String>,
) -> Result<impl IntoResponse, PlatformError> {
    let project = state.registry.get_project(&project_id).await?;
    Ok(Json(ApiResponse::success(ProjectData {
        project: project.to_view(),
    })))
}

/// `GET /project/{id}/deployments`, newest first
pub async fn list_deployments_handler(
    State(state): State<Arc<ServerState>>,
    Path(project_id): Path<String>,
) -> Result<impl IntoResponse, PlatformError> {
    let deployments = state.registry.list_by_project(&project_id).await?;
    Ok(Json(ApiResponse::success(DeploymentListData {
        deployments: deployments.iter().map(|d| d.to_view()).collect(),
    })))
}

// =============================== DEPLOYMENTS =============================== //

/// `POST /deploy`: create a deployment and dispatch its build
pub async fn deploy_handler(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<DeployRequest>, JsonRejection>,
) -> Result<impl IntoResponse, PlatformError> {
    let request = json_body(payload)?;

    let project = state.registry.get_project(&request.project_id).await?;
    let deployment = state.registry.create(&project.id).await?;
    state.dispatcher.dispatch(&deployment, &project).await?;

    info!("Deployment {} accepted for project {}", deployment.id, project.id);
    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::success(DeployData {
            deployment_url: state.deployment_url(&deployment.id),
            deployment_id: deployment.id,
        })),
    ))
}

/// `GET /deployment/{id}`
pub async fn get_deployment_handler(
    State(state): State<Arc<ServerState>>,
    Path(deployment_id): Path<String>,
) -> Result<impl IntoResponse, PlatformError> {
    let deployment = state.registry.get(&deployment_id).await?;
    Ok(Json(ApiResponse::success(DeploymentData {
        deployment: deployment.to_view(),
    })))
}

/// `POST /deployment/{id}/cancel`
pub async fn cancel_deployment_handler(
    State(state): State<Arc<ServerState>>,
    Path(deployment_id): Path<String>,
) -> Result<impl IntoResponse, PlatformError> {
    state.registry.cancel(&deployment_id).await?;
    let deployment = state.registry.get(&deployment_id).await?;
    Ok(Json(ApiResponse::success(DeploymentData {
        deployment: deployment.to_view(),
    })))
}

/// `GET /resolve/{slug}`, read by remote routing proxies
pub async fn resolve_handler(
    State(state): State<Arc<ServerState>>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, PlatformError> {
    let deployment_id = state.registry.resolve_slug(&slug).await?;
    Ok(Json(ResolveResponse { deployment_id }))
}

// ================================== LOGS =================================== //

/// `GET /logs/{id}?since=`
pub async fn logs_handler(
    State(state): State<Arc<ServerState>>,
    Path(deployment_id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Result<impl IntoResponse, PlatformError> {
    state.registry.get(&deployment_id).await?;
    let events = state.log_store.read(&deployment_id, query.since).await?;
    Ok(Json(ApiResponse::success(LogsData {
        logs: events.iter().map(|e| e.to_view()).collect(),
    })))
}

/// `POST /events`: build workers push log lines onto the stream
pub async fn publish_events_handler(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<PublishEventsRequest>, JsonRejection>,
) -> Result<impl IntoResponse, PlatformError> {
    let lines = json_body(payload)?.into_vec();
    if lines.is_empty() {
        warn!("Empty log batch published");
    }

    let event_ids = ingest::publish(state.publisher.as_ref(), lines).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::success(PublishEventsData {
            accepted: event_ids.len(),
        })),
    ))
}
