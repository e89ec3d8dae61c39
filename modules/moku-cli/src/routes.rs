//! REST surface for projects, websites, and jobs: one handler per route, a
//! `State<Arc<AppState>>` extractor, `Json<T>` in and out.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use futures::stream::Stream;
use moku_core::JobId;
use moku_orchestrator::Job;
use serde::Deserialize;
use std::str::FromStr;
use tracing::warn;

use crate::error::ApiError;
use crate::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/projects", get(list_projects).post(create_project))
        .route("/projects/{project}", get(get_project))
        .route(
            "/projects/{project}/websites",
            get(list_websites).post(create_website),
        )
        .route(
            "/projects/{project}/websites/{website}/fetch-jobs",
            post(start_fetch_job),
        )
        .route(
            "/projects/{project}/websites/{website}/enumerate-jobs",
            post(start_enumerate_job),
        )
        .route("/jobs", get(list_jobs))
        .route("/jobs/{id}", get(get_job))
        .route("/jobs/{id}/cancel", post(cancel_job))
        .route("/jobs/{id}/events", get(job_events))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Deserialize)]
struct CreateProjectRequest {
    slug: String,
    name: String,
    #[serde(default)]
    description: String,
}

async fn list_projects(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let projects = state.registry.list_projects().await?;
    Ok(Json(projects))
}

async fn create_project(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateProjectRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let project = state
        .registry
        .create_project(&req.slug, &req.name, &req.description)
        .await?;
    Ok((StatusCode::CREATED, Json(project)))
}

async fn get_project(
    State(state): State<Arc<AppState>>,
    Path(project): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let project = state
        .registry
        .get_project_by_slug(&project)
        .await?
        .ok_or_else(|| moku_registry::RegistryError::NotFound(format!("project {project}")))?;
    Ok(Json(project))
}

#[derive(Deserialize)]
struct CreateWebsiteRequest {
    slug: String,
    origin: String,
}

async fn list_websites(
    State(state): State<Arc<AppState>>,
    Path(project): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let project = state
        .registry
        .get_project_by_slug(&project)
        .await?
        .ok_or_else(|| moku_registry::RegistryError::NotFound(format!("project {project}")))?;
    let websites = state.registry.list_websites(project.id).await?;
    Ok(Json(websites))
}

async fn create_website(
    State(state): State<Arc<AppState>>,
    Path(project): Path<String>,
    Json(req): Json<CreateWebsiteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let project = state
        .registry
        .get_project_by_slug(&project)
        .await?
        .ok_or_else(|| moku_registry::RegistryError::NotFound(format!("project {project}")))?;
    let website = state
        .registry
        .create_website(project.id, &req.slug, &req.origin)
        .await?;
    Ok((StatusCode::CREATED, Json(website)))
}

#[derive(Deserialize)]
struct StartFetchRequest {
    #[serde(default = "default_status")]
    status: String,
    limit: Option<usize>,
}

fn default_status() -> String {
    "new".to_string()
}

async fn start_fetch_job(
    State(state): State<Arc<AppState>>,
    Path((project, website)): Path<(String, String)>,
    Json(req): Json<StartFetchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state
        .orchestrator
        .start_fetch_job(&project, &website, &req.status, req.limit)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(job)))
}

#[derive(Deserialize)]
struct StartEnumerateRequest {
    #[serde(default = "default_concurrency")]
    concurrency: usize,
}

fn default_concurrency() -> usize {
    4
}

async fn start_enumerate_job(
    State(state): State<Arc<AppState>>,
    Path((project, website)): Path<(String, String)>,
    Json(req): Json<StartEnumerateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state
        .orchestrator
        .start_enumerate_job(&project, &website, req.concurrency)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(job)))
}

async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<Vec<Job>> {
    Json(state.orchestrator.list_jobs().await)
}

fn parse_job_id(raw: &str) -> Result<JobId, ApiError> {
    JobId::from_str(raw)
        .map_err(|_| moku_orchestrator::OrchestratorError::Validation(format!("invalid job id: {raw}")).into())
}

async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    let job_id = parse_job_id(&id)?;
    let job = state
        .orchestrator
        .get_job(job_id)
        .await
        .ok_or_else(|| moku_orchestrator::OrchestratorError::NotFound(format!("job {id}")))?;
    Ok(Json(job))
}

async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let job_id = parse_job_id(&id)?;
    state.orchestrator.cancel_job(job_id);
    Ok(StatusCode::NO_CONTENT)
}

/// Streams a job's events as server-sent events until it closes or the job
/// reaches a terminal state (`JobEvent`). Only the first subscriber
/// gets a stream; later calls 404 (orchestrator `subscribe` semantics).
async fn job_events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let job_id = parse_job_id(&id)?;
    let rx = state
        .orchestrator
        .subscribe(job_id)
        .ok_or_else(|| moku_orchestrator::OrchestratorError::NotFound(format!("job {id} has no active subscription")))?;

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| {
            let data = serde_json::to_string(&event).unwrap_or_else(|e| {
                warn!(error = %e, "failed to serialize job event");
                "{}".to_string()
            });
            (Ok(Event::default().data(data)), rx)
        })
    });

    Ok(Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_job_id_accepts_a_valid_uuid() {
        let id = JobId::new();
        let parsed = parse_job_id(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn parse_job_id_rejects_garbage() {
        let err = parse_job_id("not-a-uuid");
        assert!(err.is_err());
    }

    #[test]
    fn default_status_and_concurrency_match_documented_defaults() {
        assert_eq!(default_status(), "new");
        assert_eq!(default_concurrency(), 4);
    }
}
