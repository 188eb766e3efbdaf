use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::models::{
    ErrorBody, HealthResponse, OutputFormat, RenderRequest, RenderUrlResponse,
};
use crate::jobs::error_codes::suggested_action;
use crate::jobs::{
    AdmissionController, ErrorKind, Job, JobError, JobRegistry, JobStatus, QueueStatus, Scheduler,
};
use crate::render::files::{delete_temp_file, resolve_in_dir};
use crate::render::{VideoRenderer, WeatherParser};

pub mod models;
pub mod validation;

/// How long a `url`-mode video is advertised as available.
pub const VIDEO_URL_TTL_SECS: i64 = 60 * 60;

#[derive(Clone)]
pub struct ApiState {
    pub registry: JobRegistry,
    pub scheduler: Scheduler,
    pub admission: AdmissionController,
    pub parser: Arc<dyn WeatherParser>,
    pub renderer: Arc<dyn VideoRenderer>,
    pub temp_dir: PathBuf,
    pub started_at: Instant,
}

impl ApiState {
    pub fn new(
        admission: AdmissionController,
        parser: Arc<dyn WeatherParser>,
        renderer: Arc<dyn VideoRenderer>,
        temp_dir: PathBuf,
    ) -> Self {
        let scheduler = admission.scheduler().clone();
        Self {
            registry: scheduler.registry().clone(),
            scheduler,
            admission,
            parser,
            renderer,
            temp_dir,
            started_at: Instant::now(),
        }
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/render", post(render_video))
        .route("/videos/:file", get(serve_video))
        // Inspect
        .route("/jobs", get(list_jobs))
        .route("/jobs/:id", get(get_job))
        .route("/queue", get(queue_status))
        // Metrics
        .route("/metrics/prom", get(metrics_prom))
        // Health
        .route("/health", get(health))
        .with_state(state)
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn err_body(status: StatusCode, msg: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: msg.into(),
            kind: None,
            suggested_action: None,
        }),
    )
}

fn internal_err(e: anyhow::Error) -> ApiError {
    err_body(
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("internal error: {e}"),
    )
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::AdmissionRejected => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::TaskTimeout => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::UnknownJob => StatusCode::NOT_FOUND,
        ErrorKind::AlreadySubmitted => StatusCode::CONFLICT,
        ErrorKind::TaskFailure | ErrorKind::InvalidTransition => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn job_err(e: JobError) -> ApiError {
    let kind = e.kind();
    (
        status_for(kind),
        Json(ErrorBody {
            error: e.to_string(),
            kind: Some(kind.as_str().to_string()),
            suggested_action: Some(suggested_action(kind).to_string()),
        }),
    )
}

pub async fn render_video(
    State(state): State<ApiState>,
    Json(body): Json<RenderRequest>,
) -> Result<Response, ApiError> {
    let started = Instant::now();

    let req = validation::validate_render_request(body)
        .map_err(|msg| err_body(StatusCode::BAD_REQUEST, msg))?;

    tracing::info!(
        text_len = req.text.chars().count(),
        output_format = ?req.output_format,
        "render request received"
    );

    let data = state
        .parser
        .parse(&req.text)
        .await
        .map_err(|e| internal_err(e.context("could not parse weather text")))?;

    let admission = state.admission.admit().map_err(job_err)?;
    let job_id = admission.job().id;

    let renderer = state.renderer.clone();
    let options = req.options.clone();
    let output = admission
        .submit(move || async move {
            let path = renderer.render(&data, &options).await?;
            Ok::<_, anyhow::Error>(path.display().to_string())
        })
        .await
        .map_err(|e| {
            tracing::error!(
                job_id = %job_id,
                error = %e,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "render request failed"
            );
            job_err(e)
        })?;

    let path = PathBuf::from(output);
    if tokio::fs::metadata(&path).await.is_err() {
        tracing::error!(job_id = %job_id, path = %path.display(), "rendered file not found");
        return Err(err_body(
            StatusCode::INTERNAL_SERVER_ERROR,
            "rendered video is missing",
        ));
    }

    let processing_ms = started.elapsed().as_millis() as u64;
    tracing::info!(job_id = %job_id, path = %path.display(), processing_ms, "render request done");

    match req.output_format {
        OutputFormat::Url => {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| internal_err(anyhow::anyhow!("bad output path {}", path.display())))?;
            Ok(Json(RenderUrlResponse {
                video_url: format!("/videos/{name}"),
                expires_at: Utc::now() + chrono::Duration::seconds(VIDEO_URL_TTL_SECS),
                job_id,
            })
            .into_response())
        }
        OutputFormat::Stream => {
            let bytes = tokio::fs::read(&path).await;
            if let Err(e) = delete_temp_file(&path).await {
                tracing::warn!(job_id = %job_id, error = %e, "could not delete streamed video");
            }
            let bytes = bytes.map_err(|e| internal_err(e.into()))?;

            Ok((
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "video/mp4".to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        r#"inline; filename="weather-video.mp4""#.to_string(),
                    ),
                    (HeaderName::from_static("x-job-id"), job_id.to_string()),
                    (
                        HeaderName::from_static("x-processing-time"),
                        processing_ms.to_string(),
                    ),
                ],
                bytes,
            )
                .into_response())
        }
    }
}

pub async fn serve_video(
    State(state): State<ApiState>,
    Path(file): Path<String>,
) -> Result<Response, ApiError> {
    let not_found = || err_body(StatusCode::NOT_FOUND, "video not found");

    let path = resolve_in_dir(&state.temp_dir, &file).ok_or_else(not_found)?;
    let bytes = match tokio::fs::read(&path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
        Err(e) => return Err(internal_err(e.into())),
    };

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "video/mp4")],
        bytes,
    )
        .into_response())
}

pub async fn get_job(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Job>, ApiError> {
    state
        .registry
        .get(id)
        .map(Json)
        .ok_or_else(|| job_err(JobError::UnknownJob(id)))
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    pub items: Vec<Job>,
    pub total: usize,
}

/// Newest first.
pub async fn list_jobs(
    State(state): State<ApiState>,
    Query(q): Query<ListJobsQuery>,
) -> Result<Json<ListJobsResponse>, ApiError> {
    let status = match q.status.as_deref() {
        None => None,
        Some(s) => Some(JobStatus::from_str(s).ok_or_else(|| {
            err_body(StatusCode::BAD_REQUEST, format!("unknown status: {s}"))
        })?),
    };

    let mut items: Vec<Job> = state
        .registry
        .list()
        .into_iter()
        .filter(|j| status.map_or(true, |s| j.status == s))
        .collect();
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let total = items.len();
    items.truncate(q.limit.unwrap_or(100).clamp(1, 1000));

    Ok(Json(ListJobsResponse { items, total }))
}

pub async fn queue_status(State(state): State<ApiState>) -> Json<QueueStatus> {
    Json(QueueStatus::collect(&state.scheduler, &state.admission))
}

pub async fn metrics_prom(State(state): State<ApiState>) -> Response {
    let body = QueueStatus::collect(&state.scheduler, &state.admission).to_prometheus();
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response()
}

pub async fn health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}
