// crates/renderflow/tests/api.rs
mod common;

use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use common::{admission, api_state, FakeBehavior, FAKE_MP4};
use renderflow::api::models::RenderRequest;
use renderflow::api::{
    get_job, health, list_jobs, metrics_prom, queue_status, render_video, serve_video,
    ListJobsQuery,
};
use renderflow::jobs::JobStatus;
use serde_json::{json, Value};
use uuid::Uuid;

const TEXT: &str = "Mañana en Sevilla soleado con 30 grados y viento del sur a 15 km/h";

fn request(body: Value) -> Json<RenderRequest> {
    Json(serde_json::from_value(body).unwrap())
}

async fn body_bytes(resp: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

#[tokio::test]
async fn url_mode_returns_a_servable_link() {
    let state = api_state(admission(2, 10_000, 10), FakeBehavior::Write);

    let resp = render_video(
        State(state.clone()),
        request(json!({ "text": TEXT, "options": { "outputFormat": "url", "fps": 24 } })),
    )
    .await
    .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    let url = body["videoUrl"].as_str().unwrap();
    assert!(url.starts_with("/videos/render-") && url.ends_with(".mp4"));
    assert!(body["expiresAt"].is_string());

    let job_id: Uuid = body["jobId"].as_str().unwrap().parse().unwrap();
    let job = state.registry.get(job_id).unwrap();
    assert_eq!(job.status, JobStatus::Completed);

    let file = url.trim_start_matches("/videos/").to_string();
    let video = serve_video(State(state.clone()), Path(file)).await.unwrap();
    assert_eq!(video.headers()["content-type"], "video/mp4");
    assert_eq!(body_bytes(video).await, FAKE_MP4);
}

#[tokio::test]
async fn stream_mode_sends_the_file_and_deletes_it() {
    let state = api_state(admission(2, 10_000, 10), FakeBehavior::Write);

    let resp = render_video(State(state.clone()), request(json!({ "text": TEXT })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let headers = resp.headers().clone();
    assert_eq!(headers["content-type"], "video/mp4");
    assert_eq!(
        headers["content-disposition"],
        r#"inline; filename="weather-video.mp4""#
    );
    assert!(headers.contains_key("x-processing-time"));
    let job_id: Uuid = headers["x-job-id"].to_str().unwrap().parse().unwrap();

    assert_eq!(body_bytes(resp).await, FAKE_MP4);

    let job = state.registry.get(job_id).unwrap();
    let path = job.result.expect("completed job keeps its output path");
    assert!(!std::path::Path::new(&path).exists());
}

#[tokio::test]
async fn invalid_requests_are_bad_request() {
    let state = api_state(admission(2, 10_000, 10), FakeBehavior::Write);

    for body in [
        json!({}),
        json!({ "text": "  corto  " }),
        json!({ "text": TEXT, "options": { "quality": 101 } }),
        json!({ "text": TEXT, "options": { "width": 50 } }),
    ] {
        let (status, Json(err)) = render_video(State(state.clone()), request(body))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!err.error.is_empty());
    }
    assert!(state.registry.is_empty());
}

#[tokio::test]
async fn full_queue_is_too_many_requests() {
    let state = api_state(admission(1, 10_000, 1), FakeBehavior::Write);
    let _held = state.admission.admit().unwrap();

    let (status, Json(err)) = render_video(State(state.clone()), request(json!({ "text": TEXT })))
        .await
        .unwrap_err();
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(err.kind.as_deref(), Some("ADMISSION_REJECTED"));
    assert!(err.suggested_action.is_some());
    assert_eq!(state.registry.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn render_timeout_is_service_unavailable() {
    let state = api_state(
        admission(1, 50, 10),
        FakeBehavior::Sleep(Duration::from_secs(10)),
    );

    let (status, Json(err)) = render_video(State(state.clone()), request(json!({ "text": TEXT })))
        .await
        .unwrap_err();
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(err.kind.as_deref(), Some("TASK_TIMEOUT"));
    assert_eq!(state.registry.counts().failed, 1);
    assert_eq!(state.scheduler.load().running, 0);
}

#[tokio::test]
async fn renderer_failure_is_internal_error_with_message() {
    let state = api_state(admission(1, 10_000, 10), FakeBehavior::Fail("composition crashed"));

    let (status, Json(err)) = render_video(State(state.clone()), request(json!({ "text": TEXT })))
        .await
        .unwrap_err();
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(err.kind.as_deref(), Some("TASK_FAILURE"));
    assert!(err.error.contains("composition crashed"));

    let job = state.registry.list().pop().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
}

#[tokio::test]
async fn job_lookup_and_listing() {
    let state = api_state(admission(1, 10_000, 10), FakeBehavior::Fail("nope"));
    let _ = render_video(State(state.clone()), request(json!({ "text": TEXT }))).await;
    let pending = state.registry.create();

    let Json(job) = get_job(State(state.clone()), Path(pending.id)).await.unwrap();
    assert_eq!(job.status, JobStatus::Pending);

    let (status, Json(err)) = get_job(State(state.clone()), Path(Uuid::new_v4()))
        .await
        .unwrap_err();
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(err.kind.as_deref(), Some("UNKNOWN_JOB"));

    let Json(all) = list_jobs(
        State(state.clone()),
        Query(ListJobsQuery { status: None, limit: None }),
    )
    .await
    .unwrap();
    assert_eq!(all.total, 2);
    assert_eq!(all.items[0].id, pending.id, "newest first");

    let Json(failed) = list_jobs(
        State(state.clone()),
        Query(ListJobsQuery { status: Some("failed".into()), limit: None }),
    )
    .await
    .unwrap();
    assert_eq!(failed.total, 1);
    assert_eq!(failed.items[0].status, JobStatus::Failed);

    let (status, _) = list_jobs(
        State(state.clone()),
        Query(ListJobsQuery { status: Some("lost".into()), limit: None }),
    )
    .await
    .unwrap_err();
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn queue_metrics_and_health() {
    let state = api_state(admission(3, 10_000, 7), FakeBehavior::Write);
    let _held = state.admission.admit().unwrap();

    let Json(q) = queue_status(State(state.clone())).await;
    let q = serde_json::to_value(q).unwrap();
    assert_eq!(q["pending"], 1);
    assert_eq!(q["queued"], 1);
    assert_eq!(q["capacity"]["max_concurrency"], 3);
    assert_eq!(q["capacity"]["max_queue_depth"], 7);
    assert_eq!(q["render_timeout_ms"], 10_000);

    let prom = String::from_utf8(body_bytes(metrics_prom(State(state.clone())).await).await).unwrap();
    assert!(prom.contains("renderflow_jobs{status=\"pending\"} 1"));
    assert!(prom.contains("renderflow_max_queue_depth 7"));

    let Json(h) = health(State(state)).await;
    assert_eq!(h.status, "ok");
}

#[tokio::test]
async fn videos_route_rejects_traversal_and_missing_files() {
    let state = api_state(admission(1, 10_000, 10), FakeBehavior::Write);

    for name in ["../Cargo.toml", "missing.mp4"] {
        let (status, _) = serve_video(State(state.clone()), Path(name.to_string()))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

#[test]
fn job_error_kinds_map_to_http_statuses() {
    use renderflow::api::status_for;
    use renderflow::jobs::ErrorKind;

    assert_eq!(status_for(ErrorKind::AdmissionRejected), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(status_for(ErrorKind::TaskTimeout), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(status_for(ErrorKind::UnknownJob), StatusCode::NOT_FOUND);
    assert_eq!(status_for(ErrorKind::AlreadySubmitted), StatusCode::CONFLICT);
    assert_eq!(status_for(ErrorKind::TaskFailure), StatusCode::INTERNAL_SERVER_ERROR);
}
