use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{StatusCode, header},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use relay_core::{EnqueueOutcome, EnqueueService, Job, JobStatus, QueueError, QueueStore};
use relay_worker::{DrainReport, Scheduler};

use crate::auth::ApiAuth;
use crate::metrics;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn QueueStore>,
    pub enqueue: EnqueueService,
    pub scheduler: Arc<Scheduler>,
}

/// Chat ids arrive as numbers from some bridges and as strings from others.
#[derive(Debug, serde::Deserialize)]
#[serde(untagged)]
pub enum Origin {
    Text(String),
    Number(i64),
}

impl From<Origin> for String {
    fn from(origin: Origin) -> Self {
        match origin {
            Origin::Text(s) => s,
            Origin::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, serde::Deserialize)]
pub struct SubmitRequest {
    pub text: String,
    pub origin: Origin,
}

#[derive(Debug, serde::Serialize)]
pub struct SubmitResponse {
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub message: String,
}

#[derive(Debug, serde::Deserialize)]
pub struct JobsQuery {
    pub status: Option<JobStatus>,
}

#[derive(Debug, serde::Serialize)]
pub struct JobsResponse {
    pub jobs: Vec<Job>,
}

async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        metrics::gather(),
    )
}

type ApiState = (AppState, ApiAuth);

pub fn build_app(state: AppState, api_auth: ApiAuth) -> Router {
    let unauthenticated = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/metrics", get(metrics_handler));

    let api_state: ApiState = (state, api_auth);
    let api = Router::new()
        .route("/v1/requests", post(submit))
        .route("/v1/jobs", get(list_jobs))
        .route("/v1/admin/drain", post(drain_now))
        .route_layer(middleware::from_fn_with_state(
            api_state.clone(),
            api_auth_middleware,
        ))
        .with_state(api_state);

    Router::new().merge(unauthenticated).merge(api)
}

async fn api_auth_middleware(
    State((_state, auth)): State<ApiState>,
    req: axum::http::Request<axum::body::Body>,
    next: middleware::Next,
) -> Result<axum::response::Response, StatusCode> {
    if auth.allows(req.headers()) {
        Ok(next.run(req).await)
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

/// Extract an id from free text and queue it for delivery.
async fn submit(
    State((state, _auth)): State<ApiState>,
    Json(req): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<SubmitResponse>), (StatusCode, String)> {
    let origin: String = req.origin.into();
    tracing::info!(origin = %origin, text = %req.text, "request received");

    let outcome = state
        .enqueue
        .submit(&req.text, &origin)
        .await
        .map_err(map_err)?;
    let message = outcome.notice().to_string();

    let (status, label, id) = match outcome {
        EnqueueOutcome::Queued(job) => (StatusCode::ACCEPTED, "queued", Some(job.id)),
        EnqueueOutcome::AlreadyQueued(id) => (StatusCode::OK, "already_queued", Some(id)),
        EnqueueOutcome::Invalid => (StatusCode::UNPROCESSABLE_ENTITY, "invalid", None),
    };
    metrics::REQUESTS.with_label_values(&[label]).inc();

    Ok((
        status,
        Json(SubmitResponse {
            outcome: label,
            id,
            message,
        }),
    ))
}

/// Every record in the log, optionally filtered by status.
async fn list_jobs(
    State((state, _auth)): State<ApiState>,
    Query(q): Query<JobsQuery>,
) -> Result<Json<JobsResponse>, (StatusCode, String)> {
    let mut jobs = state.store.read_all().await.map_err(map_err)?;
    if let Some(status) = q.status {
        jobs.retain(|j| j.status == status);
    }
    Ok(Json(JobsResponse { jobs }))
}

/// Run one drain cycle now. 409 while another cycle is running.
async fn drain_now(
    State((state, _auth)): State<ApiState>,
) -> Result<Json<DrainReport>, (StatusCode, String)> {
    match state.scheduler.tick().await.map_err(map_err)? {
        Some(report) => {
            metrics::record_drain(&report);
            Ok(Json(report))
        }
        None => Err((
            StatusCode::CONFLICT,
            "drain cycle already running".to_string(),
        )),
    }
}

fn map_err(e: QueueError) -> (StatusCode, String) {
    tracing::error!(error = %e, "queue store failure");
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}
