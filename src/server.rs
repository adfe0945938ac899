//! HTTP surface: render webhooks, asset probing, render submission and job status.

use std::future::Future;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::{
    composition::types::Edit,
    error::{CompositorError, ProbeError, SubmissionError, WebhookError},
    probe::{MetadataProber, ProbeOutput},
    render::{signature::SIGNATURE_HEADER, JobRepository, RenderBackend, RenderJob, RenderOrchestrator, RenderStatus},
};

/// Shared handler state
pub struct AppState<B, R> {
    pub orchestrator: RenderOrchestrator<B, R>,
    pub prober: MetadataProber,
}

impl<B, R> Clone for AppState<B, R> {
    fn clone(&self) -> Self {
        Self {
            orchestrator: self.orchestrator.clone(),
            prober: self.prober.clone(),
        }
    }
}

/// JSON error body `{"error": {"kind", "message"}}`
pub struct ApiError(CompositorError);

impl From<CompositorError> for ApiError {
    fn from(error: CompositorError) -> Self {
        Self(error)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            CompositorError::Validation(_) | CompositorError::Analysis(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CompositorError::Probe(e) => match e {
                ProbeError::NotFound { .. } => StatusCode::NOT_FOUND,
                ProbeError::Forbidden { .. } => StatusCode::FORBIDDEN,
                ProbeError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                ProbeError::Unknown { .. } => StatusCode::BAD_GATEWAY,
            },
            CompositorError::Submission(SubmissionError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            CompositorError::Submission(_) => StatusCode::BAD_GATEWAY,
            CompositorError::Webhook(e) => match e {
                WebhookError::Malformed { .. } => StatusCode::BAD_REQUEST,
                WebhookError::InvalidSignature => StatusCode::UNAUTHORIZED,
                WebhookError::UnknownStatus { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                WebhookError::UnknownJob { .. } => StatusCode::NOT_FOUND,
            },
            CompositorError::StateConflict { .. } => StatusCode::CONFLICT,
            CompositorError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            CompositorError::JobNotFound { .. } => StatusCode::NOT_FOUND,
            CompositorError::Config(_) | CompositorError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        } else {
            tracing::debug!("Request rejected: {}", self.0);
        }

        let mut error = json!({
            "kind": self.0.kind(),
            "message": self.0.to_string(),
        });
        if let CompositorError::Probe(probe) = &self.0 {
            error["reason"] = json!(probe.kind());
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct ProbeRequest {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct RenderRequest {
    pub owner_id: String,
    pub edit: Edit,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RenderAccepted {
    pub job_id: Uuid,
    pub external_id: String,
    pub status: RenderStatus,
}

pub fn router<B: RenderBackend, R: JobRepository>(state: AppState<B, R>) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/webhooks/render", post(render_webhook::<B, R>))
        .route("/probe", post(probe::<B, R>))
        .route("/renders", post(submit_render::<B, R>))
        .route("/jobs/:id", get(get_job::<B, R>))
        .route("/jobs/:id/cancel", post(cancel_job::<B, R>))
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn serve<B, R, F>(listener: tokio::net::TcpListener, state: AppState<B, R>, shutdown: F) -> std::io::Result<()>
where
    B: RenderBackend,
    R: JobRepository,
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("🌐 Listening on http://{}", addr);
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn render_webhook<B: RenderBackend, R: JobRepository>(
    State(state): State<AppState<B, R>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    let outcome = state.orchestrator.on_webhook_body(&body, signature).await?;

    Ok(Json(json!({
        "outcome": outcome.label(),
        "job_id": outcome.job().map(|job| job.id),
        "status": outcome.job().map(|job| job.status),
    })))
}

async fn probe<B: RenderBackend, R: JobRepository>(
    State(state): State<AppState<B, R>>,
    Json(request): Json<ProbeRequest>,
) -> Result<Json<ProbeOutput>, ApiError> {
    let output = state.prober.probe(&request.url).await.map_err(CompositorError::from)?;
    Ok(Json(output))
}

async fn submit_render<B: RenderBackend, R: JobRepository>(
    State(state): State<AppState<B, R>>,
    Json(request): Json<RenderRequest>,
) -> Result<(StatusCode, Json<RenderAccepted>), ApiError> {
    let job = state.orchestrator.submit(&request.owner_id, request.edit).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(RenderAccepted {
            job_id: job.id,
            external_id: job.external_id,
            status: job.status,
        }),
    ))
}

async fn get_job<B: RenderBackend, R: JobRepository>(
    State(state): State<AppState<B, R>>,
    Path(id): Path<String>,
) -> Result<Json<RenderJob>, ApiError> {
    Ok(Json(state.orchestrator.get_job(parse_job_id(&id)?).await?))
}

async fn cancel_job<B: RenderBackend, R: JobRepository>(
    State(state): State<AppState<B, R>>,
    Path(id): Path<String>,
) -> Result<Json<RenderJob>, ApiError> {
    Ok(Json(state.orchestrator.cancel(parse_job_id(&id)?).await?))
}

fn parse_job_id(id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(id).map_err(|_| CompositorError::validation("id", "not a valid job id").into())
}
