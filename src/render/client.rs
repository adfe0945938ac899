use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::composition::types::Edit;
use crate::config::{seconds, RenderConfig};
use crate::error::{Result, SubmissionError};
use crate::render::types::{StatusUpdate, WebhookStatus};

/// External asynchronous renderer
pub trait RenderBackend: Send + Sync + 'static {
    /// Queue an edit for rendering and return the backend's job id
    fn submit(&self, edit: &Edit) -> impl Future<Output = Result<String>> + Send;

    /// Current status of a queued job
    fn status(&self, external_id: &str) -> impl Future<Output = Result<StatusUpdate>> + Send;
}

/// Render API client: `POST {endpoint}/render`, `GET {endpoint}/render/{id}`
#[derive(Clone)]
pub struct HttpRenderBackend {
    client: reqwest::Client,
    config: RenderConfig,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    response: Option<SubmitBody>,
}

#[derive(Debug, Deserialize)]
struct SubmitBody {
    // Rejections come back with an empty `response` object
    #[serde(default)]
    id: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    response: StatusBody,
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    id: String,
    status: WebhookStatus,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(rename = "renderTime", default)]
    render_time: Option<f64>,
    #[serde(default)]
    data: Option<Value>,
}

impl HttpRenderBackend {
    pub fn new(config: RenderConfig, client: reqwest::Client) -> Self {
        Self { client, config }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.endpoint.trim_end_matches('/'), path)
    }

    fn timeout(&self) -> Duration {
        seconds(self.config.request_timeout_sec)
    }

    fn transport_error(&self, e: reqwest::Error) -> SubmissionError {
        if e.is_timeout() {
            SubmissionError::Timeout { seconds: self.config.request_timeout_sec }
        } else {
            SubmissionError::Transport { reason: e.to_string() }
        }
    }
}

impl RenderBackend for HttpRenderBackend {
    async fn submit(&self, edit: &Edit) -> Result<String> {
        let mut body = serde_json::to_value(edit).map_err(|e| SubmissionError::MalformedResponse {
            reason: format!("edit could not be encoded: {}", e),
        })?;
        if let (Some(callback), Some(object)) = (&self.config.callback_url, body.as_object_mut()) {
            object.insert("callback".to_string(), Value::String(callback.clone()));
        }

        let response = self
            .client
            .post(self.url("render"))
            .header("x-api-key", &self.config.api_key)
            .timeout(self.timeout())
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| self.transport_error(e))?;
        let parsed: Option<SubmitResponse> = serde_json::from_str(&text).ok();

        if !status.is_success() {
            let message = parsed
                .and_then(|p| p.message)
                .unwrap_or_else(|| text.chars().take(200).collect());
            return Err(SubmissionError::Rejected { status: status.as_u16(), message }.into());
        }

        let parsed = parsed.ok_or_else(|| SubmissionError::MalformedResponse {
            reason: "response body is not valid JSON".to_string(),
        })?;

        if !parsed.success {
            return Err(SubmissionError::Rejected {
                status: status.as_u16(),
                message: parsed.message.unwrap_or_else(|| "renderer reported failure".to_string()),
            }.into());
        }

        let id = parsed
            .response
            .map(|r| r.id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SubmissionError::MalformedResponse {
                reason: "response carries no job id".to_string(),
            })?;

        tracing::debug!("Renderer accepted job {}", id);
        Ok(id)
    }

    async fn status(&self, external_id: &str) -> Result<StatusUpdate> {
        let response = self
            .client
            .get(self.url(&format!("render/{}", external_id)))
            .header("x-api-key", &self.config.api_key)
            .timeout(self.timeout())
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SubmissionError::Rejected { status: status.as_u16(), message }.into());
        }

        let parsed: StatusResponse = response.json().await.map_err(|e| SubmissionError::MalformedResponse {
            reason: e.to_string(),
        })?;
        let body = parsed.response;

        let render_status = body.status.render_status().ok_or_else(|| SubmissionError::MalformedResponse {
            reason: format!("unrecognized status '{}'", String::from(body.status.clone())),
        })?;

        Ok(StatusUpdate {
            external_id: body.id,
            status: render_status,
            url: body.url,
            error: body.error,
            duration: body.duration,
            render_time: body.render_time,
            data: body.data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::types::{Asset, Clip, Output, OutputFormat, Timeline, Track};
    use crate::error::CompositorError;
    use crate::render::types::RenderStatus;
    use axum::{
        extract::Path,
        http::{HeaderMap, StatusCode},
        routing::{get, post},
        Json, Router,
    };
    use serde_json::json;

    fn edit() -> Edit {
        Edit {
            timeline: Timeline {
                tracks: vec![Track {
                    clips: vec![Clip {
                        asset: Asset::Image { src: "https://cdn.example.com/a.jpg".into() },
                        start: 0.0,
                        length: 2.0,
                        transition: None,
                        alias: None,
                    }],
                }],
            },
            output: Output { format: Some(OutputFormat::Mp4), ..Default::default() },
        }
    }

    async fn backend_for(app: Router) -> HttpRenderBackend {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let config = RenderConfig {
            endpoint: format!("http://{}/v1/", addr),
            api_key: "key-123".into(),
            callback_url: Some("https://hooks.example.com/render".into()),
            request_timeout_sec: 2.0,
            ..Default::default()
        };
        HttpRenderBackend::new(config, reqwest::Client::new())
    }

    #[tokio::test]
    async fn test_submit_returns_external_id() {
        let app = Router::new().route(
            "/v1/render",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(headers.get("x-api-key").unwrap(), "key-123");
                assert_eq!(body["callback"], "https://hooks.example.com/render");
                assert_eq!(body["output"]["format"], "mp4");
                (
                    StatusCode::CREATED,
                    Json(json!({ "success": true, "message": "Created", "response": { "id": "ext-42" } })),
                )
            }),
        );
        let backend = backend_for(app).await;

        assert_eq!(backend.submit(&edit()).await.unwrap(), "ext-42");
    }

    #[tokio::test]
    async fn test_submit_rejection() {
        let app = Router::new().route(
            "/v1/render",
            post(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "success": false, "message": "Bad Request", "response": {} })),
                )
            }),
        );
        let backend = backend_for(app).await;

        match backend.submit(&edit()).await {
            Err(CompositorError::Submission(SubmissionError::Rejected { status, message })) => {
                assert_eq!(status, 400);
                assert_eq!(message, "Bad Request");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_submit_failure_with_empty_response_body() {
        let app = Router::new().route(
            "/v1/render",
            post(|| async { Json(json!({ "success": false, "message": "Quota exceeded", "response": {} })) }),
        );
        let backend = backend_for(app).await;

        match backend.submit(&edit()).await {
            Err(CompositorError::Submission(SubmissionError::Rejected { status, message })) => {
                assert_eq!(status, 200);
                assert_eq!(message, "Quota exceeded");
            }
            other => panic!("unexpected {:?}", other),
        }

        let app = Router::new().route(
            "/v1/render",
            post(|| async { Json(json!({ "success": true, "response": {} })) }),
        );
        let backend = backend_for(app).await;
        assert!(matches!(
            backend.submit(&edit()).await,
            Err(CompositorError::Submission(SubmissionError::MalformedResponse { .. }))
        ));
    }

    #[tokio::test]
    async fn test_submit_timeout() {
        let app = Router::new().route(
            "/v1/render",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                StatusCode::OK
            }),
        );
        let backend = backend_for(app).await;

        assert!(matches!(
            backend.submit(&edit()).await,
            Err(CompositorError::Submission(SubmissionError::Timeout { .. }))
        ));
    }

    #[tokio::test]
    async fn test_status_poll() {
        let app = Router::new().route(
            "/v1/render/:id",
            get(|Path(id): Path<String>| async move {
                Json(json!({
                    "success": true,
                    "response": {
                        "id": id,
                        "status": "done",
                        "url": "https://cdn.example.com/out.mp4",
                        "duration": 30.0,
                        "renderTime": 5120.0
                    }
                }))
            }),
        );
        let backend = backend_for(app).await;

        let update = backend.status("ext-7").await.unwrap();
        assert_eq!(update.external_id, "ext-7");
        assert_eq!(update.status, RenderStatus::Done);
        assert_eq!(update.url.as_deref(), Some("https://cdn.example.com/out.mp4"));
        assert_eq!(update.render_time, Some(5120.0));
    }
}
