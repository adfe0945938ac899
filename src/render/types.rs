use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::WebhookError;

/// Lifecycle of a render job
///
/// `Queued -> Fetching -> Rendering -> Done | Failed`. Done and Failed are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderStatus {
    Queued,
    Fetching,
    Rendering,
    Done,
    Failed,
}

impl RenderStatus {
    /// Position in the lifecycle; terminal states share the last rank
    pub fn rank(self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Fetching => 1,
            Self::Rendering => 2,
            Self::Done | Self::Failed => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Fetching => "fetching",
            Self::Rendering => "rendering",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RenderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Render job tracked on behalf of an owner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderJob {
    pub id: Uuid,
    /// Id assigned by the render backend
    pub external_id: String,
    pub owner_id: String,
    pub status: RenderStatus,
    pub result_url: Option<String>,
    pub error_message: Option<String>,
    /// Backend-reported details; keys are added or updated, never removed
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RenderJob {
    pub fn new(owner_id: impl Into<String>, external_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            external_id: external_id.into(),
            owner_id: owner_id.into(),
            status: RenderStatus::Queued,
            result_url: None,
            error_message: None,
            metadata: Map::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a forward transition and its details
    pub(crate) fn apply(&mut self, update: &StatusUpdate) {
        self.status = update.status;
        if let Some(url) = &update.url {
            self.result_url = Some(url.clone());
        }
        if let Some(error) = &update.error {
            self.error_message = Some(error.clone());
        }
        if let Some(duration) = update.duration {
            self.metadata.insert("duration".to_string(), Value::from(duration));
        }
        if let Some(render_time) = update.render_time {
            self.metadata.insert("renderTime".to_string(), Value::from(render_time));
        }
        if let Some(data) = &update.data {
            self.metadata.insert("data".to_string(), data.clone());
        }
        self.updated_at = Utc::now();
    }
}

/// Status reported by the render backend, with an explicit catch-all
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum WebhookStatus {
    Queued,
    Fetching,
    Rendering,
    Done,
    Failed,
    Unknown(String),
}

impl From<String> for WebhookStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "queued" => Self::Queued,
            "fetching" => Self::Fetching,
            "rendering" => Self::Rendering,
            "done" => Self::Done,
            "failed" => Self::Failed,
            _ => Self::Unknown(value),
        }
    }
}

impl From<WebhookStatus> for String {
    fn from(status: WebhookStatus) -> Self {
        match status {
            WebhookStatus::Unknown(raw) => raw,
            known => known.render_status().map(|s| s.as_str().to_string()).unwrap_or_default(),
        }
    }
}

impl WebhookStatus {
    pub fn render_status(&self) -> Option<RenderStatus> {
        match self {
            Self::Queued => Some(RenderStatus::Queued),
            Self::Fetching => Some(RenderStatus::Fetching),
            Self::Rendering => Some(RenderStatus::Rendering),
            Self::Done => Some(RenderStatus::Done),
            Self::Failed => Some(RenderStatus::Failed),
            Self::Unknown(_) => None,
        }
    }
}

/// Body of a render webhook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayload {
    /// External job id
    pub id: String,
    pub status: WebhookStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(rename = "renderTime", default, skip_serializing_if = "Option::is_none")]
    pub render_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl WebhookPayload {
    pub fn into_update(self) -> Result<StatusUpdate, WebhookError> {
        let status = self.status.render_status().ok_or_else(|| WebhookError::UnknownStatus {
            id: self.id.clone(),
            status: String::from(self.status.clone()),
        })?;

        Ok(StatusUpdate {
            external_id: self.id,
            status,
            url: self.url,
            error: self.error,
            duration: self.duration,
            render_time: self.render_time,
            data: self.data,
        })
    }
}

/// A status report from either a webhook or a poll
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub external_id: String,
    pub status: RenderStatus,
    pub url: Option<String>,
    pub error: Option<String>,
    pub duration: Option<f64>,
    pub render_time: Option<f64>,
    pub data: Option<Value>,
}

impl StatusUpdate {
    pub fn new(external_id: impl Into<String>, status: RenderStatus) -> Self {
        Self {
            external_id: external_id.into(),
            status,
            url: None,
            error: None,
            duration: None,
            render_time: None,
            data: None,
        }
    }
}

/// What an update did to its job
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// Transition applied and persisted
    Applied(RenderJob),
    /// Older than the stored state; ignored
    Stale(RenderJob),
    /// The job is already terminal; its state wins
    Conflict(RenderJob),
    /// No job with that external id yet; kept until the pending submission stores it
    Held,
    /// No job with that external id
    UnknownJob,
}

impl UpdateOutcome {
    pub fn job(&self) -> Option<&RenderJob> {
        match self {
            Self::Applied(job) | Self::Stale(job) | Self::Conflict(job) => Some(job),
            Self::Held | Self::UnknownJob => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Applied(_) => "applied",
            Self::Stale(_) => "stale",
            Self::Conflict(_) => "conflict",
            Self::Held => "held",
            Self::UnknownJob => "unknown_job",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_ranks() {
        assert!(RenderStatus::Queued.rank() < RenderStatus::Fetching.rank());
        assert!(RenderStatus::Fetching.rank() < RenderStatus::Rendering.rank());
        assert!(RenderStatus::Rendering.rank() < RenderStatus::Done.rank());
        assert_eq!(RenderStatus::Done.rank(), RenderStatus::Failed.rank());
        assert!(RenderStatus::Failed.is_terminal());
        assert!(!RenderStatus::Rendering.is_terminal());
    }

    #[test]
    fn test_webhook_payload_parsing() {
        let payload: WebhookPayload = serde_json::from_value(json!({
            "id": "ext-1",
            "status": "done",
            "url": "https://cdn.example.com/out.mp4",
            "duration": 30.0,
            "renderTime": 4200.5
        }))
        .unwrap();

        assert_eq!(payload.status, WebhookStatus::Done);
        let update = payload.into_update().unwrap();
        assert_eq!(update.status, RenderStatus::Done);
        assert_eq!(update.render_time, Some(4200.5));
    }

    #[test]
    fn test_unknown_status_is_kept_verbatim() {
        let payload: WebhookPayload = serde_json::from_value(json!({ "id": "ext-2", "status": "exploded" })).unwrap();
        assert_eq!(payload.status, WebhookStatus::Unknown("exploded".into()));

        match payload.into_update() {
            Err(WebhookError::UnknownStatus { id, status }) => {
                assert_eq!(id, "ext-2");
                assert_eq!(status, "exploded");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_metadata_merge_is_additive() {
        let mut job = RenderJob::new("owner", "ext-3");

        let mut first = StatusUpdate::new("ext-3", RenderStatus::Rendering);
        first.data = Some(json!({ "progress": 10 }));
        job.apply(&first);

        let mut second = StatusUpdate::new("ext-3", RenderStatus::Done);
        second.duration = Some(12.5);
        second.url = Some("https://cdn.example.com/out.mp4".into());
        job.apply(&second);

        assert_eq!(job.metadata.get("data"), Some(&json!({ "progress": 10 })));
        assert_eq!(job.metadata.get("duration"), Some(&json!(12.5)));
        assert_eq!(job.result_url.as_deref(), Some("https://cdn.example.com/out.mp4"));
        assert_eq!(job.status, RenderStatus::Done);
    }
}
