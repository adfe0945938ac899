//! # Render Job Module
//!
//! Hands validated edits to an external asynchronous renderer and tracks each job
//! until it finishes.
//!
//! Job state only moves forward (`queued -> fetching -> rendering -> done | failed`).
//! Webhooks and the poll fallback share one update path, serialized per external
//! job id, so out-of-order and duplicate deliveries settle on the same state.

pub mod client;
pub mod notify;
pub mod orchestrator;
pub mod repository;
pub mod signature;
pub mod types;

pub use client::{HttpRenderBackend, RenderBackend};
pub use notify::{CompletionNotifier, LogNotifier};
pub use orchestrator::RenderOrchestrator;
pub use repository::{InMemoryJobRepository, JobRepository};
pub use types::{RenderJob, RenderStatus, StatusUpdate, UpdateOutcome, WebhookPayload, WebhookStatus};
