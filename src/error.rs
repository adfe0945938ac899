use thiserror::Error;

use crate::render::RenderStatus;

/// Main error type for the Tempo-Compositor library
#[derive(Error, Debug)]
pub enum CompositorError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Audio analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Probe error: {0}")]
    Probe(#[from] ProbeError),

    #[error("Render submission error: {0}")]
    Submission(#[from] SubmissionError),

    #[error("Webhook error: {0}")]
    Webhook(#[from] WebhookError),

    #[error("State conflict on job {job_id}: {current:?} is terminal, ignoring {attempted:?}")]
    StateConflict {
        job_id: String,
        current: RenderStatus,
        attempted: RenderStatus,
    },

    #[error("{operation} timed out after {seconds:.1}s")]
    Timeout { operation: String, seconds: f64 },

    #[error("Render job not found: {id}")]
    JobNotFound { id: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A composition or request field failed validation.
///
/// `field` is a dotted path into the offending document, for example
/// `timeline.tracks[0].clips[3].length`.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new<F: Into<String>, R: Into<String>>(field: F, reason: R) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Soundtrack loading and analysis errors
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Failed to fetch audio from {url}: {reason}")]
    FetchFailed { url: String, reason: String },

    #[error("Audio could not be decoded ({source_name}): {reason}")]
    Undecodable { source_name: String, reason: String },

    #[error("Audio analysis failed: {reason}")]
    AnalysisFailed { reason: String },

    #[error("Invalid analysis parameters: {details}")]
    InvalidParameters { details: String },
}

/// Metadata prober failures, one variant per stable failure kind
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProbeError {
    #[error("Asset not found or unreachable: {url}")]
    NotFound { url: String },

    #[error("Access to asset forbidden: {url}")]
    Forbidden { url: String },

    #[error("Probing {url} timed out")]
    Timeout { url: String },

    #[error("Probing {url} failed: {reason}")]
    Unknown { url: String, reason: String },
}

impl ProbeError {
    /// Stable sub-kind reported to callers
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Forbidden { .. } => "forbidden",
            Self::Timeout { .. } => "timeout",
            Self::Unknown { .. } => "unknown",
        }
    }
}

/// The external renderer refused or never acknowledged a job
#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error("Renderer rejected the job (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Renderer request failed: {reason}")]
    Transport { reason: String },

    #[error("Renderer did not answer within {seconds:.1}s")]
    Timeout { seconds: f64 },

    #[error("Renderer response was malformed: {reason}")]
    MalformedResponse { reason: String },
}

/// Webhook payloads that cannot be applied
#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("Malformed webhook payload: {reason}")]
    Malformed { reason: String },

    #[error("Unrecognized render status '{status}' for job {id}")]
    UnknownStatus { id: String, status: String },

    #[error("No render job with external id {id}")]
    UnknownJob { id: String },

    #[error("Webhook signature missing or invalid")]
    InvalidSignature,
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}")]
    ParseFailed { path: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Convenience type alias for Results using CompositorError
pub type Result<T> = std::result::Result<T, CompositorError>;

impl CompositorError {
    /// Stable error kind, reported alongside every structured failure
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Analysis(_) => "analysis_error",
            Self::Probe(_) => "probe_error",
            Self::Submission(_) => "submission_error",
            Self::Webhook(_) => "webhook_error",
            Self::StateConflict { .. } => "state_conflict",
            Self::Timeout { .. } => "timeout",
            Self::JobNotFound { .. } => "job_not_found",
            Self::Config(_) => "config_error",
            Self::Io(_) => "io_error",
        }
    }

    /// Shorthand for a validation failure on `field`
    pub fn validation<F: Into<String>, R: Into<String>>(field: F, reason: R) -> Self {
        Self::Validation(ValidationError::new(field, reason))
    }

    /// Check if this error is transient (the same call may succeed later)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Io(_) | Self::Timeout { .. } => true,
            Self::Probe(ProbeError::Timeout { .. }) => true,
            Self::Analysis(AnalysisError::FetchFailed { .. }) => true,
            Self::Submission(SubmissionError::Transport { .. })
            | Self::Submission(SubmissionError::Timeout { .. }) => true,
            _ => false,
        }
    }
}
