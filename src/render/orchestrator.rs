use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::composition::types::Edit;
use crate::composition::validate::validate;
use crate::config::{seconds, RenderConfig};
use crate::error::{CompositorError, Result, SubmissionError, WebhookError};
use crate::render::client::RenderBackend;
use crate::render::notify::{CompletionNotifier, LogNotifier};
use crate::render::repository::JobRepository;
use crate::render::signature;
use crate::render::types::{RenderJob, RenderStatus, StatusUpdate, UpdateOutcome, WebhookPayload};

/// Error message stored on cancelled jobs
pub const CANCELLED: &str = "cancelled";

/// Most updates held for external ids whose submission is still in flight
const MAX_EARLY_UPDATES: usize = 256;

/// One async lock per external job id
///
/// Entries live only while someone holds or waits on them.
#[derive(Default)]
struct KeyedLocks {
    locks: parking_lot::Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    async fn lock(&self, key: &str) -> KeyGuard<'_> {
        let lock = self
            .locks
            .lock()
            .entry(key.to_string())
            .or_default()
            .clone();
        KeyGuard {
            owner: self,
            key: key.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().len()
    }
}

struct KeyGuard<'a> {
    owner: &'a KeyedLocks,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        let mut locks = self.owner.locks.lock();
        self.guard.take();
        // Only the map still points at the mutex: nobody holds or waits on it
        if locks.get(&self.key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&self.key);
        }
    }
}

/// Updates that arrived for an external id before its job was stored
#[derive(Default)]
struct EarlyUpdates {
    state: parking_lot::Mutex<EarlyState>,
}

#[derive(Default)]
struct EarlyState {
    in_flight: usize,
    held: usize,
    updates: HashMap<String, Vec<StatusUpdate>>,
}

impl EarlyUpdates {
    fn begin(&self) -> Submission<'_> {
        self.state.lock().in_flight += 1;
        Submission { early: self, finished: false }
    }

    /// Keep `update` if a submission could still claim it
    fn hold(&self, update: StatusUpdate) -> bool {
        let mut state = self.state.lock();
        if state.in_flight == 0 || state.held >= MAX_EARLY_UPDATES {
            return false;
        }
        state.held += 1;
        state.updates.entry(update.external_id.clone()).or_default().push(update);
        true
    }

    fn finish(&self, external_id: Option<&str>) -> Vec<StatusUpdate> {
        let mut state = self.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);

        let claimed = external_id
            .and_then(|id| state.updates.remove(id))
            .unwrap_or_default();
        state.held -= claimed.len();

        if state.in_flight == 0 {
            state.updates.clear();
            state.held = 0;
        }
        claimed
    }
}

/// An in-flight submission; dropping it unclaimed releases its slot
struct Submission<'a> {
    early: &'a EarlyUpdates,
    finished: bool,
}

impl Submission<'_> {
    fn claim(mut self, external_id: &str) -> Vec<StatusUpdate> {
        self.finished = true;
        self.early.finish(Some(external_id))
    }
}

impl Drop for Submission<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.early.finish(None);
        }
    }
}

/// Submits edits to the renderer and reconciles job state from webhooks and polls
///
/// Updates for one external id are applied one at a time; different ids proceed
/// in parallel. Terminal states are never left.
pub struct RenderOrchestrator<B, R> {
    inner: Arc<Inner<B, R>>,
}

struct Inner<B, R> {
    backend: B,
    repository: R,
    notifier: Arc<dyn CompletionNotifier>,
    config: RenderConfig,
    locks: KeyedLocks,
    early: EarlyUpdates,
}

impl<B, R> Clone for RenderOrchestrator<B, R> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<B: RenderBackend, R: JobRepository> RenderOrchestrator<B, R> {
    pub fn new(backend: B, repository: R, config: RenderConfig) -> Self {
        Self::with_notifier(backend, repository, config, Arc::new(LogNotifier))
    }

    pub fn with_notifier(
        backend: B,
        repository: R,
        config: RenderConfig,
        notifier: Arc<dyn CompletionNotifier>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                repository,
                notifier,
                config,
                locks: KeyedLocks::default(),
                early: EarlyUpdates::default(),
            }),
        }
    }

    pub fn repository(&self) -> &R {
        &self.inner.repository
    }

    pub fn config(&self) -> &RenderConfig {
        &self.inner.config
    }

    /// Validate and submit an edit, then persist a queued job.
    ///
    /// Nothing is stored when validation fails or the renderer does not accept the job.
    /// Updates the renderer sends before the job is stored are applied right after.
    pub async fn submit(&self, owner_id: &str, edit: Edit) -> Result<RenderJob> {
        let edit = validate(edit)?;

        let submission = self.inner.early.begin();
        let limit = seconds(self.inner.config.request_timeout_sec);
        let external_id = match tokio::time::timeout(limit, self.inner.backend.submit(&edit)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(SubmissionError::Timeout { seconds: limit.as_secs_f64() }.into());
            }
        };

        let (job, outcomes) = {
            let _guard = self.inner.locks.lock(&external_id).await;

            let mut job = RenderJob::new(owner_id, external_id.clone());
            self.inner.repository.insert(job.clone()).await?;

            let mut outcomes = Vec::new();
            for update in submission.claim(&external_id) {
                tracing::debug!("Applying early {} update for {}", update.status, external_id);
                let outcome = self.transition(job.clone(), &update).await?;
                if let Some(current) = outcome.job() {
                    job = current.clone();
                }
                outcomes.push(outcome);
            }
            (job, outcomes)
        };

        tracing::info!(
            "🚀 Submitted render {} (external {}) for {}",
            job.id, job.external_id, owner_id
        );
        for outcome in &outcomes {
            self.settle(outcome);
        }

        if self.inner.config.poll_enabled && !job.status.is_terminal() {
            self.spawn_watcher(job.external_id.clone());
        }

        Ok(job)
    }

    /// Verify and apply a raw webhook body
    pub async fn on_webhook_body(&self, body: &[u8], signature_header: Option<&str>) -> Result<UpdateOutcome> {
        if let Some(secret) = &self.inner.config.webhook_secret {
            signature::verify(secret, body, signature_header)?;
        }

        let payload: WebhookPayload = serde_json::from_slice(body).map_err(|e| WebhookError::Malformed {
            reason: e.to_string(),
        })?;

        self.on_webhook(payload).await
    }

    /// Apply a webhook payload
    pub async fn on_webhook(&self, payload: WebhookPayload) -> Result<UpdateOutcome> {
        let update = payload.into_update()?;
        tracing::debug!("Webhook for {}: {}", update.external_id, update.status);

        let external_id = update.external_id.clone();
        let outcome = self.apply_update(update).await?;
        if outcome == UpdateOutcome::UnknownJob {
            tracing::info!("Acknowledged and ignored: {}", WebhookError::UnknownJob { id: external_id });
        }
        Ok(outcome)
    }

    /// Ask the renderer for the job's status and apply it
    pub async fn poll_once(&self, external_id: &str) -> Result<UpdateOutcome> {
        let limit = seconds(self.inner.config.request_timeout_sec);
        let mut update = match tokio::time::timeout(limit, self.inner.backend.status(external_id)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(CompositorError::Timeout {
                    operation: format!("status poll for {}", external_id),
                    seconds: limit.as_secs_f64(),
                });
            }
        };
        update.external_id = external_id.to_string();
        self.apply_update(update).await
    }

    /// Poll fallback: wait for a webhook, then poll until terminal or out of attempts
    pub async fn watch(&self, external_id: String) {
        let config = &self.inner.config;
        tokio::time::sleep(seconds(config.webhook_timeout_sec)).await;

        for attempt in 1..=config.max_poll_attempts {
            match self.inner.repository.find_by_external_id(&external_id).await {
                Ok(Some(job)) if job.status.is_terminal() => return,
                Ok(Some(_)) => {}
                Ok(None) => return,
                Err(e) => tracing::warn!("Could not load render {} before polling: {}", external_id, e),
            }

            tracing::debug!("Polling render {} (attempt {}/{})", external_id, attempt, config.max_poll_attempts);
            match self.poll_once(&external_id).await {
                Ok(outcome) if outcome.job().is_some_and(|job| job.status.is_terminal()) => return,
                Ok(_) => {}
                Err(e) if e.is_recoverable() => tracing::warn!("Status poll for {} failed: {}", external_id, e),
                Err(e) => {
                    tracing::warn!("Giving up on render {}: {}", external_id, e);
                    return;
                }
            }

            tokio::time::sleep(seconds(config.poll_interval_sec)).await;
        }

        tracing::warn!(
            "Render {} still not finished after {} polls",
            external_id, config.max_poll_attempts
        );
    }

    fn spawn_watcher(&self, external_id: String) {
        let orchestrator = self.clone();
        tokio::spawn(async move { orchestrator.watch(external_id).await });
    }

    /// Mark a running job as failed
    pub async fn cancel(&self, job_id: Uuid) -> Result<RenderJob> {
        let job = self.get_job(job_id).await?;
        let guard = self.inner.locks.lock(&job.external_id).await;

        // Re-read under the lock
        let mut job = self.get_job(job_id).await?;
        if job.status.is_terminal() {
            return Err(CompositorError::StateConflict {
                job_id: job.id.to_string(),
                current: job.status,
                attempted: RenderStatus::Failed,
            });
        }

        let mut update = StatusUpdate::new(job.external_id.clone(), RenderStatus::Failed);
        update.error = Some(CANCELLED.to_string());
        job.apply(&update);
        self.inner.repository.update(job.clone()).await?;
        drop(guard);

        tracing::info!("Cancelled render {}", job.id);
        self.inner.notifier.on_failed(&job);
        Ok(job)
    }

    pub async fn get_job(&self, job_id: Uuid) -> Result<RenderJob> {
        self.inner
            .repository
            .get(job_id)
            .await?
            .ok_or_else(|| CompositorError::JobNotFound { id: job_id.to_string() })
    }

    pub async fn find_by_external_id(&self, external_id: &str) -> Result<Option<RenderJob>> {
        self.inner.repository.find_by_external_id(external_id).await
    }

    /// Single read-modify-write path shared by webhooks and polls
    async fn apply_update(&self, update: StatusUpdate) -> Result<UpdateOutcome> {
        let outcome = {
            let _guard = self.inner.locks.lock(&update.external_id).await;

            match self.inner.repository.find_by_external_id(&update.external_id).await? {
                Some(job) => self.transition(job, &update).await?,
                None => {
                    if self.inner.early.hold(update) {
                        UpdateOutcome::Held
                    } else {
                        UpdateOutcome::UnknownJob
                    }
                }
            }
        };

        self.settle(&outcome);
        Ok(outcome)
    }

    /// Move `job` forward by `update`; callers hold the job's lock
    async fn transition(&self, mut job: RenderJob, update: &StatusUpdate) -> Result<UpdateOutcome> {
        if job.status.is_terminal() {
            let conflict = CompositorError::StateConflict {
                job_id: job.id.to_string(),
                current: job.status,
                attempted: update.status,
            };
            tracing::warn!("{}", conflict);
            return Ok(UpdateOutcome::Conflict(job));
        }

        if update.status.rank() < job.status.rank() {
            tracing::warn!(
                "Ignoring stale update for render {}: {} after {}",
                job.id, update.status, job.status
            );
            return Ok(UpdateOutcome::Stale(job));
        }

        job.apply(update);
        self.inner.repository.update(job.clone()).await?;
        Ok(UpdateOutcome::Applied(job))
    }

    /// Log and notify once the job's lock is released
    fn settle(&self, outcome: &UpdateOutcome) {
        if let UpdateOutcome::Applied(job) = outcome {
            tracing::info!("Render {} is now {}", job.id, job.status);
            match job.status {
                RenderStatus::Done => self.inner.notifier.on_done(job),
                RenderStatus::Failed => self.inner.notifier.on_failed(job),
                _ => {}
            }
        }
    }
}
