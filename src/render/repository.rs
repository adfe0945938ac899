use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::{CompositorError, Result};
use crate::render::types::RenderJob;

/// Storage for render jobs
///
/// The orchestrator serializes writes per external id, so implementations only
/// need each call to be atomic on its own.
pub trait JobRepository: Send + Sync + 'static {
    fn insert(&self, job: RenderJob) -> impl Future<Output = Result<()>> + Send;

    fn get(&self, id: Uuid) -> impl Future<Output = Result<Option<RenderJob>>> + Send;

    fn find_by_external_id(&self, external_id: &str) -> impl Future<Output = Result<Option<RenderJob>>> + Send;

    /// Replace a stored job; fails with `JobNotFound` if it was never inserted
    fn update(&self, job: RenderJob) -> impl Future<Output = Result<()>> + Send;
}

/// Process-local repository
#[derive(Clone, Default)]
pub struct InMemoryJobRepository {
    inner: Arc<RwLock<Jobs>>,
}

#[derive(Default)]
struct Jobs {
    by_id: HashMap<Uuid, RenderJob>,
    by_external_id: HashMap<String, Uuid>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl JobRepository for InMemoryJobRepository {
    async fn insert(&self, job: RenderJob) -> Result<()> {
        let mut jobs = self.inner.write();
        jobs.by_external_id.insert(job.external_id.clone(), job.id);
        jobs.by_id.insert(job.id, job);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<RenderJob>> {
        Ok(self.inner.read().by_id.get(&id).cloned())
    }

    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<RenderJob>> {
        let jobs = self.inner.read();
        Ok(jobs
            .by_external_id
            .get(external_id)
            .and_then(|id| jobs.by_id.get(id))
            .cloned())
    }

    async fn update(&self, job: RenderJob) -> Result<()> {
        let mut jobs = self.inner.write();
        match jobs.by_id.get_mut(&job.id) {
            Some(stored) => {
                *stored = job;
                Ok(())
            }
            None => Err(CompositorError::JobNotFound { id: job.id.to_string() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::types::RenderStatus;

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let repo = InMemoryJobRepository::new();
        let job = RenderJob::new("owner-1", "ext-1");
        repo.insert(job.clone()).await.unwrap();

        assert_eq!(repo.get(job.id).await.unwrap(), Some(job.clone()));
        assert_eq!(repo.find_by_external_id("ext-1").await.unwrap(), Some(job));
        assert_eq!(repo.find_by_external_id("ext-404").await.unwrap(), None);
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn test_update_requires_existing_job() {
        let repo = InMemoryJobRepository::new();
        let mut job = RenderJob::new("owner-1", "ext-1");

        assert!(matches!(
            repo.update(job.clone()).await,
            Err(CompositorError::JobNotFound { .. })
        ));

        repo.insert(job.clone()).await.unwrap();
        job.status = RenderStatus::Rendering;
        repo.update(job.clone()).await.unwrap();
        assert_eq!(repo.get(job.id).await.unwrap().unwrap().status, RenderStatus::Rendering);
    }
}
