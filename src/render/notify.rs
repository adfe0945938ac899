use crate::render::types::RenderJob;

/// Hook fired once when a render job reaches a terminal state
pub trait CompletionNotifier: Send + Sync {
    fn on_done(&self, job: &RenderJob);
    fn on_failed(&self, job: &RenderJob);
}

/// Default notifier: writes completions to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl CompletionNotifier for LogNotifier {
    fn on_done(&self, job: &RenderJob) {
        tracing::info!(
            "✅ Render {} for {} finished: {}",
            job.id,
            job.owner_id,
            job.result_url.as_deref().unwrap_or("<no url>")
        );
    }

    fn on_failed(&self, job: &RenderJob) {
        tracing::warn!(
            "❌ Render {} for {} failed: {}",
            job.id,
            job.owner_id,
            job.error_message.as_deref().unwrap_or("<no reason given>")
        );
    }
}
