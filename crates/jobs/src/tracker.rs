//! Bridge between job starts, the registry, and progress subscriptions.
//!
//! [`JobTracker::start_job`] issues the start request, registers the
//! job as `pending`, and opens `progress/<job_id>`. Every message on
//! that topic is applied to the registry in delivery order.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use quantdash_channel::{ChannelError, ChannelHandler, ChannelManager, Payload, SubscriptionHandle};
use quantdash_core::error::CoreError;
use quantdash_core::job::{normalize_subject_key, Job};
use quantdash_core::job_events::progress_topic;
use quantdash_core::types::JobId;
use tokio::sync::Mutex;

use crate::api::{AnalysisApiError, JobStarter};
use crate::registry::{ApplyOutcome, JobRegistry};

pub struct JobTracker {
    starter: Arc<dyn JobStarter>,
    registry: Arc<JobRegistry>,
    channels: Arc<ChannelManager>,
    /// Open progress subscriptions indexed by job id.
    subscriptions: Mutex<HashMap<JobId, SubscriptionHandle>>,
}

impl JobTracker {
    pub fn new(
        starter: Arc<dyn JobStarter>,
        registry: Arc<JobRegistry>,
        channels: Arc<ChannelManager>,
    ) -> Self {
        Self {
            starter,
            registry,
            channels,
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Start an analysis of `subject` and begin tracking it.
    ///
    /// The subject key is normalised first; an invalid key never reaches
    /// the server. Returns the job as registered (`pending`, 0%).
    pub async fn start_job(&self, subject: &str) -> Result<Job, TrackerError> {
        let subject_key = normalize_subject_key(subject)?;
        let started = self.starter.start_job(&subject_key).await?;

        let ticker = if started.ticker.is_empty() {
            subject_key
        } else {
            started.ticker
        };
        let job = Job::pending(started.job_id, ticker);
        self.registry.add_job(job.clone()).await;
        self.track(&job.id).await;

        Ok(job)
    }

    /// Open (or reopen) the progress subscription for `job_id`.
    pub async fn track(&self, job_id: &str) {
        let handler = Arc::new(JobChannelHandler {
            job_id: job_id.to_string(),
            registry: Arc::clone(&self.registry),
        });
        let handle = self.channels.open(progress_topic(job_id), handler);

        let previous = self
            .subscriptions
            .lock()
            .await
            .insert(job_id.to_string(), handle);
        if let Some(previous) = previous {
            previous.close();
        }
        tracing::debug!(job_id = %job_id, "Tracking job progress");
    }

    /// Close the subscription for `job_id`, keeping the job entry.
    ///
    /// Returns `false` when no subscription was open.
    pub async fn release(&self, job_id: &str) -> bool {
        match self.subscriptions.lock().await.remove(job_id) {
            Some(handle) => {
                handle.close();
                true
            }
            None => false,
        }
    }

    /// Close the subscriptions of every job that has completed or failed.
    ///
    /// Returns the number of subscriptions closed.
    pub async fn release_finished(&self) -> usize {
        let finished: Vec<JobId> = self
            .registry
            .jobs()
            .await
            .into_iter()
            .filter(|j| j.is_terminal())
            .map(|j| j.id)
            .collect();

        let mut subscriptions = self.subscriptions.lock().await;
        let mut released = 0;
        for id in finished {
            if let Some(handle) = subscriptions.remove(&id) {
                handle.close();
                released += 1;
            }
        }
        released
    }

    /// Stop tracking `job_id` and remove it from the registry.
    pub async fn remove_job(&self, job_id: &str) -> Option<Job> {
        self.release(job_id).await;
        self.registry.remove_job(job_id).await
    }

    /// Number of open progress subscriptions.
    pub async fn tracked_count(&self) -> usize {
        self.subscriptions.lock().await.len()
    }

    pub async fn is_tracking(&self, job_id: &str) -> bool {
        self.subscriptions.lock().await.contains_key(job_id)
    }

    /// Close every progress subscription.
    pub async fn shutdown(&self) {
        let mut subscriptions = self.subscriptions.lock().await;
        let count = subscriptions.len();
        for (_, handle) in subscriptions.drain() {
            handle.close();
        }
        tracing::info!(count, "Closed all job subscriptions");
    }
}

/// Feeds one job's progress topic into the registry.
struct JobChannelHandler {
    job_id: JobId,
    registry: Arc<JobRegistry>,
}

#[async_trait]
impl ChannelHandler for JobChannelHandler {
    async fn on_message(&self, payload: Payload) {
        match payload {
            Payload::Message(message) => {
                let outcome = self
                    .registry
                    .apply_topic_message(&self.job_id, &message)
                    .await;
                if outcome == ApplyOutcome::UnknownJob {
                    tracing::debug!(job_id = %self.job_id, "Job no longer registered, message dropped");
                }
            }
            Payload::Raw(text) => {
                tracing::debug!(job_id = %self.job_id, raw = %text, "Ignoring unparsed progress payload");
            }
        }
    }

    async fn on_disconnect(&self) {
        tracing::debug!(job_id = %self.job_id, "Progress feed disconnected");
    }

    async fn on_error(&self, error: &ChannelError) {
        tracing::warn!(job_id = %self.job_id, error = %error, "Progress feed error");
    }
}

/// Errors from [`JobTracker::start_job`].
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// The subject key failed validation.
    #[error(transparent)]
    Validation(#[from] CoreError),

    /// The start request failed.
    #[error(transparent)]
    Api(#[from] AnalysisApiError),
}
