//! Session-wide store of analysis jobs.
//!
//! [`JobRegistry`] is the single source of truth for every job the
//! session knows about. It is created once at the composition root and
//! shared by `Arc`. Readers get cloned snapshots; observers subscribe to
//! [`RegistryEvent`]s.
//!
//! Messages for a job already in a terminal state (`completed` or
//! `failed`) are ignored, so a late or duplicated message can never
//! reopen a finished job.

use quantdash_channel::messages::ChannelMessage;
use quantdash_core::job::{Job, JobPatch, JobStatus, MAX_PROGRESS};
use quantdash_core::types::JobId;
use tokio::sync::{broadcast, RwLock};

/// Broadcast channel capacity for registry events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Fallback error text when a failure message carries none.
const DEFAULT_FAILURE_MESSAGE: &str = "Analysis failed";

/// A change to the registry, carrying the job as it is after the change.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent {
    Added(Job),
    Updated(Job),
    Removed(JobId),
}

/// What [`JobRegistry::apply_message`] did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The job entry was updated.
    Applied,
    /// No job with that id is registered; the message was dropped.
    UnknownJob,
    /// The job already completed or failed; the message was dropped.
    Terminal,
    /// The message carries no job transition (notification, pong,
    /// missing or mismatched job id).
    Ignored,
}

pub struct JobRegistry {
    /// Insertion-ordered entries.
    jobs: RwLock<Vec<Job>>,
    event_tx: broadcast::Sender<RegistryEvent>,
}

impl JobRegistry {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            jobs: RwLock::new(Vec::new()),
            event_tx,
        }
    }

    /// Subscribe to registry changes.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.event_tx.subscribe()
    }

    /// Insert a job. An existing entry with the same id is overwritten
    /// in place (last write wins, no merge) and keeps its position.
    pub async fn add_job(&self, job: Job) {
        let mut jobs = self.jobs.write().await;
        let event = match jobs.iter_mut().find(|j| j.id == job.id) {
            Some(existing) => {
                *existing = job.clone();
                RegistryEvent::Updated(job)
            }
            None => {
                jobs.push(job.clone());
                RegistryEvent::Added(job)
            }
        };
        drop(jobs);
        self.publish(event);
    }

    /// Shallow-merge `patch` onto the job with `id`.
    ///
    /// Returns `false` (and changes nothing) when the id is unknown.
    pub async fn update_job(&self, id: &str, patch: JobPatch) -> bool {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.iter_mut().find(|j| j.id == id) else {
            tracing::debug!(job_id = %id, "Update for unknown job ignored");
            return false;
        };
        job.apply_patch(patch);
        let updated = job.clone();
        drop(jobs);
        self.publish(RegistryEvent::Updated(updated));
        true
    }

    /// Remove a job, leaving every other entry untouched.
    pub async fn remove_job(&self, id: &str) -> Option<Job> {
        let mut jobs = self.jobs.write().await;
        let index = jobs.iter().position(|j| j.id == id)?;
        let removed = jobs.remove(index);
        drop(jobs);
        self.publish(RegistryEvent::Removed(removed.id.clone()));
        Some(removed)
    }

    /// Snapshot of every job, in insertion order.
    pub async fn jobs(&self) -> Vec<Job> {
        self.jobs.read().await.clone()
    }

    pub async fn get(&self, id: &str) -> Option<Job> {
        self.jobs.read().await.iter().find(|j| j.id == id).cloned()
    }

    /// Jobs that are still pending or running, in insertion order.
    pub async fn active_jobs(&self) -> Vec<Job> {
        self.jobs
            .read()
            .await
            .iter()
            .filter(|j| !j.is_terminal())
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// Apply a channel message to the job it names.
    pub async fn apply_message(&self, message: &ChannelMessage) -> ApplyOutcome {
        match message.job_id() {
            Some(job_id) => self.apply_to(job_id, message).await,
            None => ApplyOutcome::Ignored,
        }
    }

    /// Apply a message received on the progress topic of `job_id`.
    ///
    /// A message without a job id is attributed to the topic's job; one
    /// naming a different job is ignored.
    pub async fn apply_topic_message(&self, job_id: &str, message: &ChannelMessage) -> ApplyOutcome {
        match message.job_id() {
            Some(named) if named != job_id => {
                tracing::debug!(
                    topic_job_id = %job_id,
                    message_job_id = %named,
                    "Message for another job on progress topic ignored",
                );
                ApplyOutcome::Ignored
            }
            _ => self.apply_to(job_id, message).await,
        }
    }

    async fn apply_to(&self, job_id: &str, message: &ChannelMessage) -> ApplyOutcome {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) else {
            tracing::trace!(job_id = %job_id, "Message for unknown job dropped");
            return ApplyOutcome::UnknownJob;
        };
        if job.is_terminal() {
            tracing::trace!(job_id = %job_id, status = %job.status, "Message for finished job dropped");
            return ApplyOutcome::Terminal;
        }
        let Some(patch) = patch_for(job, message) else {
            return ApplyOutcome::Ignored;
        };

        job.apply_patch(patch);
        let updated = job.clone();
        drop(jobs);

        tracing::debug!(
            job_id = %updated.id,
            status = %updated.status,
            progress = updated.progress,
            "Job updated from channel",
        );
        self.publish(RegistryEvent::Updated(updated));
        ApplyOutcome::Applied
    }

    fn publish(&self, event: RegistryEvent) {
        // Ignore the SendError -- it only means there are zero receivers.
        let _ = self.event_tx.send(event);
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Translate a message into a patch for `job`, or `None` when the
/// message carries no job transition.
///
/// Progress never moves backwards: a lower value than the job already
/// reports is held at the current value.
fn patch_for(job: &Job, message: &ChannelMessage) -> Option<JobPatch> {
    match message {
        ChannelMessage::Progress(data) => {
            let mut patch = JobPatch::default().status(JobStatus::Running);
            if let Some(percent) = data.percent() {
                patch.progress = Some(percent.max(job.progress));
            }
            patch.current_step = data.current_step.clone();
            Some(patch)
        }
        ChannelMessage::Complete(data) => Some(JobPatch {
            status: Some(JobStatus::Completed),
            progress: Some(MAX_PROGRESS),
            result: Some(data.result.clone().unwrap_or(serde_json::Value::Null)),
            ..Default::default()
        }),
        ChannelMessage::Error(data) => Some(JobPatch {
            status: Some(JobStatus::Failed),
            error: Some(
                data.error
                    .clone()
                    .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string()),
            ),
            suggestion: data.suggestion.clone(),
            ..Default::default()
        }),
        ChannelMessage::Notification(_) | ChannelMessage::Pong => None,
    }
}
