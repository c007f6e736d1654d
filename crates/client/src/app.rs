//! Wiring of the client services.
//!
//! Each store is built once here and shared by `Arc`. Background tasks
//! run until [`App::shutdown`] cancels them.

use std::sync::Arc;
use std::time::Duration;

use quantdash_channel::ChannelManager;
use quantdash_jobs::{AnalysisApi, JobRegistry, JobTracker, RegistryEvent};
use quantdash_notifications::{
    run_poller, EtfUpdatesApi, FileStorage, NotificationError, NotificationSnapshot,
    NotificationStore, STORE_NAME,
};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;

/// Errors from [`App::build`].
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Notifications(#[from] NotificationError),
}

/// Shared HTTP client. Every request is bounded by `request_timeout`, so
/// a stalled backend surfaces as a failed request.
pub fn http_client(config: &ClientConfig) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()
}

pub struct App {
    pub channels: Arc<ChannelManager>,
    pub registry: Arc<JobRegistry>,
    pub tracker: Arc<JobTracker>,
    pub notifications: Arc<NotificationStore>,
    cancel: CancellationToken,
}

impl App {
    /// Build the HTTP, WebSocket and file-backed services from `config`.
    pub async fn build(config: &ClientConfig) -> Result<Self, AppError> {
        let http = http_client(config)?;

        let channels = Arc::new(ChannelManager::new(&config.ws_url, config.channel_config()));
        let registry = Arc::new(JobRegistry::new());
        let starter = Arc::new(AnalysisApi::with_client(http.clone(), &config.api_url));
        let tracker = Arc::new(JobTracker::new(
            starter,
            Arc::clone(&registry),
            Arc::clone(&channels),
        ));

        let storage = Arc::new(FileStorage::new(config.state_file()));
        let source = Arc::new(EtfUpdatesApi::with_client(http, &config.api_url));
        let notifications = Arc::new(NotificationStore::load(STORE_NAME, source, storage).await?);

        Ok(Self::new(channels, tracker, notifications))
    }

    /// Assemble an app from prebuilt services.
    pub fn new(
        channels: Arc<ChannelManager>,
        tracker: Arc<JobTracker>,
        notifications: Arc<NotificationStore>,
    ) -> Self {
        Self {
            channels,
            registry: Arc::clone(tracker.registry()),
            tracker,
            notifications,
            cancel: CancellationToken::new(),
        }
    }

    /// Start the update poller and the job and notification watchers.
    pub fn spawn_background(&self, poll_interval: Duration) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(run_poller(
                Arc::clone(&self.notifications),
                poll_interval,
                self.cancel.child_token(),
            )),
            tokio::spawn(watch_jobs(
                Arc::clone(&self.tracker),
                self.registry.subscribe(),
                self.cancel.child_token(),
            )),
            tokio::spawn(watch_notifications(
                self.notifications.subscribe(),
                self.cancel.child_token(),
            )),
        ]
    }

    /// Stop background tasks and close every channel subscription.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.shutdown().await;
        self.channels.shutdown();
        tracing::info!("Client shut down");
    }
}

/// Log job transitions and release the feed of every finished job.
async fn watch_jobs(
    tracker: Arc<JobTracker>,
    mut events: broadcast::Receiver<RegistryEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => event,
        };

        match event {
            Ok(RegistryEvent::Added(job)) => {
                tracing::info!(job_id = %job.id, ticker = %job.subject_key, "Job registered");
            }
            Ok(RegistryEvent::Updated(job)) => {
                tracing::info!(
                    job_id = %job.id,
                    status = %job.status,
                    progress = job.progress,
                    step = job.current_step.as_deref().unwrap_or(""),
                    "Job updated"
                );
                if job.is_terminal() {
                    if let Some(error) = &job.error {
                        tracing::warn!(job_id = %job.id, error = %error, suggestion = ?job.suggestion, "Job failed");
                    }
                    tracker.release(&job.id).await;
                }
            }
            Ok(RegistryEvent::Removed(id)) => {
                tracing::debug!(job_id = %id, "Job removed");
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Job watcher lagged, sweeping finished jobs");
                tracker.release_finished().await;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Log whenever the set of updated resources changes.
async fn watch_notifications(
    mut snapshots: watch::Receiver<NotificationSnapshot>,
    cancel: CancellationToken,
) {
    let mut last_ids = snapshots.borrow_and_update().updated_ids.clone();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }

        let snapshot = snapshots.borrow_and_update().clone();
        if snapshot.updated_ids != last_ids {
            tracing::info!(
                has_updates = snapshot.has_updates,
                updated = ?snapshot.updated_ids,
                "Resource updates changed"
            );
            last_ids = snapshot.updated_ids;
        }
    }
}
