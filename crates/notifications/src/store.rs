//! The notification store.
//!
//! Mutations take the state lock, change the state synchronously,
//! publish a snapshot and persist. A check releases the lock while the
//! network request is in flight, so readers are never blocked by a poll.
//!
//! Each check runs in its own task. Dropping the future returned by
//! [`NotificationStore::check_for_updates`] does not cancel the request;
//! its result is applied when it arrives and only then is the next check
//! allowed.

use std::sync::Arc;

use chrono::Utc;
use quantdash_core::types::Timestamp;
use serde_json::Value;
use tokio::sync::{watch, Mutex};

use crate::api::{UpdateSource, UpdatesApiError};
use crate::state::{NotificationSnapshot, NotificationState, PersistedRecord};
use crate::storage::{StateStorage, StorageError};

/// Result of [`NotificationStore::check_for_updates`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The check completed; `updated` ids are now flagged.
    Checked { updated: usize },
    /// Another check was already in flight. No request was made.
    Skipped,
}

/// Errors from [`NotificationStore`] operations.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    /// The update check failed. The message is also kept in the state.
    #[error("Update check failed: {0}")]
    Check(#[from] UpdatesApiError),

    /// The check task panicked or was cancelled by the runtime.
    #[error("Update check aborted: {0}")]
    Aborted(String),

    /// The state changed in memory but could not be persisted.
    #[error("Failed to persist notification state: {0}")]
    Storage(#[from] StorageError),
}

pub struct NotificationStore {
    inner: Arc<StoreInner>,
}

/// Shared by the store and its in-flight check task.
struct StoreInner {
    name: String,
    source: Arc<dyn UpdateSource>,
    storage: Arc<dyn StateStorage>,
    state: Mutex<NotificationState>,
    snapshot_tx: watch::Sender<NotificationSnapshot>,
}

impl NotificationStore {
    /// Restore the store persisted under `name`, or start empty.
    ///
    /// A record that cannot be decoded is discarded with a warning; a
    /// storage backend that cannot be read is an error.
    pub async fn load(
        name: impl Into<String>,
        source: Arc<dyn UpdateSource>,
        storage: Arc<dyn StateStorage>,
    ) -> Result<Self, NotificationError> {
        let name = name.into();
        let state = match storage.load(&name).await? {
            Some(value) => decode_record(&name, value),
            None => NotificationState::default(),
        };

        tracing::info!(
            store = %name,
            updated = state.updated_ids().len(),
            last_viewed_at = ?state.last_viewed_at,
            "Notification state loaded"
        );

        let (snapshot_tx, _) = watch::channel(state.snapshot());
        Ok(Self {
            inner: Arc::new(StoreInner {
                name,
                source,
                storage,
                state: Mutex::new(state),
                snapshot_tx,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Poll the update source once.
    ///
    /// Returns [`CheckOutcome::Skipped`] without a request while another
    /// check is running. On failure the error message is recorded and
    /// the flagged ids are left as they were.
    pub async fn check_for_updates(&self) -> Result<CheckOutcome, NotificationError> {
        let since = {
            let mut state = self.inner.state.lock().await;
            if state.is_checking {
                tracing::debug!(store = %self.inner.name, "Update check already in flight");
                return Ok(CheckOutcome::Skipped);
            }
            state.is_checking = true;
            self.inner.publish(&state);
            state.last_viewed_at
        };

        let inner = Arc::clone(&self.inner);
        match tokio::spawn(async move { inner.complete_check(since).await }).await {
            Ok(result) => result,
            Err(e) => Err(NotificationError::Aborted(e.to_string())),
        }
    }

    /// Acknowledge all updates as of now.
    pub async fn mark_as_viewed(&self) -> Result<(), NotificationError> {
        let inner = &self.inner;
        let mut state = inner.state.lock().await;
        state.mark_viewed(Utc::now());
        inner.publish(&state);
        inner.persist(&state).await?;
        tracing::debug!(store = %inner.name, "Marked all updates as viewed");
        Ok(())
    }

    /// Acknowledge one resource. Returns `false` if it was not flagged.
    pub async fn clear_update(&self, resource_id: &str) -> Result<bool, NotificationError> {
        let inner = &self.inner;
        let mut state = inner.state.lock().await;
        if !state.clear(resource_id) {
            return Ok(false);
        }
        inner.publish(&state);
        inner.persist(&state).await?;
        Ok(true)
    }

    pub fn has_update(&self, resource_id: &str) -> bool {
        self.inner
            .snapshot_tx
            .borrow()
            .updated_ids
            .contains(resource_id)
    }

    pub fn snapshot(&self) -> NotificationSnapshot {
        self.inner.snapshot_tx.borrow().clone()
    }

    /// Receiver that sees a new snapshot after every change.
    pub fn subscribe(&self) -> watch::Receiver<NotificationSnapshot> {
        self.inner.snapshot_tx.subscribe()
    }
}

impl StoreInner {
    /// Run the request and apply its result. Clears `is_checking` on
    /// every path, including a panicking source.
    async fn complete_check(&self, since: Option<Timestamp>) -> Result<CheckOutcome, NotificationError> {
        let source = Arc::clone(&self.source);
        let result = match tokio::spawn(async move { source.check_updates(since).await }).await {
            Ok(result) => result.map_err(NotificationError::from),
            Err(e) => Err(NotificationError::Aborted(e.to_string())),
        };

        let mut state = self.state.lock().await;
        state.is_checking = false;
        match result {
            Ok(response) => {
                let updated = state.apply_check(&response);
                self.publish(&state);
                self.persist(&state).await?;
                tracing::info!(store = %self.name, updated, "Update check complete");
                Ok(CheckOutcome::Checked { updated })
            }
            Err(e) => {
                state.error = Some(e.to_string());
                self.publish(&state);
                tracing::warn!(store = %self.name, error = %e, "Update check failed");
                Err(e)
            }
        }
    }

    fn publish(&self, state: &NotificationState) {
        self.snapshot_tx.send_replace(state.snapshot());
    }

    async fn persist(&self, state: &NotificationState) -> Result<(), StorageError> {
        let record = PersistedRecord::new(state.to_persisted());
        let value = serde_json::to_value(&record)?;
        if let Err(e) = self.storage.save(&self.name, value).await {
            tracing::warn!(store = %self.name, error = %e, "Failed to persist notification state");
            return Err(e);
        }
        Ok(())
    }
}

fn decode_record(name: &str, value: Value) -> NotificationState {
    match serde_json::from_value::<PersistedRecord>(value) {
        Ok(record) => NotificationState::from_persisted(record.state),
        Err(e) => {
            tracing::warn!(store = %name, error = %e, "Discarding unreadable notification state");
            NotificationState::default()
        }
    }
}
