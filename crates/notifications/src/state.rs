//! In-memory notification state and its persisted form.
//!
//! Only `lastViewedAt`, `updatedIds` and `hasUpdates` are durable. The
//! id set is stored as a JSON array and rebuilt into a set on load, so
//! duplicates in a stored record collapse.

use std::collections::BTreeSet;

use quantdash_core::types::Timestamp;
use serde::{Deserialize, Serialize};

use crate::api::UpdateCheckResponse;

/// Default storage key for the notification record.
pub const STORE_NAME: &str = "etf-notifications";

/// Schema version written next to the persisted state.
pub const STATE_VERSION: u32 = 0;

/// Full notification state. `has_updates` is derived from `updated_ids`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationState {
    pub last_viewed_at: Option<Timestamp>,
    /// Server timestamp of the last successful check. Not persisted.
    pub last_checked_at: Option<Timestamp>,
    updated_ids: BTreeSet<String>,
    pub is_checking: bool,
    pub error: Option<String>,
}

impl NotificationState {
    pub fn updated_ids(&self) -> &BTreeSet<String> {
        &self.updated_ids
    }

    pub fn has_updates(&self) -> bool {
        !self.updated_ids.is_empty()
    }

    pub fn has_update(&self, resource_id: &str) -> bool {
        self.updated_ids.contains(resource_id)
    }

    /// Replace the id set with the result of a successful check.
    ///
    /// Returns the number of ids now flagged.
    pub fn apply_check(&mut self, response: &UpdateCheckResponse) -> usize {
        self.updated_ids = response
            .updates
            .iter()
            .filter(|u| u.has_new_data)
            .map(|u| u.resource_id.clone())
            .collect();
        self.last_checked_at = Some(response.checked_at);
        self.error = None;
        self.updated_ids.len()
    }

    /// Acknowledge everything as of `now`.
    pub fn mark_viewed(&mut self, now: Timestamp) {
        self.last_viewed_at = Some(now);
        self.updated_ids.clear();
    }

    /// Drop a single id. Returns `true` if it was flagged.
    pub fn clear(&mut self, resource_id: &str) -> bool {
        self.updated_ids.remove(resource_id)
    }

    pub fn snapshot(&self) -> NotificationSnapshot {
        NotificationSnapshot {
            last_viewed_at: self.last_viewed_at,
            last_checked_at: self.last_checked_at,
            updated_ids: self.updated_ids.clone(),
            has_updates: self.has_updates(),
            is_checking: self.is_checking,
            error: self.error.clone(),
        }
    }

    pub fn to_persisted(&self) -> PersistedNotificationState {
        PersistedNotificationState {
            last_viewed_at: self.last_viewed_at,
            updated_ids: self.updated_ids.iter().cloned().collect(),
            has_updates: self.has_updates(),
        }
    }

    /// Rebuild state from its persisted form. The stored `hasUpdates`
    /// flag is ignored and recomputed from the ids.
    pub fn from_persisted(persisted: PersistedNotificationState) -> Self {
        Self {
            last_viewed_at: persisted.last_viewed_at,
            updated_ids: persisted.updated_ids.into_iter().collect(),
            ..Self::default()
        }
    }
}

/// Read-only view handed to observers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationSnapshot {
    pub last_viewed_at: Option<Timestamp>,
    pub last_checked_at: Option<Timestamp>,
    pub updated_ids: BTreeSet<String>,
    pub has_updates: bool,
    pub is_checking: bool,
    pub error: Option<String>,
}

/// Durable subset of [`NotificationState`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedNotificationState {
    #[serde(default)]
    pub last_viewed_at: Option<Timestamp>,
    #[serde(default)]
    pub updated_ids: Vec<String>,
    #[serde(default)]
    pub has_updates: bool,
}

/// Stored record: `{"state": {...}, "version": 0}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedRecord {
    pub state: PersistedNotificationState,
    #[serde(default)]
    pub version: u32,
}

impl PersistedRecord {
    pub fn new(state: PersistedNotificationState) -> Self {
        Self {
            state,
            version: STATE_VERSION,
        }
    }
}
