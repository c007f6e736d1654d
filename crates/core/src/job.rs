//! Analysis job model, shallow-merge patches, and subject key validation.
//!
//! A [`Job`] is one long-running server-side analysis task. The client
//! never computes anything about it; it only records what the push
//! channel reports.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{JobId, Timestamp};

/// Maximum length of a subject key (ticker symbol).
const MAX_SUBJECT_KEY_LEN: usize = 16;

/// Upper bound of [`Job::progress`].
pub const MAX_PROGRESS: u8 = 100;

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a job.
///
/// Moves forward only: `Pending -> Running -> Completed | Failed`. A
/// restart creates a new [`Job`] instead of resetting the status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// `true` for `Completed` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// One long-running analysis task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Server-assigned identifier, unique for the lifetime of the task.
    pub id: JobId,
    /// Business entity under analysis (e.g. a ticker symbol).
    pub subject_key: String,
    pub status: JobStatus,
    /// Completion percentage, `0..=100`.
    pub progress: u8,
    /// Human-readable description of the current phase. Advisory only.
    pub current_step: Option<String>,
    /// Opaque server payload, present only once `Completed`.
    pub result: Option<serde_json::Value>,
    /// Present only once `Failed`.
    pub error: Option<String>,
    /// Present only once `Failed`.
    pub suggestion: Option<String>,
    /// When the client registered the job.
    pub created_at: Timestamp,
}

impl Job {
    /// A freshly started job: `Pending` at 0%.
    pub fn pending(id: impl Into<JobId>, subject_key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            subject_key: subject_key.into(),
            status: JobStatus::Pending,
            progress: 0,
            current_step: None,
            result: None,
            error: None,
            suggestion: None,
            created_at: chrono::Utc::now(),
        }
    }

    /// Shallow merge: every `Some` field of `patch` overwrites the
    /// matching field, `None` leaves it alone. Progress is clamped to
    /// [`MAX_PROGRESS`].
    pub fn apply_patch(&mut self, patch: JobPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(progress) = patch.progress {
            self.progress = progress.min(MAX_PROGRESS);
        }
        if let Some(step) = patch.current_step {
            self.current_step = Some(step);
        }
        if let Some(result) = patch.result {
            self.result = Some(result);
        }
        if let Some(error) = patch.error {
            self.error = Some(error);
        }
        if let Some(suggestion) = patch.suggestion {
            self.suggestion = Some(suggestion);
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

// ---------------------------------------------------------------------------
// JobPatch
// ---------------------------------------------------------------------------

/// Partial update for a [`Job`]. See [`Job::apply_patch`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub current_step: Option<String>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub suggestion: Option<String>,
}

impl JobPatch {
    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn current_step(mut self, step: impl Into<String>) -> Self {
        self.current_step = Some(step.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Normalise and validate a subject key before a start request.
///
/// Rules:
/// - Surrounding whitespace is trimmed and letters are upper-cased.
/// - Must not be empty or exceed `MAX_SUBJECT_KEY_LEN` characters.
/// - Only ASCII alphanumerics, `.` and `-` are allowed (`BRK.B`, `RDS-A`).
pub fn normalize_subject_key(raw: &str) -> Result<String, CoreError> {
    let key = raw.trim().to_ascii_uppercase();
    if key.is_empty() {
        return Err(CoreError::Validation(
            "Subject key must not be empty".to_string(),
        ));
    }
    if key.len() > MAX_SUBJECT_KEY_LEN {
        return Err(CoreError::Validation(format!(
            "Subject key must not exceed {MAX_SUBJECT_KEY_LEN} characters"
        )));
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    {
        return Err(CoreError::Validation(format!(
            "Subject key '{key}' may only contain letters, digits, '.' or '-'"
        )));
    }
    Ok(key)
}
