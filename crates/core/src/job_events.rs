//! Push-channel wire constants and topic naming for analysis jobs.
//!
//! Shared by the channel parser (`quantdash-channel`) and the job tracker
//! (`quantdash-jobs`) so both sides agree on the wire vocabulary.

/// Reply to the keep-alive probe. Never forwarded to business handlers.
pub const MSG_TYPE_PONG: &str = "pong";

/// Outbound keep-alive probe. Sent as a bare text frame, not JSON.
pub const KEEP_ALIVE_PAYLOAD: &str = "ping";

/// Topic prefix for per-job progress feeds.
const PROGRESS_TOPIC_PREFIX: &str = "progress/";

/// Topic carrying the progress feed of a single job.
pub fn progress_topic(job_id: &str) -> String {
    format!("{PROGRESS_TOPIC_PREFIX}{job_id}")
}
