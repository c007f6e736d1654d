//! Push-channel message envelope and best-effort parser.
//!
//! The server sends JSON of the shape
//! `{"type": "<kind>", "job_id": "...", ...}` with the remaining fields
//! flat beside the tag. Parsing is best-effort: anything that does not
//! match a known envelope is handed to callers as [`Payload::Raw`].

use serde::{Deserialize, Serialize};

use quantdash_core::job::MAX_PROGRESS;
use quantdash_core::job_events::MSG_TYPE_PONG;

/// All known inbound message types, tagged by the `"type"` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChannelMessage {
    /// A job advanced. Usually carries `status: "running"`.
    Progress(ProgressData),

    /// A job finished and produced its result.
    Complete(CompleteData),

    /// A job failed.
    Error(ErrorData),

    /// Free-form server notification.
    Notification(NotificationData),

    /// Keep-alive acknowledgment.
    Pong,
}

impl ChannelMessage {
    /// Job the message refers to, when it carries one.
    pub fn job_id(&self) -> Option<&str> {
        match self {
            ChannelMessage::Progress(d) => d.job_id.as_deref(),
            ChannelMessage::Complete(d) => d.job_id.as_deref(),
            ChannelMessage::Error(d) => d.job_id.as_deref(),
            ChannelMessage::Notification(d) => d.job_id.as_deref(),
            ChannelMessage::Pong => None,
        }
    }
}

/// Payload for `progress` messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressData {
    #[serde(default)]
    pub job_id: Option<String>,
    /// Percentage as sent by the server; may be fractional.
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub current_step: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl ProgressData {
    /// Progress rounded and clamped into `0..=100`.
    pub fn percent(&self) -> Option<u8> {
        self.progress
            .filter(|p| p.is_finite())
            .map(|p| p.round().clamp(0.0, MAX_PROGRESS as f64) as u8)
    }
}

/// Payload for `complete` messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompleteData {
    #[serde(default)]
    pub job_id: Option<String>,
    /// Opaque analysis result; never interpreted client-side.
    #[serde(default)]
    pub result: Option<serde_json::Value>,
}

/// Payload for `error` messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorData {
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub suggestion: Option<String>,
}

/// Payload for `notification` messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationData {
    #[serde(default)]
    pub job_id: Option<String>,
    /// Every other field of the envelope, untouched.
    #[serde(flatten)]
    pub data: serde_json::Map<String, serde_json::Value>,
}

/// What a subscription hands to [`ChannelHandler::on_message`](crate::ChannelHandler::on_message).
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// The frame parsed into a known envelope.
    Message(ChannelMessage),
    /// The frame did not parse; delivered verbatim.
    Raw(String),
}

impl Payload {
    /// `true` for keep-alive replies, which never reach business handlers.
    pub fn is_keep_alive_ack(&self) -> bool {
        match self {
            Payload::Message(ChannelMessage::Pong) => true,
            Payload::Raw(text) => text.trim() == MSG_TYPE_PONG,
            Payload::Message(_) => false,
        }
    }
}

/// Parse an inbound text frame.
///
/// Never fails: malformed JSON and unknown `type` values degrade to
/// [`Payload::Raw`].
pub fn parse_payload(text: &str) -> Payload {
    match serde_json::from_str::<ChannelMessage>(text) {
        Ok(msg) => Payload::Message(msg),
        Err(e) => {
            tracing::debug!(error = %e, raw_message = %text, "Delivering unparsed channel payload");
            Payload::Raw(text.to_string())
        }
    }
}
