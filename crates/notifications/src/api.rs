//! REST client for the ETF update check.

use async_trait::async_trait;
use chrono::SecondsFormat;
use quantdash_core::types::Timestamp;
use serde::Deserialize;

/// One resource in an update-check response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResourceUpdate {
    pub resource_id: String,
    /// Whether the resource changed after the `since` timestamp.
    pub has_new_data: bool,
    #[serde(default)]
    pub last_updated: Option<Timestamp>,
}

/// Response of `GET /api/v1/etfs/updates`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UpdateCheckResponse {
    #[serde(default)]
    pub updates: Vec<ResourceUpdate>,
    #[serde(default)]
    pub has_any_updates: bool,
    pub checked_at: Timestamp,
}

/// Anything that can compare server-side change times against `since`.
#[async_trait]
pub trait UpdateSource: Send + Sync + 'static {
    async fn check_updates(
        &self,
        since: Option<Timestamp>,
    ) -> Result<UpdateCheckResponse, UpdatesApiError>;
}

/// Errors from the update-check REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum UpdatesApiError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Updates API error ({status}): {body}")]
    ApiError { status: u16, body: String },
}

/// HTTP client for the ETF updates endpoint.
pub struct EtfUpdatesApi {
    client: reqwest::Client,
    api_url: String,
}

impl EtfUpdatesApi {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn updates_url(&self) -> String {
        format!("{}/api/v1/etfs/updates", self.api_url)
    }
}

#[async_trait]
impl UpdateSource for EtfUpdatesApi {
    async fn check_updates(
        &self,
        since: Option<Timestamp>,
    ) -> Result<UpdateCheckResponse, UpdatesApiError> {
        let mut request = self.client.get(self.updates_url());
        if let Some(since) = since {
            request = request.query(&[("since", since.to_rfc3339_opts(SecondsFormat::Millis, true))]);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(UpdatesApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }

        let checked: UpdateCheckResponse = response.json().await?;
        tracing::debug!(
            resources = checked.updates.len(),
            has_any_updates = checked.has_any_updates,
            "Update check returned"
        );
        Ok(checked)
    }
}
