//! REST client for starting analysis jobs.
//!
//! Starting a job is the only request/response exchange in the job
//! lifecycle; every later update arrives over the push channel.

use async_trait::async_trait;
use serde::Deserialize;

/// Response of the job-start endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StartJobResponse {
    /// Server-assigned job identifier.
    pub job_id: String,
    /// Subject key as the server recorded it.
    pub ticker: String,
}

/// Anything that can start an analysis job.
#[async_trait]
pub trait JobStarter: Send + Sync + 'static {
    async fn start_job(&self, subject_key: &str) -> Result<StartJobResponse, AnalysisApiError>;
}

/// HTTP client for the analysis service.
pub struct AnalysisApi {
    client: reqwest::Client,
    api_url: String,
}

/// Errors from the analysis REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisApiError {
    /// The HTTP request itself failed (network, DNS, TLS, decoding).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service returned a non-2xx status code.
    #[error("Analysis API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl AnalysisApi {
    /// * `api_url` - Base HTTP URL, e.g. `http://localhost:8000`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Reuse an existing [`reqwest::Client`] (shared connection pool).
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn start_url(&self) -> String {
        format!("{}/api/v1/analysis/start", self.api_url)
    }
}

#[async_trait]
impl JobStarter for AnalysisApi {
    /// Sends `POST /api/v1/analysis/start` with `{"ticker": ...}`.
    async fn start_job(&self, subject_key: &str) -> Result<StartJobResponse, AnalysisApiError> {
        let body = serde_json::json!({ "ticker": subject_key });

        let response = self
            .client
            .post(self.start_url())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(AnalysisApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }

        let started: StartJobResponse = response.json().await?;
        tracing::info!(job_id = %started.job_id, ticker = %started.ticker, "Analysis job started");
        Ok(started)
    }
}
