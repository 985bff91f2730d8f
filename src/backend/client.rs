//! `BackendApi` trait and the `reqwest` implementation.
//!
//! The backend answers before its stores are ready.  Such answers surface as
//! [`BackendError::Warming`] and are retried by [`super::retry`].

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use super::types::{parse_agents, parse_history, AgentInfo, HistoryEntry};
use crate::config::BackendConfig;

// ---------------------------------------------------------------------------
// BackendError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP transport or connection error.
    #[error("HTTP request failed: {0}")]
    Request(String),

    #[error("backend request timed out")]
    Timeout,

    #[error("backend answered HTTP {0}")]
    Status(u16),

    #[error("failed to parse backend response: {0}")]
    Parse(String),

    /// The backend is up but still initializing.
    #[error("backend is still initializing")]
    Warming,

    #[error("{what}: gave up after {attempts} attempts")]
    GaveUp { what: &'static str, attempts: u32 },
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            BackendError::Timeout
        } else if let Some(status) = e.status() {
            BackendError::Status(status.as_u16())
        } else {
            BackendError::Request(e.to_string())
        }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        BackendError::Parse(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// BackendApi
// ---------------------------------------------------------------------------

/// Request/response collaborator.  Each call is a single attempt.
#[async_trait]
pub trait BackendApi: Send + Sync {
    async fn agents(&self) -> Result<Vec<AgentInfo>, BackendError>;
    async fn history(&self) -> Result<Vec<HistoryEntry>, BackendError>;
    async fn config(&self) -> Result<Value, BackendError>;
}

// ---------------------------------------------------------------------------
// HttpBackend
// ---------------------------------------------------------------------------

pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    /// The client carries the per-request timeout from `config.timeout_secs`.
    pub fn from_config(config: &BackendConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json(&self, path: &str) -> Result<Value, BackendError> {
        let url = self.url(path);
        log::debug!("backend: GET {url}");
        let response = self.client.get(&url).send().await?.error_for_status()?;
        response
            .json()
            .await
            .map_err(|e| BackendError::Parse(e.to_string()))
    }
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn agents(&self) -> Result<Vec<AgentInfo>, BackendError> {
        parse_agents(self.get_json("/api/agents").await?)
    }

    async fn history(&self) -> Result<Vec<HistoryEntry>, BackendError> {
        parse_history(self.get_json("/api/history").await?)
    }

    async fn config(&self) -> Result<Value, BackendError> {
        self.get_json("/api/config").await
    }
}
