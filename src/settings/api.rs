use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use super::record::Settings;

/// Settings read failed; the previously loaded record stays valid
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The endpoint could not be reached
    #[error("failed to fetch settings: {0}")]
    Transport(String),

    /// The endpoint answered with a non-success status
    #[error("failed to fetch settings: server returned {status}: {detail}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, if any
        detail: String,
    },

    /// The body was not a settings record
    #[error("failed to fetch settings: malformed response: {0}")]
    Malformed(String),
}

/// Settings write or reset failed; nothing was applied
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PersistenceError {
    /// The endpoint could not be reached
    #[error("failed to save settings: {0}")]
    Transport(String),

    /// The backend refused the write
    #[error("failed to save settings: server returned {status}: {detail}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Response body, if any
        detail: String,
    },
}

/// Remote source of truth for the settings record
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SettingsApi: Send + Sync {
    /// Read the current record
    ///
    /// # Errors
    /// Returns [`FetchError`] if the endpoint is unreachable or answers badly
    async fn fetch(&self) -> Result<Settings, FetchError>;

    /// Replace the record wholesale
    ///
    /// # Errors
    /// Returns [`PersistenceError`] if the write is not accepted
    async fn save(&self, settings: &Settings) -> Result<(), PersistenceError>;

    /// Restore defaults and purge every stored transcription
    ///
    /// # Errors
    /// Returns [`PersistenceError`] if the reset is not accepted
    async fn reset(&self) -> Result<(), PersistenceError>;
}

/// `SettingsApi` backed by the REST endpoint
pub struct HttpSettingsApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSettingsApi {
    /// Creates a client for `<base_url>/settings`
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to create HTTP client: {e}"))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn post_expecting_success(
        &self,
        path: &str,
        body: Option<&Settings>,
    ) -> Result<(), PersistenceError> {
        let url = self.endpoint(path);
        let mut request = self.client.post(&url);
        if let Some(settings) = body {
            request = request.json(settings);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PersistenceError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            tracing::warn!(url = %url, status = status.as_u16(), "settings write rejected");
            return Err(PersistenceError::Rejected {
                status: status.as_u16(),
                detail,
            });
        }

        tracing::debug!(url = %url, "settings write accepted");
        Ok(())
    }
}

#[async_trait]
impl SettingsApi for HttpSettingsApi {
    async fn fetch(&self) -> Result<Settings, FetchError> {
        let url = self.endpoint("settings");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                detail,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| FetchError::Malformed(e.to_string()))
    }

    async fn save(&self, settings: &Settings) -> Result<(), PersistenceError> {
        self.post_expecting_success("settings", Some(settings)).await
    }

    async fn reset(&self) -> Result<(), PersistenceError> {
        self.post_expecting_success("settings/reset", None).await
    }
}
