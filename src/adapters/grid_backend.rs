//! Grid-bot backend REST client.
//!
//! Only the handful of user/key endpoints the provisioning flow needs.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::BackendConfig;
use crate::domain::{ApiKeyStatus, BackendResponse, EnableBotTradingRequest};
use crate::error::{GateError, Result};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GridBackend: Send + Sync {
    /// Whether a trading API key is registered for `user_id`.
    async fn check_api_key(&self, user_id: &str) -> Result<bool>;

    /// Whether the backend already has a user record for `user_id`.
    async fn user_exists(&self, user_id: &str) -> Result<bool>;

    async fn create_user(&self, user_id: &str, wallet_address: &str) -> Result<BackendResponse>;

    async fn enable_bot_trading(&self, request: &EnableBotTradingRequest) -> Result<BackendResponse>;
}

#[derive(Clone)]
pub struct HttpGridBackend {
    http: Client,
    base_url: Url,
}

impl HttpGridBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| GateError::Validation(format!("invalid grid backend url '{}': {}", base_url, e)))?;

        let http = Client::builder()
            .user_agent("gridgate/0.1")
            .timeout(timeout)
            .build()
            .map_err(|e| GateError::Internal(format!("failed to build grid HTTP client: {}", e)))?;

        Ok(Self { http, base_url })
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        Self::new(&config.grid_url, Duration::from_millis(config.timeout_ms))
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| GateError::Validation(format!("grid backend url cannot be a base: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn ensure_success(resp: Response) -> Result<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        warn!(status = %status, body = %body, "grid backend request failed");
        Err(GateError::Backend {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl GridBackend for HttpGridBackend {
    async fn check_api_key(&self, user_id: &str) -> Result<bool> {
        let url = self.endpoint(&["users", user_id, "api-key"])?;
        debug!(%url, "checking api key");

        let resp = Self::ensure_success(self.http.get(url).send().await?).await?;
        let status: ApiKeyStatus = resp.json().await?;
        Ok(status.has_api_key)
    }

    async fn user_exists(&self, user_id: &str) -> Result<bool> {
        let url = self.endpoint(&["users", user_id])?;
        let resp = self.http.get(url).send().await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        Self::ensure_success(resp).await?;
        Ok(true)
    }

    async fn create_user(&self, user_id: &str, wallet_address: &str) -> Result<BackendResponse> {
        let url = self.endpoint(&["users"])?;
        let body = serde_json::json!({
            "user_id": user_id,
            "wallet_address": wallet_address,
        });

        let resp = Self::ensure_success(self.http.post(url).json(&body).send().await?).await?;
        Ok(resp.json().await?)
    }

    async fn enable_bot_trading(&self, request: &EnableBotTradingRequest) -> Result<BackendResponse> {
        let url = self.endpoint(&["bot", "enable"])?;
        debug!(user_id = %request.user_id, "enabling bot trading");

        let resp = Self::ensure_success(self.http.post(url).json(request).send().await?).await?;
        Ok(resp.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_escapes_user_id_and_keeps_base_path() {
        let backend = HttpGridBackend::new("http://grid.internal/api/", Duration::from_secs(1))
            .expect("backend should build");

        let url = backend.endpoint(&["users", "acct/1 x", "api-key"]).unwrap();
        assert_eq!(url.as_str(), "http://grid.internal/api/users/acct%2F1%20x/api-key");
    }

    #[test]
    fn rejects_invalid_base_url() {
        let err = HttpGridBackend::new("::nope", Duration::from_secs(1)).err().unwrap();
        assert!(matches!(err, GateError::Validation(_)));
    }
}
