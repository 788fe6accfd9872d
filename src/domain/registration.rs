use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// One attempted account-registration call, as tracked by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub request_id: String,
    /// Epoch millis
    pub created_at: i64,
    pub processed: bool,
}

impl RegistrationRequest {
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.created_at).single()
    }

    pub fn age_ms(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp_millis().saturating_sub(self.created_at)
    }
}

/// Request body for the backend "enable bot trading" endpoint.
///
/// The secret is wiped when the request is dropped.
#[derive(Serialize, Zeroize, ZeroizeOnDrop)]
pub struct EnableBotTradingRequest {
    #[zeroize(skip)]
    pub user_api_key: String,
    pub user_api_secret: String,
    #[zeroize(skip)]
    pub user_id: String,
}

impl std::fmt::Debug for EnableBotTradingRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnableBotTradingRequest")
            .field("user_api_key", &self.user_api_key)
            .field("user_api_secret", &"<redacted>")
            .field("user_id", &self.user_id)
            .finish()
    }
}

/// Generic `{ success, data?, message? }` envelope used by the grid backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl BackendResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
        }
    }
}

/// Body of the "check API key" endpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ApiKeyStatus {
    pub has_api_key: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_age() {
        let now = Utc::now();
        let req = RegistrationRequest {
            request_id: "x".to_string(),
            created_at: now.timestamp_millis() - 1_500,
            processed: false,
        };
        assert_eq!(req.age_ms(now), 1_500);
        assert!(req.created_at_utc().is_some());
    }

    #[test]
    fn test_backend_response_tolerates_missing_fields() {
        let resp: BackendResponse = serde_json::from_str(r#"{"success":true}"#).unwrap();
        assert!(resp.success);
        assert!(resp.data.is_none());
        assert!(resp.message.is_none());
    }

    #[test]
    fn test_zeroize_clears_only_the_secret() {
        let mut req = EnableBotTradingRequest {
            user_api_key: "K1".to_string(),
            user_api_secret: "S1".to_string(),
            user_id: "acct_1".to_string(),
        };
        assert!(!format!("{:?}", req).contains("S1"));

        req.zeroize();
        assert!(req.user_api_secret.is_empty());
        assert_eq!(req.user_api_key, "K1");
        assert_eq!(req.user_id, "acct_1");
    }
}
