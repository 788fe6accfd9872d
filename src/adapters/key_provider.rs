use async_trait::async_trait;

use crate::domain::{ApiKeyRecord, KeyOptions};
use crate::error::Result;

/// Key generation capability of the trading-account SDK.
///
/// `Ok(None)` means the SDK completed without producing a key.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyProvider: Send + Sync {
    async fn create_api_key(&self, duration_days: u32, options: &KeyOptions) -> Result<Option<ApiKeyRecord>>;
}
