use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroizing;

/// Options passed to the trading-account SDK when generating a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyOptions {
    pub tag: String,
    pub scope: String,
}

/// A freshly generated trading API key.
///
/// The secret only lives in memory until it has been handed to the backend
/// and is wiped when the record is dropped.
pub struct ApiKeyRecord {
    pub key: String,
    pub secret_key: Zeroizing<String>,
    pub scope: String,
    pub duration_days: u32,
    pub tag: String,
}

impl ApiKeyRecord {
    pub fn new(key: impl Into<String>, secret_key: impl Into<String>, duration_days: u32, options: &KeyOptions) -> Self {
        Self {
            key: key.into(),
            secret_key: Zeroizing::new(secret_key.into()),
            scope: options.scope.clone(),
            duration_days,
            tag: options.tag.clone(),
        }
    }
}

impl fmt::Debug for ApiKeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeyRecord")
            .field("key", &self.key)
            .field("secret_key", &"<redacted>")
            .field("scope", &self.scope)
            .field("duration_days", &self.duration_days)
            .field("tag", &self.tag)
            .finish()
    }
}
