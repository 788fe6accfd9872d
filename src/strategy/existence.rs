use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::adapters::{GridBackend, Notifier};
use crate::error::{GateError, Result};

/// Answers "does this account already have a trading key on the backend?"
///
/// Fails closed: any backend failure is reported as "no key" so the guard
/// shows the creation dialog instead of silently granting access.
pub struct ApiKeyCheck {
    backend: Arc<dyn GridBackend>,
    notifier: Arc<dyn Notifier>,
}

impl ApiKeyCheck {
    pub fn new(backend: Arc<dyn GridBackend>, notifier: Arc<dyn Notifier>) -> Self {
        Self { backend, notifier }
    }

    /// Returns `Err(MissingAccountId)` without calling the backend when no
    /// account id is known; every other outcome is `Ok`.
    pub async fn check(&self, account_id: Option<&str>) -> Result<bool> {
        let Some(account_id) = account_id.map(str::trim).filter(|id| !id.is_empty()) else {
            warn!("API key check skipped: no account id");
            self.notifier.warning("Account not ready yet, unable to check API key");
            return Err(GateError::MissingAccountId);
        };

        match self.backend.check_api_key(account_id).await {
            Ok(has_key) => {
                debug!(account_id, has_key, "API key check finished");
                Ok(has_key)
            }
            Err(e) => {
                info!(account_id, error = %e, "API key check failed, treating as missing");
                self.notifier
                    .error(&format!("Failed to check API key status: {}", e));
                Ok(false)
            }
        }
    }
}
