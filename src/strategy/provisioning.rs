//! Creates a trading API key and registers it with the grid backend.
//!
//! Steps run strictly in order: generate key -> ensure backend user ->
//! enable bot trading. Every failure is caught here, turned into a
//! notification and returned as a `ProvisionOutcome`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, warn};

use crate::adapters::{GridBackend, KeyProvider, Notifier};
use crate::config::ProvisioningConfig;
use crate::domain::{AccountSession, ApiKeyRecord, EnableBotTradingRequest, KeyOptions};
use crate::error::{GateError, Result, DUPLICATE_INDEX_MARKER};
use crate::strategy::RegistrationLedger;

/// Result of one provisioning attempt
#[derive(Debug)]
pub enum ProvisionOutcome {
    /// Key generated and stored on the backend
    Created,
    /// Backend already had the registration (unique index violation)
    AlreadyRegistered,
    /// Another attempt is still running; nothing was sent
    InFlight,
    /// Attempt failed; the user may retry
    Failed(GateError),
}

impl ProvisionOutcome {
    /// Whether the gate can be released
    pub fn is_resolved(&self) -> bool {
        matches!(self, ProvisionOutcome::Created | ProvisionOutcome::AlreadyRegistered)
    }
}

enum Registration {
    Created,
    /// Backend already held a key
    Existing(GateError),
}

/// Key generation parameters handed to the SDK
#[derive(Debug, Clone)]
pub struct KeyParams {
    pub duration_days: u32,
    pub options: KeyOptions,
}

impl Default for KeyParams {
    fn default() -> Self {
        Self::from(&ProvisioningConfig::default())
    }
}

impl From<&ProvisioningConfig> for KeyParams {
    fn from(config: &ProvisioningConfig) -> Self {
        Self {
            duration_days: config.duration_days,
            options: KeyOptions {
                tag: config.tag.clone(),
                scope: config.scope.clone(),
            },
        }
    }
}

pub struct ApiKeyProvisioner {
    keys: Arc<dyn KeyProvider>,
    backend: Arc<dyn GridBackend>,
    ledger: Arc<RegistrationLedger>,
    notifier: Arc<dyn Notifier>,
    params: KeyParams,
    submitting: AtomicBool,
    /// Accounts assumed registered; cleared again when an attempt fails
    processed: Mutex<HashSet<String>>,
}

impl ApiKeyProvisioner {
    pub fn new(
        keys: Arc<dyn KeyProvider>,
        backend: Arc<dyn GridBackend>,
        ledger: Arc<RegistrationLedger>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            keys,
            backend,
            ledger,
            notifier,
            params: KeyParams::default(),
            submitting: AtomicBool::new(false),
            processed: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_params(mut self, params: KeyParams) -> Self {
        self.params = params;
        self
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting.load(Ordering::SeqCst)
    }

    pub fn is_processed(&self, account_id: &str) -> bool {
        self.processed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(account_id)
    }

    /// Create and register a key for `session`.
    ///
    /// `on_success` runs once the backend holds a key for the account,
    /// including when it reports the registration already exists.
    pub async fn provision<F>(&self, session: &AccountSession, on_success: F) -> ProvisionOutcome
    where
        F: FnOnce() + Send,
    {
        if self.submitting.swap(true, Ordering::SeqCst) {
            info!("API key creation already in progress, ignoring request");
            return ProvisionOutcome::InFlight;
        }

        let outcome = self.run(session, on_success).await;
        self.submitting.store(false, Ordering::SeqCst);
        outcome
    }

    async fn run<F>(&self, session: &AccountSession, on_success: F) -> ProvisionOutcome
    where
        F: FnOnce() + Send,
    {
        let Some(account_id) = session.account_id() else {
            warn!("API key creation requested without an account id");
            self.notifier.error("Account not ready, please reconnect your wallet");
            return ProvisionOutcome::Failed(GateError::MissingAccountId);
        };

        if self.is_processed(account_id) {
            info!(account_id, "API key already registered this session, not resubmitting");
            on_success();
            return ProvisionOutcome::AlreadyRegistered;
        }

        let request_id = self.ledger.generate_request_id();
        if self.ledger.is_request_processed(&request_id) {
            debug!(request_id = %request_id, "registration request already processed");
            return ProvisionOutcome::AlreadyRegistered;
        }

        self.set_processed(account_id, true);

        match self.register(account_id, session.address.as_deref()).await {
            Ok(Registration::Created) => {
                self.finish(&request_id);
                info!(account_id, request_id = %request_id, "API key created and registered");
                self.notifier.success("API key created successfully");
                on_success();
                ProvisionOutcome::Created
            }
            Ok(Registration::Existing(reason)) => {
                // A previous attempt already went through; keep the processed flag.
                self.finish(&request_id);
                info!(account_id, reason = %reason, "API key already registered on backend");
                on_success();
                ProvisionOutcome::AlreadyRegistered
            }
            Err(e) => {
                self.set_processed(account_id, false);
                error!(account_id, error = %e, "API key creation failed");
                self.notifier.error(&e.to_string());
                ProvisionOutcome::Failed(e)
            }
        }
    }

    /// Only the enable step may report an existing registration; a duplicate
    /// anywhere earlier says nothing about the key.
    async fn register(&self, account_id: &str, address: Option<&str>) -> Result<Registration> {
        let record = self.generate_key().await?;
        self.ensure_user(account_id, address).await?;

        let request = EnableBotTradingRequest {
            user_api_key: record.key.clone(),
            user_api_secret: record.secret_key.as_str().to_string(),
            user_id: account_id.to_string(),
        };
        drop(record);

        let response = match self.backend.enable_bot_trading(&request).await {
            Ok(response) => response,
            Err(e) if e.is_duplicate_registration() => return Ok(Registration::Existing(e)),
            Err(e) => return Err(e),
        };
        if response.success {
            return Ok(Registration::Created);
        }

        let message = response
            .message
            .unwrap_or_else(|| "backend rejected API key".to_string());
        if message.contains(DUPLICATE_INDEX_MARKER) {
            Ok(Registration::Existing(GateError::DuplicateRegistration(message)))
        } else {
            Err(GateError::Persistence(message))
        }
    }

    async fn generate_key(&self) -> Result<ApiKeyRecord> {
        let params = &self.params;
        match self
            .keys
            .create_api_key(params.duration_days, &params.options)
            .await
        {
            Ok(Some(record)) => Ok(record),
            Ok(None) => Err(GateError::KeyGeneration(
                "trading account returned no key".to_string(),
            )),
            Err(e @ GateError::KeyGeneration(_)) => Err(e),
            Err(e) => Err(GateError::KeyGeneration(e.to_string())),
        }
    }

    async fn ensure_user(&self, account_id: &str, address: Option<&str>) -> Result<()> {
        let exists = self
            .backend
            .user_exists(account_id)
            .await
            .map_err(|e| GateError::UserLookup(e.to_string()))?;
        if exists {
            return Ok(());
        }

        let wallet_address = address.unwrap_or_default();
        debug!(account_id, wallet_address, "creating backend user");
        // A duplicate here means another registration raced us; the user row is there.
        let message = match self.backend.create_user(account_id, wallet_address).await {
            Ok(response) if response.success => return Ok(()),
            Ok(response) => response
                .message
                .unwrap_or_else(|| "backend rejected user".to_string()),
            Err(e) if e.is_duplicate_registration() => e.to_string(),
            Err(e) => return Err(e),
        };
        if message.contains(DUPLICATE_INDEX_MARKER) {
            debug!(account_id, "backend user already exists");
            Ok(())
        } else {
            Err(GateError::Persistence(message))
        }
    }

    fn finish(&self, request_id: &str) {
        if let Err(e) = self.ledger.mark_request_processed(request_id) {
            warn!(request_id, error = %e, "failed to record processed registration request");
        }
    }

    fn set_processed(&self, account_id: &str, processed: bool) {
        let mut accounts = self.processed.lock().unwrap_or_else(PoisonError::into_inner);
        if processed {
            accounts.insert(account_id.to_string());
        } else {
            accounts.remove(account_id);
        }
    }
}
