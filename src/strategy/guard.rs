//! Strategy access guard
//!
//! Gates the grid-strategy surface until the connected account has a
//! backend-registered API key:
//!
//! ```text
//! UNKNOWN → CHECKING → HAS_KEY
//!              ↓
//!           NO_KEY → CREATING → HAS_KEY
//!              ↓  ↖______↙ (failure)
//!          DISMISSED (skip)
//! ```
//!
//! Any account change or disconnect sends the guard back to UNKNOWN. The
//! dialog/blur flags are derived from the state, so "dialog open while the
//! key exists" cannot be expressed.

use chrono::Utc;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::domain::AccountSession;
use crate::storage::{KeyValueStore, SKIP_APIKEY_CREATION_KEY};
use crate::strategy::{ApiKeyCheck, ApiKeyProvisioner, ProvisionOutcome, RegistrationLedger};

const HISTORY_LIMIT: usize = 64;

/// Guard state; every non-initial state names the account it refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GuardState {
    /// Nothing known yet
    Unknown,
    /// Existence check in flight
    Checking { account_id: String },
    /// Backend holds a key; surface unlocked
    HasKey { account_id: String },
    /// No key; surface blurred, creation dialog shown
    NoKey { account_id: String },
    /// Creation flow running; dialog shown with its action disabled
    Creating { account_id: String },
    /// User skipped creation for now
    Dismissed { account_id: String },
}

impl GuardState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardState::Unknown => "UNKNOWN",
            GuardState::Checking { .. } => "CHECKING",
            GuardState::HasKey { .. } => "HAS_KEY",
            GuardState::NoKey { .. } => "NO_KEY",
            GuardState::Creating { .. } => "CREATING",
            GuardState::Dismissed { .. } => "DISMISSED",
        }
    }

    pub fn account_id(&self) -> Option<&str> {
        match self {
            GuardState::Unknown => None,
            GuardState::Checking { account_id }
            | GuardState::HasKey { account_id }
            | GuardState::NoKey { account_id }
            | GuardState::Creating { account_id }
            | GuardState::Dismissed { account_id } => Some(account_id),
        }
    }

    pub fn view(&self) -> GuardView {
        match self {
            GuardState::Unknown | GuardState::Checking { .. } => GuardView::default(),
            GuardState::HasKey { .. } => GuardView {
                has_api_key: Some(true),
                ..GuardView::default()
            },
            GuardState::NoKey { .. } => GuardView {
                has_api_key: Some(false),
                dialog_open: true,
                blurred: true,
                create_enabled: true,
            },
            GuardState::Creating { .. } => GuardView {
                has_api_key: Some(false),
                dialog_open: true,
                blurred: true,
                create_enabled: false,
            },
            GuardState::Dismissed { .. } => GuardView {
                has_api_key: Some(false),
                ..GuardView::default()
            },
        }
    }
}

impl fmt::Display for GuardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the strategy surface should render
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GuardView {
    /// `None` until a check has completed
    pub has_api_key: Option<bool>,
    pub dialog_open: bool,
    pub blurred: bool,
    pub create_enabled: bool,
}

/// State transition record
#[derive(Debug, Clone, Serialize)]
pub struct GuardTransition {
    pub from: GuardState,
    pub to: GuardState,
    pub timestamp: i64,
}

struct GuardInner {
    state: GuardState,
    session: AccountSession,
    history: VecDeque<GuardTransition>,
}

pub struct StrategyGuard {
    checker: ApiKeyCheck,
    provisioner: ApiKeyProvisioner,
    ledger: Arc<RegistrationLedger>,
    /// Durable store for the skip flag
    prefs: Arc<dyn KeyValueStore>,
    inner: Mutex<GuardInner>,
    views: watch::Sender<GuardView>,
}

impl StrategyGuard {
    pub fn new(
        checker: ApiKeyCheck,
        provisioner: ApiKeyProvisioner,
        ledger: Arc<RegistrationLedger>,
        prefs: Arc<dyn KeyValueStore>,
    ) -> Self {
        let (views, _) = watch::channel(GuardView::default());
        Self {
            checker,
            provisioner,
            ledger,
            prefs,
            inner: Mutex::new(GuardInner {
                state: GuardState::Unknown,
                session: AccountSession::disconnected(),
                history: VecDeque::new(),
            }),
            views,
        }
    }

    pub fn state(&self) -> GuardState {
        self.lock().state.clone()
    }

    pub fn view(&self) -> GuardView {
        self.lock().state.view()
    }

    /// Receive every view change
    pub fn subscribe(&self) -> watch::Receiver<GuardView> {
        self.views.subscribe()
    }

    pub fn history(&self) -> Vec<GuardTransition> {
        self.lock().history.iter().cloned().collect()
    }

    /// Re-evaluate after a wallet/account change.
    pub async fn on_session(&self, session: AccountSession) -> GuardView {
        if let Err(e) = self.ledger.cleanup_expired_requests() {
            warn!(error = %e, "registration ledger cleanup failed");
        }

        let pending_check = {
            let mut inner = self.lock();
            let identity_changed = inner.session.account_id() != session.account_id();

            if (identity_changed || !session.is_connected()) && inner.state != GuardState::Unknown {
                info!(
                    previous = ?inner.session.account_id(),
                    current = ?session.account_id(),
                    status = %session.status,
                    "account changed, resetting strategy guard"
                );
                self.transition(&mut inner, GuardState::Unknown);
            }
            inner.session = session;

            if inner.session.can_trade() && inner.state == GuardState::Unknown {
                let account_id = inner.session.account_id().map(str::to_string);
                if let Some(id) = &account_id {
                    self.transition(
                        &mut inner,
                        GuardState::Checking {
                            account_id: id.clone(),
                        },
                    );
                }
                Some(account_id)
            } else {
                None
            }
        };

        match pending_check {
            Some(account_id) => self.run_check(account_id).await,
            None => self.view(),
        }
    }

    /// Run the existence check again for the current session.
    pub async fn refresh(&self) -> GuardView {
        let session = {
            let mut inner = self.lock();
            if matches!(
                inner.state,
                GuardState::Checking { .. } | GuardState::Creating { .. }
            ) {
                debug!(state = %inner.state, "refresh ignored while busy");
                return inner.state.view();
            }
            if inner.state != GuardState::Unknown {
                self.transition(&mut inner, GuardState::Unknown);
            }
            inner.session.clone()
        };
        self.on_session(session).await
    }

    /// "Create API Key" action from the dialog.
    pub async fn create_api_key(&self) -> GuardView {
        let (session, account_id) = {
            let mut inner = self.lock();
            let GuardState::NoKey { account_id } = &inner.state else {
                info!(state = %inner.state, "create ignored: dialog not actionable");
                return inner.state.view();
            };
            let account_id = account_id.clone();
            self.transition(
                &mut inner,
                GuardState::Creating {
                    account_id: account_id.clone(),
                },
            );
            (inner.session.clone(), account_id)
        };

        let outcome = self
            .provisioner
            .provision(&session, || self.settle_creation(&account_id, true))
            .await;

        match outcome {
            ProvisionOutcome::Created | ProvisionOutcome::AlreadyRegistered => {}
            ProvisionOutcome::InFlight | ProvisionOutcome::Failed(_) => {
                self.settle_creation(&account_id, false)
            }
        }
        self.view()
    }

    /// "Skip" action from the dialog.
    ///
    /// The flag is written for parity with the web console but nothing reads
    /// it back; the next evaluation prompts again.
    pub fn skip(&self) -> GuardView {
        let mut inner = self.lock();
        let GuardState::NoKey { account_id } = &inner.state else {
            debug!(state = %inner.state, "skip ignored");
            return inner.state.view();
        };
        let account_id = account_id.clone();

        if let Err(e) = self.prefs.set(SKIP_APIKEY_CREATION_KEY, "true") {
            warn!(error = %e, "failed to persist skip flag");
        }
        self.transition(&mut inner, GuardState::Dismissed { account_id });
        inner.state.view()
    }

    /// Drive the guard from a session subscription until the sender is dropped.
    pub async fn run(&self, mut sessions: watch::Receiver<AccountSession>) {
        let initial = sessions.borrow_and_update().clone();
        self.on_session(initial).await;

        while sessions.changed().await.is_ok() {
            let session = sessions.borrow_and_update().clone();
            self.on_session(session).await;
        }
        debug!("session channel closed, strategy guard stopped");
    }

    async fn run_check(&self, account_id: Option<String>) -> GuardView {
        let result = self.checker.check(account_id.as_deref()).await;

        let Some(account_id) = account_id else {
            return self.view();
        };

        let mut inner = self.lock();
        let expected = GuardState::Checking {
            account_id: account_id.clone(),
        };
        if inner.state != expected {
            debug!(account_id = %account_id, state = %inner.state, "discarding stale key check");
            return inner.state.view();
        }

        let next = match result {
            Ok(true) => GuardState::HasKey { account_id },
            Ok(false) | Err(_) => GuardState::NoKey { account_id },
        };
        self.transition(&mut inner, next);
        inner.state.view()
    }

    fn settle_creation(&self, account_id: &str, created: bool) {
        let mut inner = self.lock();
        let creating = matches!(&inner.state, GuardState::Creating { account_id: id } if id == account_id);
        if !creating {
            debug!(account_id, state = %inner.state, "discarding stale creation result");
            return;
        }

        let account_id = account_id.to_string();
        let next = if created {
            GuardState::HasKey { account_id }
        } else {
            GuardState::NoKey { account_id }
        };
        self.transition(&mut inner, next);
    }

    fn transition(&self, inner: &mut GuardInner, to: GuardState) {
        let from = std::mem::replace(&mut inner.state, to.clone());
        info!(from = %from, to = %to, account_id = ?to.account_id(), "strategy guard transition");

        if inner.history.len() == HISTORY_LIMIT {
            inner.history.pop_front();
        }
        inner.history.push_back(GuardTransition {
            from,
            to: to.clone(),
            timestamp: Utc::now().timestamp_millis(),
        });

        self.views.send_replace(to.view());
    }

    fn lock(&self) -> MutexGuard<'_, GuardInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
