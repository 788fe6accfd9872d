use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of the connected wallet / trading account, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Disconnected,
    Connecting,
    SignedIn,
    TradingDisabled,
    TradingEnabled,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Disconnected => "DISCONNECTED",
            AccountStatus::Connecting => "CONNECTING",
            AccountStatus::SignedIn => "SIGNED_IN",
            AccountStatus::TradingDisabled => "TRADING_DISABLED",
            AccountStatus::TradingEnabled => "TRADING_ENABLED",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Default for AccountStatus {
    fn default() -> Self {
        Self::Disconnected
    }
}

/// Snapshot of the wallet/account as reported by the trading-account SDK.
///
/// The guard only ever reads these; a new snapshot is pushed on every
/// wallet or account change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSession {
    /// Present once account creation has completed
    pub account_id: Option<String>,
    /// Connected wallet address
    pub address: Option<String>,
    pub status: AccountStatus,
    /// True only right after the account was first created
    #[serde(default)]
    pub is_new: bool,
}

impl AccountSession {
    pub fn disconnected() -> Self {
        Self::default()
    }

    pub fn new(account_id: impl Into<String>, address: impl Into<String>, status: AccountStatus) -> Self {
        Self {
            account_id: Some(account_id.into()),
            address: Some(address.into()),
            status,
            is_new: false,
        }
    }

    /// Account id, ignoring blank values the SDK sometimes reports mid-connect.
    pub fn account_id(&self) -> Option<&str> {
        self.account_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    pub fn is_connected(&self) -> bool {
        self.status > AccountStatus::Disconnected
    }

    pub fn can_trade(&self) -> bool {
        self.status == AccountStatus::TradingEnabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_ordering() {
        assert!(AccountStatus::Disconnected < AccountStatus::Connecting);
        assert!(AccountStatus::SignedIn < AccountStatus::TradingDisabled);
        assert!(AccountStatus::TradingDisabled < AccountStatus::TradingEnabled);
    }

    #[test]
    fn test_blank_account_id_is_absent() {
        let mut session = AccountSession::new("  ", "0xabc", AccountStatus::TradingEnabled);
        assert_eq!(session.account_id(), None);

        session.account_id = Some("acct_1".to_string());
        assert_eq!(session.account_id(), Some("acct_1"));
        assert!(session.can_trade());
    }
}
