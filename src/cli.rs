use anyhow::Context;
use chrono::Duration;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::adapters::{HttpGridBackend, LogNotifier};
use crate::config::AppConfig;
use crate::error::Result;
use crate::storage::JsonFileStore;
use crate::strategy::{ApiKeyCheck, RegistrationLedger};

#[derive(Parser)]
#[command(name = "gridgate")]
#[command(version = "0.1.0")]
#[command(about = "Grid strategy API-key guard and backend proxy", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Directory holding default.toml and per-environment overrides
    #[arg(short, long, default_value = "config", env = "GRIDGATE_CONFIG_DIR")]
    pub config_dir: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the grid/referral proxy server
    Serve {
        /// Override the listen port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Ask the grid backend whether an account has an API key
    CheckKey {
        #[arg(long)]
        account_id: String,
    },
    /// Inspect or prune a registration ledger persisted to a JSON store file
    #[command(subcommand)]
    Ledger(LedgerCommands),
}

#[derive(Subcommand)]
pub enum LedgerCommands {
    /// List known registration requests
    Show {
        /// JSON store file an embedding application uses as its session store
        #[arg(long)]
        store: PathBuf,
    },
    /// Remove requests older than the retention window
    Cleanup {
        #[arg(long)]
        store: PathBuf,
    },
}

/// Print whether `account_id` has a key. Backend failures print "no key".
pub async fn check_key(config: &AppConfig, account_id: &str) -> Result<bool> {
    let backend = HttpGridBackend::from_config(&config.backend)?;
    let check = ApiKeyCheck::new(Arc::new(backend), Arc::new(LogNotifier));

    let has_key = check.check(Some(account_id)).await?;
    if has_key {
        println!("{account_id}: API key registered");
    } else {
        println!("{account_id}: no API key registered");
    }
    Ok(has_key)
}

fn open_ledger(config: &AppConfig, path: &Path) -> Result<RegistrationLedger> {
    let store = JsonFileStore::open(path)
        .with_context(|| format!("failed to open ledger store {}", path.display()))?;
    let ttl = Duration::seconds(config.provisioning.request_ttl_secs as i64);
    Ok(RegistrationLedger::with_ttl(Arc::new(store), ttl))
}

pub fn show_ledger(config: &AppConfig, store: &Path) -> Result<()> {
    let ledger = open_ledger(config, store)?;
    let requests = ledger.requests();

    if requests.is_empty() {
        println!("No registration requests recorded");
        return Ok(());
    }

    println!("{:<28} {:<25} {}", "REQUEST", "CREATED", "PROCESSED");
    for request in requests {
        let created = request
            .created_at_utc()
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "?".to_string());
        println!(
            "{:<28} {:<25} {}",
            request.request_id, created, request.processed
        );
    }
    Ok(())
}

pub fn cleanup_ledger(config: &AppConfig, store: &Path) -> Result<usize> {
    let ledger = open_ledger(config, store)?;
    let removed = ledger.cleanup_expired_requests()?;
    println!("Removed {removed} expired registration requests");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GateError;
    use crate::storage::KeyValueStore;
    use chrono::Utc;
    use rand::Rng;

    fn scratch_path() -> PathBuf {
        let suffix: u64 = rand::thread_rng().gen();
        std::env::temp_dir().join(format!("gridgate-cli-{suffix}.json"))
    }

    fn config() -> AppConfig {
        AppConfig::load_from("/nonexistent/gridgate-config").unwrap()
    }

    #[test]
    fn test_cleanup_prunes_persisted_ledger() {
        let path = scratch_path();
        {
            let ledger = RegistrationLedger::new(Arc::new(JsonFileStore::open(&path).unwrap()));
            let stale = ledger.generate_request_id_at(Utc::now() - Duration::minutes(30));
            ledger.mark_request_processed(&stale).unwrap();
            ledger.generate_request_id();
        }

        assert_eq!(cleanup_ledger(&config(), &path).unwrap(), 1);

        let store = JsonFileStore::open(&path).unwrap();
        let ledger = RegistrationLedger::new(Arc::new(store));
        assert_eq!(ledger.requests().len(), 1);
        assert!(ledger.requests().iter().all(|r| !r.processed));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_unreadable_store_reports_path() {
        let dir = std::env::temp_dir();
        let err = cleanup_ledger(&config(), &dir).unwrap_err();

        assert!(matches!(err, GateError::Other(_)));
        assert!(err.to_string().contains("failed to open ledger store"));
    }

    #[test]
    fn test_show_on_missing_store_is_empty() {
        let path = scratch_path();
        show_ledger(&config(), &path).unwrap();
        assert!(!JsonFileStore::open(&path).unwrap().contains("registrationRequestTimestamps"));
    }
}
