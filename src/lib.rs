pub mod adapters;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod storage;
pub mod strategy;

pub use config::AppConfig;
pub use domain::{AccountSession, AccountStatus, ApiKeyRecord, KeyOptions, RegistrationRequest};
pub use error::{GateError, Result};
pub use storage::{JsonFileStore, KeyValueStore, MemoryStore};
pub use strategy::{
    ApiKeyCheck, ApiKeyProvisioner, GuardState, GuardView, ProvisionOutcome, RegistrationLedger,
    StrategyGuard,
};
