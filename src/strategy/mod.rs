//! Strategy surface access control
//!
//! - `ledger` - registration request ids with time-bounded retention
//! - `existence` - backend "does this account have a key" check
//! - `provisioning` - key generation + backend registration flow
//! - `guard` - state machine gating the strategy UI

pub mod existence;
pub mod guard;
pub mod ledger;
pub mod provisioning;

pub use existence::ApiKeyCheck;
pub use guard::{GuardState, GuardTransition, GuardView, StrategyGuard};
pub use ledger::RegistrationLedger;
pub use provisioning::{ApiKeyProvisioner, KeyParams, ProvisionOutcome};
