//! Key-value stores standing in for browser session/local storage.
//!
//! The ledger and the skip flag only ever see `dyn KeyValueStore`, so tests
//! inject a `MemoryStore` and the binary uses a `JsonFileStore` for state
//! that must survive restarts.

pub mod file;
pub mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use crate::error::Result;

/// Ids of registration requests already marked processed (JSON array).
pub const PROCESSED_REQUESTS_KEY: &str = "processedRegistrationRequests";
/// Request id -> creation time in epoch millis (JSON object).
pub const REQUEST_TIMESTAMPS_KEY: &str = "registrationRequestTimestamps";
/// Set to "true" once the user skipped API key creation.
pub const SKIP_APIKEY_CREATION_KEY: &str = "orderly_console_skip_apikey_creation";

/// String-keyed store with last-write-wins semantics.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}
