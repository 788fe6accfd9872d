use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::RegistrationRequest;
use crate::error::Result;
use crate::storage::{KeyValueStore, PROCESSED_REQUESTS_KEY, REQUEST_TIMESTAMPS_KEY};

const SUFFIX_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const SUFFIX_LEN: usize = 9;

/// Ledger of registration attempts, used to avoid resubmitting the same
/// attempt when the guard re-evaluates after a reconnect or remount.
///
/// # Limitations
/// Request ids are `<epoch millis>-<random suffix>`. They identify attempts,
/// not payloads: two attempts to register the same account get different
/// ids, so this ledger cannot catch a retry that starts a fresh attempt.
/// Protection against concurrent submissions comes from the provisioner's
/// in-flight flag.
///
/// # Example
/// ```rust,ignore
/// let ledger = RegistrationLedger::new(store);
/// let id = ledger.generate_request_id();
///
/// if !ledger.is_request_processed(&id) {
///     // submit, then:
///     ledger.mark_request_processed(&id)?;
/// }
/// ```
pub struct RegistrationLedger {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl RegistrationLedger {
    /// Create a ledger with the default 5 minute retention
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_ttl(store, Duration::minutes(5))
    }

    pub fn with_ttl(store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Start a new attempt and return its id.
    pub fn generate_request_id(&self) -> String {
        self.generate_request_id_at(Utc::now())
    }

    pub fn generate_request_id_at(&self, now: DateTime<Utc>) -> String {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..SUFFIX_LEN)
            .map(|_| SUFFIX_CHARSET[rng.gen_range(0..SUFFIX_CHARSET.len())] as char)
            .collect();
        let created_at = now.timestamp_millis();
        let id = format!("{}-{}", created_at, suffix);

        let mut timestamps = self.load_timestamps();
        timestamps.insert(id.clone(), created_at);
        // The id stays usable even if the timestamp cannot be stored; cleanup
        // falls back to the millis prefix.
        if let Err(e) = self.save_timestamps(&timestamps) {
            warn!(request_id = %id, error = %e, "failed to record registration request timestamp");
        }

        debug!(request_id = %id, "new registration request");
        id
    }

    pub fn is_request_processed(&self, request_id: &str) -> bool {
        self.load_processed().iter().any(|id| id == request_id)
    }

    pub fn mark_request_processed(&self, request_id: &str) -> Result<()> {
        let mut processed = self.load_processed();
        if processed.iter().any(|id| id == request_id) {
            return Ok(());
        }
        processed.push(request_id.to_string());
        self.store
            .set(PROCESSED_REQUESTS_KEY, &serde_json::to_string(&processed)?)?;

        debug!(request_id, "marked registration request processed");
        Ok(())
    }

    /// Drop entries older than the retention window.
    ///
    /// Returns the number of request ids removed.
    pub fn cleanup_expired_requests(&self) -> Result<usize> {
        self.cleanup_expired_requests_at(Utc::now())
    }

    pub fn cleanup_expired_requests_at(&self, now: DateTime<Utc>) -> Result<usize> {
        let now_ms = now.timestamp_millis();
        let ttl_ms = self.ttl.num_milliseconds();
        let is_expired = |created_at: i64| now_ms.saturating_sub(created_at) > ttl_ms;

        let mut timestamps = self.load_timestamps();
        let mut processed = self.load_processed();
        let mut removed = BTreeSet::new();

        for (id, created_at) in &timestamps {
            if is_expired(*created_at) {
                removed.insert(id.clone());
            }
        }

        processed.retain(|id| {
            let created_at = timestamps
                .get(id)
                .copied()
                .or_else(|| created_at_from_id(id));
            match created_at {
                Some(ts) if !is_expired(ts) => true,
                _ => {
                    removed.insert(id.clone());
                    false
                }
            }
        });

        if removed.is_empty() {
            return Ok(0);
        }

        timestamps.retain(|id, _| !removed.contains(id));
        self.save_timestamps(&timestamps)?;
        self.store
            .set(PROCESSED_REQUESTS_KEY, &serde_json::to_string(&processed)?)?;

        info!("Cleaned up {} expired registration requests", removed.len());
        Ok(removed.len())
    }

    /// Look up a single attempt.
    pub fn request(&self, request_id: &str) -> Option<RegistrationRequest> {
        let processed = self.is_request_processed(request_id);
        let created_at = self
            .load_timestamps()
            .get(request_id)
            .copied()
            .or_else(|| created_at_from_id(request_id))?;

        Some(RegistrationRequest {
            request_id: request_id.to_string(),
            created_at,
            processed,
        })
    }

    /// Every attempt the ledger still knows about, oldest first.
    pub fn requests(&self) -> Vec<RegistrationRequest> {
        let timestamps = self.load_timestamps();
        let processed = self.load_processed();

        let mut ids: BTreeSet<&String> = timestamps.keys().collect();
        ids.extend(processed.iter());

        let mut requests: Vec<RegistrationRequest> = ids
            .into_iter()
            .filter_map(|id| {
                let created_at = timestamps
                    .get(id)
                    .copied()
                    .or_else(|| created_at_from_id(id))?;
                Some(RegistrationRequest {
                    request_id: id.clone(),
                    created_at,
                    processed: processed.contains(id),
                })
            })
            .collect();
        requests.sort_by_key(|r| r.created_at);
        requests
    }

    fn load_processed(&self) -> Vec<String> {
        let Some(raw) = self.store.get(PROCESSED_REQUESTS_KEY) else {
            return Vec::new();
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(error = %e, "ignoring unreadable processed request list");
            Vec::new()
        })
    }

    fn load_timestamps(&self) -> BTreeMap<String, i64> {
        let Some(raw) = self.store.get(REQUEST_TIMESTAMPS_KEY) else {
            return BTreeMap::new();
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(error = %e, "ignoring unreadable request timestamp map");
            BTreeMap::new()
        })
    }

    fn save_timestamps(&self, timestamps: &BTreeMap<String, i64>) -> Result<()> {
        self.store
            .set(REQUEST_TIMESTAMPS_KEY, &serde_json::to_string(timestamps)?)
    }
}

fn created_at_from_id(request_id: &str) -> Option<i64> {
    request_id
        .split_once('-')
        .and_then(|(millis, _)| millis.parse().ok())
}
