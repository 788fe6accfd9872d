//! Health endpoint for the proxy process.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Upstream failures newer than this mark the proxy degraded.
const FAILURE_WINDOW_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamInfo {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub upstreams: Vec<UpstreamInfo>,
    pub requests_forwarded: u64,
    pub upstream_failures: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<DateTime<Utc>>,
}

/// Shared counters for the proxy
pub struct HealthState {
    pub started_at: DateTime<Utc>,
    pub upstreams: Vec<UpstreamInfo>,
    requests_forwarded: AtomicU64,
    upstream_failures: AtomicU64,
    last_failure: RwLock<Option<DateTime<Utc>>>,
}

impl HealthState {
    pub fn new(upstreams: Vec<UpstreamInfo>) -> Self {
        Self {
            started_at: Utc::now(),
            upstreams,
            requests_forwarded: AtomicU64::new(0),
            upstream_failures: AtomicU64::new(0),
            last_failure: RwLock::new(None),
        }
    }

    pub fn record_forwarded(&self) {
        self.requests_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn record_failure(&self) {
        self.upstream_failures.fetch_add(1, Ordering::Relaxed);
        *self.last_failure.write().await = Some(Utc::now());
    }

    pub async fn get_health(&self) -> HealthResponse {
        let now = Utc::now();
        let last_failure = *self.last_failure.read().await;
        let status = match last_failure {
            Some(at) if now - at < Duration::seconds(FAILURE_WINDOW_SECS) => HealthStatus::Degraded,
            _ => HealthStatus::Healthy,
        };

        HealthResponse {
            status,
            timestamp: now,
            uptime_seconds: (now - self.started_at).num_seconds().max(0) as u64,
            upstreams: self.upstreams.clone(),
            requests_forwarded: self.requests_forwarded.load(Ordering::Relaxed),
            upstream_failures: self.upstream_failures.load(Ordering::Relaxed),
            last_failure,
        }
    }
}

/// Degraded still answers 200: the proxy itself is up.
pub async fn health_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.get_health().await))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recent_failure_degrades() {
        let state = HealthState::new(vec![]);
        assert_eq!(state.get_health().await.status, HealthStatus::Healthy);

        state.record_forwarded();
        state.record_failure().await;
        let health = state.get_health().await;
        assert_eq!(health.status, HealthStatus::Degraded);
        assert_eq!(health.requests_forwarded, 1);
        assert_eq!(health.upstream_failures, 1);
        assert!(health.last_failure.is_some());
    }
}
