//! Pass-through proxy to the grid and referral backends.
//!
//! `/api/proxy/grid/*` and `/api/proxy/referral/*` are forwarded verbatim
//! (method, path, query, headers except `Host`, body). The browser only ever
//! talks to this origin, so responses get permissive CORS headers.

use axum::{
    body::to_bytes,
    extract::{FromRef, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, info};

use crate::config::AppConfig;
use crate::error::{GateError, Result};
use crate::services::health::{health_handler, HealthState, UpstreamInfo};

const GRID_PREFIX: &str = "/api/proxy/grid";
const REFERRAL_PREFIX: &str = "/api/proxy/referral";
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Response headers owned by this hop rather than the upstream.
const STRIPPED_RESPONSE_HEADERS: &[&str] = &["connection", "transfer-encoding", "content-length"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upstream {
    Grid,
    Referral,
}

impl Upstream {
    pub fn as_str(&self) -> &'static str {
        match self {
            Upstream::Grid => "grid",
            Upstream::Referral => "referral",
        }
    }

    fn prefix(&self) -> &'static str {
        match self {
            Upstream::Grid => GRID_PREFIX,
            Upstream::Referral => REFERRAL_PREFIX,
        }
    }
}

#[derive(Clone)]
pub struct ProxyState {
    http: reqwest::Client,
    grid_url: String,
    referral_url: String,
    health: Arc<HealthState>,
}

impl FromRef<ProxyState> for Arc<HealthState> {
    fn from_ref(state: &ProxyState) -> Self {
        Arc::clone(&state.health)
    }
}

impl ProxyState {
    pub fn new(grid_url: &str, referral_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| GateError::Internal(format!("failed to build proxy HTTP client: {}", e)))?;

        let grid_url = grid_url.trim_end_matches('/').to_string();
        let referral_url = referral_url.trim_end_matches('/').to_string();
        let health = Arc::new(HealthState::new(vec![
            UpstreamInfo {
                name: Upstream::Grid.as_str().to_string(),
                url: grid_url.clone(),
            },
            UpstreamInfo {
                name: Upstream::Referral.as_str().to_string(),
                url: referral_url.clone(),
            },
        ]));

        Ok(Self {
            http,
            grid_url,
            referral_url,
            health,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(
            &config.backend.grid_url,
            &config.backend.referral_url,
            Duration::from_millis(config.backend.timeout_ms),
        )
    }

    pub fn health(&self) -> Arc<HealthState> {
        Arc::clone(&self.health)
    }

    fn base_url(&self, upstream: Upstream) -> &str {
        match upstream {
            Upstream::Grid => &self.grid_url,
            Upstream::Referral => &self.referral_url,
        }
    }

    /// Upstream URL for an incoming request URI, keeping its original encoding.
    pub fn target_url(&self, upstream: Upstream, uri: &Uri) -> String {
        let rest = uri.path().strip_prefix(upstream.prefix()).unwrap_or_default();
        let mut target = format!("{}{}", self.base_url(upstream), rest);
        if let Some(query) = uri.query() {
            target.push('?');
            target.push_str(query);
        }
        target
    }
}

pub fn create_router(state: ProxyState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(GRID_PREFIX, any(proxy_grid))
        .route("/api/proxy/grid/*path", any(proxy_grid))
        .route(REFERRAL_PREFIX, any(proxy_referral))
        .route("/api/proxy/referral/*path", any(proxy_referral))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(cors)
}

async fn proxy_grid(State(state): State<ProxyState>, req: Request) -> Response {
    forward(&state, Upstream::Grid, req).await
}

async fn proxy_referral(State(state): State<ProxyState>, req: Request) -> Response {
    forward(&state, Upstream::Referral, req).await
}

async fn forward(state: &ProxyState, upstream: Upstream, req: Request) -> Response {
    let (parts, body) = req.into_parts();
    let target = state.target_url(upstream, &parts.uri);

    let body = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return proxy_error(StatusCode::PAYLOAD_TOO_LARGE, "Invalid request body", &e.to_string())
        }
    };

    let method = match reqwest::Method::from_bytes(parts.method.as_str().as_bytes()) {
        Ok(method) => method,
        Err(e) => return proxy_error(StatusCode::METHOD_NOT_ALLOWED, "Unsupported method", &e.to_string()),
    };

    debug!(upstream = upstream.as_str(), %method, %target, "forwarding request");

    let mut builder = state.http.request(method, &target);
    for (name, value) in parts.headers.iter() {
        if name == header::HOST {
            continue;
        }
        builder = builder.header(name.as_str(), value.as_bytes());
    }

    let result = async {
        let resp = builder.body(body).send().await?;
        let status = resp.status().as_u16();
        let headers = copy_response_headers(resp.headers());
        let bytes = resp.bytes().await?;
        Ok::<_, reqwest::Error>((status, headers, bytes))
    }
    .await;

    match result {
        Ok((status, headers, bytes)) => {
            state.health.record_forwarded();
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            (status, headers, bytes).into_response()
        }
        Err(e) => {
            state.health.record_failure().await;
            error!(upstream = upstream.as_str(), %target, error = %e, "proxy request failed");
            proxy_error(StatusCode::BAD_GATEWAY, "Proxy request failed", &e.to_string())
        }
    }
}

fn copy_response_headers(upstream: &reqwest::header::HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in upstream.iter() {
        let name = name.as_str();
        if STRIPPED_RESPONSE_HEADERS.contains(&name) || name.starts_with("access-control-") {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            headers.append(name, value);
        }
    }
    headers
}

fn proxy_error(status: StatusCode, error: &str, message: &str) -> Response {
    (status, Json(json!({ "error": error, "message": message }))).into_response()
}

/// Serve the proxy until Ctrl+C / SIGTERM
pub async fn start_proxy_server(config: &AppConfig) -> Result<()> {
    let state = ProxyState::from_config(config)?;
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.proxy.bind, config.proxy.port)
        .parse()
        .map_err(|e| GateError::Validation(format!("invalid proxy listen address: {}", e)))?;
    info!(
        grid = %config.backend.grid_url,
        referral = %config.backend.referral_url,
        "proxy listening on http://{}",
        addr
    );

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("proxy stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_url_keeps_path_and_query() {
        let state = ProxyState::new("http://grid:3001/", "http://referral:3002", Duration::from_secs(1)).unwrap();

        let uri: Uri = "/api/proxy/grid/bots/list%20all?user_id=acct_1".parse().unwrap();
        assert_eq!(
            state.target_url(Upstream::Grid, &uri),
            "http://grid:3001/bots/list%20all?user_id=acct_1"
        );

        let uri: Uri = "/api/proxy/referral".parse().unwrap();
        assert_eq!(state.target_url(Upstream::Referral, &uri), "http://referral:3002");
    }
}
