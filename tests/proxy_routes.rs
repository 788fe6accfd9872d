use axum::body::{to_bytes, Body, Bytes};
use axum::http::{header, HeaderMap, Method, Request, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::{Json, Router};
use gridgate::services::{create_router, ProxyState};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceExt;

async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> impl IntoResponse {
    let read = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let payload = json!({
        "method": method.as_str(),
        "uri": uri.to_string(),
        "host": read("host"),
        "x_request_tag": read("x-request-tag"),
        "body": String::from_utf8_lossy(&body),
    });
    (
        [
            ("access-control-allow-origin", "https://upstream.example"),
            ("x-upstream", "echo"),
        ],
        Json(payload),
    )
}

async fn spawn_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().fallback(echo);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn proxy(grid_url: &str, referral_url: &str) -> Router {
    let state = ProxyState::new(grid_url, referral_url, Duration::from_secs(5)).unwrap();
    create_router(state)
}

async fn json_body(resp: axum::response::Response) -> Value {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn grid_request_is_forwarded_verbatim() {
    let upstream = spawn_upstream().await;
    let app = proxy(&format!("http://{upstream}/"), "http://127.0.0.1:1");

    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/proxy/grid/bot/enable?dry_run=1&tag=a%20b")
                .header(header::HOST, "console.example.com")
                .header("x-request-tag", "abc")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"user_id":"acct_1"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get("x-upstream").unwrap(), "echo");
    let body = json_body(resp).await;
    assert_eq!(body["method"], "POST");
    assert_eq!(body["uri"], "/bot/enable?dry_run=1&tag=a%20b");
    assert_eq!(body["host"], upstream.to_string());
    assert_eq!(body["x_request_tag"], "abc");
    assert_eq!(body["body"], r#"{"user_id":"acct_1"}"#);
}

#[tokio::test]
async fn referral_prefix_routes_to_referral_upstream() {
    let upstream = spawn_upstream().await;
    let app = proxy("http://127.0.0.1:1", &format!("http://{upstream}"));

    let resp = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/proxy/referral/codes/ABC123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["method"], "DELETE");
    assert_eq!(body["uri"], "/codes/ABC123");
}

#[tokio::test]
async fn cors_headers_replace_upstream_ones() {
    let upstream = spawn_upstream().await;
    let app = proxy(&format!("http://{upstream}"), "http://127.0.0.1:1");

    let resp = app
        .oneshot(
            Request::builder()
                .uri("/api/proxy/grid/users/acct_1")
                .header(header::ORIGIN, "https://console.example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let origins: Vec<_> = resp
        .headers()
        .get_all(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .iter()
        .collect();
    assert_eq!(origins, vec!["*"]);
}

#[tokio::test]
async fn preflight_is_answered_locally() {
    let app = proxy("http://127.0.0.1:1", "http://127.0.0.1:1");

    let resp = app
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/api/proxy/grid/bot/enable")
                .header(header::ORIGIN, "https://console.example.com")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "*"
    );
}

#[tokio::test]
async fn unreachable_upstream_returns_bad_gateway() {
    let state = ProxyState::new("http://127.0.0.1:1", "http://127.0.0.1:1", Duration::from_secs(2)).unwrap();
    let health = state.health();
    let app = create_router(state);

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/proxy/grid/users/acct_1/api-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    let body = json_body(resp).await;
    assert_eq!(body["error"], "Proxy request failed");
    assert!(body["message"].as_str().is_some_and(|m| !m.is_empty()));

    let report = health.get_health().await;
    assert_eq!(report.upstream_failures, 1);
    assert_eq!(report.requests_forwarded, 0);

    let resp = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["upstreams"][0]["name"], "grid");
}

#[tokio::test]
async fn unknown_paths_are_not_proxied() {
    let app = proxy("http://127.0.0.1:1", "http://127.0.0.1:1");

    let resp = app
        .oneshot(Request::builder().uri("/api/other/thing").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
