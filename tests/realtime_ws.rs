//! End-to-end tests using a real WebSocket client against a served router.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};

use opspulse::auth::{AuthError, IdentityService, TokenVerifier};
use opspulse::provider::{MetricPoint, ProviderError, RealtimeDataProvider};
use opspulse::websocket::SessionRegistry;
use opspulse::{build_router, AppState, Config, PushScheduler};

const SECRET: &str = "integration-secret";
const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

// ── Mock Collaborators ──

/// Maps "alice" to "acme.com" and everyone else to no company
struct DirectoryIdentity;

#[async_trait]
impl IdentityService for DirectoryIdentity {
    async fn resolve_company_scope(
        &self,
        identity: &str,
        _role: &str,
        _token: &str,
    ) -> Result<Option<String>, AuthError> {
        Ok((identity == "alice").then(|| "acme.com".to_string()))
    }
}

#[derive(Default)]
struct CountingProvider {
    calls: AtomicUsize,
}

#[async_trait]
impl RealtimeDataProvider for CountingProvider {
    async fn fetch_realtime(
        &self,
        _company: &str,
        measurement: &str,
        _gateway_id: &str,
    ) -> Result<Vec<MetricPoint>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if measurement == "broken" {
            return Err(ProviderError::Unavailable("query layer down".to_string()));
        }
        Ok(vec![MetricPoint::new(1_700_000_000_000).field("usage_idle", 42.5)])
    }
}

struct TestServer {
    base: String,
    registry: Arc<SessionRegistry>,
    scheduler: Arc<PushScheduler>,
    provider: Arc<CountingProvider>,
}

/// Boot a router on an ephemeral port
async fn boot_server() -> TestServer {
    boot_server_with(|_| {}).await
}

async fn boot_server_with(configure: impl FnOnce(&mut Config)) -> TestServer {
    let mut config = Config::default();
    config.auth.jwt_secret = SECRET.to_string();
    configure(&mut config);

    let provider = Arc::new(CountingProvider::default());
    let state = AppState::new(&config, provider.clone(), Arc::new(DirectoryIdentity));
    let registry = Arc::clone(&state.registry);
    let scheduler = Arc::clone(&state.scheduler);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = build_router(state, &[]);
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestServer {
        base: format!("ws://{addr}/api/v1/ws"),
        registry,
        scheduler,
        provider,
    }
}

fn token(sub: &str) -> String {
    TokenVerifier::new(SECRET).issue(sub, "user", 300).unwrap()
}

async fn connect(server: &TestServer, sub: &str) -> WsStream {
    let url = format!("{}?accessToken={}", server.base, token(sub));
    let (ws, _response) = connect_async(url).await.unwrap();
    ws
}

async fn send(ws: &mut WsStream, value: Value) {
    ws.send(Message::Text(value.to_string())).await.unwrap();
}

/// Next JSON text frame, skipping control frames
async fn recv(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn wait_for<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached");
}

fn handshake_status(err: tungstenite::Error) -> u16 {
    match err {
        tungstenite::Error::Http(response) => response.status().as_u16(),
        other => panic!("Expected HTTP rejection, got {:?}", other),
    }
}

// ── Handshake ──

#[tokio::test]
async fn test_handshake_without_token_is_rejected() {
    let server = boot_server().await;

    let err = connect_async(server.base.clone()).await.unwrap_err();

    assert_eq!(handshake_status(err), 401);
    assert_eq!(server.registry.session_count().await, 0);
}

#[tokio::test]
async fn test_handshake_with_bad_signature_is_rejected() {
    let server = boot_server().await;
    let forged = TokenVerifier::new("other-secret")
        .issue("alice", "user", 300)
        .unwrap();

    let err = connect_async(format!("{}?token={}", server.base, forged))
        .await
        .unwrap_err();

    assert_eq!(handshake_status(err), 401);
}

#[tokio::test]
async fn test_handshake_without_company_is_rejected() {
    let server = boot_server().await;

    let err = connect_async(format!("{}?accessToken={}", server.base, token("mallory")))
        .await
        .unwrap_err();

    assert_eq!(handshake_status(err), 401);
    assert_eq!(server.registry.session_count().await, 0);
}

#[tokio::test]
async fn test_handshake_over_session_limit_is_rejected() {
    let server = boot_server_with(|config| config.realtime.max_sessions = 1).await;
    let mut first = connect(&server, "alice").await;
    assert_eq!(recv(&mut first).await["type"], "connection");

    let err = connect_async(format!("{}?accessToken={}", server.base, token("alice")))
        .await
        .unwrap_err();

    assert_eq!(handshake_status(err), 503);
    assert_eq!(server.registry.session_count().await, 1);

    // The admitted session is unaffected
    send(&mut first, json!({"action": "ping"})).await;
    assert_eq!(recv(&mut first).await["type"], "pong");
}

// ── Session lifecycle ──

#[tokio::test]
async fn test_connect_greets_with_normalized_company() {
    let server = boot_server().await;
    let mut ws = connect(&server, "alice").await;

    let hello = recv(&mut ws).await;
    assert_eq!(hello["type"], "connection");
    assert_eq!(hello["status"], "success");
    assert_eq!(hello["company"], "acme");
    assert!(hello["extra"]["sessionId"].is_string());

    assert_eq!(server.registry.company_session_count("acme").await, 1);
}

#[tokio::test]
async fn test_ping_pong() {
    let server = boot_server().await;
    let mut ws = connect(&server, "alice").await;
    recv(&mut ws).await;

    send(&mut ws, json!({"action": "ping"})).await;

    let pong = recv(&mut ws).await;
    assert_eq!(pong["type"], "pong");
}

#[tokio::test]
async fn test_subscribe_acks_then_pushes() {
    let server = boot_server().await;
    let mut ws = connect(&server, "alice").await;
    recv(&mut ws).await;

    send(
        &mut ws,
        json!({"action": "subscribe", "measurement": "cpu", "gatewayId": "gw-1", "interval": 5}),
    )
    .await;

    let ack = recv(&mut ws).await;
    assert_eq!(ack["type"], "subscribe");
    assert_eq!(ack["gatewayId"], "gw-1");
    assert_eq!(ack["data"]["interval"], 5);

    let push = recv(&mut ws).await;
    assert_eq!(push["type"], "realtime");
    assert_eq!(push["company"], "acme");
    assert_eq!(push["measurement"], "cpu");
    assert_eq!(push["data"][0]["usage_idle"], 42.5);

    assert_eq!(server.scheduler.job_count().await, 1);
}

#[tokio::test]
async fn test_out_of_range_interval_is_rejected() {
    let server = boot_server().await;
    let mut ws = connect(&server, "alice").await;
    recv(&mut ws).await;

    send(
        &mut ws,
        json!({"action": "subscribe", "measurement": "cpu", "gatewayId": "gw-1", "interval": 3}),
    )
    .await;

    let err = recv(&mut ws).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["status"], "error");
    assert_eq!(server.scheduler.job_count().await, 0);

    // Connection stays usable
    send(&mut ws, json!({"action": "ping"})).await;
    assert_eq!(recv(&mut ws).await["type"], "pong");
}

#[tokio::test]
async fn test_provider_failure_keeps_subscription() {
    let server = boot_server().await;
    let mut ws = connect(&server, "alice").await;
    recv(&mut ws).await;

    send(
        &mut ws,
        json!({"action": "subscribe", "measurement": "broken", "gatewayId": "gw-1"}),
    )
    .await;

    assert_eq!(recv(&mut ws).await["type"], "subscribe");
    let err = recv(&mut ws).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["measurement"], "broken");
    assert_eq!(server.scheduler.job_count().await, 1);
}

#[tokio::test]
async fn test_unsubscribe_stops_job() {
    let server = boot_server().await;
    let mut ws = connect(&server, "alice").await;
    recv(&mut ws).await;

    send(
        &mut ws,
        json!({"action": "subscribe", "measurement": "cpu", "gatewayId": "gw-1", "interval": 60}),
    )
    .await;
    assert_eq!(recv(&mut ws).await["type"], "subscribe");
    assert_eq!(recv(&mut ws).await["type"], "realtime");

    send(&mut ws, json!({"action": "unsubscribe"})).await;

    let ack = recv(&mut ws).await;
    assert_eq!(ack["type"], "unsubscribe");
    assert_eq!(ack["measurement"], "cpu");
    assert_eq!(server.scheduler.job_count().await, 0);
    assert_eq!(server.registry.topic_count().await, 0);
}

#[tokio::test]
async fn test_client_close_tears_down_session() {
    let server = boot_server().await;
    let mut ws = connect(&server, "alice").await;
    recv(&mut ws).await;

    send(
        &mut ws,
        json!({"action": "subscribe", "measurement": "cpu", "gatewayId": "gw-1", "interval": 60}),
    )
    .await;
    assert_eq!(recv(&mut ws).await["type"], "subscribe");
    assert_eq!(recv(&mut ws).await["type"], "realtime");

    ws.close(None).await.unwrap();
    drop(ws);

    let registry = Arc::clone(&server.registry);
    wait_for(|| {
        let registry = Arc::clone(&registry);
        async move { registry.session_count().await == 0 }
    })
    .await;

    assert_eq!(server.scheduler.job_count().await, 0);
    assert_eq!(server.registry.topic_count().await, 0);

    // No ticks after teardown
    let calls = server.provider.calls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.provider.calls.load(Ordering::SeqCst), calls);
}

#[tokio::test]
async fn test_companies_are_isolated() {
    let server = boot_server().await;
    let mut ws = connect(&server, "alice").await;
    recv(&mut ws).await;

    let delivered = server
        .registry
        .send_to_company("globex", &opspulse::Envelope::notice(Some("globex"), "hi"))
        .await;
    assert_eq!(delivered, 0);

    let delivered = server
        .registry
        .send_to_company("acme", &opspulse::Envelope::notice(Some("acme"), "hi"))
        .await;
    assert_eq!(delivered, 1);

    let notice = recv(&mut ws).await;
    assert_eq!(notice["type"], "connection");
    assert_eq!(notice["message"], "hi");
}
