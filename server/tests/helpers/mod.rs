//! Reusable test helpers for HTTP integration tests.
//!
//! Provides `TestApp` for building and sending requests through the full axum
//! router backed by in-memory stores, helpers that produce correctly signed and
//! encrypted callbacks, and a spawnable relay target that records what it receives.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{self, Method, Request, Response, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use http_body_util::BodyExt;
use serde_json::Value;
use tokio::task::JoinHandle;
use tower::ServiceExt;
use uuid::Uuid;
use wx_crypto::{compute_signature, PayloadCodec};
use wx_relay_server::api::{create_router, AppState};
use wx_relay_server::audit::{AuditLog, AuditRecord, InMemoryAuditSink, LogBroadcaster};
use wx_relay_server::callback::xml::{encrypted_envelope, serialize_event};
use wx_relay_server::callback::{DecryptedEvent, RelayDispatcher};
use wx_relay_server::config::Config;
use wx_relay_server::connections::{Connection, InMemoryConnectionStore};

pub const CORP_ID: &str = "wx5823bf96d3bd56c7";
pub const AGENT_ID: &str = "1000002";
pub const TOKEN: &str = "QDG6eK";
pub const ENCODING_AES_KEY: &str = "jWmYm7qr5nMoAUwZRjGtBxmz3KA1tkAj3ykkR6q2B2C";
pub const TIMESTAMP: &str = "1409659813";
pub const NONCE: &str = "1372623149";

// ============================================================================
// Test App
// ============================================================================

/// A test application wrapping the full axum router.
pub struct TestApp {
    pub router: Router,
    pub connections: Arc<InMemoryConnectionStore>,
    pub audit_sink: Arc<InMemoryAuditSink>,
    pub broadcaster: LogBroadcaster,
}

impl TestApp {
    /// Create a test app with no registered connections.
    pub fn new() -> Self {
        let config = Config::default_for_test();
        let connections = Arc::new(InMemoryConnectionStore::new());
        let audit_sink = Arc::new(InMemoryAuditSink::new());
        let broadcaster = LogBroadcaster::new();
        let relay = RelayDispatcher::new(
            config.relay_timeout(),
            config.relay_block_private_addresses,
        )
        .expect("Failed to build relay client");

        let state = AppState::new(
            connections.clone(),
            AuditLog::new(audit_sink.clone(), broadcaster.clone()),
            relay,
            config,
        );

        Self {
            router: create_router(state),
            connections,
            audit_sink,
            broadcaster,
        }
    }

    /// Create a test app with the standard test connection registered.
    pub fn with_connection(relay_url: Option<String>) -> (Self, Connection) {
        let app = Self::new();
        let connection = test_connection(relay_url);
        app.connections.insert(connection.clone());
        (app, connection)
    }

    /// Build an HTTP request with the given method and URI.
    pub fn request(method: Method, uri: &str) -> http::request::Builder {
        Request::builder().method(method).uri(uri)
    }

    /// Send a request through the router via `tower::ServiceExt::oneshot`.
    pub async fn oneshot(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("oneshot request failed")
    }

    /// POST a signed callback to `/callback/{corp}/{agent}`.
    pub async fn post_callback(&self, callback: &SignedCallback) -> Response<Body> {
        self.post_callback_at("/callback", callback).await
    }

    /// POST a signed callback under the given route prefix.
    pub async fn post_callback_at(&self, prefix: &str, callback: &SignedCallback) -> Response<Body> {
        let uri = callback_uri(
            prefix,
            &[
                ("msg_signature", callback.signature.as_str()),
                ("timestamp", TIMESTAMP),
                ("nonce", NONCE),
            ],
        );
        self.oneshot(
            Self::request(Method::POST, &uri)
                .header("content-type", "text/xml")
                .body(Body::from(callback.body.clone()))
                .unwrap(),
        )
        .await
    }

    /// Snapshot of every audit record written so far.
    pub fn audit_records(&self) -> Vec<AuditRecord> {
        self.audit_sink.records()
    }
}

/// The standard test connection.
pub fn test_connection(relay_url: Option<String>) -> Connection {
    Connection {
        id: Uuid::now_v7(),
        name: "Test Agent".into(),
        corp_id: CORP_ID.into(),
        agent_id: AGENT_ID.into(),
        token: TOKEN.into(),
        encoding_aes_key: ENCODING_AES_KEY.into(),
        relay_url,
    }
}

/// `{prefix}/{CORP_ID}/{AGENT_ID}?...` with URL-encoded parameters.
pub fn callback_uri(prefix: &str, params: &[(&str, &str)]) -> String {
    let url = reqwest::Url::parse_with_params(
        &format!("http://localhost{prefix}/{CORP_ID}/{AGENT_ID}"),
        params,
    )
    .expect("valid callback URL");
    match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_string(),
    }
}

// ============================================================================
// Callback builders
// ============================================================================

/// An encrypted callback body and the signature the platform would send with it.
pub struct SignedCallback {
    pub encrypted: String,
    pub signature: String,
    pub body: String,
}

/// Encrypt raw plaintext for the test tenant and sign it.
pub fn sign_plaintext(plaintext: &str) -> SignedCallback {
    sign_plaintext_for(CORP_ID, plaintext)
}

/// Encrypt plaintext addressed to `receiver` (normally the corp id) and sign it.
pub fn sign_plaintext_for(receiver: &str, plaintext: &str) -> SignedCallback {
    let codec = PayloadCodec::new(ENCODING_AES_KEY, receiver).expect("valid test key");
    let encrypted = codec.encrypt(plaintext).expect("encryption failed");
    let signature = compute_signature(TOKEN, TIMESTAMP, NONCE, &encrypted);
    let body = encrypted_envelope(CORP_ID, AGENT_ID, &encrypted);
    SignedCallback {
        encrypted,
        signature,
        body,
    }
}

/// Encrypt and sign an event.
pub fn sign_event(event: &DecryptedEvent) -> SignedCallback {
    sign_plaintext(&serialize_event(event))
}

pub fn text_event(content: &str) -> DecryptedEvent {
    DecryptedEvent {
        to_user: CORP_ID.into(),
        from_user: "zhangsan".into(),
        create_time: "1348831860".into(),
        msg_type: "text".into(),
        content: content.into(),
        msg_id: "1234567890123456".into(),
        agent_id: AGENT_ID.into(),
        ..DecryptedEvent::default()
    }
}

pub fn click_event(event_key: &str) -> DecryptedEvent {
    DecryptedEvent {
        to_user: CORP_ID.into(),
        from_user: "zhangsan".into(),
        create_time: "1348831860".into(),
        msg_type: "event".into(),
        agent_id: AGENT_ID.into(),
        event: Some("click".into()),
        event_key: Some(event_key.into()),
        ..DecryptedEvent::default()
    }
}

/// Collect a response body into a string.
pub async fn body_string(response: Response<Body>) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to read body")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("body is not UTF-8")
}

/// Collect a response body as JSON.
pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_str(&body_string(response).await).expect("body is not JSON")
}

// ============================================================================
// Test Server
// ============================================================================

/// A running test server bound to a random port.
pub struct TestServer {
    /// Server address (127.0.0.1:PORT).
    pub addr: SocketAddr,
    /// Base URL for HTTP requests (e.g., `http://127.0.0.1:12345`).
    pub url: String,
    /// Handle to the server task for cleanup.
    _handle: JoinHandle<()>,
}

/// Spawn a real HTTP server on a random port.
pub async fn spawn_test_server(router: Router) -> TestServer {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let addr = listener.local_addr().expect("Failed to get local addr");
    let url = format!("http://{addr}");

    let handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .await
            .expect("Test server failed");
    });

    TestServer {
        addr,
        url,
        _handle: handle,
    }
}

/// A relay target recording every JSON body it receives.
pub struct RelayTarget {
    pub server: TestServer,
    received: Arc<Mutex<Vec<Value>>>,
}

impl RelayTarget {
    /// URL the connection should relay to.
    pub fn webhook_url(&self) -> String {
        format!("{}/webhook", self.server.url)
    }

    /// Bodies received so far.
    pub fn received(&self) -> Vec<Value> {
        self.received.lock().unwrap().clone()
    }
}

#[derive(Clone)]
struct RelayTargetState {
    received: Arc<Mutex<Vec<Value>>>,
    status: StatusCode,
    delay: Duration,
}

async fn record_relay(
    State(state): State<RelayTargetState>,
    Json(body): Json<Value>,
) -> (StatusCode, &'static str) {
    state.received.lock().unwrap().push(body);
    tokio::time::sleep(state.delay).await;
    (state.status, "ok")
}

/// Spawn a relay target answering every POST with `status`.
pub async fn spawn_relay_target(status: StatusCode) -> RelayTarget {
    spawn_slow_relay_target(status, Duration::ZERO).await
}

/// Spawn a relay target that records each body, then waits `delay` before answering.
pub async fn spawn_slow_relay_target(status: StatusCode, delay: Duration) -> RelayTarget {
    let received = Arc::new(Mutex::new(Vec::new()));
    let router = Router::new()
        .route("/webhook", post(record_relay))
        .with_state(RelayTargetState {
            received: received.clone(),
            status,
            delay,
        });

    RelayTarget {
        server: spawn_test_server(router).await,
        received,
    }
}
