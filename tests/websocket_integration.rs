//! End-to-end tests for the WebSocket push channel using a real client.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tower::util::ServiceExt;

use chatline::api::{build_router, serve_on, AppState};
use chatline::auth::Claims;
use chatline::config::Config;
use chatline::store::ChatStore;
use chatline::types::{ConversationId, UserId};

const SECRET: &str = "integration-secret";
const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

struct TestServer {
    addr: SocketAddr,
    state: AppState,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    async fn start() -> Self {
        let store = Arc::new(ChatStore::open_in_memory().unwrap());
        let mut config = Config::default();
        config.auth.jwt_secret = SECRET.to_string();
        let state = AppState::new(store, config);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();

        tokio::spawn(serve_on(listener, state.clone(), async move {
            let _ = rx.await;
        }));

        Self {
            addr,
            state,
            shutdown: Some(tx),
        }
    }

    fn ws_url(&self, conversation: &str) -> String {
        format!("ws://{}/api/v1/ws/{}", self.addr, conversation)
    }

    fn conversation(&self, a: UserId, b: UserId) -> ConversationId {
        self.state
            .store
            .create_conversation(a, "integration", &[b])
            .unwrap()
            .conversation
            .id
    }

    /// Send a message through the REST route sharing this server's state
    async fn post_message(&self, sender: UserId, conversation: ConversationId, body: &str) {
        let response = build_router(self.state.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/v1/messages/{}", conversation))
                    .header(header::AUTHORIZATION, format!("Bearer {}", token(sender)))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(json!({ "body": body }).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    async fn wait_for_connections(&self, expected: usize) {
        let hub = Arc::clone(&self.state.hub);
        timeout(TIMEOUT, async move {
            while hub.connection_count() != expected {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("hub never reached {} connections", expected));
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

fn token(user: UserId) -> String {
    let now = chrono::Utc::now().timestamp() as u64;
    let claims = Claims {
        sub: user.to_string(),
        username: None,
        exp: now + 3600,
        iat: now,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

async fn connect_with_header(url: &str, bearer: Option<&str>) -> Result<WsStream, WsError> {
    let mut request = url.into_client_request().unwrap();
    if let Some(bearer) = bearer {
        request.headers_mut().insert(
            "Authorization",
            HeaderValue::from_str(&format!("Bearer {}", bearer)).unwrap(),
        );
    }
    connect_async(request).await.map(|(ws, _)| ws)
}

fn rejected_status(result: Result<WsStream, WsError>) -> u16 {
    match result {
        Err(WsError::Http(response)) => response.status().as_u16(),
        Err(other) => panic!("Expected HTTP rejection, got {:?}", other),
        Ok(_) => panic!("Expected HTTP rejection, connection was upgraded"),
    }
}

/// Next text frame as JSON, skipping keep-alive frames
async fn next_event(ws: &mut WsStream) -> Value {
    loop {
        let frame = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for event")
            .expect("stream ended")
            .expect("transport error");
        match frame {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("Unexpected frame {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_missing_credential_is_rejected_with_401() {
    let server = TestServer::start().await;
    let (alice, bob) = (UserId::new(), UserId::new());
    let cid = server.conversation(alice, bob);

    let status = rejected_status(connect_with_header(&server.ws_url(&cid.to_string()), None).await);

    assert_eq!(status, 401);
    assert_eq!(server.state.hub.room_count(), 0);
}

#[tokio::test]
async fn test_invalid_credential_is_rejected_with_401() {
    let server = TestServer::start().await;
    let (alice, bob) = (UserId::new(), UserId::new());
    let cid = server.conversation(alice, bob);

    let status = rejected_status(
        connect_with_header(&server.ws_url(&cid.to_string()), Some("not-a-jwt")).await,
    );

    assert_eq!(status, 401);
    assert_eq!(server.state.hub.room_count(), 0);
}

#[tokio::test]
async fn test_malformed_conversation_id_is_rejected_with_400() {
    let server = TestServer::start().await;
    let alice = UserId::new();

    let status = rejected_status(
        connect_with_header(&server.ws_url("definitely-not-an-id"), Some(&token(alice))).await,
    );

    assert_eq!(status, 400);
    assert_eq!(server.state.hub.room_count(), 0);
}

#[tokio::test]
async fn test_non_member_is_rejected_with_403() {
    let server = TestServer::start().await;
    let (alice, bob, mallory) = (UserId::new(), UserId::new(), UserId::new());
    let cid = server.conversation(alice, bob);

    let status = rejected_status(
        connect_with_header(&server.ws_url(&cid.to_string()), Some(&token(mallory))).await,
    );

    assert_eq!(status, 403);
    assert_eq!(server.state.hub.room_count(), 0);
}

#[tokio::test]
async fn test_member_receives_messages_in_publish_order() {
    let server = TestServer::start().await;
    let (alice, bob) = (UserId::new(), UserId::new());
    let cid = server.conversation(alice, bob);

    let mut ws = connect_with_header(&server.ws_url(&cid.to_string()), Some(&token(bob)))
        .await
        .unwrap();
    server.wait_for_connections(1).await;

    server.post_message(alice, cid, "A").await;
    server.post_message(alice, cid, "B").await;

    let first = next_event(&mut ws).await;
    assert_eq!(first["type"], "message.created");
    assert_eq!(first["conversation_id"], cid.to_string());
    assert_eq!(first["payload"]["body"], "A");
    assert_eq!(first["payload"]["sender_id"], alice.to_string());
    assert_eq!(first["payload"]["type"], "text");

    let second = next_event(&mut ws).await;
    assert_eq!(second["payload"]["body"], "B");
}

#[tokio::test]
async fn test_events_stay_in_their_room() {
    let server = TestServer::start().await;
    let (alice, bob, carol) = (UserId::new(), UserId::new(), UserId::new());
    let with_bob = server.conversation(alice, bob);
    let with_carol = server.conversation(alice, carol);

    let mut bob_ws = connect_with_header(&server.ws_url(&with_bob.to_string()), Some(&token(bob)))
        .await
        .unwrap();
    server.wait_for_connections(1).await;

    server.post_message(alice, with_carol, "for carol only").await;
    server.post_message(alice, with_bob, "for bob").await;

    let event = next_event(&mut bob_ws).await;
    assert_eq!(event["conversation_id"], with_bob.to_string());
    assert_eq!(event["payload"]["body"], "for bob");
}

#[tokio::test]
async fn test_query_token_fallback() {
    let server = TestServer::start().await;
    let (alice, bob) = (UserId::new(), UserId::new());
    let cid = server.conversation(alice, bob);

    // A bad header token does not block a valid query token
    let url = format!("{}?token={}", server.ws_url(&cid.to_string()), token(bob));
    let mut ws = connect_with_header(&url, Some("stale-token")).await.unwrap();
    server.wait_for_connections(1).await;

    server.post_message(alice, cid, "via query token").await;
    assert_eq!(next_event(&mut ws).await["payload"]["body"], "via query token");
}

#[tokio::test]
async fn test_client_close_removes_connection_and_room() {
    let server = TestServer::start().await;
    let (alice, bob) = (UserId::new(), UserId::new());
    let cid = server.conversation(alice, bob);

    let mut ws = connect_with_header(&server.ws_url(&cid.to_string()), Some(&token(alice)))
        .await
        .unwrap();
    server.wait_for_connections(1).await;
    assert!(server.state.hub.contains_room(cid));

    ws.close(None).await.unwrap();
    server.wait_for_connections(0).await;

    assert!(!server.state.hub.contains_room(cid));
    // Publishing to the now empty room is a no-op
    server.post_message(bob, cid, "nobody listening").await;
}

#[tokio::test]
async fn test_receipt_updates_reach_other_members() {
    let server = TestServer::start().await;
    let (alice, bob) = (UserId::new(), UserId::new());
    let cid = server.conversation(alice, bob);

    let mut ws = connect_with_header(&server.ws_url(&cid.to_string()), Some(&token(alice)))
        .await
        .unwrap();
    server.wait_for_connections(1).await;

    let response = build_router(server.state.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/v1/conversations/{}/read", cid))
                .header(header::AUTHORIZATION, format!("Bearer {}", token(bob)))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "ts": 1_234 }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let event = next_event(&mut ws).await;
    assert_eq!(event["type"], "receipt.updated");
    assert_eq!(event["payload"]["user_id"], bob.to_string());
    assert_eq!(event["payload"]["last_read_ts"], 1_234);
}

#[tokio::test]
async fn test_shutdown_closes_open_connections() {
    let mut server = TestServer::start().await;
    let (alice, bob) = (UserId::new(), UserId::new());
    let cid = server.conversation(alice, bob);

    let mut ws = connect_with_header(&server.ws_url(&cid.to_string()), Some(&token(alice)))
        .await
        .unwrap();
    server.wait_for_connections(1).await;

    if let Some(tx) = server.shutdown.take() {
        tx.send(()).unwrap();
    }

    let closed = timeout(TIMEOUT, async {
        while let Some(frame) = ws.next().await {
            match frame {
                Ok(Message::Close(_)) | Err(_) => return,
                Ok(_) => continue,
            }
        }
    })
    .await;

    assert!(closed.is_ok(), "connection was not closed on shutdown");
    server.wait_for_connections(0).await;
}
