//! End-to-end tests against the development server
//!
//! Each test starts a `DevServer` on an ephemeral port and drives it through
//! the public session and realtime APIs.

use futures::{SinkExt, StreamExt};
use harvest::auth::{AuthClient, AuthError, AuthMode, DevToken, HttpAuthClient};
use harvest::realtime::{
    ChannelConfig, ConnectionState, DroneState, Envelope, RealtimeChannel, Topic, Update,
};
use harvest::server::{FeedGenerator, AUTH_ERROR, AUTH_OK};
use harvest::session::{Role, SessionStore};
use harvest::storage::{FileTokenStore, TokenStore};
use harvest::{DevServer, DevServerConfig};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;

const TEST_SECRET: &[u8] = b"test-secret-for-integration-tests";

struct Backend {
    addr: SocketAddr,
    publisher: broadcast::Sender<Envelope>,
}

impl Backend {
    async fn start(tick: Duration) -> Self {
        let server = DevServer::new(DevServerConfig {
            token_secret: TEST_SECRET.to_vec(),
            tick,
            ..DevServerConfig::default()
        });
        let publisher = server.publisher();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(server.serve(listener));

        Self { addr, publisher }
    }

    async fn quiet() -> Self {
        Self::start(Duration::ZERO).await
    }

    fn api_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    async fn session(&self, mode: AuthMode, dir: &Path) -> SessionStore {
        SessionStore::open(
            mode,
            Arc::new(HttpAuthClient::new(self.api_url())),
            Arc::new(FileTokenStore::new(dir)),
        )
        .await
    }

    async fn wait_for_clients(&self, count: usize) {
        eventually(|| self.publisher.receiver_count() == count).await;
    }
}

async fn eventually<F: Fn() -> bool>(condition: F) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn wait_for_state(channel: &RealtimeChannel, target: ConnectionState) {
    let mut rx = channel.state_receiver();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == target))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {:?}", target))
        .unwrap();
}

async fn next_envelope<S>(stream: &mut S) -> Envelope
where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("timed out waiting for server frame")
            .expect("server closed the connection")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

#[tokio::test]
async fn test_health() {
    let backend = Backend::quiet().await;

    let body = reqwest::get(format!("http://{}/health", backend.addr))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn test_strict_login_persists_signed_token() {
    let backend = Backend::quiet().await;
    let dir = tempfile::tempdir().unwrap();

    let session = backend.session(AuthMode::Strict, dir.path()).await;
    let user = session.login("farmer@demo.com", "demo123").await.unwrap();

    assert_eq!(user.id, "farmer-1");
    assert_eq!(user.name, "Mary Farmer");
    assert_eq!(user.role, Role::Farmer);

    let token = session.token().unwrap();
    let verified = DevToken::parse(&token, TEST_SECRET).unwrap();
    assert_eq!(verified.user_id(), "farmer-1");

    let stored = FileTokenStore::new(dir.path()).load().await.unwrap();
    assert_eq!(stored, Some(token.clone()));

    // A fresh process sees the token but not the profile
    let restored = backend.session(AuthMode::Strict, dir.path()).await;
    assert!(restored.is_authenticated());
    assert_eq!(restored.token(), Some(token));
    assert_eq!(restored.user(), None);
}

#[tokio::test]
async fn test_strict_login_wrong_password() {
    let backend = Backend::quiet().await;
    let dir = tempfile::tempdir().unwrap();

    let session = backend.session(AuthMode::Strict, dir.path()).await;
    let result = session.login("admin@demo.com", "not-the-password").await;

    assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    assert!(!session.is_authenticated());
    assert_eq!(FileTokenStore::new(dir.path()).load().await.unwrap(), None);
}

#[tokio::test]
async fn test_demo_login_wrong_password_falls_back() {
    let backend = Backend::quiet().await;
    let dir = tempfile::tempdir().unwrap();

    let session = backend.session(AuthMode::Demo, dir.path()).await;
    let user = session.login("operator@demo.com", "nope").await.unwrap();

    assert_eq!(user.id, "operator-1");
    assert_eq!(user.role, Role::DroneOperator);
    assert!(session.token().unwrap().starts_with("mock-jwt-token-"));
}

#[tokio::test]
async fn test_register_then_duplicate() {
    let backend = Backend::quiet().await;
    let dir = tempfile::tempdir().unwrap();

    let session = backend.session(AuthMode::Strict, dir.path()).await;
    let user = session
        .register("pilot@farm.io", "s3cret", "Sky Pilot", Role::DroneOperator)
        .await
        .unwrap();
    assert_eq!(user.name, "Sky Pilot");
    assert!(session.token().unwrap().starts_with("dev-"));

    // The new account can log in
    session.logout().await.unwrap();
    let again = session.login("pilot@farm.io", "s3cret").await.unwrap();
    assert_eq!(again.id, user.id);

    let other_dir = tempfile::tempdir().unwrap();
    let other = backend.session(AuthMode::Strict, other_dir.path()).await;
    let result = other
        .register("pilot@farm.io", "x", "Impostor", Role::Admin)
        .await;
    assert!(matches!(result, Err(AuthError::Rejected { status: 409 })));
}

#[tokio::test]
async fn test_demo_mode_without_backend() {
    // Reserve a port, then free it so nothing is listening there
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let dir = tempfile::tempdir().unwrap();
    let session = SessionStore::open(
        AuthMode::Demo,
        Arc::new(HttpAuthClient::new(format!("http://{}/api", addr))),
        Arc::new(FileTokenStore::new(dir.path())),
    )
    .await;

    let user = session.login("grower@farm.io", "whatever").await.unwrap();
    assert_eq!(user.name, "Grower");
    assert_eq!(user.role, Role::Farmer);

    let stored = FileTokenStore::new(dir.path()).load().await.unwrap().unwrap();
    assert!(stored.starts_with("mock-jwt-token-"));

    session.logout().await.unwrap();
    assert!(!session.is_authenticated());
    assert_eq!(FileTokenStore::new(dir.path()).load().await.unwrap(), None);
}

#[tokio::test]
async fn test_logout_with_server_token() {
    let backend = Backend::quiet().await;
    let dir = tempfile::tempdir().unwrap();

    let session = backend.session(AuthMode::Strict, dir.path()).await;
    session.login("security@demo.com", "demo123").await.unwrap();

    session.logout().await.unwrap();

    assert!(!session.is_authenticated());
    assert!(!dir.path().join("token").exists());
}

#[tokio::test]
async fn test_refresh_reissues_token_for_same_account() {
    let backend = Backend::quiet().await;
    let dir = tempfile::tempdir().unwrap();

    let session = backend.session(AuthMode::Strict, dir.path()).await;
    let user = session.login("admin@demo.com", "demo123").await.unwrap();
    let first = session.token().unwrap();

    // Issue time has millisecond resolution
    tokio::time::sleep(Duration::from_millis(5)).await;
    let refreshed = session.refresh().await.unwrap().unwrap();
    let second = session.token().unwrap();

    assert_eq!(refreshed.id, user.id);
    assert_ne!(first, second);
    let token = DevToken::parse(&second, TEST_SECRET).unwrap();
    assert_eq!(token.user_id(), user.id);
    assert_eq!(token.role(), Role::Admin);

    let stored = FileTokenStore::new(dir.path()).load().await.unwrap();
    assert_eq!(stored.as_deref(), Some(second.as_str()));
}

#[tokio::test]
async fn test_refresh_rejects_forged_token() {
    let backend = Backend::quiet().await;
    let client = HttpAuthClient::new(backend.api_url());

    let forged = DevToken::create("admin-1", Role::Admin, b"some-other-secret").unwrap();
    let result = client.refresh(forged.as_str()).await;
    assert!(matches!(result, Err(AuthError::InvalidCredentials)));

    let result = client.refresh("mock-jwt-token-1").await;
    assert!(matches!(result, Err(AuthError::InvalidCredentials)));
}

#[tokio::test]
async fn test_channel_authenticates_with_session_and_receives_updates() {
    let backend = Backend::quiet().await;
    let dir = tempfile::tempdir().unwrap();

    let session = Arc::new(backend.session(AuthMode::Strict, dir.path()).await);
    session.login("operator@demo.com", "demo123").await.unwrap();

    let channel = RealtimeChannel::with_credentials(ChannelConfig::new(backend.ws_url()), session);
    let drones: Arc<parking_lot::Mutex<Vec<String>>> = Arc::default();
    let d = drones.clone();
    channel.on_drone_update(move |drone| d.lock().push(drone.id));

    channel.connect();
    wait_for_state(&channel, ConnectionState::Connected).await;
    backend.wait_for_clients(1).await;

    let mut generator = FeedGenerator::new();
    let mut rng = StdRng::seed_from_u64(1);
    let drone_update = loop {
        let update = generator.next_update(&mut rng);
        if update.topic() == Topic::DroneUpdate {
            break update;
        }
    };
    backend.publisher.send(drone_update.to_envelope().unwrap()).unwrap();

    eventually(|| drones.lock().len() == 1).await;
    assert!(drones.lock()[0].starts_with("DH-"));

    channel.disconnect().await;
}

#[tokio::test]
async fn test_simulated_feed_covers_every_topic() {
    let backend = Backend::start(Duration::from_millis(10)).await;
    let channel = RealtimeChannel::new(ChannelConfig::new(backend.ws_url()));

    let seen: Arc<parking_lot::Mutex<HashSet<Topic>>> = Arc::default();
    let _subscriptions: Vec<_> = Topic::ALL
        .iter()
        .map(|topic| {
            let seen = seen.clone();
            channel.subscribe(*topic, move |update| {
                seen.lock().insert(update.topic());
            })
        })
        .collect();

    channel.connect();
    eventually(|| seen.lock().len() == Topic::ALL.len()).await;

    channel.disconnect().await;
}

#[tokio::test]
async fn test_websocket_auth_verification() {
    let backend = Backend::quiet().await;
    let token = DevToken::create("admin-1", Role::Admin, TEST_SECRET).unwrap();

    let (mut ws, _) = tokio_tungstenite::connect_async(backend.ws_url()).await.unwrap();

    let auth = Envelope::auth(token.as_str());
    ws.send(Message::text(serde_json::to_string(&auth).unwrap())).await.unwrap();
    let reply = next_envelope(&mut ws).await;
    assert_eq!(reply.kind, AUTH_OK);
    assert_eq!(reply.data, json!({"userId": "admin-1", "role": "admin"}));

    // Offline placeholder tokens are not accepted by the server
    let auth = Envelope::auth("mock-jwt-token-1700000000000");
    ws.send(Message::text(serde_json::to_string(&auth).unwrap())).await.unwrap();
    let reply = next_envelope(&mut ws).await;
    assert_eq!(reply.kind, AUTH_ERROR);

    // Signed with another secret
    let forged = DevToken::create("admin-1", Role::Admin, b"other-secret").unwrap();
    let auth = Envelope::auth(forged.as_str());
    ws.send(Message::text(serde_json::to_string(&auth).unwrap())).await.unwrap();
    let reply = next_envelope(&mut ws).await;
    assert_eq!(reply.kind, AUTH_ERROR);
}

#[tokio::test]
async fn test_client_updates_are_republished() {
    let backend = Backend::quiet().await;

    let channel = RealtimeChannel::new(ChannelConfig::new(backend.ws_url()));
    let states: Arc<parking_lot::Mutex<Vec<DroneState>>> = Arc::default();
    let s = states.clone();
    channel.subscribe(Topic::DroneUpdate, move |update| {
        if let Update::DroneUpdate(drone) = update {
            s.lock().push(drone.status);
        }
    });
    channel.connect();
    wait_for_state(&channel, ConnectionState::Connected).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(backend.ws_url()).await.unwrap();
    backend.wait_for_clients(2).await;

    // Not a known topic: ignored
    let command = Envelope::new("drone_command", json!({"droneId": "DH-002", "command": "launch"}));
    ws.send(Message::text(serde_json::to_string(&command).unwrap())).await.unwrap();

    // Known topic with a bad payload: rejected
    let invalid = Envelope::new("drone_update", json!({"id": "DH-002"}));
    ws.send(Message::text(serde_json::to_string(&invalid).unwrap())).await.unwrap();

    let valid = Envelope::new(
        "drone_update",
        json!({
            "id": "DH-002",
            "name": "Harvester Beta",
            "status": "active",
            "battery": 91,
            "signal": 87,
            "location": {"lat": 36.1647, "lng": -86.7796},
            "currentTask": "Scouting Field B"
        }),
    );
    ws.send(Message::text(serde_json::to_string(&valid).unwrap())).await.unwrap();

    eventually(|| states.lock().len() == 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(*states.lock(), vec![DroneState::Active]);

    channel.disconnect().await;
}
