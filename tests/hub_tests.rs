use std::time::Duration;

use serde_json::json;
use tokio::net::TcpListener;

use devicehub::client::HubClient;
use devicehub::config::Config;
use devicehub::identity::{Session, SessionCodec};
use devicehub::server::{self, AppState};
use devicehub::storage::SharedStore;

const SECRET: &str = "integration-secret";

async fn start_server(key_field: &str) -> (String, AppState) {
    let cfg = Config {
        bind: "127.0.0.1".into(),
        port: 0,
        session_key_field: key_field.into(),
        max_session_length: Duration::from_secs(3600),
        max_extended_session_length: Duration::from_secs(86_400),
        session_secret: SECRET.into(),
        ..Config::default()
    };
    let store = SharedStore::new();
    let _ = store.ensure_user("admin", "hunter2").unwrap();
    let state = AppState::new(&cfg, store);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let serve_state = state.clone();
    let _ = tokio::spawn(async move {
        let _ = server::serve(listener, serve_state).await;
    });
    (format!("ws://{addr}/ws"), state)
}

async fn login(client: &mut HubClient, remember: bool) -> String {
    let ack = client
        .request("create-session", json!({"username": "admin", "password": "hunter2", "remember": remember}))
        .await
        .unwrap();
    assert!(ack.is_ok(), "login failed: {:?}", ack.error);
    ack.token().unwrap().to_string()
}

fn now_ms() -> i64 { chrono::Utc::now().timestamp_millis() }

#[tokio::test]
async fn login_then_sticky_session() {
    let (url, state) = start_server("sessionToken").await;
    let mut client = HubClient::connect(&url).await.unwrap();

    let t1 = login(&mut client, false).await;
    assert!(!t1.is_empty());
    let session = SessionCodec::new(SECRET).decode(&t1).unwrap();
    assert!(!session.remember);

    // no token on the wire: the connection remembers who we are
    let ack = client.request_with_token("refresh-session", json!({}), None).await.unwrap();
    assert!(ack.is_ok());
    assert_eq!(ack.data().unwrap()["session"]["subject"], json!(session.subject));
    assert_eq!(ack.data().unwrap()["user"]["username"], "admin");
    let t2 = ack.token().unwrap();
    assert_ne!(t2, t1);
    assert_eq!(SessionCodec::new(SECRET).decode(t2), Some(session));

    assert_eq!(state.connections.len(), 1);
    client.close().await.unwrap();
}

#[tokio::test]
async fn token_resumes_session_on_new_connection() {
    let (url, _state) = start_server("sessionToken").await;
    let mut first = HubClient::connect(&url).await.unwrap();
    let token = login(&mut first, true).await;

    let mut second = HubClient::connect(&url).await.unwrap();
    second.set_token(Some(token));
    let ack = second.request("create-device", json!({"name": "pump"})).await.unwrap();
    assert!(ack.is_ok(), "{:?}", ack.error);
    assert_eq!(ack.data().unwrap()["name"], "pump");
}

#[tokio::test]
async fn garbage_token_is_rejected_with_event() {
    let (url, _state) = start_server("sessionToken").await;
    let mut client = HubClient::connect(&url).await.unwrap();
    let ack = client.request_with_token("get-devices", json!({}), Some("definitely-not-a-token")).await.unwrap();
    assert_eq!(ack.code(), Some("BAD_REQUEST"));
    assert!(ack.response.is_none());
    let events = client.take_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].code_str(), "BAD_REQUEST");

    // connection is still usable
    let ack = client.request_with_token("get-devices", json!({}), None).await.unwrap();
    assert!(ack.is_ok());
    assert_eq!(ack.token(), Some(""));
}

#[tokio::test]
async fn expired_token_is_rejected_but_logout_works() {
    let (url, _state) = start_server("sessionToken").await;
    let stale = SessionCodec::new(SECRET)
        .encode(Some(&Session::new("someone", now_ms() - 2 * 3_600_000, false)))
        .unwrap();
    let mut client = HubClient::connect(&url).await.unwrap();

    let ack = client.request_with_token("get-systems", json!({}), Some(&stale)).await.unwrap();
    assert_eq!(ack.code(), Some("SESSION_EXPIRED"));

    // the stale session is still cached, so even login is refused until logout
    let ack = client
        .request_with_token("create-session", json!({"username": "admin", "password": "hunter2"}), None)
        .await
        .unwrap();
    assert_eq!(ack.code(), Some("SESSION_EXPIRED"));

    let ack = client.request_with_token("destroy-session", json!({}), None).await.unwrap();
    assert!(ack.is_ok());
    assert_eq!(ack.token(), Some(""));

    let _ = login(&mut client, false).await;
}

#[tokio::test]
async fn remembered_session_outlives_normal_length() {
    let (url, _state) = start_server("sessionToken").await;
    let old = SessionCodec::new(SECRET)
        .encode(Some(&Session::new("someone", now_ms() - 2 * 3_600_000, true)))
        .unwrap();
    let mut client = HubClient::connect(&url).await.unwrap();
    let ack = client.request_with_token("get-devices", json!({}), Some(&old)).await.unwrap();
    assert!(ack.is_ok());
}

#[tokio::test]
async fn custom_key_field_and_system_access() {
    let (url, _state) = start_server("auth").await;
    let mut owner = HubClient::connect_with_key_field(&url, "auth").await.unwrap();
    let _ = login(&mut owner, false).await;

    let ack = owner.request("create-system", json!({"name": "greenhouse"})).await.unwrap();
    assert!(ack.is_ok(), "{:?}", ack.error);
    let id = ack.data().unwrap()["id"].as_str().unwrap().to_string();

    // anonymous visitors cannot see a whitelisted system
    let mut visitor = HubClient::connect_with_key_field(&url, "auth").await.unwrap();
    let ack = visitor.request("get-system", json!({"id": id})).await.unwrap();
    assert_eq!(ack.code(), Some("FORBIDDEN"));
    assert!(ack.response.is_some());
    let ack = visitor.request("get-systems", json!({})).await.unwrap();
    assert_eq!(ack.data().unwrap(), &json!([]));

    let ack = owner.request("update-system", json!({"id": id, "access": {"view": {"level": "public"}}})).await.unwrap();
    assert!(ack.is_ok(), "{:?}", ack.error);
    let ack = visitor.request("get-system", json!({"id": id})).await.unwrap();
    assert!(ack.is_ok());
    assert_eq!(ack.data().unwrap()["name"], "greenhouse");
}

#[tokio::test]
async fn unknown_operations_and_bad_frames() {
    let (url, _state) = start_server("sessionToken").await;
    let mut client = HubClient::connect(&url).await.unwrap();
    let ack = client.request("destroy-user", json!({"id": "x"})).await.unwrap();
    assert_eq!(ack.code(), Some("UNKNOWN_OPERATION"));
    let _ = client.take_events();

    client.send_raw("this is not json").await.unwrap();
    let event = client.next_event(Duration::from_secs(5)).await.unwrap().unwrap();
    assert_eq!(event.code_str(), "BAD_REQUEST");
}

#[tokio::test]
async fn signup_then_login() {
    let (url, _state) = start_server("sessionToken").await;
    let mut client = HubClient::connect(&url).await.unwrap();
    let ack = client
        .request("create-user", json!({"username": "grace", "email": "Grace@Navy.mil", "password": "cobol"}))
        .await
        .unwrap();
    assert!(ack.is_ok(), "{:?}", ack.error);
    assert_eq!(ack.data().unwrap()["email"], "grace@navy.mil");
    assert_eq!(ack.token(), Some(""));

    let ack = client
        .request("create-session", json!({"email": "grace@navy.mil", "password": "cobol"}))
        .await
        .unwrap();
    assert!(ack.is_ok(), "{:?}", ack.error);
    assert_eq!(ack.data().unwrap()["user"]["username"], "grace");

    let ack = client.request("create-session", json!({"username": "grace", "password": "wrong"})).await.unwrap();
    assert_eq!(ack.code(), Some("INVALID_CREDENTIALS"));
    assert_eq!(client.take_events().len(), 1);
}
