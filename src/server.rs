//!
//! devicehub WebSocket server
//! --------------------------
//! Axum server exposing the hub's operations over a single persistent WebSocket.
//!
//! Responsibilities:
//! - Accept connections on `/ws` and register each one in the connection registry.
//! - Read text frames and hand each to the dispatcher on its own task, so a slow
//!   handler does not hold up later requests on the same socket.
//! - Funnel acknowledgements and `error` events through one writer task per socket.
//! - Serve a plain liveness route on `/`.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::{routing::get, Router};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::handlers::build_operation_table;
use crate::storage::SharedStore;

pub mod connection;
pub mod dispatch;
pub mod protocol;
pub mod registry;

use connection::{Connection, ConnectionRegistry};
use dispatch::Dispatcher;
use protocol::OutboundFrame;

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub dispatcher: Arc<Dispatcher>,
    pub connections: ConnectionRegistry,
}

impl AppState {
    pub fn new(config: &Config, store: SharedStore) -> Self {
        let dispatcher = Dispatcher::from_config(config, build_operation_table(), store.clone());
        Self { store, dispatcher: Arc::new(dispatcher), connections: ConnectionRegistry::new() }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "devicehub ok" }))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

/// Serve on an already bound listener until the server stops.
pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    let app = build_router(state);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Bind the configured address and serve with a fresh store (plus the bootstrap admin, if configured).
pub async fn run(config: Config) -> anyhow::Result<()> {
    let store = SharedStore::new();
    if let (Some(user), Some(password)) = (config.admin_user.as_deref(), config.admin_password.as_deref()) {
        let _ = store.ensure_user(user, password)?;
    }
    run_with_store(config, store).await
}

pub async fn run_with_store(config: Config, store: SharedStore) -> anyhow::Result<()> {
    let state = AppState::new(&config, store);
    info!(
        target: "startup",
        "registered {} operations: {}",
        state.dispatcher.table().len(),
        state.dispatcher.table().operations().join(", ")
    );
    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("Starting server on {}", listener.local_addr()?);
    serve(listener, state).await
}

async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<OutboundFrame>();
    let conn = Arc::new(Connection::new(tx));
    let conn_id = conn.id();
    state.connections.register(conn.clone());
    info!(connection = %conn_id, open = state.connections.len(), "client connected");

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let text = frame.to_text();
            if text.is_empty() { continue; }
            if sink.send(Message::Text(text.into())).await.is_err() { break; }
        }
        let _ = sink.close().await;
    });

    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                // sessions resolve in arrival order; only handlers run concurrently
                let Some(pending) = state.dispatcher.accept_frame(&conn, text.as_str()) else { continue; };
                let dispatcher = state.dispatcher.clone();
                let conn = conn.clone();
                let _ = tokio::spawn(async move {
                    dispatcher.complete(&conn, pending).await;
                });
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(connection = %conn_id, "socket error: {}", e);
                break;
            }
        }
    }

    let _ = state.connections.remove(&conn_id);
    // in-flight tasks hold their own sender; the writer ends once they finish
    drop(conn);
    if let Err(e) = writer.await {
        debug!(connection = %conn_id, "writer task ended abnormally: {}", e);
    }
    info!(connection = %conn_id, open = state.connections.len(), "client disconnected");
}
