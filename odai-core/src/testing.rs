//! In-process relay and helpers for end-to-end tests.
//!
//! The relay routes binary frames between connections subscribed to the
//! same channel (never back to the sender) and records everything each
//! connection sent, so tests can assert on wire order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::any;
use axum::Router;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::sync::{ConnectionManager, ConnectionState, ControlMessage};

/// Something a client sent to the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    Control(String),
    Frame(Vec<u8>),
}

#[derive(Debug, Clone)]
enum Relayed {
    Frame {
        from: usize,
        channel: String,
        bytes: Vec<u8>,
    },
    Text(String),
    DropAll,
}

#[derive(Default)]
struct Log {
    connections: usize,
    received: HashMap<usize, Vec<Received>>,
    subscriptions: HashMap<usize, String>,
}

#[derive(Clone)]
struct RelayState {
    log: Arc<Mutex<Log>>,
    events: broadcast::Sender<Relayed>,
}

pub struct Relay {
    addr: std::net::SocketAddr,
    state: RelayState,
    server: JoinHandle<()>,
}

impl Relay {
    pub async fn start() -> Self {
        let (events, _) = broadcast::channel(64);
        let state = RelayState {
            log: Arc::new(Mutex::new(Log::default())),
            events,
        };

        let app = Router::new()
            .route("/ws", any(ws_handler))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            state,
            server,
        }
    }

    pub fn server_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn endpoint(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Total connections accepted so far.
    pub fn connections(&self) -> usize {
        self.state.log.lock().unwrap().connections
    }

    /// Everything connection `conn` (numbered from 0) sent, in order.
    pub fn received(&self, conn: usize) -> Vec<Received> {
        let log = self.state.log.lock().unwrap();
        log.received.get(&conn).cloned().unwrap_or_default()
    }

    /// Live connections currently subscribed to `channel`.
    pub fn subscribers(&self, channel: &str) -> usize {
        let log = self.state.log.lock().unwrap();
        log.subscriptions.values().filter(|c| *c == channel).count()
    }

    /// Closes every live connection.
    pub fn drop_all(&self) {
        let _ = self.state.events.send(Relayed::DropAll);
    }

    /// Sends a text message to every live connection.
    pub fn send_text(&self, text: &str) {
        let _ = self.state.events.send(Relayed::Text(text.to_string()));
    }

    /// Polls until `check` holds, panicking after five seconds.
    pub async fn wait_until<F>(&self, what: &str, check: F)
    where
        F: Fn(&Relay) -> bool,
    {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !check(self) {
            if tokio::time::Instant::now() > deadline {
                panic!("timed out waiting for {}", what);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// Waits for a manager to reach `state`, panicking after five seconds.
pub async fn wait_for_state(manager: &ConnectionManager, state: ConnectionState) {
    let mut changes = manager.state_changes();
    let reached = tokio::time::timeout(Duration::from_secs(5), changes.wait_for(|s| *s == state))
        .await
        .map(|r| r.is_ok())
        .unwrap_or(false);
    assert!(reached, "timed out waiting for {:?}", state);
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<RelayState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: RelayState) {
    let mut events = state.events.subscribe();
    let conn = {
        let mut log = state.log.lock().unwrap();
        let conn = log.connections;
        log.connections += 1;
        conn
    };
    let mut channel: Option<String> = None;

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                let msg = match incoming {
                    Some(Ok(msg)) => msg,
                    _ => break,
                };

                match msg {
                    Message::Text(text) => {
                        let mut log = state.log.lock().unwrap();
                        log.received
                            .entry(conn)
                            .or_default()
                            .push(Received::Control(text.as_str().to_string()));

                        if let Ok(ControlMessage::SetCanvas { canvas_id }) =
                            ControlMessage::decode(text.as_str())
                        {
                            log.subscriptions.insert(conn, canvas_id.clone());
                            channel = Some(canvas_id);
                        }
                    }
                    Message::Binary(bytes) => {
                        state
                            .log
                            .lock()
                            .unwrap()
                            .received
                            .entry(conn)
                            .or_default()
                            .push(Received::Frame(bytes.to_vec()));

                        if let Some(channel) = channel.clone() {
                            let _ = state.events.send(Relayed::Frame {
                                from: conn,
                                channel,
                                bytes: bytes.to_vec(),
                            });
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            event = events.recv() => {
                let outgoing = match event {
                    Ok(Relayed::Frame { from, channel: target, bytes }) => {
                        if from == conn || channel.as_deref() != Some(target.as_str()) {
                            continue;
                        }
                        Message::Binary(bytes.into())
                    }
                    Ok(Relayed::Text(text)) => Message::Text(text.into()),
                    Ok(Relayed::DropAll) => {
                        let _ = socket.send(Message::Close(None)).await;
                        break;
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                if socket.send(outgoing).await.is_err() {
                    break;
                }
            }
        }
    }

    state.log.lock().unwrap().subscriptions.remove(&conn);
}
