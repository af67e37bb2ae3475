//! Connection state machine driven through a scripted in-memory connector.
//!
//! Time is paused, so backoff and heartbeat schedules are checked against the
//! virtual clock.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::{FutureExt, StreamExt};
use pawtalk_client::ws::{
    ComponentSession, Connection, ConnectionConfig, ConnectionState, Connector, Inbound,
    MountOptions, SocketIo, TransportError,
};
use pawtalk_shared::Frame;
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Accept,
    Refuse,
}

/// Server end of an accepted socket.
struct ServerSide {
    to_client: UnboundedSender<Inbound>,
    from_client: UnboundedReceiver<String>,
}

impl ServerSide {
    fn push(&self, text: &str) {
        self.to_client
            .unbounded_send(Inbound::Text(text.to_string()))
            .expect("client listening");
    }

    /// Everything the client has written so far.
    fn drain(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(Some(text)) = self.from_client.next().now_or_never() {
            out.push(text);
        }
        out
    }
}

struct ScriptedConnector {
    script: Mutex<VecDeque<Outcome>>,
    fallback: Outcome,
    attempts: Mutex<Vec<(Instant, String)>>,
    accepted: mpsc::UnboundedSender<ServerSide>,
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, url: &str) -> Result<SocketIo, TransportError> {
        self.attempts
            .lock()
            .unwrap()
            .push((Instant::now(), url.to_string()));
        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback);

        match outcome {
            Outcome::Refuse => Err(TransportError::Connect("connection refused".into())),
            Outcome::Accept => {
                let (out_tx, out_rx) = unbounded();
                let (in_tx, in_rx) = unbounded();
                let _ = self.accepted.send(ServerSide {
                    to_client: in_tx,
                    from_client: out_rx,
                });
                Ok(SocketIo {
                    outgoing: out_tx,
                    incoming: in_rx,
                })
            }
        }
    }
}

struct Harness {
    connection: Connection,
    connector: Arc<ScriptedConnector>,
    servers: mpsc::UnboundedReceiver<ServerSide>,
    state: watch::Receiver<ConnectionState>,
    started: Instant,
}

impl Harness {
    fn new(script: &[Outcome], fallback: Outcome) -> Self {
        let (accepted, servers) = mpsc::unbounded_channel();
        let connector = Arc::new(ScriptedConnector {
            script: Mutex::new(script.iter().copied().collect()),
            fallback,
            attempts: Mutex::new(Vec::new()),
            accepted,
        });
        let connection = Connection::new(ConnectionConfig::default(), connector.clone());
        let state = connection.watch_state();
        Self {
            connection,
            connector,
            servers,
            state,
            started: Instant::now(),
        }
    }

    fn attempts(&self) -> usize {
        self.connector.attempts.lock().unwrap().len()
    }

    /// Seconds since the harness started at which each connect happened.
    fn attempt_times(&self) -> Vec<u64> {
        self.connector
            .attempts
            .lock()
            .unwrap()
            .iter()
            .map(|(at, _)| (*at - self.started).as_secs_f64().round() as u64)
            .collect()
    }

    async fn next_server(&mut self) -> ServerSide {
        tokio::time::timeout(Duration::from_secs(300), self.servers.recv())
            .await
            .expect("no socket accepted")
            .expect("connector gone")
    }

    async fn wait_for(&mut self, want: ConnectionState) {
        tokio::time::timeout(
            Duration::from_secs(300),
            self.state.wait_for(|state| *state == want),
        )
        .await
        .expect("state not reached")
        .expect("connection gone");
    }

    async fn open(&mut self) -> ServerSide {
        self.connection.connect("tok");
        let server = self.next_server().await;
        self.wait_for(ConnectionState::Open).await;
        server
    }
}

fn is_ping(text: &str) -> bool {
    matches!(Frame::parse(text), Ok(Frame::Ping))
}

#[tokio::test(start_paused = true)]
async fn endpoint_carries_token() {
    let mut h = Harness::new(&[], Outcome::Accept);
    let _server = h.open().await;
    let url = h.connector.attempts.lock().unwrap()[0].1.clone();
    assert_eq!(url, "ws://localhost:8000/ws/?token=tok");
}

#[tokio::test(start_paused = true)]
async fn second_connect_does_not_open_another_socket() {
    let mut h = Harness::new(&[], Outcome::Accept);
    h.connection.connect("tok");
    h.connection.connect("tok");
    let _server = h.next_server().await;
    h.wait_for(ConnectionState::Open).await;

    h.connection.connect("tok");
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(h.attempts(), 1);
    assert!(h.connection.is_connected());
}

#[tokio::test(start_paused = true)]
async fn mount_auto_connects_once() {
    let mut h = Harness::new(&[], Outcome::Accept);
    let token = || Some("tok".to_string());

    let mut inbox = ComponentSession::mount(&h.connection, "inbox", &token, MountOptions::default());
    let _server = h.next_server().await;
    let url = h.connector.attempts.lock().unwrap()[0].1.clone();
    assert!(url.ends_with("?token=tok"));

    let opened = tokio::time::timeout(Duration::from_secs(60), async {
        while let Some(state) = inbox.changed().await {
            if state == ConnectionState::Open {
                return true;
            }
        }
        false
    })
    .await
    .expect("never opened");
    assert!(opened);
    assert!(inbox.is_connected());

    let thread = ComponentSession::mount(&h.connection, "thread", &token, MountOptions::default());
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.attempts(), 1);
    assert!(thread.is_connected());
}

#[tokio::test(start_paused = true)]
async fn backoff_doubles_then_gives_up() {
    let mut h = Harness::new(&[Outcome::Accept], Outcome::Refuse);
    let server = h.open().await;

    // Unexpected close: the incoming stream ends
    drop(server);
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(h.attempt_times(), vec![0, 1, 3, 7, 15, 31]);
    assert_eq!(h.connection.reconnect_attempts(), 5);
    assert_eq!(h.connection.state(), ConnectionState::Disconnected);

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(h.attempts(), 6);
}

#[tokio::test(start_paused = true)]
async fn manual_connect_after_giving_up_starts_over() {
    let mut h = Harness::new(&[Outcome::Accept], Outcome::Refuse);
    let server = h.open().await;
    drop(server);
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(h.attempts(), 6);

    let restart = Instant::now();
    h.connection.connect("tok");
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(h.attempts(), 7);
    assert_eq!(h.connection.reconnect_attempts(), 1);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.attempts(), 8);
    let last = h.connector.attempts.lock().unwrap()[7].0;
    assert_eq!((last - restart).as_secs_f64().round() as u64, 1);
}

#[tokio::test(start_paused = true)]
async fn successful_reconnect_resets_attempts() {
    let mut h = Harness::new(&[], Outcome::Accept);
    let server = h.open().await;

    server
        .to_client
        .unbounded_send(Inbound::Closed(Some("going away".into())))
        .unwrap();
    h.wait_for(ConnectionState::Disconnected).await;
    assert_eq!(h.connection.reconnect_attempts(), 1);

    let _again = h.next_server().await;
    h.wait_for(ConnectionState::Open).await;
    assert_eq!(h.connection.reconnect_attempts(), 0);
    assert_eq!(h.attempt_times(), vec![0, 1]);
    drop(server);
}

#[tokio::test(start_paused = true)]
async fn heartbeat_pings_while_open_only() {
    let mut h = Harness::new(&[Outcome::Accept], Outcome::Refuse);
    let mut server = h.open().await;

    tokio::time::sleep(Duration::from_secs(95)).await;
    let sent = server.drain();
    assert_eq!(sent.len(), 3);
    assert!(sent.iter().all(|text| is_ping(text)));

    // Close, then let the reconnects run out
    let ServerSide {
        to_client,
        from_client,
    } = server;
    drop(to_client);
    h.wait_for(ConnectionState::Disconnected).await;
    tokio::time::sleep(Duration::from_secs(300)).await;

    let late: Vec<String> = tokio::time::timeout(Duration::from_secs(5), from_client.collect())
        .await
        .expect("client kept the socket open");
    assert!(late.is_empty());
}

#[tokio::test(start_paused = true)]
async fn send_writes_envelope() {
    let mut h = Harness::new(&[], Outcome::Accept);
    let mut server = h.open().await;

    let frame = Frame::message("typing", json!({"user": 4})).with_conversation(12);
    assert!(h.connection.send(&frame));

    let text = server.from_client.next().await.unwrap();
    let value: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(
        value,
        json!({"type": "typing", "data": {"user": 4}, "conversation_id": 12})
    );
}

#[tokio::test(start_paused = true)]
async fn malformed_frames_are_dropped() {
    let mut h = Harness::new(&[], Outcome::Accept);
    let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
    let _handle = h
        .connection
        .register_handler("new_message", "thread-1", move |frame: &Frame| {
            let _ = tx.send(frame.data().clone());
        });
    let server = h.open().await;

    server.push("not json");
    server.push(r#"{"data": {"text": "no type"}}"#);
    server.push(r#"{"type": "new_message", "data": {"text": "hi"}}"#);

    let data = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(data, json!({"text": "hi"}));
    assert!(rx.try_recv().is_err());
    assert_eq!(h.connection.state(), ConnectionState::Open);
}

#[tokio::test(start_paused = true)]
async fn disconnect_is_terminal() {
    let mut h = Harness::new(&[], Outcome::Accept);
    let _handle = h
        .connection
        .register_handler("new_message", "list-1", |_: &Frame| {});
    let mut server = h.open().await;

    h.connection.disconnect();
    assert_eq!(h.connection.state(), ConnectionState::Disconnected);
    assert!(h.connection.registry().is_empty());
    assert!(!h.connection.send(&Frame::Ping));

    // The client side of the socket is gone
    assert_eq!(server.from_client.next().await, None);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(h.attempts(), 1);
    assert_eq!(h.connection.reconnect_attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn disconnect_cancels_pending_reconnect() {
    let mut h = Harness::new(&[Outcome::Accept], Outcome::Refuse);
    let server = h.open().await;
    drop(server);
    h.wait_for(ConnectionState::Disconnected).await;

    // A reconnect is now scheduled one second out
    h.connection.disconnect();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.attempts(), 1);
}
