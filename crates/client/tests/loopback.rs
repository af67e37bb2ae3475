//! End-to-end over a real socket: a tokio-tungstenite server on 127.0.0.1.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use pawtalk_client::endpoint::Runtime;
use pawtalk_client::ws::{Connection, ConnectionConfig, ConnectionState, ReconnectConfig};
use pawtalk_shared::Frame;
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

type ServerSocket = WebSocketStream<TcpStream>;

const WAIT: Duration = Duration::from_secs(5);

/// Accepts sockets forever, handing each one (with its request URI) to the test.
async fn serve() -> (u16, mpsc::UnboundedReceiver<(String, ServerSocket)>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let uri = Arc::new(Mutex::new(String::new()));
            let seen = uri.clone();
            let callback = move |req: &Request, resp: Response| {
                *seen.lock().unwrap() = req.uri().to_string();
                Ok::<_, ErrorResponse>(resp)
            };
            if let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await {
                let uri = uri.lock().unwrap().clone();
                if tx.send((uri, ws)).is_err() {
                    break;
                }
            }
        }
    });

    (port, rx)
}

async fn wait_state(rx: &mut watch::Receiver<ConnectionState>, want: ConnectionState) {
    tokio::time::timeout(WAIT, rx.wait_for(|state| *state == want))
        .await
        .expect("state not reached")
        .expect("connection gone");
}

/// Next text frame from the client, skipping protocol-level frames.
async fn next_text(ws: &mut ServerSocket) -> Option<String> {
    loop {
        match tokio::time::timeout(WAIT, ws.next()).await.ok()?? {
            Ok(Message::Text(text)) => return Some(text.as_str().to_string()),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}

#[tokio::test]
async fn tungstenite_round_trip() {
    let (port, mut accepted) = serve().await;
    let connection = Connection::tungstenite(ConnectionConfig {
        runtime: Runtime::Native {
            host: "127.0.0.1".into(),
            port,
            secure: false,
        },
        heartbeat_interval: Duration::from_millis(200),
        reconnect: ReconnectConfig {
            base_delay: Duration::from_millis(50),
            max_attempts: 5,
        },
    });
    let mut state = connection.watch_state();

    let (tx, mut received) = mpsc::unbounded_channel::<Value>();
    let _handle = connection.register_handler("new_message", "loopback-1", move |frame: &Frame| {
        let _ = tx.send(frame.data().clone());
    });

    connection.connect("secret");
    let (uri, mut ws) = tokio::time::timeout(WAIT, accepted.recv())
        .await
        .expect("no connection")
        .expect("server gone");
    assert_eq!(uri, "/ws/?token=secret");
    wait_state(&mut state, ConnectionState::Open).await;

    // Server to client
    ws.send(Message::text(
        json!({"type": "new_message", "data": {"text": "hi"}}).to_string(),
    ))
    .await
    .unwrap();
    let data = tokio::time::timeout(WAIT, received.recv())
        .await
        .expect("not dispatched")
        .unwrap();
    assert_eq!(data, json!({"text": "hi"}));

    // Client to server, then a heartbeat
    assert!(connection.send(&Frame::message("typing", json!({"user": 1})).with_conversation(7)));
    let mut saw_typing = false;
    let mut saw_ping = false;
    while !(saw_typing && saw_ping) {
        let text = next_text(&mut ws).await.expect("client went quiet");
        match Frame::parse(&text).unwrap() {
            Frame::Ping => saw_ping = true,
            frame => {
                assert_eq!(frame.kind(), "typing");
                assert_eq!(frame.conversation_id(), Some(7));
                assert_eq!(frame.data(), &json!({"user": 1}));
                saw_typing = true;
            }
        }
    }

    // Server closes; the client comes back on its own
    ws.close(None).await.unwrap();
    let (_, mut ws) = tokio::time::timeout(WAIT, accepted.recv())
        .await
        .expect("no reconnect")
        .expect("server gone");
    wait_state(&mut state, ConnectionState::Open).await;
    assert_eq!(connection.reconnect_attempts(), 0);

    // Subscriptions survive a reconnect
    ws.send(Message::text(
        json!({"type": "new_message", "data": {"text": "again"}}).to_string(),
    ))
    .await
    .unwrap();
    let data = tokio::time::timeout(WAIT, received.recv()).await.unwrap().unwrap();
    assert_eq!(data, json!({"text": "again"}));

    // A manual disconnect closes the socket and stays closed
    connection.disconnect();
    assert_eq!(connection.state(), ConnectionState::Disconnected);
    while next_text(&mut ws).await.is_some() {}
    assert!(tokio::time::timeout(Duration::from_millis(300), accepted.recv())
        .await
        .is_err());
}

#[tokio::test]
async fn refused_connection_stays_disconnected() {
    // Bind then drop to get a port with nothing listening
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let connection = Connection::tungstenite(ConnectionConfig {
        runtime: Runtime::Native {
            host: "127.0.0.1".into(),
            port,
            secure: false,
        },
        heartbeat_interval: Duration::from_secs(30),
        reconnect: ReconnectConfig {
            base_delay: Duration::from_millis(10),
            max_attempts: 2,
        },
    });

    connection.connect("secret");
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(connection.state(), ConnectionState::Disconnected);
    assert_eq!(connection.reconnect_attempts(), 2);
    assert!(!connection.send(&Frame::Ping));
}
