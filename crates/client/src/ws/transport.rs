//! Socket transport seam and its tokio-tungstenite implementation.

use async_trait::async_trait;
use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::endpoint::EndpointError;

/// Something received from an open socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    /// The socket closed or failed; no further events follow.
    Closed(Option<String>),
}

/// The two halves of an open socket.
///
/// Dropping `outgoing` asks the transport to close the socket. The incoming
/// stream ends (or yields [`Inbound::Closed`]) once the socket is gone.
pub struct SocketIo {
    pub outgoing: UnboundedSender<String>,
    pub incoming: UnboundedReceiver<Inbound>,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to open socket: {0}")]
    Connect(String),
    #[error(transparent)]
    Endpoint(#[from] EndpointError),
}

/// Opens sockets. Implemented by [`TungsteniteConnector`] and by test doubles.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<SocketIo, TransportError>;
}

/// Connector over `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<SocketIo, TransportError> {
        let (ws_stream, _response) = connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let (mut write, mut read) = ws_stream.split();
        let (out_tx, mut out_rx) = unbounded::<String>();
        let (in_tx, in_rx) = unbounded::<Inbound>();

        // Read task
        tokio::spawn(async move {
            while let Some(msg_result) = read.next().await {
                match msg_result {
                    Ok(Message::Text(text)) => {
                        if in_tx.unbounded_send(Inbound::Text(text.to_string())).is_err() {
                            // Connection side is gone
                            break;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        let reason = frame.map(|f| f.reason.to_string());
                        let _ = in_tx.unbounded_send(Inbound::Closed(reason));
                        break;
                    }
                    Ok(_) => {
                        // Protocol pings are answered by tungstenite; binary is not used
                    }
                    Err(e) => {
                        let _ = in_tx.unbounded_send(Inbound::Closed(Some(e.to_string())));
                        break;
                    }
                }
            }
        });

        // Write task
        tokio::spawn(async move {
            while let Some(text) = out_rx.next().await {
                if let Err(e) = write.send(Message::Text(text.into())).await {
                    crate::log_error!("Socket write failed: {}", e);
                    break;
                }
            }
            // Sender dropped: close our side
            let _ = write.close().await;
        });

        Ok(SocketIo {
            outgoing: out_tx,
            incoming: in_rx,
        })
    }
}
