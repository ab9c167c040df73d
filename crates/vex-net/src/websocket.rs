//! WebSocket transport over `tokio-tungstenite`.
//!
//! Each connection is bridged to a [`TransportHandle`] by a dedicated
//! tokio task that forwards outgoing frames to the socket and socket
//! frames to the event channel.

use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::transport::{Connector, Outgoing, TransportError, TransportEvent, TransportHandle};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects to `ws://` and `wss://` URLs.
#[derive(Debug, Clone, Default)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for WsConnector {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<TransportHandle, TransportError>> {
        let url = url.to_string();
        Box::pin(async move {
            let (ws, _response) = connect_async(url.as_str())
                .await
                .map_err(|e| TransportError::Connection(format!("{url}: {e}")))?;

            info!(url = %url, "WebSocket connected");

            let (handle, outbound_rx, events_tx) = TransportHandle::channel();
            tokio::spawn(socket_loop(ws, outbound_rx, events_tx));
            Ok(handle)
        })
    }
}

async fn socket_loop(
    ws: WsStream,
    mut outbound: mpsc::Receiver<Outgoing>,
    events: mpsc::Sender<TransportEvent>,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    loop {
        tokio::select! {
            out = outbound.recv() => {
                match out {
                    Some(Outgoing::Text(text)) => {
                        if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                            warn!(error = %e, "WebSocket send failed");
                            let _ = events.send(TransportEvent::Error(e.to_string())).await;
                            break;
                        }
                    }
                    Some(Outgoing::Close) | None => {
                        debug!("Closing WebSocket from our side");
                        let _ = ws_tx.send(Message::Close(None)).await;
                        break;
                    }
                }
            }

            frame = ws_rx.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if events.send(TransportEvent::Message(text.as_str().to_string())).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let code = frame.map(|f| u16::from(f.code));
                        debug!(code = ?code, "WebSocket closed by peer");
                        let _ = events.send(TransportEvent::Closed(code)).await;
                        break;
                    }
                    // Binary frames are not part of the protocol; ping/pong is
                    // answered by tungstenite itself.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket stream error");
                        let _ = events.send(TransportEvent::Error(e.to_string())).await;
                        break;
                    }
                    None => {
                        let _ = events.send(TransportEvent::Closed(None)).await;
                        break;
                    }
                }
            }
        }
    }

    debug!("WebSocket task terminated");
}
