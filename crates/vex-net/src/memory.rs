//! In-process transport.
//!
//! [`MemoryConnector`] hands every connection attempt to a
//! [`MemoryListener`], which yields the server side of the pair as a
//! [`ServerEnd`]. Used to script a server in tests and to embed a client
//! next to an in-process peer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tracing::debug;

use crate::transport::{Connector, Outgoing, TransportError, TransportEvent, TransportHandle};

#[derive(Clone)]
pub struct MemoryConnector {
    accept_tx: mpsc::UnboundedSender<ServerEnd>,
    refuse: Arc<AtomicBool>,
}

pub struct MemoryListener {
    accept_rx: mpsc::UnboundedReceiver<ServerEnd>,
    refuse: Arc<AtomicBool>,
}

/// The server side of one in-memory transport instance.
pub struct ServerEnd {
    pub url: String,
    from_client: mpsc::Receiver<Outgoing>,
    to_client: mpsc::Sender<TransportEvent>,
}

impl MemoryConnector {
    pub fn new() -> (Self, MemoryListener) {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        let refuse = Arc::new(AtomicBool::new(false));
        (
            Self {
                accept_tx,
                refuse: refuse.clone(),
            },
            MemoryListener { accept_rx, refuse },
        )
    }
}

impl Connector for MemoryConnector {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<TransportHandle, TransportError>> {
        let result = if self.refuse.load(Ordering::SeqCst) {
            Err(TransportError::Connection(format!("{url}: refused")))
        } else {
            let (handle, from_client, to_client) = TransportHandle::channel();
            let end = ServerEnd {
                url: url.to_string(),
                from_client,
                to_client,
            };
            self.accept_tx
                .send(end)
                .map(|()| handle)
                .map_err(|_| TransportError::Connection(format!("{url}: listener gone")))
        };
        Box::pin(async move { result })
    }
}

impl MemoryListener {
    /// Next connection attempt, `None` once every connector is dropped.
    pub async fn accept(&mut self) -> Option<ServerEnd> {
        self.accept_rx.recv().await
    }

    /// Make subsequent connection attempts fail (or succeed again).
    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

impl ServerEnd {
    /// Next text frame from the client. `None` when the client closed.
    pub async fn recv(&mut self) -> Option<String> {
        match self.from_client.recv().await {
            Some(Outgoing::Text(text)) => Some(text),
            Some(Outgoing::Close) | None => {
                debug!(url = %self.url, "Client closed memory transport");
                None
            }
        }
    }

    pub async fn send(&self, text: impl Into<String>) -> Result<(), TransportError> {
        self.to_client
            .send(TransportEvent::Message(text.into()))
            .await
            .map_err(|_| TransportError::Closed)
    }

    /// Report a transport error to the client.
    pub async fn fail(self, reason: &str) {
        let _ = self
            .to_client
            .send(TransportEvent::Error(reason.to_string()))
            .await;
    }

    /// Close from the server side with an optional close code.
    pub async fn close(self, code: Option<u16>) {
        let _ = self.to_client.send(TransportEvent::Closed(code)).await;
    }
}
