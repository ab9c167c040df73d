//! The transport seen by the protocol engine.
//!
//! A transport is an abstract duplex channel of text frames. Opening it is
//! the `open` notification; afterwards it reports inbound frames, errors
//! and the final close through [`TransportEvent`]s, and accepts outbound
//! frames through [`Outgoing`]. Each [`TransportHandle`] is one transport
//! instance and is never reused after it closes.

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::mpsc;

/// Buffer size of the frame channels on both sides of a transport task.
pub const FRAME_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("transport closed")]
    Closed,
}

/// Notifications sent *from* a transport instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text frame arrived.
    Message(String),
    /// The transport failed. No further events follow.
    Error(String),
    /// The peer closed the transport, with its close code if one was sent.
    Closed(Option<u16>),
}

/// Frames sent *into* a transport instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    Text(String),
    /// Close the transport from our side.
    Close,
}

/// An open transport instance.
#[derive(Debug)]
pub struct TransportHandle {
    pub outbound: mpsc::Sender<Outgoing>,
    pub events: mpsc::Receiver<TransportEvent>,
}

impl TransportHandle {
    /// Pair of channels for a transport task: the handle for the client and
    /// the task-side ends.
    pub fn channel() -> (Self, mpsc::Receiver<Outgoing>, mpsc::Sender<TransportEvent>) {
        let (outbound_tx, outbound_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        (
            Self {
                outbound: outbound_tx,
                events: events_rx,
            },
            outbound_rx,
            events_tx,
        )
    }
}

/// Opens fresh transport instances.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<TransportHandle, TransportError>>;
}
