//! Lifecycle and push notifications raised by the client.
//!
//! Consumers either register a callback for one [`EventKind`] with
//! [`EventBus::on`] or take a broadcast stream of every event with
//! [`EventBus::subscribe`]. Callbacks run synchronously on the task that
//! raised the event and must not block.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::broadcast;

use vex_shared::types::{Channel, ChannelId, ChatMessage, User};

use crate::error::ClientError;

/// Capacity of the broadcast stream. Slow subscribers lag instead of
/// blocking the connection.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// The first connection opened.
    Ready,
    /// A later connection opened and the session was restored.
    Reconnect { attempt: u64 },
    /// The transport closed, with the close code when the server sent one.
    Disconnect { code: Option<u16> },
    /// Too many probes went unanswered; the connection is being replaced.
    DeadHeartbeat,
    /// The handshake completed. Carries our user record when the server
    /// included one.
    Authed(Option<User>),
    Message(ChatMessage),
    /// The server pushed our own user record.
    UserInfo(User),
    /// Another user's record changed.
    PeerChange(User),
    ChannelList(Vec<Channel>),
    OnlineList {
        channel_id: ChannelId,
        users: Vec<User>,
    },
    Error(Arc<ClientError>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Ready,
    Reconnect,
    Disconnect,
    DeadHeartbeat,
    Authed,
    Message,
    UserInfo,
    PeerChange,
    ChannelList,
    OnlineList,
    Error,
}

impl ClientEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Ready => EventKind::Ready,
            Self::Reconnect { .. } => EventKind::Reconnect,
            Self::Disconnect { .. } => EventKind::Disconnect,
            Self::DeadHeartbeat => EventKind::DeadHeartbeat,
            Self::Authed(_) => EventKind::Authed,
            Self::Message(_) => EventKind::Message,
            Self::UserInfo(_) => EventKind::UserInfo,
            Self::PeerChange(_) => EventKind::PeerChange,
            Self::ChannelList(_) => EventKind::ChannelList,
            Self::OnlineList { .. } => EventKind::OnlineList,
            Self::Error(_) => EventKind::Error,
        }
    }

    pub(crate) fn error(err: ClientError) -> Self {
        Self::Error(Arc::new(err))
    }
}

type Callback = Arc<dyn Fn(&ClientEvent) + Send + Sync>;

pub struct EventBus {
    callbacks: RwLock<HashMap<EventKind, Vec<Callback>>>,
    stream: broadcast::Sender<ClientEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (stream, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            callbacks: RwLock::new(HashMap::new()),
            stream,
        }
    }

    /// Run `callback` for every event of `kind`.
    pub fn on<F>(&self, kind: EventKind, callback: F)
    where
        F: Fn(&ClientEvent) + Send + Sync + 'static,
    {
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push(Arc::new(callback));
    }

    /// Stream of every event raised from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.stream.subscribe()
    }

    pub fn emit(&self, event: ClientEvent) {
        tracing::trace!(kind = ?event.kind(), "Emitting client event");

        // Callbacks may register further callbacks, so never call them
        // with the lock held.
        let callbacks: Vec<Callback> = self
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event.kind())
            .cloned()
            .unwrap_or_default();
        for callback in callbacks {
            callback(&event);
        }

        // No subscribers is fine.
        let _ = self.stream.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
