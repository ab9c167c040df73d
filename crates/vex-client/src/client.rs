//! The client handle and its request plumbing.
//!
//! [`Client`] is a cheap clone of an `Arc` around the shared state. The
//! connection supervisor task owns the transport; everything else talks to
//! it through the current [`Link`] and the correlation registry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, watch, Notify};
use tracing::{debug, info, warn};

use vex_net::{Connector, Outgoing, WsConnector};
use vex_shared::protocol::{Command, Inbound};
use vex_shared::types::ChannelId;
use vex_shared::{KeyError, Keys};

use crate::config::{parse_hex_pubkey, ClientConfig};
use crate::connection;
use crate::error::{ClientError, Result};
use crate::events::{ClientEvent, EventBus, EventKind};
use crate::handshake::AuthState;
use crate::registry::Registry;
use crate::state::{Account, ClientInfo, ClientState};

/// Lock a std mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The open transport of one connection generation.
pub(crate) struct Link {
    pub generation: u64,
    pub outbound: mpsc::Sender<Outgoing>,
    /// Ends the session without reconnecting.
    pub halt: Arc<Notify>,
}

pub(crate) struct Inner {
    pub config: ClientConfig,
    pub keys: Arc<dyn Keys>,
    pub connector: Arc<dyn Connector>,
    pub registry: Mutex<Registry>,
    pub state: Mutex<ClientState>,
    pub events: EventBus,
    pub link: Mutex<Option<Link>>,
    /// Incremented for every connection attempt.
    pub generation: AtomicU64,
    pub auth: watch::Sender<AuthState>,
    pub logged_out: watch::Sender<bool>,
}

impl Inner {
    pub fn is_logged_out(&self) -> bool {
        *self.logged_out.borrow()
    }
}

/// Handle to a running client. Clones share the same connection.
#[derive(Clone)]
pub struct Client {
    pub(crate) inner: Arc<Inner>,
}

impl Client {
    /// Start a client and its connection task.
    ///
    /// Must be called from within a tokio runtime. The first connection
    /// attempt starts immediately; listen for [`ClientEvent::Ready`].
    pub fn new(
        config: ClientConfig,
        keys: Arc<dyn Keys>,
        connector: Arc<dyn Connector>,
    ) -> Result<Self> {
        let server_pubkey = match config.server_pubkey.as_deref() {
            Some(hex_key) => Some(parse_hex_pubkey(hex_key).map_err(|e| {
                warn!(error = %e, "Rejected configured server key");
                ClientError::Key(KeyError::InvalidKeyBytes)
            })?),
            None => None,
        };

        if !config.secure {
            warn!(host = %config.host, "Secure transport disabled, traffic is sent in the clear");
        }

        let (auth, _) = watch::channel(AuthState::Unauthenticated);
        let (logged_out, _) = watch::channel(false);

        let inner = Arc::new(Inner {
            state: Mutex::new(ClientState::new(server_pubkey)),
            config,
            keys,
            connector,
            registry: Mutex::new(Registry::new()),
            events: EventBus::new(),
            link: Mutex::new(None),
            generation: AtomicU64::new(0),
            auth,
            logged_out,
        });

        info!(url = %inner.config.ws_url(), "Starting client");
        tokio::spawn(connection::supervise(inner.clone()));

        Ok(Self { inner })
    }

    /// Start a client that connects over WebSocket.
    pub fn with_websocket(config: ClientConfig, keys: Arc<dyn Keys>) -> Result<Self> {
        Self::new(config, keys, Arc::new(WsConnector::new()))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Run `callback` for every event of `kind`.
    pub fn on<F>(&self, kind: EventKind, callback: F)
    where
        F: Fn(&ClientEvent) + Send + Sync + 'static,
    {
        self.inner.events.on(kind, callback);
    }

    /// Stream of every event raised from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.inner.events.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.inner.link).is_some()
    }

    /// Generation of the most recent connection attempt.
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    /// Number of requests still waiting for a reply.
    pub fn pending_requests(&self) -> usize {
        lock(&self.inner.registry).len()
    }

    /// Channels that will be rejoined after a reconnect, in join order.
    pub fn joined_channels(&self) -> Vec<ChannelId> {
        lock(&self.inner.state).joined().to_vec()
    }

    pub fn account(&self) -> Account {
        let state = lock(&self.inner.state);
        Account {
            public_key: hex::encode(self.inner.keys.public_key()),
            server_public_key: state.server_pubkey.clone(),
            hostname: self.inner.config.host.clone(),
            user: state.user.clone(),
        }
    }

    pub fn info(&self) -> ClientInfo {
        let authed = self.auth_state() == AuthState::Authenticated;
        let state = lock(&self.inner.state);
        ClientInfo {
            authed,
            client: state.user.clone(),
            host: self.inner.config.ws_url(),
            secure: self.inner.config.secure,
            power_levels: state.power_levels,
            joined_channels: state.joined().to_vec(),
        }
    }

    /// Close the connection for good. Pending requests fail with
    /// [`ClientError::LoggedOut`] and no reconnect is attempted.
    pub fn logout(&self) {
        if self.inner.logged_out.send_replace(true) {
            return;
        }
        info!("Logging out");

        // The session task sees the flag and closes the transport.
        let link = lock(&self.inner.link).take();
        if let Some(link) = link {
            debug!(generation = link.generation, "Detached link on logout");
        }
        lock(&self.inner.registry).abandon_all(crate::registry::Abandoned::LoggedOut);
        self.inner.auth.send_replace(AuthState::Unauthenticated);
    }

    fn current_link(&self) -> Result<(u64, mpsc::Sender<Outgoing>)> {
        if self.inner.is_logged_out() {
            return Err(ClientError::LoggedOut);
        }
        lock(&self.inner.link)
            .as_ref()
            .map(|link| (link.generation, link.outbound.clone()))
            .ok_or(ClientError::NotConnected)
    }

    /// Send `command` and wait for the frame correlated with it, whatever
    /// its status.
    pub(crate) async fn round_trip(
        &self,
        command: Command,
        timeout: Option<Duration>,
        operation: &'static str,
    ) -> Result<Inbound> {
        let text = command.encode()?;
        let id = command.request_id;
        let (generation, outbound) = self.current_link()?;

        let (tx, rx) = oneshot::channel();
        lock(&self.inner.registry).register(
            id.clone(),
            generation,
            Box::new(move |reply| {
                let _ = tx.send(reply);
            }),
        )?;

        if outbound.send(Outgoing::Text(text)).await.is_err() {
            lock(&self.inner.registry).cancel(&id);
            return Err(ClientError::ConnectionLost);
        }
        debug!(request_id = %id, kind = %command.kind, generation, "Sent request");

        let reply = match timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(reply) => reply,
                Err(_) => {
                    lock(&self.inner.registry).cancel(&id);
                    warn!(request_id = %id, operation, "Request timed out");
                    return Err(ClientError::Timeout {
                        operation,
                        millis: limit.as_millis() as u64,
                    });
                }
            },
            None => rx.await,
        };

        match reply {
            Ok(Ok(inbound)) => Ok(inbound),
            Ok(Err(reason)) => Err(reason.into()),
            Err(_) => Err(ClientError::ConnectionLost),
        }
    }

    /// Send `command` and return the `data` of a success reply.
    pub(crate) async fn request(&self, command: Command) -> Result<Value> {
        let reply = self
            .round_trip(command, self.inner.config.request_timeout, "reply")
            .await?;
        reply.into_result().map_err(ClientError::Api)
    }

    /// Like [`request`](Self::request), decoding the payload.
    pub(crate) async fn call<T: DeserializeOwned>(&self, command: Command) -> Result<T> {
        let data = self.request(command).await?;
        Ok(serde_json::from_value(data)?)
    }
}
