//! Connection supervision.
//!
//! One supervisor task per client opens a transport, runs a session on it
//! until it ends, then waits and opens the next one. Every attempt gets a
//! new generation number; requests are tagged with the generation they were
//! sent on and anything left from an older generation is failed when a new
//! session opens.
//!
//! A session ends when the transport closes or errors, when the heartbeat
//! declares it dead, when the handshake halts it, or on logout. Only the
//! last two stop the supervisor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Notify};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use vex_net::{Outgoing, TransportError, TransportEvent, TransportHandle};
use vex_shared::protocol::{kind, Command, Inbound};
use vex_shared::types::{Channel, ChannelId, ChatMessage, PowerLevels, User};

use crate::client::{lock, Client, Inner, Link};
use crate::error::{ClientError, Result};
use crate::events::ClientEvent;
use crate::handshake::AuthState;
use crate::heartbeat::{Beat, Heartbeat};
use crate::registry::{Abandoned, Dispatch};

#[derive(Debug)]
enum SessionEnd {
    Closed(Option<u16>),
    Failed,
    DeadHeartbeat,
    Halted,
    LoggedOut,
}

/// Resolves once the client has logged out.
async fn logged_out(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|logged_out| *logged_out).await;
}

pub(crate) async fn supervise(inner: Arc<Inner>) {
    let mut failures: u32 = 0;

    loop {
        if inner.is_logged_out() {
            break;
        }

        let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let url = inner.config.ws_url();
        debug!(generation, url = %url, "Opening transport");

        let connected = tokio::select! {
            result = inner.connector.connect(&url) => result,
            _ = logged_out(inner.logged_out.subscribe()) => break,
        };

        match connected {
            Ok(handle) => {
                failures = 0;
                let end = run_session(&inner, generation, handle).await;
                match end {
                    SessionEnd::LoggedOut => break,
                    SessionEnd::Halted => {
                        warn!(generation, "Connection halted, not reconnecting");
                        inner.events.emit(ClientEvent::Disconnect { code: None });
                        break;
                    }
                    SessionEnd::Closed(code) => {
                        info!(generation, code = ?code, "Connection closed");
                        inner.events.emit(ClientEvent::Disconnect { code });
                    }
                    SessionEnd::Failed | SessionEnd::DeadHeartbeat => {
                        inner.events.emit(ClientEvent::Disconnect { code: None });
                    }
                }
            }
            Err(e) => {
                failures = failures.saturating_add(1);
                warn!(generation, error = %e, failures, "Connection attempt failed");
                inner.events.emit(ClientEvent::error(e.into()));
            }
        }

        let delay = inner.config.reconnect_delay_after(failures);
        info!(delay_ms = delay.as_millis() as u64, "Reconnecting");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = logged_out(inner.logged_out.subscribe()) => break,
        }
    }

    info!("Connection supervisor stopped");
}

async fn run_session(inner: &Arc<Inner>, generation: u64, handle: TransportHandle) -> SessionEnd {
    let TransportHandle {
        outbound,
        mut events,
    } = handle;
    let halt = Arc::new(Notify::new());
    open_session(inner, generation, &outbound, &halt);

    let mut heartbeat = Heartbeat::new(inner.config.heartbeat_threshold);
    let period = inner.config.heartbeat_interval.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let end = loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(TransportEvent::Message(text)) => handle_frame(inner, generation, &text),
                    Some(TransportEvent::Error(reason)) => {
                        warn!(generation, reason = %reason, "Transport error");
                        inner.events.emit(ClientEvent::error(TransportError::Connection(reason).into()));
                        break SessionEnd::Failed;
                    }
                    Some(TransportEvent::Closed(code)) => break SessionEnd::Closed(code),
                    None => break SessionEnd::Closed(None),
                }
            }

            _ = ticker.tick() => {
                match heartbeat.on_tick() {
                    Beat::Probe => send_probe(inner, generation, &outbound, heartbeat.pong_flag()),
                    Beat::Dead => {
                        inner.events.emit(ClientEvent::DeadHeartbeat);
                        request_close(generation, &outbound);
                        break SessionEnd::DeadHeartbeat;
                    }
                }
            }

            _ = halt.notified() => {
                request_close(generation, &outbound);
                break SessionEnd::Halted;
            }

            _ = logged_out(inner.logged_out.subscribe()) => {
                request_close(generation, &outbound);
                break SessionEnd::LoggedOut;
            }
        }
    };

    close_session(inner, generation, &end);
    end
}

fn open_session(
    inner: &Arc<Inner>,
    generation: u64,
    outbound: &mpsc::Sender<Outgoing>,
    halt: &Arc<Notify>,
) {
    *lock(&inner.link) = Some(Link {
        generation,
        outbound: outbound.clone(),
        halt: halt.clone(),
    });
    lock(&inner.registry).abandon_stale(generation, Abandoned::ConnectionLost);
    inner.auth.send_replace(AuthState::Unauthenticated);

    let (reconnects, reauth) = {
        let mut state = lock(&inner.state);
        state.connect_count += 1;
        state.invalidate_all();
        (state.connect_count - 1, state.ever_authenticated)
    };

    info!(generation, "Connection open");
    if reconnects == 0 {
        inner.events.emit(ClientEvent::Ready);
    } else {
        let client = Client {
            inner: inner.clone(),
        };
        tokio::spawn(restore_session(client, generation, reconnects, reauth));
    }
}

fn close_session(inner: &Arc<Inner>, generation: u64, end: &SessionEnd) {
    {
        let mut link = lock(&inner.link);
        if link.as_ref().is_some_and(|l| l.generation == generation) {
            *link = None;
        }
    }

    let reason = match end {
        SessionEnd::LoggedOut => Abandoned::LoggedOut,
        _ => Abandoned::ConnectionLost,
    };
    lock(&inner.registry).abandon_all(reason);
    lock(&inner.state).invalidate_all();

    debug!(generation, end = ?end, "Session ended");
}

/// Ask the transport task to close. A full queue means the socket is
/// stalled; the session ends anyway and the transport is dropped with it.
fn request_close(generation: u64, outbound: &mpsc::Sender<Outgoing>) {
    if let Err(TrySendError::Full(_)) = outbound.try_send(Outgoing::Close) {
        debug!(generation, "Outbound queue full, dropping transport without close frame");
    }
}

/// Queue a ping. Never waits on the outbound queue: a probe that cannot be
/// queued leaves the pong flag unset and counts as a miss on the next tick.
fn send_probe(
    inner: &Arc<Inner>,
    generation: u64,
    outbound: &mpsc::Sender<Outgoing>,
    pong: Arc<AtomicBool>,
) {
    let probe = Command::bare(kind::PING);
    let text = match probe.encode() {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "Failed to encode heartbeat probe");
            return;
        }
    };

    // Any correlated reply proves the server is alive.
    let registered = lock(&inner.registry).register(
        probe.request_id.clone(),
        generation,
        Box::new(move |reply| {
            if reply.is_ok() {
                pong.store(true, Ordering::SeqCst);
            }
        }),
    );
    if let Err(e) = registered {
        warn!(error = %e, "Failed to register heartbeat probe");
        return;
    }

    match outbound.try_send(Outgoing::Text(text)) {
        Ok(()) => trace!(generation, "Sent heartbeat probe"),
        Err(e) => {
            lock(&inner.registry).cancel(&probe.request_id);
            if let TrySendError::Full(_) = e {
                warn!(generation, "Outbound queue full, heartbeat probe skipped");
            }
        }
    }
}

fn handle_frame(inner: &Arc<Inner>, generation: u64, text: &str) {
    let inbound = match Inbound::parse(text) {
        Ok(inbound) => inbound,
        Err(e) => {
            warn!(generation, error = %e, "Discarding malformed frame");
            inner.events.emit(ClientEvent::error(e.into()));
            return;
        }
    };

    let dispatch = lock(&inner.registry).dispatch(inbound);
    if let Dispatch::Unsolicited(push) = dispatch {
        if let Err(e) = route_push(inner, push) {
            warn!(generation, error = %e, "Failed to handle push");
            inner.events.emit(ClientEvent::error(e));
        }
    }
}

/// Handle a frame that answers no pending request.
fn route_push(inner: &Arc<Inner>, push: Inbound) -> Result<()> {
    let push_kind = push.kind.clone();
    match push_kind.as_str() {
        kind::CHAT => {
            let message: ChatMessage = serde_json::from_value(Value::Object(push.body))?;
            trace!(channel = %message.channel_id, "Chat message");
            inner.events.emit(ClientEvent::Message(message));
        }
        kind::CLIENT_INFO => {
            let user: User = push.field("client")?;
            lock(&inner.state).user = Some(user.clone());
            inner.events.emit(ClientEvent::UserInfo(user));
        }
        kind::PEER_CHANGE => {
            let user: User = push.field("client")?;
            inner.events.emit(ClientEvent::PeerChange(user));
        }
        kind::CHANNEL_LIST => {
            let channels: Vec<Channel> = push.field("data")?;
            {
                let mut state = lock(&inner.state);
                state.invalidate_channels();
                let epoch = state.cache_epoch();
                state.store_channels(epoch, channels.clone());
            }
            inner.events.emit(ClientEvent::ChannelList(channels));
        }
        kind::ONLINE_LIST => {
            let channel_id: ChannelId = push.field("channelID")?;
            let users: Vec<User> = push.field("data")?;
            {
                let mut state = lock(&inner.state);
                state.invalidate_online(&channel_id);
                let epoch = state.cache_epoch();
                state.store_online(epoch, channel_id.clone(), users.clone());
            }
            inner.events.emit(ClientEvent::OnlineList { channel_id, users });
        }
        kind::POWER_LEVELS => {
            let levels: PowerLevels = push.field("powerLevels")?;
            debug!(?levels, "Server power levels");
            lock(&inner.state).power_levels = levels;
        }
        kind::CHALLENGE => {
            let client = Client {
                inner: inner.clone(),
            };
            tokio::spawn(client.answer_challenge(push));
        }
        kind::HISTORY => debug!("Ignoring unrequested history batch"),
        kind::PONG => trace!("Late heartbeat reply"),
        other => debug!(kind = %other, "Unhandled push"),
    }
    Ok(())
}

/// Re-authenticate and rejoin channels after a reconnect.
async fn restore_session(client: Client, generation: u64, reconnects: u64, reauth: bool) {
    if reauth {
        if let Err(e) = client.auth().await {
            warn!(generation, error = %e, "Re-authentication failed, channels not rejoined");
            return;
        }
    }

    let channels = client.joined_channels();
    debug!(generation, count = channels.len(), "Rejoining channels");
    for channel_id in channels {
        if client.generation() != generation {
            debug!(generation, "Restore superseded by a newer connection");
            return;
        }
        match client.channels().rejoin(&channel_id).await {
            Ok(()) => debug!(channel = %channel_id, "Rejoined channel"),
            Err(
                e @ (ClientError::ConnectionLost | ClientError::LoggedOut | ClientError::NotConnected),
            ) => {
                warn!(channel = %channel_id, error = %e, "Rejoin interrupted");
                return;
            }
            Err(ClientError::Api(api)) => {
                warn!(channel = %channel_id, error = %api, "Server refused rejoin");
                lock(&client.inner.state).mark_left(&channel_id);
                client.inner.events.emit(ClientEvent::error(ClientError::Api(api)));
            }
            Err(e) => {
                // The channel stays on the list and is retried on the next reconnect.
                warn!(channel = %channel_id, error = %e, "Rejoin failed");
                client.inner.events.emit(ClientEvent::error(e));
            }
        }
    }

    if client.generation() == generation {
        info!(generation, reconnects, "Session restored");
        client
            .inner
            .events
            .emit(ClientEvent::Reconnect { attempt: reconnects });
    }
}
