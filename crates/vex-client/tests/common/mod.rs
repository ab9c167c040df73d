//! Scripted server side for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio::time::timeout;

use vex_client::{ChannelId, Client, ClientConfig, ClientEvent, KeyRing, Keys};
use vex_net::{MemoryConnector, MemoryListener, ServerEnd};

/// Upper bound on any single expected step.
pub const STEP: Duration = Duration::from_secs(2);

/// Window in which something must *not* happen.
pub const QUIET: Duration = Duration::from_millis(250);

pub fn config() -> ClientConfig {
    ClientConfig {
        secure: false,
        heartbeat_interval: Duration::from_secs(3600),
        reconnect_delay: Duration::from_millis(20),
        max_reconnect_delay: Duration::from_millis(100),
        challenge_timeout: Duration::from_secs(2),
        auth_timeout: Duration::from_secs(2),
        ..ClientConfig::new("chat.test")
    }
}

pub struct Harness {
    pub client: Client,
    pub listener: MemoryListener,
    pub server: ServerEnd,
    pub events: broadcast::Receiver<ClientEvent>,
    pub server_keys: KeyRing,
}

/// Start a client and wait until its first connection is ready.
pub async fn start(config: ClientConfig) -> Harness {
    let (connector, mut listener) = MemoryConnector::new();
    let client =
        Client::new(config, Arc::new(KeyRing::generate()), Arc::new(connector)).unwrap();
    let mut events = client.subscribe();
    let server = accept(&mut listener).await;
    expect_event(&mut events, |e| matches!(e, ClientEvent::Ready)).await;
    Harness {
        client,
        listener,
        server,
        events,
        server_keys: KeyRing::generate(),
    }
}

pub async fn accept(listener: &mut MemoryListener) -> ServerEnd {
    timeout(STEP, listener.accept())
        .await
        .expect("client made no connection attempt")
        .expect("connector dropped")
}

/// Assert the client does not open another connection for a while.
pub async fn assert_no_connection(listener: &mut MemoryListener) {
    assert!(
        timeout(QUIET, listener.accept()).await.is_err(),
        "client reconnected unexpectedly"
    );
}

pub async fn next_frame(server: &mut ServerEnd) -> Value {
    let text = timeout(STEP, server.recv())
        .await
        .expect("no frame from client")
        .expect("client closed the transport");
    serde_json::from_str(&text).unwrap()
}

/// Wait until the client closes its side of `server`.
pub async fn expect_closed(server: &mut ServerEnd) {
    timeout(STEP, async {
        while server.recv().await.is_some() {}
    })
    .await
    .expect("client kept the transport open");
}

pub async fn send(server: &ServerEnd, frame: Value) {
    server.send(frame.to_string()).await.unwrap();
}

pub async fn reply_success(server: &ServerEnd, request: &Value, data: Value) {
    send(
        server,
        json!({
            "type": request["type"],
            "transmissionID": request["transmissionID"],
            "status": "success",
            "data": data,
        }),
    )
    .await;
}

pub async fn reply_error(server: &ServerEnd, request: &Value, code: &str, message: &str) {
    send(
        server,
        json!({
            "type": request["type"],
            "transmissionID": request["transmissionID"],
            "status": "error",
            "code": code,
            "message": message,
        }),
    )
    .await;
}

pub async fn expect_event<F>(events: &mut broadcast::Receiver<ClientEvent>, matches: F) -> ClientEvent
where
    F: Fn(&ClientEvent) -> bool,
{
    timeout(STEP, async {
        loop {
            match events.recv().await {
                Ok(event) if matches(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(e) => panic!("event stream ended: {e}"),
            }
        }
    })
    .await
    .expect("expected event did not arrive")
}

/// Count matching events raised during `window`.
pub async fn count_events<F>(
    events: &mut broadcast::Receiver<ClientEvent>,
    window: Duration,
    matches: F,
) -> usize
where
    F: Fn(&ClientEvent) -> bool,
{
    let deadline = tokio::time::Instant::now() + window;
    let mut count = 0;
    loop {
        match tokio::time::timeout_at(deadline, events.recv()).await {
            Ok(Ok(event)) => {
                if matches(&event) {
                    count += 1;
                }
            }
            Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
            Ok(Err(_)) | Err(_) => return count,
        }
    }
}

/// Answer the client's challenge frame by signing its nonce with `keys`.
pub async fn answer_challenge(server: &ServerEnd, frame: &Value, keys: &KeyRing) {
    assert_eq!(frame["type"], "challenge");
    let nonce = frame["challenge"].as_str().unwrap();
    send(
        server,
        json!({
            "type": "response",
            "transmissionID": frame["transmissionID"],
            "response": hex::encode(keys.sign(nonce.as_bytes())),
            "pubkey": hex::encode(keys.public_key()),
        }),
    )
    .await;
}

/// Challenge the client with `nonce`, check its signed answer and accept it.
pub async fn challenge_client(server: &mut ServerEnd, nonce: &str) -> Value {
    send(server, json!({ "type": "challenge", "challenge": nonce })).await;

    let response = next_frame(server).await;
    assert_eq!(response["type"], "response");
    let pubkey = hex::decode(response["pubkey"].as_str().unwrap()).unwrap();
    let signature = hex::decode(response["response"].as_str().unwrap()).unwrap();
    vex_shared::identity::verify_signature(&pubkey, nonce.as_bytes(), &signature)
        .expect("client signed the wrong nonce");

    reply_success(server, &response, json!({ "userID": "u1", "username": "ada" })).await;
    response
}

/// Serve both halves of a handshake started by `Client::auth`.
pub async fn serve_handshake(server: &mut ServerEnd, keys: &KeyRing) {
    let frame = next_frame(server).await;
    answer_challenge(server, &frame, keys).await;
    challenge_client(server, "server-nonce").await;
}

/// Join `id`, serving the JOIN on `server`.
pub async fn join(client: &Client, server: &mut ServerEnd, id: &str) {
    let task = tokio::spawn({
        let client = client.clone();
        let id = ChannelId::from(id);
        async move { client.channels().join(&id).await }
    });
    let frame = next_frame(server).await;
    assert_eq!(frame["method"], "JOIN");
    reply_success(server, &frame, json!({ "channelID": id, "name": id })).await;
    task.await.unwrap().unwrap();
}

pub async fn leave(client: &Client, server: &mut ServerEnd, id: &str) {
    let task = tokio::spawn({
        let client = client.clone();
        let id = ChannelId::from(id);
        async move { client.channels().leave(&id).await }
    });
    let frame = next_frame(server).await;
    assert_eq!(frame["method"], "LEAVE");
    reply_success(server, &frame, json!({ "channelID": id, "name": id })).await;
    task.await.unwrap().unwrap();
}

/// Answer every heartbeat probe on `server` until the client closes it.
pub fn spawn_pong_responder(mut server: ServerEnd) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(text) = server.recv().await {
            let frame: Value = serde_json::from_str(&text).unwrap();
            if frame["type"] == "ping" {
                send(
                    &server,
                    json!({ "type": "pong", "transmissionID": frame["transmissionID"] }),
                )
                .await;
            }
        }
    })
}
