mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::timeout;

use vex_client::{ChannelId, Client, ClientConfig, ClientError, ClientEvent, KeyRing};
use vex_net::MemoryConnector;

use common::*;

#[tokio::test]
async fn pending_calls_fail_with_connection_lost() {
    let mut h = start(config()).await;

    let join = tokio::spawn({
        let client = h.client.clone();
        async move { client.channels().join(&ChannelId::from("c1")).await }
    });
    let lookup = tokio::spawn({
        let client = h.client.clone();
        async move { client.users().retrieve(&"u1".into()).await }
    });
    next_frame(&mut h.server).await;
    next_frame(&mut h.server).await;
    assert_eq!(h.client.pending_requests(), 2);

    h.server.close(Some(1006)).await;

    let result = timeout(STEP, join).await.unwrap().unwrap();
    assert!(matches!(result, Err(ClientError::ConnectionLost)));
    let result = timeout(STEP, lookup).await.unwrap().unwrap();
    assert!(matches!(result, Err(ClientError::ConnectionLost)));
    assert_eq!(h.client.pending_requests(), 0);

    expect_event(&mut h.events, |e| {
        matches!(e, ClientEvent::Disconnect { code: Some(1006) })
    })
    .await;

    let _server = accept(&mut h.listener).await;
    expect_event(&mut h.events, |e| {
        matches!(e, ClientEvent::Reconnect { attempt: 1 })
    })
    .await;
    assert_eq!(h.client.generation(), 2);
    assert!(h.client.joined_channels().is_empty());
}

#[tokio::test]
async fn rejoins_in_original_order_without_left_channels() {
    let mut h = start(config()).await;
    for id in ["c1", "c2", "c3"] {
        join(&h.client, &mut h.server, id).await;
    }
    leave(&h.client, &mut h.server, "c2").await;

    h.server.close(None).await;
    expect_event(&mut h.events, |e| matches!(e, ClientEvent::Disconnect { .. })).await;

    let mut server = accept(&mut h.listener).await;
    for expected in ["c1", "c3"] {
        let frame = next_frame(&mut server).await;
        assert_eq!(frame["type"], "channel");
        assert_eq!(frame["method"], "JOIN");
        assert_eq!(frame["channelID"], expected);
        reply_success(&server, &frame, json!({ "channelID": expected, "name": expected })).await;
    }

    expect_event(&mut h.events, |e| matches!(e, ClientEvent::Reconnect { .. })).await;
    assert_eq!(
        h.client.joined_channels(),
        vec![ChannelId::from("c1"), ChannelId::from("c3")]
    );
}

#[tokio::test]
async fn reauthenticates_before_rejoining() {
    let mut h = start(config()).await;

    let auth = tokio::spawn({
        let client = h.client.clone();
        async move { client.auth().await }
    });
    serve_handshake(&mut h.server, &h.server_keys).await;
    auth.await.unwrap().unwrap();
    join(&h.client, &mut h.server, "c1").await;

    h.server.close(None).await;

    let mut server = accept(&mut h.listener).await;
    serve_handshake(&mut server, &h.server_keys).await;

    let frame = next_frame(&mut server).await;
    assert_eq!(frame["method"], "JOIN");
    assert_eq!(frame["channelID"], "c1");
    reply_success(&server, &frame, json!({ "channelID": "c1", "name": "c1" })).await;

    expect_event(&mut h.events, |e| matches!(e, ClientEvent::Reconnect { attempt: 1 })).await;
    assert!(h.client.is_authenticated());
}

#[tokio::test]
async fn different_key_after_pinning_is_rejected() {
    let mut h = start(config()).await;

    let auth = tokio::spawn({
        let client = h.client.clone();
        async move { client.auth().await }
    });
    serve_handshake(&mut h.server, &h.server_keys).await;
    auth.await.unwrap().unwrap();

    h.server.close(None).await;

    let mut server = accept(&mut h.listener).await;
    let impostor = KeyRing::generate();
    let frame = next_frame(&mut server).await;
    answer_challenge(&server, &frame, &impostor).await;

    expect_event(&mut h.events, |e| {
        matches!(e, ClientEvent::Error(err) if matches!(**err, ClientError::TrustViolation(_)))
    })
    .await;
    expect_closed(&mut server).await;
    assert_no_connection(&mut h.listener).await;
}

#[tokio::test]
async fn failed_rejoin_does_not_block_the_rest() {
    let mut h = start(config()).await;
    join(&h.client, &mut h.server, "gone").await;
    join(&h.client, &mut h.server, "c2").await;

    h.server.close(None).await;

    let mut server = accept(&mut h.listener).await;
    let frame = next_frame(&mut server).await;
    assert_eq!(frame["channelID"], "gone");
    reply_error(&server, &frame, "E404", "no such channel").await;

    let frame = next_frame(&mut server).await;
    assert_eq!(frame["channelID"], "c2");
    reply_success(&server, &frame, json!({ "channelID": "c2", "name": "c2" })).await;

    expect_event(&mut h.events, |e| matches!(e, ClientEvent::Reconnect { .. })).await;
    assert_eq!(h.client.joined_channels(), vec![ChannelId::from("c2")]);
}

#[tokio::test]
async fn dead_heartbeat_reconnects_exactly_once() {
    let mut h = start(ClientConfig {
        heartbeat_interval: Duration::from_millis(30),
        heartbeat_threshold: 2,
        ..config()
    })
    .await;

    // The first server never answers probes.
    expect_event(&mut h.events, |e| matches!(e, ClientEvent::DeadHeartbeat)).await;
    let frame = next_frame(&mut h.server).await;
    assert_eq!(frame["type"], "ping");
    expect_closed(&mut h.server).await;

    let server = accept(&mut h.listener).await;
    let responder = spawn_pong_responder(server);

    let dead = count_events(&mut h.events, QUIET, |e| matches!(e, ClientEvent::DeadHeartbeat)).await;
    assert_eq!(dead, 0);
    assert_no_connection(&mut h.listener).await;
    assert_eq!(h.client.generation(), 2);
    assert!(h.client.is_connected());

    h.client.logout();
    timeout(STEP, responder).await.unwrap().unwrap();
}

#[tokio::test]
async fn answered_heartbeat_keeps_the_connection() {
    let h = start(ClientConfig {
        heartbeat_interval: Duration::from_millis(20),
        ..config()
    })
    .await;
    let Harness {
        client,
        mut listener,
        server,
        mut events,
        ..
    } = h;
    let _responder = spawn_pong_responder(server);

    let dead = count_events(&mut events, QUIET, |e| matches!(e, ClientEvent::DeadHeartbeat)).await;
    assert_eq!(dead, 0);
    assert_no_connection(&mut listener).await;
    assert!(client.is_connected());
}

#[tokio::test]
async fn logout_disarms_reconnect() {
    let mut h = start(config()).await;

    let join = tokio::spawn({
        let client = h.client.clone();
        async move { client.channels().join(&ChannelId::from("c1")).await }
    });
    next_frame(&mut h.server).await;

    h.client.logout();

    let result = timeout(STEP, join).await.unwrap().unwrap();
    assert!(matches!(result, Err(ClientError::LoggedOut)));
    expect_closed(&mut h.server).await;
    assert_no_connection(&mut h.listener).await;

    let again = h.client.channels().join(&ChannelId::from("c1")).await;
    assert!(matches!(again, Err(ClientError::LoggedOut)));
    assert!(!h.client.is_connected());
}

#[tokio::test]
async fn refused_connection_is_retried() {
    let (connector, mut listener) = MemoryConnector::new();
    listener.set_refuse(true);

    let client = Client::new(config(), Arc::new(KeyRing::generate()), Arc::new(connector)).unwrap();
    let mut events = client.subscribe();

    expect_event(&mut events, |e| {
        matches!(e, ClientEvent::Error(err) if matches!(**err, ClientError::Transport(_)))
    })
    .await;
    assert!(!client.is_connected());

    listener.set_refuse(false);
    let _server = accept(&mut listener).await;
    expect_event(&mut events, |e| matches!(e, ClientEvent::Ready)).await;
    assert!(client.generation() >= 2);
}

#[tokio::test]
async fn rejoin_with_undecodable_payload_still_counts() {
    let mut h = start(config()).await;
    join(&h.client, &mut h.server, "c1").await;
    join(&h.client, &mut h.server, "c2").await;

    h.server.close(None).await;

    let mut server = accept(&mut h.listener).await;
    let frame = next_frame(&mut server).await;
    assert_eq!(frame["channelID"], "c1");
    reply_success(&server, &frame, json!(null)).await;

    let frame = next_frame(&mut server).await;
    assert_eq!(frame["channelID"], "c2");
    reply_success(&server, &frame, json!({ "channelID": "c2", "name": "c2" })).await;

    expect_event(&mut h.events, |e| matches!(e, ClientEvent::Reconnect { attempt: 1 })).await;
    assert_eq!(
        h.client.joined_channels(),
        vec![ChannelId::from("c1"), ChannelId::from("c2")]
    );
}

#[tokio::test]
async fn timed_out_rejoin_does_not_block_the_rest() {
    let mut h = start(ClientConfig {
        request_timeout: Some(Duration::from_millis(100)),
        ..config()
    })
    .await;
    join(&h.client, &mut h.server, "c1").await;
    join(&h.client, &mut h.server, "c2").await;

    h.server.close(None).await;

    let mut server = accept(&mut h.listener).await;
    let frame = next_frame(&mut server).await;
    assert_eq!(frame["channelID"], "c1");

    let frame = next_frame(&mut server).await;
    assert_eq!(frame["channelID"], "c2");
    reply_success(&server, &frame, json!({ "channelID": "c2", "name": "c2" })).await;

    expect_event(&mut h.events, |e| {
        matches!(e, ClientEvent::Error(err) if matches!(**err, ClientError::Timeout { .. }))
    })
    .await;
    expect_event(&mut h.events, |e| matches!(e, ClientEvent::Reconnect { attempt: 1 })).await;
    // Still joined as far as we know; retried on the next reconnect.
    assert_eq!(
        h.client.joined_channels(),
        vec![ChannelId::from("c1"), ChannelId::from("c2")]
    );
}

#[tokio::test]
async fn transport_error_reports_and_reconnects() {
    let mut h = start(config()).await;

    let lookup = tokio::spawn({
        let client = h.client.clone();
        async move { client.users().retrieve(&"u1".into()).await }
    });
    next_frame(&mut h.server).await;

    h.server.fail("reset").await;

    expect_event(&mut h.events, |e| {
        matches!(e, ClientEvent::Error(err) if matches!(**err, ClientError::Transport(_)))
    })
    .await;
    expect_event(&mut h.events, |e| {
        matches!(e, ClientEvent::Disconnect { code: None })
    })
    .await;
    let result = timeout(STEP, lookup).await.unwrap().unwrap();
    assert!(matches!(result, Err(ClientError::ConnectionLost)));

    let _server = accept(&mut h.listener).await;
    expect_event(&mut h.events, |e| matches!(e, ClientEvent::Reconnect { attempt: 1 })).await;
}

#[tokio::test]
async fn zero_heartbeat_interval_does_not_stop_the_client() {
    let mut h = start(ClientConfig {
        heartbeat_interval: Duration::ZERO,
        ..config()
    })
    .await;

    expect_event(&mut h.events, |e| matches!(e, ClientEvent::DeadHeartbeat)).await;
    let _server = accept(&mut h.listener).await;
}

#[tokio::test]
async fn stalled_outbound_queue_still_detects_dead_heartbeat() {
    let mut h = start(ClientConfig {
        heartbeat_interval: Duration::from_millis(30),
        heartbeat_threshold: 2,
        ..config()
    })
    .await;

    // The server never reads, so these fill the outbound queue.
    let channel = ChannelId::from("c1");
    let senders: Vec<_> = (0..300)
        .map(|i| {
            let client = h.client.clone();
            let channel = channel.clone();
            tokio::spawn(async move { client.messages().send(&channel, &format!("m{i}")).await })
        })
        .collect();

    expect_event(&mut h.events, |e| matches!(e, ClientEvent::DeadHeartbeat)).await;
    let _server = accept(&mut h.listener).await;

    for sender in senders {
        sender.abort();
    }
}
