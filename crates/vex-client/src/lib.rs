//! Client-side protocol engine for the Vex chat server.
//!
//! A [`Client`] keeps one logical connection to the server alive over a
//! sequence of transport instances: it correlates replies with requests,
//! authenticates both ends with signed challenges, probes liveness, and
//! on every reconnect restores authentication and channel membership.
//! Resource operations live behind [`Client::channels`],
//! [`Client::users`], [`Client::permissions`], [`Client::files`] and
//! [`Client::messages`].

pub mod client;
pub mod commands;
pub mod config;
mod connection;
pub mod error;
pub mod events;
pub mod handshake;
pub mod heartbeat;
pub mod registry;
pub mod state;

use tracing_subscriber::{fmt, EnvFilter};

pub use client::Client;
pub use commands::{Channels, Files, Messages, Permissions, UserUpdate, Users};
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use events::{ClientEvent, EventKind};
pub use handshake::AuthState;
pub use state::{Account, ClientInfo};

pub use vex_shared::types::{
    Channel, ChannelId, ChatMessage, FileId, FileInfo, MessageId, Permission, PowerLevels, User,
    UserId,
};
pub use vex_shared::{KeyRing, Keys};

/// Install a `tracing` subscriber for applications embedding the client.
///
/// Honours `RUST_LOG`; defaults to debug output for the client and
/// transport crates. Does nothing if a global subscriber is already set.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("vex_client=debug,vex_net=debug,warn"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
