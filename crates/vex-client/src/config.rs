//! Client configuration loaded from environment variables.
//!
//! Every setting has a default that talks to a local development server,
//! so `ClientConfig::default()` is enough to get started.

use std::time::Duration;

use vex_shared::constants::{
    AUTH_TIMEOUT_SECS, CHALLENGE_TIMEOUT_SECS, DEFAULT_HEARTBEAT_INTERVAL_SECS,
    DEFAULT_HEARTBEAT_THRESHOLD, DEFAULT_HOST, DEFAULT_RECONNECT_DELAY_SECS, FILE_ENDPOINT,
    MAX_RECONNECT_DELAY_SECS, PUBKEY_SIZE, SOCKET_ENDPOINT,
};
use vex_shared::types::FileId;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server `host[:port]`, without scheme.
    /// Env: `VEX_HOST`
    /// Default: `localhost:8000`
    pub host: String,

    /// Use `wss://` and `https://`. Turning this off sends everything in
    /// the clear and is only meant for local development.
    /// Env: `VEX_SECURE` (true/false)
    /// Default: `true`
    pub secure: bool,

    /// Pinned server public key (hex, 64 chars). When unset the key
    /// presented on the first successful challenge is pinned instead.
    /// Env: `VEX_SERVER_PUBKEY`
    pub server_pubkey: Option<String>,

    /// Time between liveness probes.
    /// Env: `VEX_HEARTBEAT_MS`
    /// Default: 10 s
    pub heartbeat_interval: Duration,

    /// Consecutive unanswered probes after which the connection is dead.
    /// Env: `VEX_HEARTBEAT_THRESHOLD`
    /// Default: `2`
    pub heartbeat_threshold: u32,

    /// Delay before reopening after a close.
    /// Env: `VEX_RECONNECT_MS`
    /// Default: 5 s
    pub reconnect_delay: Duration,

    /// Upper bound of the reconnect delay once attempts start failing.
    pub max_reconnect_delay: Duration,

    /// How long to wait for the server to answer our challenge.
    pub challenge_timeout: Duration,

    /// How long `auth()` waits for the whole handshake.
    pub auth_timeout: Duration,

    /// Optional bound on every other request. `None` waits until the reply
    /// arrives or the connection is lost.
    pub request_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            secure: true,
            server_pubkey: None,
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_INTERVAL_SECS),
            heartbeat_threshold: DEFAULT_HEARTBEAT_THRESHOLD,
            reconnect_delay: Duration::from_secs(DEFAULT_RECONNECT_DELAY_SECS),
            max_reconnect_delay: Duration::from_secs(MAX_RECONNECT_DELAY_SECS),
            challenge_timeout: Duration::from_secs(CHALLENGE_TIMEOUT_SECS),
            auth_timeout: Duration::from_secs(AUTH_TIMEOUT_SECS),
            request_timeout: None,
        }
    }
}

impl ClientConfig {
    /// Config for `host` with every other setting at its default.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("VEX_HOST") {
            if !host.trim().is_empty() {
                config.host = host.trim().to_string();
            }
        }

        if let Ok(val) = std::env::var("VEX_SECURE") {
            config.secure = val != "false" && val != "0";
        }

        if let Ok(hex_key) = std::env::var("VEX_SERVER_PUBKEY") {
            match parse_hex_pubkey(&hex_key) {
                Ok(key) => config.server_pubkey = Some(key),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "Invalid VEX_SERVER_PUBKEY, pinning on first use instead"
                    );
                }
            }
        }

        if let Ok(val) = std::env::var("VEX_HEARTBEAT_MS") {
            match val.parse::<u64>() {
                Ok(ms) if ms > 0 => config.heartbeat_interval = Duration::from_millis(ms),
                _ => tracing::warn!(value = %val, "Invalid VEX_HEARTBEAT_MS, using default"),
            }
        }

        if let Ok(val) = std::env::var("VEX_HEARTBEAT_THRESHOLD") {
            match val.parse::<u32>() {
                Ok(n) if n > 0 => config.heartbeat_threshold = n,
                _ => tracing::warn!(value = %val, "Invalid VEX_HEARTBEAT_THRESHOLD, using default"),
            }
        }

        if let Ok(val) = std::env::var("VEX_RECONNECT_MS") {
            match val.parse::<u64>() {
                Ok(ms) => config.reconnect_delay = Duration::from_millis(ms),
                _ => tracing::warn!(value = %val, "Invalid VEX_RECONNECT_MS, using default"),
            }
        }

        // RUST_LOG is read by the EnvFilter in `init_tracing`.

        config
    }

    fn scheme_suffix(&self) -> &'static str {
        if self.secure {
            "s"
        } else {
            ""
        }
    }

    /// URL of the server's socket endpoint.
    pub fn ws_url(&self) -> String {
        format!("ws{}://{}{}", self.scheme_suffix(), self.host, SOCKET_ENDPOINT)
    }

    /// Base HTTP URL of the server.
    pub fn http_url(&self) -> String {
        format!("http{}://{}", self.scheme_suffix(), self.host)
    }

    /// Download URL of an uploaded file.
    pub fn file_url(&self, file_id: &FileId) -> String {
        format!("{}{}/{}", self.http_url(), FILE_ENDPOINT, file_id)
    }

    /// Delay before reconnect attempt after `failures` consecutive failed
    /// connection attempts.
    pub fn reconnect_delay_after(&self, failures: u32) -> Duration {
        let factor = 2u32.saturating_pow(failures.min(16));
        self.reconnect_delay
            .saturating_mul(factor)
            .min(self.max_reconnect_delay.max(self.reconnect_delay))
    }
}

/// Validate a hex public key and normalise it to lowercase.
pub(crate) fn parse_hex_pubkey(hex_key: &str) -> Result<String, String> {
    let bytes = hex::decode(hex_key.trim()).map_err(|e| e.to_string())?;
    if bytes.len() != PUBKEY_SIZE {
        return Err(format!(
            "expected {} hex chars, got {}",
            PUBKEY_SIZE * 2,
            hex_key.trim().len()
        ));
    }
    Ok(hex::encode(bytes))
}
