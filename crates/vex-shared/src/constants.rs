/// Path of the WebSocket endpoint on the server.
pub const SOCKET_ENDPOINT: &str = "/socket";

/// Path prefix under which uploaded files are served over HTTP.
pub const FILE_ENDPOINT: &str = "/file";

/// Default server host:port
pub const DEFAULT_HOST: &str = "localhost:8000";

/// Used as `topMessage` when no history has been seen yet.
pub const NIL_UUID: &str = "00000000-0000-0000-0000-000000000000";

/// Ed25519 public key size in bytes
pub const PUBKEY_SIZE: usize = 32;

/// Ed25519 secret seed size in bytes
pub const SECRET_KEY_SIZE: usize = 32;

/// Seed followed by public key, the on-disk private key layout
pub const KEYPAIR_SIZE: usize = 64;

/// Ed25519 signature size in bytes
pub const SIGNATURE_SIZE: usize = 64;

/// File names inside a key folder
pub const PUB_KEY_FILE: &str = "key.pub";
pub const PRIV_KEY_FILE: &str = "key.priv";

/// Heartbeat defaults
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_HEARTBEAT_THRESHOLD: u32 = 2;

/// Reconnect delay after an unplanned close, doubled per failed attempt up
/// to the maximum.
pub const DEFAULT_RECONNECT_DELAY_SECS: u64 = 5;
pub const MAX_RECONNECT_DELAY_SECS: u64 = 60;

/// Bound on the wait for the server's answer to our challenge.
pub const CHALLENGE_TIMEOUT_SECS: u64 = 10;

/// Bound on the total wait for the handshake to reach `Authenticated`.
pub const AUTH_TIMEOUT_SECS: u64 = 10;
