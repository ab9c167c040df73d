//! Mutual challenge-response authentication.
//!
//! Two independent exchanges make up the handshake:
//!
//! * We challenge the server with a random nonce and check its signature
//!   against the pinned server key. With no key pinned yet, the key the
//!   server presents is verified and pinned (trust on first use). A
//!   mismatch or a bad signature is a trust violation: the connection is
//!   closed and not reopened.
//! * The server challenges us. We sign its nonce and the server's verdict
//!   on our response moves the state to `Authenticated` or `Failed`.
//!
//! [`Client::auth`] starts the first exchange and waits for the second to
//! complete.

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use vex_shared::protocol::{kind, Command, Inbound};
use vex_shared::types::User;

use crate::client::{lock, Client};
use crate::error::{ClientError, Result};
use crate::events::ClientEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    /// Our challenge to the server is outstanding.
    ChallengeIssued,
    Authenticated,
    Failed,
}

impl Client {
    pub fn auth_state(&self) -> AuthState {
        *self.inner.auth.borrow()
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth_state() == AuthState::Authenticated
    }

    fn set_auth(&self, next: AuthState) {
        let previous = self.inner.auth.send_replace(next);
        if previous != next {
            debug!(?previous, ?next, "Auth state changed");
        }
    }

    /// Authenticate the connection.
    ///
    /// Resolves with the server's hex public key once the server has proved
    /// its identity and accepted ours.
    pub async fn auth(&self) -> Result<String> {
        let server_key = self.challenge_server().await?;
        self.await_authenticated().await?;
        Ok(server_key)
    }

    async fn challenge_server(&self) -> Result<String> {
        self.inner.auth.send_if_modified(|state| {
            if *state == AuthState::Authenticated {
                false
            } else {
                *state = AuthState::ChallengeIssued;
                true
            }
        });

        let nonce = Uuid::new_v4().to_string();
        let command = Command::bare(kind::CHALLENGE)
            .field("challenge", nonce.as_str())
            .field("pubkey", hex::encode(self.inner.keys.public_key()));

        debug!("Challenging server");
        let timeout = Some(self.inner.config.challenge_timeout);
        let reply = match self.round_trip(command, timeout, "challenge response").await {
            Ok(reply) => reply,
            Err(err) => {
                self.set_auth(AuthState::Failed);
                if let ClientError::Timeout { operation, millis } = &err {
                    self.inner.events.emit(ClientEvent::error(ClientError::Timeout {
                        operation: *operation,
                        millis: *millis,
                    }));
                }
                return Err(err);
            }
        };

        if let Some(api) = reply.api_error() {
            warn!(error = %api, "Server refused our challenge");
            self.set_auth(AuthState::Failed);
            let reason = api.to_string();
            self.inner
                .events
                .emit(ClientEvent::error(ClientError::HandshakeFailed(reason.clone())));
            return Err(ClientError::HandshakeFailed(reason));
        }

        self.verify_server(&nonce, &reply)
            .map_err(|reason| self.reject_server(reason))
    }

    /// Check the server's signature over `nonce`, pinning its key on first
    /// use. Returns the server's hex key.
    fn verify_server(&self, nonce: &str, reply: &Inbound) -> std::result::Result<String, String> {
        let signature = reply
            .str_field("response")
            .ok()
            .and_then(|sig| hex::decode(sig).ok())
            .ok_or("challenge reply carries no readable signature")?;
        let presented = reply.str_field("pubkey").ok().map(str::to_ascii_lowercase);

        let pinned = lock(&self.inner.state).server_pubkey.clone();
        let key_hex = match (pinned.as_ref(), presented) {
            (Some(pinned), Some(presented)) if *pinned != presented => {
                return Err(format!(
                    "server presented key {presented}, pinned key is {pinned}"
                ));
            }
            (Some(pinned), _) => pinned.clone(),
            (None, Some(presented)) => presented,
            (None, None) => return Err("server presented no key".into()),
        };

        let key = hex::decode(&key_hex).map_err(|_| "server key is not valid hex")?;
        if !self.inner.keys.verify(nonce.as_bytes(), &signature, &key) {
            return Err("challenge signature did not verify".into());
        }

        if pinned.is_none() {
            let mut state = lock(&self.inner.state);
            if state.server_pubkey.is_none() {
                info!(server_key = %key_hex, "Pinned server key");
                state.server_pubkey = Some(key_hex.clone());
            }
        }
        Ok(key_hex)
    }

    /// Close the connection for good after the server failed to prove its
    /// identity.
    fn reject_server(&self, reason: String) -> ClientError {
        error!(reason = %reason, "Server failed to prove its identity");
        self.set_auth(AuthState::Failed);
        self.inner
            .events
            .emit(ClientEvent::error(ClientError::TrustViolation(reason.clone())));
        if let Some(link) = lock(&self.inner.link).as_ref() {
            link.halt.notify_one();
        }
        ClientError::TrustViolation(reason)
    }

    /// Answer a challenge pushed by the server.
    pub(crate) async fn answer_challenge(self, challenge: Inbound) {
        let nonce = match challenge.str_field("challenge") {
            Ok(nonce) => nonce.to_string(),
            Err(e) => {
                warn!(error = %e, "Server challenge without a nonce");
                self.inner.events.emit(ClientEvent::error(e.into()));
                return;
            }
        };

        let signature = self.inner.keys.sign(nonce.as_bytes());
        let command = Command::bare(kind::RESPONSE)
            .field("response", hex::encode(signature))
            .field("pubkey", hex::encode(self.inner.keys.public_key()));

        debug!("Answering server challenge");
        let timeout = Some(self.inner.config.challenge_timeout);
        let verdict = match self.round_trip(command, timeout, "challenge verdict").await {
            Ok(reply) => reply,
            Err(ClientError::Timeout { operation, millis }) => {
                self.set_auth(AuthState::Failed);
                self.inner
                    .events
                    .emit(ClientEvent::error(ClientError::Timeout { operation, millis }));
                return;
            }
            Err(e) => {
                debug!(error = %e, "Challenge answer abandoned");
                return;
            }
        };

        match verdict.into_result() {
            Ok(data) => {
                let user: Option<User> = serde_json::from_value(data).ok();
                {
                    let mut state = lock(&self.inner.state);
                    state.ever_authenticated = true;
                    if let Some(user) = &user {
                        state.user = Some(user.clone());
                    }
                }
                self.set_auth(AuthState::Authenticated);
                info!(user = ?user.as_ref().map(|u| u.user_id.as_str()), "Authenticated");
                self.inner.events.emit(ClientEvent::Authed(user));
            }
            Err(api) => {
                warn!(error = %api, "Server rejected our challenge response");
                self.set_auth(AuthState::Failed);
                self.inner
                    .events
                    .emit(ClientEvent::error(ClientError::HandshakeFailed(api.to_string())));
            }
        }
    }

    async fn await_authenticated(&self) -> Result<()> {
        let mut rx = self.inner.auth.subscribe();
        let limit = self.inner.config.auth_timeout;
        let settled = tokio::time::timeout(
            limit,
            rx.wait_for(|state| matches!(state, AuthState::Authenticated | AuthState::Failed)),
        )
        .await
        .map(|outcome| outcome.map(|state| *state));

        match settled {
            Ok(Ok(AuthState::Authenticated)) => Ok(()),
            Ok(Ok(_)) => Err(ClientError::HandshakeFailed(
                "server rejected our challenge response".into(),
            )),
            Ok(Err(_)) => Err(ClientError::NotConnected),
            Err(_) => {
                warn!(timeout_ms = limit.as_millis() as u64, "Authentication timed out");
                self.set_auth(AuthState::Failed);
                let millis = limit.as_millis() as u64;
                let operation = "authentication";
                self.inner
                    .events
                    .emit(ClientEvent::error(ClientError::Timeout { operation, millis }));
                Err(ClientError::Timeout { operation, millis })
            }
        }
    }
}
