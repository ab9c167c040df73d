use tracing::info;

use vex_shared::protocol::{kind, Command, Method};
use vex_shared::types::User;

use crate::client::{lock, Client};
use crate::error::Result;

impl Client {
    /// Create a new account bound to our public key.
    ///
    /// The server first assigns a user record; we then prove ownership of
    /// the key by signing the assigned user ID.
    pub async fn register(&self) -> Result<User> {
        let assigned: User = self
            .call(Command::new(kind::IDENTITY, Method::Create))
            .await?;

        let signed = self.inner.keys.sign(assigned.user_id.as_str().as_bytes());
        let command = Command::new(kind::IDENTITY, Method::Register)
            .field("pubkey", hex::encode(self.inner.keys.public_key()))
            .field("signed", hex::encode(signed))
            .field("uuid", assigned.user_id.as_str());
        let user: User = self.call(command).await?;

        info!(user_id = %user.user_id, "Registered account");
        lock(&self.inner.state).user = Some(user.clone());
        Ok(user)
    }
}
