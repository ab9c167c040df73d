use serde_json::Value;
use tracing::debug;

use vex_shared::protocol::{kind, Command, Method};
use vex_shared::types::{User, UserId};

use crate::client::{lock, Client};
use crate::error::Result;

/// Fields to change on a user record. `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub avatar: Option<String>,
    pub power_level: Option<i64>,
}

/// User operations.
pub struct Users<'a> {
    client: &'a Client,
}

impl Client {
    pub fn users(&self) -> Users<'_> {
        Users { client: self }
    }
}

impl Users<'_> {
    pub async fn retrieve(&self, user_id: &UserId) -> Result<User> {
        let command = Command::new(kind::USER, Method::Retrieve).field("userID", user_id.as_str());
        self.client.call(command).await
    }

    pub async fn update(&self, user_id: &UserId, update: UserUpdate) -> Result<User> {
        let mut command =
            Command::new(kind::USER, Method::Update).field("userID", user_id.as_str());
        if let Some(username) = update.username {
            command = command.field("username", username);
        }
        if let Some(avatar) = update.avatar {
            command = command.field("avatar", avatar);
        }
        if let Some(level) = update.power_level {
            command = command.field("powerLevel", Value::from(level));
        }
        let user: User = self.client.call(command).await?;
        self.remember_if_self(&user);
        Ok(user)
    }

    pub async fn kick(&self, user_id: &UserId) -> Result<User> {
        let command = Command::new(kind::USER, Method::Kick).field("userID", user_id.as_str());
        self.client.call(command).await
    }

    pub async fn ban(&self, user_id: &UserId) -> Result<User> {
        let command = Command::new(kind::USER, Method::Ban).field("userID", user_id.as_str());
        self.client.call(command).await
    }

    /// Change our own username.
    pub async fn nick(&self, username: &str) -> Result<User> {
        let command = Command::new(kind::USER, Method::Nick).field("username", username);
        let user: User = self.client.call(command).await?;
        debug!(username, "Changed nickname");
        self.remember_if_self(&user);
        Ok(user)
    }

    fn remember_if_self(&self, user: &User) {
        let mut state = lock(&self.client.inner.state);
        let is_self = state
            .user
            .as_ref()
            .map_or(true, |current| current.user_id == user.user_id);
        if is_self {
            state.user = Some(user.clone());
        }
    }
}
