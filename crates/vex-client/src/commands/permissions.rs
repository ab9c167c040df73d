use serde_json::json;

use vex_shared::protocol::{kind, Command, Method};
use vex_shared::types::{ChannelId, Permission, UserId};

use crate::client::Client;
use crate::error::Result;

/// Access grants on private channels.
pub struct Permissions<'a> {
    client: &'a Client,
}

impl Client {
    pub fn permissions(&self) -> Permissions<'_> {
        Permissions { client: self }
    }
}

impl Permissions<'_> {
    pub async fn grant(&self, user_id: &UserId, channel_id: &ChannelId) -> Result<Permission> {
        let command = Command::new(kind::CHANNEL_PERM, Method::Create).field(
            "permission",
            json!({ "channelID": channel_id, "userID": user_id }),
        );
        self.client.call(command).await
    }

    pub async fn retrieve(&self, channel_id: &ChannelId) -> Result<Vec<Permission>> {
        let command = Command::new(kind::CHANNEL_PERM, Method::Retrieve)
            .field("permission", json!({ "channelID": channel_id }));
        self.client.call(command).await
    }

    pub async fn revoke(&self, user_id: &UserId, channel_id: &ChannelId) -> Result<Permission> {
        let command = Command::new(kind::CHANNEL_PERM, Method::Delete).field(
            "permission",
            json!({ "channelID": channel_id, "userID": user_id }),
        );
        self.client.call(command).await
    }
}
