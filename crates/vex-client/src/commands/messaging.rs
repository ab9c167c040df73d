use vex_shared::constants::NIL_UUID;
use vex_shared::protocol::{kind, Command, Method};
use vex_shared::types::{ChannelId, ChatMessage, MessageId};

use crate::client::Client;
use crate::error::Result;

/// Chat messages.
pub struct Messages<'a> {
    client: &'a Client,
}

impl Client {
    pub fn messages(&self) -> Messages<'_> {
        Messages { client: self }
    }
}

impl Messages<'_> {
    /// Post a message. It comes back to every member, us included, as a
    /// [`ClientEvent::Message`](crate::ClientEvent::Message).
    pub async fn send(&self, channel_id: &ChannelId, body: &str) -> Result<()> {
        let command = Command::new(kind::CHAT, Method::Create)
            .field("channelID", channel_id.as_str())
            .field("message", body);
        self.client.request(command).await?;
        Ok(())
    }

    /// Messages older than `before`, or the most recent ones when `None`.
    pub async fn history(
        &self,
        channel_id: &ChannelId,
        before: Option<&MessageId>,
    ) -> Result<Vec<ChatMessage>> {
        let top = before.map_or(NIL_UUID, MessageId::as_str);
        let command = Command::new(kind::HISTORY_REQ, Method::Retrieve)
            .field("channelID", channel_id.as_str())
            .field("topMessage", top);
        self.client.call(command).await
    }
}
