use tracing::debug;

use vex_shared::protocol::{kind, Command, Method};
use vex_shared::types::{Channel, ChannelId, User};

use crate::client::{lock, Client};
use crate::error::Result;

/// Channel operations.
pub struct Channels<'a> {
    client: &'a Client,
}

impl Client {
    pub fn channels(&self) -> Channels<'_> {
        Channels { client: self }
    }
}

impl Channels<'_> {
    pub async fn create(&self, name: &str, public: bool) -> Result<Channel> {
        let command = Command::new(kind::CHANNEL, Method::Create)
            .field("name", name)
            .field("privateChannel", !public);
        let channel: Channel = self.client.call(command).await?;
        lock(&self.client.inner.state).invalidate_channels();
        debug!(channel = %channel.channel_id, name, "Created channel");
        Ok(channel)
    }

    pub async fn delete(&self, channel_id: &ChannelId) -> Result<Channel> {
        let command =
            Command::new(kind::CHANNEL, Method::Delete).field("channelID", channel_id.as_str());
        let channel: Channel = self.client.call(command).await?;
        {
            let mut state = lock(&self.client.inner.state);
            state.invalidate_channels();
            state.mark_left(channel_id);
        }
        Ok(channel)
    }

    /// Join a channel. Joined channels are rejoined after a reconnect.
    pub async fn join(&self, channel_id: &ChannelId) -> Result<Channel> {
        let command =
            Command::new(kind::CHANNEL, Method::Join).field("channelID", channel_id.as_str());
        let channel: Channel = self.client.call(command).await?;
        lock(&self.client.inner.state).mark_joined(channel_id);
        debug!(channel = %channel_id, "Joined channel");
        Ok(channel)
    }

    /// Rejoin a channel after a reconnect. Any success reply counts, whatever
    /// its payload.
    pub(crate) async fn rejoin(&self, channel_id: &ChannelId) -> Result<()> {
        let command =
            Command::new(kind::CHANNEL, Method::Join).field("channelID", channel_id.as_str());
        self.client.request(command).await?;
        Ok(())
    }

    pub async fn leave(&self, channel_id: &ChannelId) -> Result<Channel> {
        let command =
            Command::new(kind::CHANNEL, Method::Leave).field("channelID", channel_id.as_str());
        let channel: Channel = self.client.call(command).await?;
        lock(&self.client.inner.state).mark_left(channel_id);
        debug!(channel = %channel_id, "Left channel");
        Ok(channel)
    }

    /// Channels visible to us. Served from cache until the server pushes a
    /// change or the connection is replaced.
    pub async fn retrieve(&self) -> Result<Vec<Channel>> {
        let epoch = {
            let state = lock(&self.client.inner.state);
            if let Some(channels) = state.cached_channels() {
                return Ok(channels);
            }
            state.cache_epoch()
        };

        let channels: Vec<Channel> = self
            .client
            .call(Command::new(kind::CHANNEL, Method::Retrieve))
            .await?;
        lock(&self.client.inner.state).store_channels(epoch, channels.clone());
        Ok(channels)
    }

    /// Users currently online in a channel.
    pub async fn active(&self, channel_id: &ChannelId) -> Result<Vec<User>> {
        let epoch = {
            let state = lock(&self.client.inner.state);
            if let Some(users) = state.cached_online(channel_id) {
                return Ok(users);
            }
            state.cache_epoch()
        };

        let command =
            Command::new(kind::CHANNEL, Method::Active).field("channelID", channel_id.as_str());
        let users: Vec<User> = self.client.call(command).await?;
        lock(&self.client.inner.state).store_online(epoch, channel_id.clone(), users.clone());
        Ok(users)
    }
}
