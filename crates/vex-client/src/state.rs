//! Session state shared by the connection task and the operation facade.
//!
//! Held behind a `std::sync::Mutex` inside the client. Never hold the lock
//! across an `.await`.

use std::collections::HashMap;

use serde::Serialize;

use vex_shared::types::{Channel, ChannelId, PowerLevels, User};

/// Snapshot of the account this client acts for.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Our public key, hex.
    pub public_key: String,
    /// The pinned server key, hex. `None` until pinned.
    pub server_public_key: Option<String>,
    pub hostname: String,
    pub user: Option<User>,
}

/// Summary of the connection as the client currently sees it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub authed: bool,
    pub client: Option<User>,
    pub host: String,
    pub secure: bool,
    pub power_levels: PowerLevels,
    pub joined_channels: Vec<ChannelId>,
}

pub struct ClientState {
    /// Channels we successfully joined, in join order.
    joined: Vec<ChannelId>,

    channel_cache: Option<Vec<Channel>>,
    online_cache: HashMap<ChannelId, Vec<User>>,
    /// Bumped on every invalidation so an in-flight fetch started before
    /// the invalidation does not repopulate the cache with stale data.
    cache_epoch: u64,

    pub user: Option<User>,
    pub server_pubkey: Option<String>,
    pub power_levels: PowerLevels,

    /// Number of transports opened so far.
    pub connect_count: u64,
    /// Whether any handshake on any connection succeeded.
    pub ever_authenticated: bool,
}

impl ClientState {
    pub fn new(server_pubkey: Option<String>) -> Self {
        Self {
            joined: Vec::new(),
            channel_cache: None,
            online_cache: HashMap::new(),
            cache_epoch: 0,
            user: None,
            server_pubkey,
            power_levels: PowerLevels::default(),
            connect_count: 0,
            ever_authenticated: false,
        }
    }

    pub fn joined(&self) -> &[ChannelId] {
        &self.joined
    }

    pub fn mark_joined(&mut self, channel_id: &ChannelId) {
        if !self.joined.contains(channel_id) {
            self.joined.push(channel_id.clone());
        }
    }

    pub fn mark_left(&mut self, channel_id: &ChannelId) {
        self.joined.retain(|id| id != channel_id);
    }

    pub fn cache_epoch(&self) -> u64 {
        self.cache_epoch
    }

    pub fn cached_channels(&self) -> Option<Vec<Channel>> {
        self.channel_cache.clone()
    }

    /// Store a fetched channel list unless the cache was invalidated since
    /// `epoch`.
    pub fn store_channels(&mut self, epoch: u64, channels: Vec<Channel>) {
        if epoch == self.cache_epoch {
            self.channel_cache = Some(channels);
        }
    }

    pub fn cached_online(&self, channel_id: &ChannelId) -> Option<Vec<User>> {
        self.online_cache.get(channel_id).cloned()
    }

    pub fn store_online(&mut self, epoch: u64, channel_id: ChannelId, users: Vec<User>) {
        if epoch == self.cache_epoch {
            self.online_cache.insert(channel_id, users);
        }
    }

    pub fn invalidate_channels(&mut self) {
        self.channel_cache = None;
        self.cache_epoch += 1;
    }

    pub fn invalidate_online(&mut self, channel_id: &ChannelId) {
        self.online_cache.remove(channel_id);
        self.cache_epoch += 1;
    }

    pub fn invalidate_all(&mut self) {
        self.channel_cache = None;
        self.online_cache.clear();
        self.cache_epoch += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(id: &str) -> Channel {
        Channel {
            channel_id: id.into(),
            name: id.to_string(),
            public: true,
            admin: None,
            index: 0,
        }
    }

    #[test]
    fn test_joined_keeps_order_without_duplicates() {
        let mut state = ClientState::new(None);
        state.mark_joined(&"c1".into());
        state.mark_joined(&"c2".into());
        state.mark_joined(&"c1".into());
        state.mark_joined(&"c3".into());
        state.mark_left(&"c2".into());

        let ids: Vec<&str> = state.joined().iter().map(ChannelId::as_str).collect();
        assert_eq!(ids, ["c1", "c3"]);
    }

    #[test]
    fn test_stale_fetch_does_not_repopulate_cache() {
        let mut state = ClientState::new(None);
        let epoch = state.cache_epoch();
        state.invalidate_channels();
        state.store_channels(epoch, vec![channel("c1")]);
        assert!(state.cached_channels().is_none());

        let epoch = state.cache_epoch();
        state.store_channels(epoch, vec![channel("c1")]);
        assert_eq!(state.cached_channels().unwrap().len(), 1);
    }

    #[test]
    fn test_invalidate_all_clears_both_caches() {
        let mut state = ClientState::new(None);
        let epoch = state.cache_epoch();
        state.store_channels(epoch, vec![channel("c1")]);
        state.store_online(epoch, "c1".into(), Vec::new());

        state.invalidate_all();
        assert!(state.cached_channels().is_none());
        assert!(state.cached_online(&"c1".into()).is_none());
    }
}
