use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declares a server-assigned identifier. The server hands these out as
/// UUID strings, but the client treats them as opaque.
macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

opaque_id!(
    /// Correlates a reply with the command that caused it.
    RequestId
);
opaque_id!(ChannelId);
opaque_id!(UserId);
opaque_id!(FileId);
opaque_id!(MessageId);

impl RequestId {
    /// A fresh version-4 UUID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

/// A user account on the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "userID")]
    pub user_id: UserId,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub pubkey: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub power_level: i64,
    #[serde(default)]
    pub banned: bool,
    #[serde(default)]
    pub index: i64,
}

/// A channel as last reported by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Channel {
    #[serde(rename = "channelID")]
    pub channel_id: ChannelId,
    pub name: String,
    #[serde(default)]
    pub public: bool,
    /// User ID of the channel administrator.
    #[serde(default)]
    pub admin: Option<UserId>,
    #[serde(default)]
    pub index: i64,
}

/// A broadcast chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(rename = "messageID")]
    pub message_id: MessageId,
    #[serde(rename = "channelID")]
    pub channel_id: ChannelId,
    #[serde(rename = "userID")]
    pub user_id: UserId,
    #[serde(rename = "message", alias = "body")]
    pub body: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub author: Option<User>,
    #[serde(default)]
    pub index: i64,
}

/// Access grant for a user on a private channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    #[serde(rename = "userID")]
    pub user_id: UserId,
    #[serde(rename = "channelID")]
    pub channel_id: ChannelId,
    #[serde(default)]
    pub power_level: i64,
}

/// Metadata of an uploaded file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    #[serde(rename = "fileID")]
    pub file_id: FileId,
    #[serde(default)]
    pub file_name: String,
    #[serde(rename = "ownerID", default)]
    pub owner_id: Option<UserId>,
    /// Download location, filled in by the client from its configured host.
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub index: i64,
}

/// Power level the server requires for each action.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PowerLevels {
    pub kick: i64,
    pub ban: i64,
    pub op: i64,
    pub grant: i64,
    pub revoke: i64,
    pub talk: i64,
    pub create: i64,
    pub delete: i64,
    pub files: i64,
}

impl Default for PowerLevels {
    fn default() -> Self {
        Self {
            kick: 25,
            ban: 50,
            op: 100,
            grant: 50,
            revoke: 50,
            talk: 0,
            create: 50,
            delete: 50,
            files: 25,
        }
    }
}
