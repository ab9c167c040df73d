//! Types shared between the Vex transport and client crates: the JSON wire
//! envelopes, the server-owned data model and the signing key collaborator.

pub mod constants;
pub mod error;
pub mod identity;
pub mod protocol;
pub mod types;

pub use error::{KeyError, ProtocolError};
pub use identity::{KeyRing, Keys};
pub use protocol::{ApiError, Command, Inbound, Method, Status};
pub use types::{
    Channel, ChannelId, ChatMessage, FileId, FileInfo, MessageId, Permission, PowerLevels,
    RequestId, User, UserId,
};
