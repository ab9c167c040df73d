//! Caller-facing operations, grouped by resource.
//!
//! Every operation builds a command, sends it through the correlation
//! registry and resolves with the decoded `data` of the reply, or with
//! [`ClientError::Api`](crate::ClientError::Api) when the server reports an
//! error. Access them through the borrowing handles on [`Client`]:
//! `client.channels()`, `client.users()` and so on.

pub mod channels;
pub mod files;
pub mod identity;
pub mod messaging;
pub mod permissions;
pub mod users;

pub use channels::Channels;
pub use files::Files;
pub use messaging::Messages;
pub use permissions::Permissions;
pub use users::{UserUpdate, Users};

#[cfg(test)]
pub(crate) mod testing {
    //! A client wired to an in-memory server for facade unit tests.

    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::{json, Value};
    use vex_net::{MemoryConnector, MemoryListener, ServerEnd};
    use vex_shared::KeyRing;

    use crate::{Client, ClientConfig, ClientEvent};

    pub async fn connected() -> (Client, ServerEnd, MemoryListener) {
        let (connector, mut listener) = MemoryConnector::new();
        let config = ClientConfig {
            secure: false,
            heartbeat_interval: Duration::from_secs(3600),
            reconnect_delay: Duration::from_millis(10),
            ..ClientConfig::new("chat.test")
        };
        let client = Client::new(config, Arc::new(KeyRing::generate()), Arc::new(connector)).unwrap();
        let mut events = client.subscribe();
        let server = listener.accept().await.unwrap();
        loop {
            if let ClientEvent::Ready = events.recv().await.unwrap() {
                break;
            }
        }
        (client, server, listener)
    }

    /// Read the next command and answer it with `status: success`.
    pub async fn reply_success(server: &mut ServerEnd, data: Value) -> Value {
        let frame: Value = serde_json::from_str(&server.recv().await.unwrap()).unwrap();
        let reply = json!({
            "type": frame["type"],
            "transmissionID": frame["transmissionID"],
            "status": "success",
            "data": data,
        });
        server.send(reply.to_string()).await.unwrap();
        frame
    }
}
