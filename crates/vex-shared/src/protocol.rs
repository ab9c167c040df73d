//! JSON wire envelopes.
//!
//! Every frame is a single JSON object with a `type` discriminator.
//! Commands carry a `transmissionID` that the server echoes in its reply;
//! replies report `status: success` with a `data` payload or
//! `status: error` with a `code` and `message`. Older servers express the
//! status through `type: success` / `type: error` and capitalised
//! `Code` / `Message` fields, which are accepted as well.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProtocolError;
use crate::types::RequestId;

/// Field carrying the request identifier in both directions.
pub const REQUEST_ID_FIELD: &str = "transmissionID";

/// Values of the `type` discriminator.
pub mod kind {
    pub const CHANNEL: &str = "channel";
    pub const CHANNEL_PERM: &str = "channelPerm";
    pub const USER: &str = "user";
    pub const CHAT: &str = "chat";
    pub const FILE: &str = "file";
    pub const HISTORY_REQ: &str = "historyReq";
    pub const IDENTITY: &str = "identity";
    pub const CHALLENGE: &str = "challenge";
    pub const RESPONSE: &str = "response";
    pub const PING: &str = "ping";
    pub const PONG: &str = "pong";

    pub const CHANNEL_LIST: &str = "channelList";
    pub const ONLINE_LIST: &str = "onlineList";
    pub const CLIENT_INFO: &str = "clientInfo";
    pub const PEER_CHANGE: &str = "peerChange";
    pub const POWER_LEVELS: &str = "powerLevels";
    pub const HISTORY: &str = "history";

    pub const SUCCESS: &str = "success";
    pub const ERROR: &str = "error";
}

/// Operation verb of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Create,
    Retrieve,
    Update,
    Delete,
    Join,
    Leave,
    Ban,
    Kick,
    Nick,
    Active,
    Register,
}

/// An outbound command.
#[derive(Debug, Clone, Serialize)]
pub struct Command {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<Method>,
    #[serde(rename = "transmissionID")]
    pub request_id: RequestId,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Command {
    /// A command with an operation verb and a fresh request identifier.
    pub fn new(kind: &str, method: Method) -> Self {
        Self {
            kind: kind.to_string(),
            method: Some(method),
            request_id: RequestId::new(),
            fields: Map::new(),
        }
    }

    /// A command without a verb (ping, challenge, response).
    pub fn bare(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            method: None,
            request_id: RequestId::new(),
            fields: Map::new(),
        }
    }

    pub fn field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Outcome reported by a correlated reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Error,
}

/// Structured error returned by the server for a single request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    pub kind: String,
    pub request_id: Option<RequestId>,
    pub body: Map<String, Value>,
}

impl Inbound {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Object(body) = value else {
            return Err(ProtocolError::NotAnObject);
        };

        let kind = body
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingType)?
            .to_string();

        let request_id = body
            .get(REQUEST_ID_FIELD)
            .and_then(Value::as_str)
            .map(RequestId::from);

        Ok(Self {
            kind,
            request_id,
            body,
        })
    }

    /// `None` for pushes that carry no status at all.
    pub fn status(&self) -> Option<Status> {
        let status = self
            .body
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or(self.kind.as_str());
        match status {
            kind::SUCCESS => Some(Status::Success),
            kind::ERROR => Some(Status::Error),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.status() == Some(Status::Error)
    }

    /// The server error carried by this frame, if it is an error reply.
    pub fn api_error(&self) -> Option<ApiError> {
        if !self.is_error() {
            return None;
        }
        let text = |keys: [&str; 2]| {
            keys.iter()
                .find_map(|k| self.body.get(*k))
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_default()
        };
        Some(ApiError {
            code: text(["code", "Code"]),
            message: text(["message", "Message"]),
        })
    }

    /// Splits a correlated reply into its payload or its server error.
    pub fn into_result(mut self) -> Result<Value, ApiError> {
        if let Some(err) = self.api_error() {
            return Err(err);
        }
        Ok(self.body.remove("data").unwrap_or(Value::Null))
    }

    pub fn field<T: DeserializeOwned>(&self, key: &str) -> Result<T, ProtocolError> {
        let value = self
            .body
            .get(key)
            .ok_or_else(|| ProtocolError::MissingField(key.to_string()))?;
        Ok(T::deserialize(value)?)
    }

    pub fn str_field(&self, key: &str) -> Result<&str, ProtocolError> {
        self.body
            .get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| ProtocolError::MissingField(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_command_envelope_shape() {
        let cmd = Command::new(kind::CHANNEL, Method::Create)
            .field("name", "general")
            .field("privateChannel", false);
        let value: Value = serde_json::from_str(&cmd.encode().unwrap()).unwrap();

        assert_eq!(value["type"], "channel");
        assert_eq!(value["method"], "CREATE");
        assert_eq!(value["name"], "general");
        assert_eq!(value["transmissionID"], cmd.request_id.as_str());
    }

    #[test]
    fn test_bare_command_omits_method() {
        let cmd = Command::bare(kind::PING);
        let value: Value = serde_json::from_str(&cmd.encode().unwrap()).unwrap();
        assert!(value.get("method").is_none());
    }

    #[test]
    fn test_inbound_requires_object_with_type() {
        assert!(matches!(
            Inbound::parse("[1,2]"),
            Err(ProtocolError::NotAnObject)
        ));
        assert!(matches!(
            Inbound::parse(r#"{"data":1}"#),
            Err(ProtocolError::MissingType)
        ));
        assert!(matches!(Inbound::parse("{not json"), Err(ProtocolError::Json(_))));
    }

    #[test]
    fn test_status_form_success() {
        let frame = json!({
            "type": "channel",
            "transmissionID": "r1",
            "status": "success",
            "data": { "channelID": "c1" },
        });
        let inbound = Inbound::parse(&frame.to_string()).unwrap();
        assert_eq!(inbound.request_id, Some(RequestId::from("r1")));
        assert_eq!(inbound.status(), Some(Status::Success));
        assert_eq!(inbound.into_result().unwrap()["channelID"], "c1");
    }

    #[test]
    fn test_legacy_error_form() {
        let frame = json!({
            "type": "error",
            "transmissionID": "r2",
            "Code": "E403",
            "Message": "not allowed",
        });
        let inbound = Inbound::parse(&frame.to_string()).unwrap();
        let err = inbound.into_result().unwrap_err();
        assert_eq!(err.code, "E403");
        assert_eq!(err.message, "not allowed");
    }

    #[test]
    fn test_push_has_no_status() {
        let inbound = Inbound::parse(r#"{"type":"chat","message":"hi"}"#).unwrap();
        assert_eq!(inbound.status(), None);
        assert!(inbound.request_id.is_none());
    }
}
