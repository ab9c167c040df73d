use thiserror::Error;

/// Failures decoding or encoding a wire frame.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Frame is not a JSON object")]
    NotAnObject,

    #[error("Frame has no `type` discriminator")]
    MissingType,

    #[error("Frame is missing field `{0}`")]
    MissingField(String),

    #[error("Hex decode error: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// Failures of the signing key collaborator.
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Invalid key bytes")]
    InvalidKeyBytes,

    #[error("Signature did not verify")]
    BadSignature,

    #[error("Key file error: {0}")]
    KeyFile(String),

    #[error("Hex decode error: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
