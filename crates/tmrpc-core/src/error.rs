use std::time::Duration;

use crate::rpc::JsonRpcId;

/// Transport and protocol failures raised while talking to a node.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("websocket transport error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("not connected")]
    NotConnected,

    #[error("transport closed")]
    TransportClosed,

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("request id {0} is already outstanding")]
    DuplicateRequestId(JsonRpcId),

    #[error("JSON-RPC server error {code}: {message}")]
    ServerError {
        code: i64,
        message: String,
        data: Option<String>,
    },

    #[error("invalid JSON-RPC response: {0}")]
    InvalidResponse(String),
}

/// A wire response that does not match the shape a protocol version promises.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("missing required field `{0}`")]
    MissingField(String),

    #[error("invalid field `{field}`: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("unknown public key type `{0}`")]
    UnknownPubkeyType(String),

    #[error("unexpected event payload: {0}")]
    UnexpectedEvent(String),
}

impl DecodeError {
    pub(crate) fn invalid(field: &str, reason: impl std::fmt::Display) -> Self {
        Self::InvalidField {
            field: field.to_owned(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("RPC communication failure: {0}")]
    Rpc(#[from] RpcError),

    #[error("response decode failure: {0}")]
    Decode(#[from] DecodeError),

    #[error("unsupported node version `{0}`")]
    UnsupportedVersion(String),

    #[error("invalid connection: {0}")]
    InvalidConnection(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("transport does not support event subscriptions")]
    StreamingUnsupported,
}
