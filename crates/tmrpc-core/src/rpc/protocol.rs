use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::RpcError;
use crate::requests::Method;

/// Suffix the node appends to a subscribe request id on every event frame.
const EVENT_ID_SUFFIX: &str = "#event";

pub type Params = serde_json::Map<String, serde_json::Value>;

/// JSON-RPC correlation token.
///
/// Requests built by this crate always carry decimal string ids; nodes answer
/// with the same id, and tag subscription events with `"<id>#event"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcId {
    Number(u64),
    String(String),
}

impl JsonRpcId {
    /// Allocate an id that is unique among all requests built by this process.
    pub fn next() -> Self {
        static NEXT_ID: OnceLock<AtomicU64> = OnceLock::new();
        let counter = NEXT_ID.get_or_init(|| AtomicU64::new(initial_request_id()));
        Self::String(counter.fetch_add(1, Ordering::Relaxed).to_string())
    }

    /// The subscription an event frame belongs to: the id with any `#event`
    /// suffix stripped.
    pub fn subscription_key(&self) -> JsonRpcId {
        match self {
            Self::Number(n) => Self::Number(*n),
            Self::String(s) => Self::String(s.strip_suffix(EVENT_ID_SUFFIX).unwrap_or(s).to_owned()),
        }
    }
}

impl fmt::Display for JsonRpcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

fn initial_request_id() -> u64 {
    // Keep ids below 2^53 so JavaScript-based proxies do not mangle them.
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| (d.as_micros() as u64) & ((1 << 52) - 1))
        .unwrap_or(1)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: JsonRpcId,
    pub method: String,
    pub params: Params,
}

impl JsonRpcRequest {
    pub fn new(method: Method, params: Params) -> Self {
        Self::with_method_name(method.as_str(), params)
    }

    pub fn with_method_name(method: &str, params: Params) -> Self {
        Self {
            jsonrpc: "2.0",
            id: JsonRpcId::next(),
            method: method.to_owned(),
            params,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JsonRpcSuccess {
    pub id: JsonRpcId,
    pub result: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JsonRpcErrorObject {
    pub code: i64,
    pub message: String,
    pub data: Option<String>,
}

/// Exactly one of the two response variants.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonRpcResponse {
    Success(JsonRpcSuccess),
    Error {
        id: Option<JsonRpcId>,
        error: JsonRpcErrorObject,
    },
}

impl JsonRpcResponse {
    pub fn id(&self) -> Option<&JsonRpcId> {
        match self {
            Self::Success(success) => Some(&success.id),
            Self::Error { id, .. } => id.as_ref(),
        }
    }

    /// Surface the error variant as a call failure.
    pub fn into_result(self) -> Result<JsonRpcSuccess, RpcError> {
        match self {
            Self::Success(success) => Ok(success),
            Self::Error { error, .. } => Err(RpcError::ServerError {
                code: error.code,
                message: error.message,
                data: error.data,
            }),
        }
    }
}

/// Payload of an unsolicited subscription frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JsonRpcEvent {
    #[serde(default)]
    pub query: Option<String>,
    pub data: EventData,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EventData {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: serde_json::Value,
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(default)]
    id: Option<JsonRpcId>,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Decode a response envelope, rejecting frames that carry neither a result
/// nor an error.
pub fn parse_response(raw: serde_json::Value) -> Result<JsonRpcResponse, RpcError> {
    let frame: RawFrame = serde_json::from_value(raw)
        .map_err(|e| RpcError::InvalidResponse(format!("malformed JSON-RPC frame: {e}")))?;
    classify_frame(frame)
}

pub fn parse_response_text(body: &str) -> Result<JsonRpcResponse, RpcError> {
    let raw: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| RpcError::InvalidResponse(format!("decode JSON-RPC response: {e}; body={body}")))?;
    parse_response(raw)
}

fn classify_frame(frame: RawFrame) -> Result<JsonRpcResponse, RpcError> {
    match (frame.error, frame.result) {
        (Some(error), _) => Ok(JsonRpcResponse::Error {
            id: frame.id,
            error: parse_jsonrpc_error(error),
        }),
        (None, Some(result)) => {
            let id = frame
                .id
                .ok_or_else(|| RpcError::InvalidResponse("success response without id".into()))?;
            Ok(JsonRpcResponse::Success(JsonRpcSuccess { id, result }))
        }
        (None, None) => Err(RpcError::InvalidResponse(
            "frame has neither result nor error".into(),
        )),
    }
}

/// Parse a JSON-RPC error value into a structured error object.
///
/// Non-standard shapes are kept as the message so the caller still sees what
/// the node sent.
pub(crate) fn parse_jsonrpc_error(err: serde_json::Value) -> JsonRpcErrorObject {
    #[derive(Deserialize)]
    struct StandardError {
        code: i64,
        message: String,
        #[serde(default)]
        data: Option<serde_json::Value>,
    }

    match serde_json::from_value::<StandardError>(err.clone()) {
        Ok(parsed) => JsonRpcErrorObject {
            code: parsed.code,
            message: parsed.message,
            data: parsed.data.map(|data| match data {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            }),
        },
        Err(_) => JsonRpcErrorObject {
            code: 0,
            message: format!("non-standard JSON-RPC error: {err}"),
            data: None,
        },
    }
}

/// Extract the event payload from a subscription frame's `result`.
pub fn parse_event(result: serde_json::Value) -> Result<JsonRpcEvent, RpcError> {
    serde_json::from_value(result)
        .map_err(|e| RpcError::InvalidResponse(format!("malformed subscription event: {e}")))
}
