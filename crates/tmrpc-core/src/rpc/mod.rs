//! JSON-RPC transport layer.
//!
//! Defines the [`RpcClient`] request/response contract and the
//! [`RpcStreamingClient`] extension for persistent subscription channels,
//! with an HTTP implementation ([`HttpClient`]), a multiplexed WebSocket
//! implementation ([`WebSocketClient`]) and a test mock (`mock::MockRpc`).

mod connection;
mod http;
#[cfg(test)]
pub mod mock;
mod protocol;
mod websocket;

pub use connection::{parse_connection, Endpoint};
pub use http::HttpClient;
pub use protocol::{
    parse_event, parse_response, parse_response_text, EventData, JsonRpcErrorObject, JsonRpcEvent,
    JsonRpcId, JsonRpcRequest, JsonRpcResponse, JsonRpcSuccess, Params,
};
pub use websocket::{EventStream, WebSocketClient};

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{CoreError, RpcError};

/// Request/response correlation over one logical connection.
#[async_trait]
pub trait RpcClient: Send + Sync {
    /// Send one request and wait for the response carrying the same id.
    /// JSON-RPC error envelopes are returned as [`RpcError::ServerError`].
    async fn execute(&self, request: JsonRpcRequest) -> Result<JsonRpcSuccess, RpcError>;

    /// Close the underlying connection. Outstanding calls fail with
    /// [`RpcError::TransportClosed`].
    fn disconnect(&self);

    /// The streaming capability of this transport, if it has one.
    fn as_streaming(&self) -> Option<&dyn RpcStreamingClient> {
        None
    }
}

/// A transport that can hold server-side subscriptions open.
#[async_trait]
pub trait RpcStreamingClient: RpcClient {
    /// Send a `subscribe` request and, once the node acknowledges it, return
    /// the stream of events routed to that subscription.
    async fn listen(&self, request: JsonRpcRequest) -> Result<EventStream, RpcError>;
}

/// Timeouts and throttling shared by both transports.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Outbound HTTP requests per second; `None` disables throttling.
    pub requests_per_second: Option<u32>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            requests_per_second: None,
        }
    }
}

impl TransportConfig {
    pub(crate) fn validate(&self) -> Result<(), CoreError> {
        if self.request_timeout.is_zero() {
            return Err(CoreError::InvalidConfig(
                "request timeout must be greater than zero".to_owned(),
            ));
        }
        if self.requests_per_second == Some(0) {
            return Err(CoreError::InvalidConfig(
                "requests_per_second must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Open a transport for `connection`, choosing HTTP or WebSocket by scheme.
pub async fn connect_transport(
    connection: &str,
    config: &TransportConfig,
) -> Result<std::sync::Arc<dyn RpcClient>, CoreError> {
    match parse_connection(connection)? {
        Endpoint::Http(url) => Ok(std::sync::Arc::new(HttpClient::new(&url, config)?)),
        Endpoint::WebSocket(url) => Ok(std::sync::Arc::new(
            WebSocketClient::connect(&url, config).await?,
        )),
    }
}
