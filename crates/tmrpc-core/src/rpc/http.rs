use std::num::NonZeroU32;

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::header;
use tracing::{debug, trace};

use crate::error::{CoreError, RpcError};

use super::connection::parse_http_connection;
use super::protocol::{parse_response_text, JsonRpcRequest, JsonRpcSuccess};
use super::{RpcClient, TransportConfig};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// JSON-RPC client that issues one HTTP POST per call.
///
/// Calls share no mutable state beyond the connection pool, so concurrent
/// calls are independent exchanges.
pub struct HttpClient {
    client: reqwest::Client,
    url: String,
    limiter: Option<DirectRateLimiter>,
}

impl HttpClient {
    /// Create a client for an `http://`, `https://` or bare `host:port`
    /// connection string.
    ///
    /// If `requests_per_second` is set, each outbound POST waits for the
    /// rate limiter first.
    pub fn new(connection: &str, config: &TransportConfig) -> Result<Self, CoreError> {
        config.validate()?;
        let url = parse_http_connection(connection)?;

        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .pool_max_idle_per_host(8)
            .tcp_nodelay(true)
            .build()
            .map_err(RpcError::Transport)?;

        let limiter = match config.requests_per_second {
            None => None,
            Some(limit) => {
                let limit = NonZeroU32::new(limit).ok_or_else(|| {
                    CoreError::InvalidConfig("requests_per_second must be at least 1".to_owned())
                })?;
                Some(RateLimiter::direct(Quota::per_second(limit)))
            }
        };

        Ok(Self {
            client,
            url,
            limiter,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn wait_for_rate_limit(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }
}

#[async_trait]
impl RpcClient for HttpClient {
    async fn execute(&self, request: JsonRpcRequest) -> Result<JsonRpcSuccess, RpcError> {
        self.wait_for_rate_limit().await;
        debug!(
            rpc.id = %request.id,
            rpc.method = %request.method,
            rpc.params = request.params.len(),
            "rpc call"
        );

        let response = self
            .client
            .post(&self.url)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&request)
            .send()
            .await?;
        let status = response.status();

        let body = response.text().await?;
        debug!(rpc.id = %request.id, rpc.method = %request.method, %status, body_len = body.len(), "rpc response");
        trace!(rpc.id = %request.id, rpc.method = %request.method, body = %body, "rpc response body");

        // Error envelopes for unparseable requests may carry an empty id, so
        // only successful results are held to the request id.
        let success = parse_response_text(&body)?.into_result()?;
        if success.id != request.id {
            return Err(RpcError::InvalidResponse(format!(
                "response id {} does not match request id {}",
                success.id, request.id
            )));
        }
        Ok(success)
    }

    fn disconnect(&self) {
        // Every call is its own exchange; there is nothing to tear down.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_accepts_bare_host() {
        let client =
            HttpClient::new("localhost:26657", &TransportConfig::default()).expect("should build");
        assert_eq!(client.url(), "http://localhost:26657");
    }

    #[test]
    fn new_rejects_websocket_url() {
        let result = HttpClient::new("ws://localhost:26657", &TransportConfig::default());
        assert!(matches!(result, Err(CoreError::InvalidConnection(_))));
    }

    #[test]
    fn new_rejects_zero_rate_limit() {
        let config = TransportConfig {
            requests_per_second: Some(0),
            ..TransportConfig::default()
        };
        let result = HttpClient::new("http://localhost:26657", &config);
        assert!(matches!(result, Err(CoreError::InvalidConfig(_))));
    }
}
