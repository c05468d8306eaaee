use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::RpcError;

use super::protocol::{parse_event, JsonRpcEvent, JsonRpcRequest, JsonRpcSuccess};
use super::websocket::EventStream;
use super::{RpcClient, RpcStreamingClient};

/// A mock node for testing. Answers each method with canned `result`s (or
/// an error envelope) populated via the builder, and records every request
/// it receives. A method given several results serves them in order and
/// then keeps repeating the last one.
///
/// When built with [`MockRpcBuilder::streaming`], `listen` succeeds and the
/// returned streams stay open until the mock is dropped or disconnected;
/// events are fed in with [`MockRpc::push_event`]. Disconnecting ends every
/// stream with a transport-closed error, as a real socket loss does.
pub struct MockRpc {
    results: HashMap<String, Vec<Value>>,
    served: Mutex<HashMap<String, usize>>,
    errors: HashMap<String, (i64, String)>,
    streaming: bool,
    requests: Mutex<Vec<JsonRpcRequest>>,
    feeds: Mutex<Vec<mpsc::UnboundedSender<Result<JsonRpcEvent, RpcError>>>>,
}

impl MockRpc {
    pub fn builder() -> MockRpcBuilder {
        MockRpcBuilder {
            results: HashMap::new(),
            errors: HashMap::new(),
            streaming: false,
        }
    }

    /// Every request seen so far, in arrival order.
    pub fn requests(&self) -> Vec<JsonRpcRequest> {
        self.requests.lock().clone()
    }

    pub fn last_request(&self, method: &str) -> Option<JsonRpcRequest> {
        self.requests
            .lock()
            .iter()
            .rev()
            .find(|request| request.method == method)
            .cloned()
    }

    /// Deliver one event frame `result` to every open subscription.
    pub fn push_event(&self, result: Value) {
        let mut feeds = self.feeds.lock();
        feeds.retain(|feed| feed.send(parse_event(result.clone())).is_ok());
    }

    /// Number of subscriptions whose stream has not been dropped.
    pub fn open_subscriptions(&self) -> usize {
        let mut feeds = self.feeds.lock();
        feeds.retain(|feed| !feed.is_closed());
        feeds.len()
    }
}

pub struct MockRpcBuilder {
    results: HashMap<String, Vec<Value>>,
    errors: HashMap<String, (i64, String)>,
    streaming: bool,
}

impl MockRpcBuilder {
    pub fn with_result(self, method: &str, result: Value) -> Self {
        self.with_results(method, vec![result])
    }

    pub fn with_results(mut self, method: &str, results: Vec<Value>) -> Self {
        self.results.insert(method.to_owned(), results);
        self
    }

    pub fn with_error(mut self, method: &str, code: i64, message: &str) -> Self {
        self.errors
            .insert(method.to_owned(), (code, message.to_owned()));
        self
    }

    pub fn streaming(mut self) -> Self {
        self.streaming = true;
        self
    }

    pub fn build(self) -> MockRpc {
        MockRpc {
            results: self.results,
            served: Mutex::new(HashMap::new()),
            errors: self.errors,
            streaming: self.streaming,
            requests: Mutex::new(Vec::new()),
            feeds: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl RpcClient for MockRpc {
    async fn execute(&self, request: JsonRpcRequest) -> Result<JsonRpcSuccess, RpcError> {
        self.requests.lock().push(request.clone());

        if let Some((code, message)) = self.errors.get(&request.method) {
            return Err(RpcError::ServerError {
                code: *code,
                message: message.clone(),
                data: None,
            });
        }
        let result = self.results.get(&request.method).and_then(|results| {
            let mut served = self.served.lock();
            let count = served.entry(request.method.clone()).or_insert(0);
            let result = results.get(*count).or_else(|| results.last()).cloned();
            *count += 1;
            result
        });
        match result {
            Some(result) => Ok(JsonRpcSuccess {
                id: request.id,
                result,
            }),
            None => Err(RpcError::ServerError {
                code: -32601,
                message: format!("Method not found: {}", request.method),
                data: None,
            }),
        }
    }

    fn disconnect(&self) {
        for feed in self.feeds.lock().drain(..) {
            let _ = feed.send(Err(RpcError::TransportClosed));
        }
    }

    fn as_streaming(&self) -> Option<&dyn RpcStreamingClient> {
        if self.streaming {
            Some(self)
        } else {
            None
        }
    }
}

#[async_trait]
impl RpcStreamingClient for MockRpc {
    async fn listen(&self, request: JsonRpcRequest) -> Result<EventStream, RpcError> {
        self.requests.lock().push(request.clone());
        if let Some((code, message)) = self.errors.get(&request.method) {
            return Err(RpcError::ServerError {
                code: *code,
                message: message.clone(),
                data: None,
            });
        }

        let (feed, events) = mpsc::unbounded_channel();
        self.feeds.lock().push(feed);
        Ok(EventStream::from_channel(request.id, events))
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::requests::Method;
    use crate::rpc::Params;

    #[tokio::test]
    async fn canned_result_echoes_request_id() {
        let rpc = MockRpc::builder()
            .with_result("health", serde_json::json!({}))
            .build();
        let request = JsonRpcRequest::new(Method::Health, Params::new());
        let id = request.id.clone();

        let success = rpc.execute(request).await.expect("canned result");
        assert_eq!(success.id, id);
        assert_eq!(rpc.requests().len(), 1);
    }

    #[tokio::test]
    async fn result_sequence_repeats_last() {
        let rpc = MockRpc::builder()
            .with_results("status", vec![serde_json::json!(1), serde_json::json!(2)])
            .build();
        let mut seen = Vec::new();
        for _ in 0..3 {
            let request = JsonRpcRequest::new(Method::Status, Params::new());
            seen.push(rpc.execute(request).await.expect("canned").result);
        }
        assert_eq!(seen, vec![serde_json::json!(1), serde_json::json!(2), serde_json::json!(2)]);
    }

    #[tokio::test]
    async fn unknown_method_is_server_error() {
        let rpc = MockRpc::builder().build();
        let err = rpc
            .execute(JsonRpcRequest::new(Method::Status, Params::new()))
            .await
            .expect_err("no canned result");
        assert!(matches!(err, RpcError::ServerError { code: -32601, .. }));
    }

    #[tokio::test]
    async fn pushed_events_reach_open_streams() {
        let rpc = MockRpc::builder().streaming().build();
        let streaming = rpc.as_streaming().expect("streaming mock");
        let mut stream = streaming
            .listen(JsonRpcRequest::new(Method::Subscribe, Params::new()))
            .await
            .expect("listen");

        rpc.push_event(serde_json::json!({"data": {"type": "t", "value": 1}}));
        let event = stream.next().await.expect("item").expect("event");
        assert_eq!(event.data.value, serde_json::json!(1));

        drop(stream);
        assert_eq!(rpc.open_subscriptions(), 0);
    }
}
