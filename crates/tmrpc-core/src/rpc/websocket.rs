use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::stream::SplitSink;
use futures::{SinkExt, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, trace, warn};

use crate::error::{CoreError, RpcError};
use crate::requests::Method;

use super::connection::parse_websocket_connection;
use super::protocol::{
    parse_event, parse_response, JsonRpcEvent, JsonRpcId, JsonRpcRequest, JsonRpcResponse,
    JsonRpcSuccess, Params,
};
use super::{RpcClient, RpcStreamingClient, TransportConfig};

type Responder = oneshot::Sender<Result<JsonRpcSuccess, RpcError>>;
type EventSender = mpsc::UnboundedSender<Result<JsonRpcEvent, RpcError>>;
type EventReceiver = mpsc::UnboundedReceiver<Result<JsonRpcEvent, RpcError>>;

/// Messages from client handles to the task that owns the socket.
enum Command {
    Call {
        request: JsonRpcRequest,
        responder: Responder,
    },
    Listen {
        request: JsonRpcRequest,
        events: EventSender,
        responder: Responder,
    },
    Unsubscribe {
        id: JsonRpcId,
    },
    Forget {
        id: JsonRpcId,
    },
    Disconnect,
}

// ==============================================================================
// WebSocketClient
// ==============================================================================

/// JSON-RPC client multiplexing many calls and subscriptions over one socket.
///
/// A single background task owns the socket. It holds the table of
/// outstanding request ids and the subscription routing table, so neither
/// needs a lock. When the socket drops, every outstanding call fails and
/// every subscription stream ends with [`RpcError::TransportClosed`]; the
/// client never reconnects on its own.
pub struct WebSocketClient {
    url: String,
    commands: mpsc::UnboundedSender<Command>,
    connected: Arc<AtomicBool>,
    request_timeout: Duration,
}

impl WebSocketClient {
    /// Open a socket to a `ws://` or `wss://` endpoint.
    pub async fn connect(connection: &str, config: &TransportConfig) -> Result<Self, CoreError> {
        config.validate()?;
        let url = parse_websocket_connection(connection)?;

        let (socket, _) = tokio::time::timeout(
            config.connect_timeout,
            tokio_tungstenite::connect_async(url.as_str()),
        )
        .await
        .map_err(|_| RpcError::Timeout(config.connect_timeout))?
        .map_err(RpcError::WebSocket)?;
        debug!(url = %url, "websocket connected");

        Ok(Self::from_socket(url, socket, config.request_timeout))
    }

    fn from_socket<S>(url: String, socket: WebSocketStream<S>, request_timeout: Duration) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (commands, receiver) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(true));
        tokio::spawn(run_socket(
            socket,
            receiver,
            Arc::clone(&connected),
            url.clone(),
            request_timeout,
        ));

        Self {
            url,
            commands,
            connected,
            request_timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn submit(&self, command: Command) -> Result<(), RpcError> {
        if !self.is_connected() {
            return Err(RpcError::NotConnected);
        }
        self.commands
            .send(command)
            .map_err(|_| RpcError::NotConnected)
    }

    async fn await_response(
        &self,
        id: JsonRpcId,
        response: oneshot::Receiver<Result<JsonRpcSuccess, RpcError>>,
    ) -> Result<JsonRpcSuccess, RpcError> {
        match tokio::time::timeout(self.request_timeout, response).await {
            Ok(Ok(result)) => result,
            // The socket task dropped the responder while shutting down.
            Ok(Err(_)) => Err(RpcError::TransportClosed),
            Err(_) => {
                let _ = self.commands.send(Command::Forget { id });
                Err(RpcError::Timeout(self.request_timeout))
            }
        }
    }
}

impl Drop for WebSocketClient {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Disconnect);
    }
}

#[async_trait]
impl RpcClient for WebSocketClient {
    async fn execute(&self, request: JsonRpcRequest) -> Result<JsonRpcSuccess, RpcError> {
        debug!(rpc.id = %request.id, rpc.method = %request.method, "rpc call");
        let id = request.id.clone();
        let (responder, response) = oneshot::channel();
        self.submit(Command::Call { request, responder })?;
        self.await_response(id, response).await
    }

    fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let _ = self.commands.send(Command::Disconnect);
    }

    fn as_streaming(&self) -> Option<&dyn RpcStreamingClient> {
        Some(self)
    }
}

#[async_trait]
impl RpcStreamingClient for WebSocketClient {
    async fn listen(&self, request: JsonRpcRequest) -> Result<EventStream, RpcError> {
        debug!(rpc.id = %request.id, rpc.method = %request.method, "subscribe");
        let id = request.id.clone();
        let (events, receiver) = mpsc::unbounded_channel();
        let (responder, response) = oneshot::channel();
        self.submit(Command::Listen {
            request,
            events,
            responder,
        })?;
        self.await_response(id.clone(), response).await?;

        Ok(EventStream {
            id,
            events: receiver,
            commands: Some(self.commands.clone()),
        })
    }
}

// ==============================================================================
// EventStream
// ==============================================================================

/// Events routed to one subscription, in the order the node emitted them.
///
/// Dropping the stream unsubscribes on the node. The stream yields
/// [`RpcError::TransportClosed`] and ends if the socket goes away.
pub struct EventStream {
    id: JsonRpcId,
    events: EventReceiver,
    commands: Option<mpsc::UnboundedSender<Command>>,
}

impl EventStream {
    /// A stream fed directly by a channel, detached from any socket.
    #[cfg(test)]
    pub(crate) fn from_channel(id: JsonRpcId, events: EventReceiver) -> Self {
        Self {
            id,
            events,
            commands: None,
        }
    }

    pub fn id(&self) -> &JsonRpcId {
        &self.id
    }
}

impl Stream for EventStream {
    type Item = Result<JsonRpcEvent, RpcError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().events.poll_recv(cx)
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        if let Some(commands) = &self.commands {
            let _ = commands.send(Command::Unsubscribe {
                id: self.id.clone(),
            });
        }
    }
}

// ==============================================================================
// Socket Task
// ==============================================================================

enum Pending {
    Call(Responder),
    Subscribe(Responder),
    /// Fire-and-forget requests such as `unsubscribe`, dropped unanswered
    /// once older than the request timeout.
    Ignored { sent: Instant },
}

struct Subscription {
    query: Option<String>,
    events: EventSender,
}

/// Routing state owned exclusively by the socket task.
#[derive(Default)]
struct Router {
    pending: HashMap<JsonRpcId, Pending>,
    subscriptions: HashMap<JsonRpcId, Subscription>,
}

impl Router {
    fn is_outstanding(&self, id: &JsonRpcId) -> bool {
        self.pending.contains_key(id) || self.subscriptions.contains_key(id)
    }

    /// Forget fire-and-forget requests the node never answered.
    fn expire_ignored(&mut self, now: Instant, ttl: Duration) {
        self.pending.retain(|id, pending| match pending {
            Pending::Ignored { sent } if now.saturating_duration_since(*sent) >= ttl => {
                debug!(rpc.id = %id, "fire-and-forget request unanswered");
                false
            }
            _ => true,
        });
    }

    /// Classify one inbound frame: a response to an outstanding request, an
    /// event for a live subscription, or noise.
    fn dispatch(&mut self, text: &str) {
        trace!(frame = %text, "websocket frame");
        let raw: serde_json::Value = match serde_json::from_str(text) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "discarding malformed websocket frame");
                return;
            }
        };

        let Some(id) = raw
            .get("id")
            .and_then(|id| serde_json::from_value::<JsonRpcId>(id.clone()).ok())
        else {
            warn!("discarding websocket frame without a usable id");
            return;
        };

        if let Some(pending) = self.pending.remove(&id) {
            let response = parse_response(raw).and_then(JsonRpcResponse::into_result);
            self.complete(id, pending, response);
            return;
        }

        let key = id.subscription_key();
        if let Some(subscription) = self.subscriptions.get(&key) {
            let event = parse_response(raw)
                .and_then(JsonRpcResponse::into_result)
                .and_then(|success| parse_event(success.result));
            if let Err(e) = &event {
                warn!(rpc.id = %id, error = %e, "malformed subscription event");
            }
            // A closed receiver means the stream was dropped and an
            // unsubscribe command is already queued.
            let _ = subscription.events.send(event);
            return;
        }

        warn!(rpc.id = %id, "discarding frame for unknown request or subscription");
    }

    fn complete(
        &mut self,
        id: JsonRpcId,
        pending: Pending,
        response: Result<JsonRpcSuccess, RpcError>,
    ) {
        match pending {
            Pending::Call(responder) => {
                let _ = responder.send(response);
            }
            Pending::Subscribe(responder) => {
                if response.is_err() {
                    self.subscriptions.remove(&id);
                }
                let _ = responder.send(response);
            }
            Pending::Ignored { .. } => {
                if let Err(e) = response {
                    debug!(rpc.id = %id, error = %e, "fire-and-forget request rejected");
                }
            }
        }
    }

    fn shutdown(&mut self) {
        for (_, pending) in self.pending.drain() {
            match pending {
                Pending::Call(responder) | Pending::Subscribe(responder) => {
                    let _ = responder.send(Err(RpcError::TransportClosed));
                }
                Pending::Ignored { .. } => {}
            }
        }
        for (_, subscription) in self.subscriptions.drain() {
            let _ = subscription.events.send(Err(RpcError::TransportClosed));
        }
    }
}

async fn send_request<S>(
    sink: &mut SplitSink<WebSocketStream<S>, Message>,
    request: &JsonRpcRequest,
) -> Result<(), RpcError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let text = serde_json::to_string(request)
        .map_err(|e| RpcError::InvalidResponse(format!("encode request: {e}")))?;
    sink.send(Message::Text(text)).await?;
    Ok(())
}

async fn run_socket<S>(
    socket: WebSocketStream<S>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    connected: Arc<AtomicBool>,
    url: String,
    request_timeout: Duration,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sink, mut source) = socket.split();
    let mut router = Router::default();

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    let _ = sink.close().await;
                    break;
                };
                match command {
                    Command::Call { request, responder } => {
                        if router.is_outstanding(&request.id) {
                            let _ = responder.send(Err(RpcError::DuplicateRequestId(request.id)));
                        } else {
                            match send_request(&mut sink, &request).await {
                                Ok(()) => {
                                    router.pending.insert(request.id, Pending::Call(responder));
                                }
                                Err(e) => {
                                    warn!(url = %url, error = %e, "websocket send failed");
                                    let _ = responder.send(Err(e));
                                    break;
                                }
                            }
                        }
                    }
                    Command::Listen { request, events, responder } => {
                        if router.is_outstanding(&request.id) {
                            let _ = responder.send(Err(RpcError::DuplicateRequestId(request.id)));
                        } else {
                            let query = request
                                .params
                                .get("query")
                                .and_then(serde_json::Value::as_str)
                                .map(str::to_owned);
                            match send_request(&mut sink, &request).await {
                                Ok(()) => {
                                    router
                                        .pending
                                        .insert(request.id.clone(), Pending::Subscribe(responder));
                                    router
                                        .subscriptions
                                        .insert(request.id, Subscription { query, events });
                                }
                                Err(e) => {
                                    warn!(url = %url, error = %e, "websocket send failed");
                                    let _ = responder.send(Err(e));
                                    break;
                                }
                            }
                        }
                    }
                    Command::Unsubscribe { id } => {
                        let query = router
                            .subscriptions
                            .remove(&id)
                            .and_then(|subscription| subscription.query);
                        if let Some(query) = query {
                            let mut params = Params::new();
                            params.insert("query".to_owned(), serde_json::Value::String(query));
                            let request = JsonRpcRequest::new(Method::Unsubscribe, params);
                            debug!(rpc.id = %request.id, subscription = %id, "unsubscribe");
                            if let Err(e) = send_request(&mut sink, &request).await {
                                warn!(url = %url, error = %e, "websocket send failed");
                                break;
                            }
                            let now = Instant::now();
                            router.expire_ignored(now, request_timeout);
                            router.pending.insert(request.id, Pending::Ignored { sent: now });
                        }
                    }
                    Command::Forget { id } => {
                        router.pending.remove(&id);
                        router.subscriptions.remove(&id);
                    }
                    Command::Disconnect => {
                        debug!(url = %url, "websocket disconnect requested");
                        let _ = sink.close().await;
                        break;
                    }
                }
            }
            frame = source.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => router.dispatch(&text),
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => router.dispatch(&text),
                        Err(_) => warn!("discarding non UTF-8 binary frame"),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        debug!(url = %url, ?frame, "websocket closed by node");
                        break;
                    }
                    // Ping replies are queued by tungstenite itself.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(url = %url, error = %e, "websocket read failed");
                        break;
                    }
                    None => {
                        debug!(url = %url, "websocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    connected.store(false, Ordering::SeqCst);
    commands.close();
    router.shutdown();
    // Commands that raced the shutdown drop their responders here, which
    // their callers observe as a closed transport.
    while commands.try_recv().is_ok() {}
}
