use reqwest::Url;

use crate::error::CoreError;

/// Path the node serves its WebSocket endpoint on.
const WEBSOCKET_PATH: &str = "/websocket";

/// A validated node endpoint, tagged with the transport it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Http(String),
    WebSocket(String),
}

/// Parse a connection string into an endpoint.
///
/// Accepts `http://`, `https://`, `ws://`, `wss://` URLs or a bare
/// `host:port`, which is treated as plain HTTP.
pub fn parse_connection(connection: &str) -> Result<Endpoint, CoreError> {
    let connection = connection.trim();
    let normalized = if connection.contains("://") {
        connection.to_owned()
    } else {
        format!("http://{connection}")
    };

    let mut parsed = Url::parse(&normalized).map_err(|e| {
        CoreError::InvalidConnection(format!(
            "`{connection}`: expected an HTTP(S) or WS(S) URL ({e})"
        ))
    })?;
    if parsed.host_str().is_none() {
        return Err(CoreError::InvalidConnection(format!(
            "`{connection}`: missing host"
        )));
    }

    match parsed.scheme() {
        "http" | "https" => Ok(Endpoint::Http(normalized)),
        "ws" | "wss" => {
            if parsed.path().is_empty() || parsed.path() == "/" {
                parsed.set_path(WEBSOCKET_PATH);
            }
            Ok(Endpoint::WebSocket(parsed.to_string()))
        }
        other => Err(CoreError::InvalidConnection(format!(
            "unsupported connection scheme `{other}`; expected http, https, ws or wss"
        ))),
    }
}

/// Like [`parse_connection`], but requires an HTTP endpoint.
pub(super) fn parse_http_connection(connection: &str) -> Result<String, CoreError> {
    match parse_connection(connection)? {
        Endpoint::Http(url) => Ok(url),
        Endpoint::WebSocket(url) => Err(CoreError::InvalidConnection(format!(
            "`{url}` is a websocket endpoint; expected http or https"
        ))),
    }
}

/// Like [`parse_connection`], but requires a WebSocket endpoint.
pub(super) fn parse_websocket_connection(connection: &str) -> Result<String, CoreError> {
    match parse_connection(connection)? {
        Endpoint::WebSocket(url) => Ok(url),
        Endpoint::Http(url) => Err(CoreError::InvalidConnection(format!(
            "`{url}` is an HTTP endpoint; expected ws or wss"
        ))),
    }
}
