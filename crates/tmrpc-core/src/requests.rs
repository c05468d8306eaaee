//! Request parameters and tag-query construction.
//!
//! Builders here translate typed inputs into the JSON parameter objects the
//! node expects. Heights travel as decimal strings, transaction bytes and
//! hashes as base64, and `abci_query` data as hex.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::Value;

use crate::responses::TxHash;
use crate::rpc::Params;

/// Node-side JSON-RPC method names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Health,
    Status,
    AbciInfo,
    AbciQuery,
    Block,
    Blockchain,
    BlockResults,
    Commit,
    Genesis,
    Validators,
    BroadcastTxSync,
    BroadcastTxAsync,
    BroadcastTxCommit,
    Tx,
    TxSearch,
    Subscribe,
    Unsubscribe,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Health => "health",
            Self::Status => "status",
            Self::AbciInfo => "abci_info",
            Self::AbciQuery => "abci_query",
            Self::Block => "block",
            Self::Blockchain => "blockchain",
            Self::BlockResults => "block_results",
            Self::Commit => "commit",
            Self::Genesis => "genesis",
            Self::Validators => "validators",
            Self::BroadcastTxSync => "broadcast_tx_sync",
            Self::BroadcastTxAsync => "broadcast_tx_async",
            Self::BroadcastTxCommit => "broadcast_tx_commit",
            Self::Tx => "tx",
            Self::TxSearch => "tx_search",
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==============================================================================
// Typed Parameters
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbciQueryParams {
    pub path: String,
    pub data: Vec<u8>,
    pub height: Option<u64>,
    pub prove: bool,
}

impl AbciQueryParams {
    pub fn new(path: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            data: data.into(),
            height: None,
            prove: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxParams {
    pub hash: TxHash,
    pub prove: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxSearchParams {
    pub query: QueryString,
    pub prove: bool,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl TxSearchParams {
    pub fn new(query: QueryString) -> Self {
        Self {
            query,
            prove: false,
            page: None,
            per_page: None,
        }
    }
}

/// How a protocol version spells the proof flag of `abci_query`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProveFlag {
    /// `trusted: true` means "skip the proof".
    Trusted,
    Prove,
}

// ==============================================================================
// Tag Queries
// ==============================================================================

/// A server-side filter expression such as `tm.event='Tx' AND tx.height>5`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryString(String);

impl QueryString {
    pub fn new(query: impl Into<String>) -> Self {
        Self(query.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Join two expressions with `AND`; an empty side is dropped.
    pub fn and(&self, other: &QueryString) -> QueryString {
        match (self.0.is_empty(), other.0.is_empty()) {
            (true, _) => other.clone(),
            (_, true) => self.clone(),
            _ => QueryString(format!("{} AND {}", self.0, other.0)),
        }
    }
}

impl fmt::Display for QueryString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTag {
    pub key: String,
    pub value: String,
}

impl QueryTag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Typed transaction filter. Each `Some` field becomes one clause.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxQuery {
    pub tags: Vec<QueryTag>,
    pub height: Option<u64>,
    pub min_height: Option<u64>,
    pub max_height: Option<u64>,
    pub hash: Option<TxHash>,
}

/// Render a filter as a tag query.
///
/// Clause order is fixed: tags as given, then `tx.height=`, `tx.height>`,
/// `tx.height<`, `tx.hash=`.
pub fn build_tx_query(query: &TxQuery) -> QueryString {
    let mut clauses: Vec<String> = query
        .tags
        .iter()
        .map(|tag| format!("{}='{}'", tag.key, tag.value))
        .collect();
    if let Some(height) = query.height {
        clauses.push(format!("tx.height={height}"));
    }
    if let Some(min) = query.min_height {
        clauses.push(format!("tx.height>{min}"));
    }
    if let Some(max) = query.max_height {
        clauses.push(format!("tx.height<{max}"));
    }
    if let Some(hash) = &query.hash {
        clauses.push(format!("tx.hash='{hash}'"));
    }
    QueryString(clauses.join(" AND "))
}

/// Event families a client can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    NewBlock,
    NewBlockHeader,
    Tx,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NewBlock => "NewBlock",
            Self::NewBlockHeader => "NewBlockHeader",
            Self::Tx => "Tx",
        }
    }

    pub fn query(self) -> QueryString {
        QueryString(format!("tm.event='{}'", self.as_str()))
    }
}

// ==============================================================================
// Parameter Encoding
// ==============================================================================

fn height_value(height: u64) -> Value {
    Value::String(height.to_string())
}

pub(crate) fn encode_height(height: Option<u64>) -> Params {
    let mut params = Params::new();
    if let Some(height) = height {
        params.insert("height".into(), height_value(height));
    }
    params
}

pub(crate) fn encode_blockchain(min_height: Option<u64>, max_height: Option<u64>) -> Params {
    let mut params = Params::new();
    if let Some(min) = min_height {
        params.insert("minHeight".into(), height_value(min));
    }
    if let Some(max) = max_height {
        params.insert("maxHeight".into(), height_value(max));
    }
    params
}

pub(crate) fn encode_broadcast_tx(tx: &[u8]) -> Params {
    let mut params = Params::new();
    params.insert("tx".into(), Value::String(BASE64.encode(tx)));
    params
}

pub(crate) fn encode_abci_query(query: &AbciQueryParams, flag: ProveFlag) -> Params {
    let mut params = Params::new();
    params.insert("path".into(), Value::String(query.path.clone()));
    params.insert("data".into(), Value::String(hex::encode(&query.data)));
    if let Some(height) = query.height {
        params.insert("height".into(), height_value(height));
    }
    match flag {
        ProveFlag::Trusted => params.insert("trusted".into(), Value::Bool(!query.prove)),
        ProveFlag::Prove => params.insert("prove".into(), Value::Bool(query.prove)),
    };
    params
}

pub(crate) fn encode_tx(params: &TxParams) -> Params {
    let mut encoded = Params::new();
    encoded.insert(
        "hash".into(),
        Value::String(BASE64.encode(params.hash.as_bytes())),
    );
    encoded.insert("prove".into(), Value::Bool(params.prove));
    encoded
}

pub(crate) fn encode_tx_search(params: &TxSearchParams) -> Params {
    let mut encoded = Params::new();
    encoded.insert("query".into(), Value::String(params.query.to_string()));
    encoded.insert("prove".into(), Value::Bool(params.prove));
    if let Some(page) = params.page {
        encoded.insert("page".into(), Value::from(page));
    }
    if let Some(per_page) = params.per_page {
        encoded.insert("per_page".into(), Value::from(per_page));
    }
    encoded
}

pub(crate) fn encode_subscribe(query: &QueryString) -> Params {
    let mut params = Params::new();
    params.insert("query".into(), Value::String(query.to_string()));
    params
}
