//! Typed response model shared by every protocol version.
//!
//! Byte fields are decoded from whichever encoding the node uses for them,
//! integers are normalised from decimal strings or numbers, and fields a
//! node may omit are `Option`s. Nothing here is tied to the wire format.

use std::collections::BTreeMap;
use std::fmt;

use time::OffsetDateTime;

// ==============================================================================
// Identifiers And Keys
// ==============================================================================

/// Transaction identifier as computed by the node's hash algorithm.
///
/// Displays as upper-case hex, the form tag queries and block explorers use.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxHash(Vec<u8>);

impl TxHash {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, hex::FromHexError> {
        hex::decode(hex_str).map(Self)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(&self.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Ed25519,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    pub algorithm: Algorithm,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteSignature {
    pub algorithm: Algorithm,
    pub signature: Vec<u8>,
}

// ==============================================================================
// Endpoint Responses
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbciInfoResponse {
    pub data: Option<String>,
    pub last_block_height: Option<u64>,
    pub last_block_app_hash: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbciQueryResponse {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub height: Option<u64>,
    pub index: Option<u64>,
    /// Only set when the application rejected the query.
    pub code: Option<u32>,
    pub log: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockResponse {
    pub block_meta: BlockMeta,
    pub block: Block,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockResultsResponse {
    pub height: u64,
    pub results: Vec<TxData>,
    pub end_block: EndBlock,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndBlock {
    pub validator_updates: Vec<Validator>,
    pub consensus_updates: Option<ConsensusParams>,
    pub tags: Option<Vec<Tag>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockchainResponse {
    pub last_height: u64,
    pub block_metas: Vec<BlockMeta>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastTxSyncResponse {
    pub result: TxData,
    pub hash: TxHash,
}

pub type BroadcastTxAsyncResponse = BroadcastTxSyncResponse;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastTxCommitResponse {
    pub height: Option<u64>,
    pub hash: TxHash,
    pub check_tx: TxData,
    pub deliver_tx: Option<TxData>,
}

/// True only when both the check and the delivery phase reported code 0.
pub fn tx_commit_success(response: &BroadcastTxCommitResponse) -> bool {
    response.check_tx.code == 0
        && response
            .deliver_tx
            .as_ref()
            .is_some_and(|deliver| deliver.code == 0)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitResponse {
    pub canonical: bool,
    pub header: Header,
    pub commit: Commit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenesisResponse {
    pub genesis_time: OffsetDateTime,
    pub chain_id: String,
    pub consensus_params: ConsensusParams,
    pub validators: Vec<Validator>,
    pub app_hash: Vec<u8>,
    /// Application-defined; kept as JSON.
    pub app_state: Option<serde_json::Value>,
}

pub type HealthResponse = ();

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusResponse {
    pub node_info: NodeInfo,
    pub sync_info: SyncInfo,
    pub validator_info: Validator,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxResponse {
    pub tx: Vec<u8>,
    pub tx_result: TxData,
    pub height: u64,
    pub index: u32,
    pub hash: TxHash,
    pub proof: Option<TxProof>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxSearchResponse {
    pub total_count: u64,
    pub txs: Vec<TxResponse>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorsResponse {
    pub block_height: u64,
    pub results: Vec<Validator>,
}

// ==============================================================================
// Events
// ==============================================================================

pub type NewBlockEvent = Block;
pub type NewBlockHeaderEvent = Header;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxEvent {
    pub tx: Vec<u8>,
    /// Computed locally with the bound protocol version's hash.
    pub hash: TxHash,
    pub result: TxData,
    pub height: u64,
    pub index: u32,
}

// ==============================================================================
// Shared Structures
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// Outcome of running a transaction through the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxData {
    pub code: u32,
    pub log: Option<String>,
    pub data: Option<Vec<u8>>,
    pub tags: Option<Vec<Tag>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxProof {
    pub data: Vec<u8>,
    pub root_hash: Vec<u8>,
    pub total: u64,
    pub index: u64,
    pub aunts: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockMeta {
    pub block_id: BlockId,
    pub header: Header,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockId {
    pub hash: Vec<u8>,
    pub parts: PartSetHeader,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartSetHeader {
    pub total: u64,
    pub hash: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub header: Header,
    pub last_commit: Commit,
    pub txs: Vec<Vec<u8>>,
    pub evidence: Option<Vec<Evidence>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evidence {
    pub kind: String,
    pub validator: Validator,
    pub height: u64,
    pub time: u64,
    pub total_voting_power: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub block_id: BlockId,
    /// `None` where a validator did not precommit.
    pub precommits: Vec<Option<Vote>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vote {
    pub kind: u32,
    pub validator_address: Vec<u8>,
    pub validator_index: u64,
    pub height: u64,
    pub round: u64,
    pub timestamp: OffsetDateTime,
    pub block_id: BlockId,
    pub signature: VoteSignature,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub chain_id: String,
    pub height: u64,
    pub time: OffsetDateTime,
    pub num_txs: u64,
    pub total_txs: u64,
    pub last_block_id: BlockId,

    pub app_hash: Vec<u8>,
    pub consensus_hash: Vec<u8>,
    pub data_hash: Vec<u8>,
    pub evidence_hash: Vec<u8>,
    pub last_commit_hash: Vec<u8>,
    pub last_results_hash: Vec<u8>,
    pub validators_hash: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub id: Vec<u8>,
    pub listen_addr: String,
    pub network: String,
    pub version: String,
    pub channels: String,
    pub moniker: String,
    pub other: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncInfo {
    pub latest_block_hash: Vec<u8>,
    pub latest_app_hash: Vec<u8>,
    pub latest_block_height: u64,
    pub latest_block_time: OffsetDateTime,
    pub catching_up: bool,
}

/// A validator as reported by genesis, status, validator sets or evidence.
/// Which optional fields are set depends on the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validator {
    pub address: Option<Vec<u8>>,
    pub pubkey: PublicKey,
    pub voting_power: i64,
    pub name: Option<String>,
    pub accum: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusParams {
    pub block_size: BlockSizeParams,
    pub evidence: EvidenceParams,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSizeParams {
    pub max_bytes: u64,
    pub max_gas: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceParams {
    pub max_age: u64,
}
